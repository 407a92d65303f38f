//! Ordered cursor over a bucket's entries.
//!
//! Cursors borrow the bucket of a transaction snapshot, so they see a stable
//! view for their whole lifetime. Keys come back in byte-ascending order.
//! Each positioning call is O(log n) via `BTreeMap::range`.

use std::ops::Bound;

use crate::bucket::Entries;

/// A key-value pair borrowed from the transaction snapshot
pub type Entry<'a> = (&'a [u8], &'a [u8]);

pub struct Cursor<'a> {
    entries: &'a Entries,
    /// Key of the entry most recently returned
    position: Option<&'a [u8]>,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(entries: &'a Entries) -> Self {
        Self { entries, position: None }
    }

    fn settle(&mut self, found: Option<(&'a Vec<u8>, &'a Vec<u8>)>) -> Option<Entry<'a>> {
        match found {
            Some((k, v)) => {
                self.position = Some(k.as_slice());
                Some((k.as_slice(), v.as_slice()))
            }
            None => {
                self.position = None;
                None
            }
        }
    }

    /// Move to the smallest key.
    pub fn first(&mut self) -> Option<Entry<'a>> {
        let found = self.entries.iter().next();
        self.settle(found)
    }

    /// Move to the largest key.
    pub fn last(&mut self) -> Option<Entry<'a>> {
        let found = self.entries.iter().next_back();
        self.settle(found)
    }

    /// Move to the first key >= `key`.
    pub fn seek(&mut self, key: &[u8]) -> Option<Entry<'a>> {
        let found = self
            .entries
            .range::<[u8], _>((Bound::Included(key), Bound::Unbounded))
            .next();
        self.settle(found)
    }

    /// Advance past the current key. Starts at `first` on a fresh cursor and
    /// stays exhausted once it has run off the end.
    pub fn next(&mut self) -> Option<Entry<'a>> {
        let found = match self.position {
            Some(pos) => self
                .entries
                .range::<[u8], _>((Bound::Excluded(pos), Bound::Unbounded))
                .next(),
            None => return self.first(),
        };
        match found {
            Some(_) => self.settle(found),
            None => {
                // Keep the position so repeated calls stay at the end
                None
            }
        }
    }

    /// Step back before the current key.
    pub fn prev(&mut self) -> Option<Entry<'a>> {
        let pos = match self.position {
            Some(pos) => pos,
            None => return self.last(),
        };
        let found = self
            .entries
            .range::<[u8], _>((Bound::Unbounded, Bound::Excluded(pos)))
            .next_back();
        match found {
            Some(_) => self.settle(found),
            None => None,
        }
    }

    /// Entry at the current position, if any.
    pub fn current(&self) -> Option<Entry<'a>> {
        let pos = self.position?;
        self.entries.get_key_value(pos).map(|(k, v)| (k.as_slice(), v.as_slice()))
    }
}

impl std::fmt::Debug for Cursor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("entries", &self.entries.len())
            .field("position", &self.position)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(keys: &[&str]) -> Entries {
        keys.iter()
            .map(|k| (k.as_bytes().to_vec(), format!("v-{}", k).into_bytes()))
            .collect()
    }

    fn key(entry: Option<Entry<'_>>) -> Option<String> {
        entry.map(|(k, _)| String::from_utf8(k.to_vec()).unwrap())
    }

    #[test]
    fn test_first_next_walks_in_byte_order() {
        let data = entries(&["b", "a", "c"]);
        let mut cursor = Cursor::new(&data);
        assert_eq!(key(cursor.first()), Some("a".into()));
        assert_eq!(key(cursor.next()), Some("b".into()));
        assert_eq!(key(cursor.next()), Some("c".into()));
        assert_eq!(key(cursor.next()), None);
        assert_eq!(key(cursor.next()), None);
    }

    #[test]
    fn test_seek_lands_on_first_greater_or_equal() {
        let data = entries(&["2014-12-31", "2015-01-01", "2015-03-04", "2016-01-01"]);
        let mut cursor = Cursor::new(&data);
        assert_eq!(key(cursor.seek(b"2015")), Some("2015-01-01".into()));
        assert_eq!(key(cursor.next()), Some("2015-03-04".into()));
        assert_eq!(key(cursor.seek(b"2015-03-04")), Some("2015-03-04".into()));
        assert_eq!(key(cursor.seek(b"2017")), None);
    }

    #[test]
    fn test_prev_and_last() {
        let data = entries(&["a", "b", "c"]);
        let mut cursor = Cursor::new(&data);
        assert_eq!(key(cursor.last()), Some("c".into()));
        assert_eq!(key(cursor.prev()), Some("b".into()));
        assert_eq!(key(cursor.prev()), Some("a".into()));
        assert_eq!(key(cursor.prev()), None);
        assert_eq!(key(cursor.current()), Some("a".into()));
    }

    #[test]
    fn test_empty_bucket() {
        let data = Entries::new();
        let mut cursor = Cursor::new(&data);
        assert!(cursor.first().is_none());
        assert!(cursor.next().is_none());
        assert!(cursor.current().is_none());
    }

    #[test]
    fn test_values_follow_keys() {
        let data = entries(&["k"]);
        let mut cursor = Cursor::new(&data);
        let (k, v) = cursor.first().unwrap();
        assert_eq!(k, b"k");
        assert_eq!(v, b"v-k");
    }
}
