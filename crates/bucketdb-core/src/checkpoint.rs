//! Checkpoint: collapse WAL history into one snapshot batch.
//!
//! Without checkpoints the WAL keeps every commit ever made and recovery
//! replays all of them. A checkpoint walks the live tree and emits the
//! smallest batch that rebuilds it:
//!
//! 1. `Reset`
//! 2. `CreateBucket` for each bucket, parents before children
//! 3. `SetSequence` for each bucket whose counter is non-zero
//! 4. `Put` for each live entry
//!
//! The WAL writer syncs that batch into a fresh file before deleting older
//! files (see `WalWriter::rotate_with_snapshot`).

use crate::bucket::Bucket;
use crate::format::Operation;

/// Result of a checkpoint.
#[derive(Debug, Clone, Default)]
pub struct CheckpointResult {
    /// Buckets in the snapshot
    pub buckets: usize,
    /// Live entries in the snapshot
    pub entries: usize,
    /// WAL files removed after the snapshot became durable
    pub removed_files: usize,
}

/// Build the snapshot batch for `root`.
pub(crate) fn snapshot_ops(root: &Bucket) -> (Vec<Operation>, CheckpointResult) {
    let mut ops = vec![Operation::Reset];
    let mut result = CheckpointResult::default();
    let mut path = Vec::new();
    walk(root, &mut path, &mut ops, &mut result);
    (ops, result)
}

fn walk(bucket: &Bucket, path: &mut Vec<String>, ops: &mut Vec<Operation>, result: &mut CheckpointResult) {
    if !path.is_empty() {
        result.buckets += 1;
        ops.push(Operation::CreateBucket { path: path.clone() });
        if bucket.sequence() > 0 {
            ops.push(Operation::SetSequence { path: path.clone(), value: bucket.sequence() });
        }
        for (key, value) in bucket.entries() {
            result.entries += 1;
            ops.push(Operation::Put { path: path.clone(), key: key.clone(), value: value.clone() });
        }
    }

    let mut children: Vec<(&str, &Bucket)> = bucket.children().collect();
    children.sort_unstable_by(|a, b| a.0.cmp(b.0));
    for (name, child) in children {
        path.push(name.to_string());
        walk(child, path, ops, result);
        path.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(segments: &[&str]) -> Vec<String> {
        segments.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_snapshot_rebuilds_identical_tree() {
        let mut root = Bucket::default();
        root.apply(&Operation::CreateBucket { path: p(&["locations"]) }).unwrap();
        root.apply(&Operation::CreateBucket { path: p(&["weather"]) }).unwrap();
        root.apply(&Operation::CreateBucket { path: p(&["weather", "loc_00001"]) }).unwrap();
        root.apply(&Operation::SetSequence { path: p(&["locations"]), value: 3 }).unwrap();
        root.apply(&Operation::Put { path: p(&["locations"]), key: b"00000001".to_vec(), value: b"x".to_vec() }).unwrap();
        root.apply(&Operation::Put { path: p(&["weather", "loc_00001"]), key: b"2015-01-01".to_vec(), value: b"y".to_vec() }).unwrap();

        let (ops, result) = snapshot_ops(&root);
        assert_eq!(ops[0], Operation::Reset);
        assert_eq!(result.buckets, 3);
        assert_eq!(result.entries, 2);

        let mut rebuilt = Bucket::default();
        for op in &ops {
            rebuilt.apply(op).unwrap();
        }
        let loc = rebuilt.resolve(&["locations"]).unwrap();
        assert_eq!(loc.sequence(), 3);
        assert_eq!(loc.get(b"00000001"), Some(&b"x"[..]));
        let w = rebuilt.resolve(&["weather", "loc_00001"]).unwrap();
        assert_eq!(w.get(b"2015-01-01"), Some(&b"y"[..]));
    }

    #[test]
    fn test_empty_tree_is_just_reset() {
        let (ops, result) = snapshot_ops(&Bucket::default());
        assert_eq!(ops, vec![Operation::Reset]);
        assert_eq!(result.buckets, 0);
    }
}
