//! One row of a table.
//!
//! Values are strings; typed accessors convert at the boundary. Every
//! accessor checks the field name against the owning table's schema.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{Datelike, NaiveDate, NaiveDateTime};

use crate::codec::Fields;
use crate::error::{TableError, TableResult};
use crate::schema::Schema;

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn int_to_str(x: i64) -> String {
    x.to_string()
}

/// Shortest text that parses back to `x`, never in exponent form.
pub fn float_to_str(x: f64) -> String {
    x.to_string()
}

/// Dates and date-times sort as text, so only four-digit years are stored.
pub const MIN_YEAR: i32 = 0;
pub const MAX_YEAR: i32 = 9999;

/// `None` for years outside `MIN_YEAR..=MAX_YEAR`.
pub fn date_to_str(date: NaiveDate) -> Option<String> {
    (MIN_YEAR..=MAX_YEAR)
        .contains(&date.year())
        .then(|| date.format(DATE_FORMAT).to_string())
}

/// `None` for years outside `MIN_YEAR..=MAX_YEAR`.
pub fn datetime_to_str(datetime: NaiveDateTime) -> Option<String> {
    (MIN_YEAR..=MAX_YEAR)
        .contains(&datetime.year())
        .then(|| datetime.format(DATETIME_FORMAT).to_string())
}

/// chrono accepts one-digit months, days and times; stored text must be
/// exactly as wide as the layout prints.
fn parse_date(s: &str) -> Option<NaiveDate> {
    let date = NaiveDate::parse_from_str(s, DATE_FORMAT).ok()?;
    (date_to_str(date)? == s).then_some(date)
}

fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    let datetime = NaiveDateTime::parse_from_str(s, DATETIME_FORMAT).ok()?;
    (datetime_to_str(datetime)? == s).then_some(datetime)
}

pub fn bool_to_str(b: bool) -> &'static str {
    if b {
        "true"
    } else {
        "false"
    }
}

pub fn bytes_to_str(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

fn out_of_range(field: &str, value: impl std::fmt::Display, expected: &'static str) -> TableError {
    TableError::InvalidValue { field: field.to_string(), value: value.to_string(), expected }
}

#[derive(Debug, Clone)]
pub struct Record {
    schema: Arc<Schema>,
    values: Fields,
    dirty: bool,
    deleted: bool,
}

impl Record {
    /// A record as decoded from storage: clean.
    pub(crate) fn loaded(schema: Arc<Schema>, values: Fields) -> Self {
        Self { schema, values, dirty: false, deleted: false }
    }

    /// A record created in memory: dirty until saved.
    pub(crate) fn added(schema: Arc<Schema>, values: Fields) -> Self {
        Self { schema, values, dirty: true, deleted: false }
    }

    fn check(&self, field: &str) -> TableResult<()> {
        self.schema.require(field).map(|_| ())
    }

    fn parsed<T>(
        &self,
        field: &str,
        expected: &'static str,
        parse: impl FnOnce(&str) -> Option<T>,
    ) -> TableResult<Option<T>> {
        match self.get(field)? {
            None => Ok(None),
            Some(raw) => parse(raw).map(Some).ok_or_else(|| TableError::InvalidValue {
                field: field.to_string(),
                value: raw.to_string(),
                expected,
            }),
        }
    }

    /// Raw string value. `Ok(None)` if the field is in the schema but unset.
    pub fn get(&self, field: &str) -> TableResult<Option<&str>> {
        self.check(field)?;
        Ok(self.values.get(field).map(String::as_str))
    }

    /// Raw string value, or `default` if unset.
    pub fn get_or<'a>(&'a self, field: &str, default: &'a str) -> TableResult<&'a str> {
        Ok(self.get(field)?.unwrap_or(default))
    }

    pub fn get_int(&self, field: &str) -> TableResult<Option<i64>> {
        self.parsed(field, "int", |s| s.parse().ok())
    }

    pub fn get_float(&self, field: &str) -> TableResult<Option<f64>> {
        self.parsed(field, "float", |s| s.parse().ok())
    }

    pub fn get_date(&self, field: &str) -> TableResult<Option<NaiveDate>> {
        self.parsed(field, "date", parse_date)
    }

    pub fn get_datetime(&self, field: &str) -> TableResult<Option<NaiveDateTime>> {
        self.parsed(field, "datetime", parse_datetime)
    }

    /// Only the literals `true` and `false` are accepted.
    pub fn get_bool(&self, field: &str) -> TableResult<Option<bool>> {
        self.parsed(field, "bool", |s| match s {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        })
    }

    pub fn get_bytes(&self, field: &str) -> TableResult<Option<Vec<u8>>> {
        self.parsed(field, "base64 bytes", |s| STANDARD.decode(s).ok())
    }

    /// Store a raw string value and mark the record dirty.
    pub fn set(&mut self, field: &str, value: impl Into<String>) -> TableResult<()> {
        self.check(field)?;
        self.values.insert(field.to_string(), value.into());
        self.dirty = true;
        Ok(())
    }

    pub fn set_int(&mut self, field: &str, value: i64) -> TableResult<()> {
        self.set(field, int_to_str(value))
    }

    pub fn set_float(&mut self, field: &str, value: f64) -> TableResult<()> {
        self.set(field, float_to_str(value))
    }

    /// Years outside `MIN_YEAR..=MAX_YEAR` are rejected.
    pub fn set_date(&mut self, field: &str, value: NaiveDate) -> TableResult<()> {
        let text = date_to_str(value).ok_or_else(|| out_of_range(field, value, "date"))?;
        self.set(field, text)
    }

    pub fn set_datetime(&mut self, field: &str, value: NaiveDateTime) -> TableResult<()> {
        let text = datetime_to_str(value).ok_or_else(|| out_of_range(field, value, "datetime"))?;
        self.set(field, text)
    }

    pub fn set_bool(&mut self, field: &str, value: bool) -> TableResult<()> {
        self.set(field, bool_to_str(value))
    }

    pub fn set_bytes(&mut self, field: &str, value: &[u8]) -> TableResult<()> {
        self.set(field, bytes_to_str(value))
    }

    /// All set fields, in name order.
    pub fn values(&self) -> &Fields {
        &self.values
    }

    /// Changed since it was loaded or last saved.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Marked for deletion on the next save.
    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    pub(crate) fn mark_deleted(&mut self) {
        self.deleted = true;
    }

    pub(crate) fn mark_clean(&mut self) {
        self.dirty = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldType;

    fn record() -> Record {
        let schema = Schema::new()
            .field("name", FieldType::String)
            .field("count", FieldType::Int)
            .field("price", FieldType::Float)
            .field("born", FieldType::Date)
            .field("seen", FieldType::DateTime)
            .field("active", FieldType::Bool)
            .field("blob", FieldType::Bytes);
        Record::loaded(Arc::new(schema), Fields::new())
    }

    #[test]
    fn test_typed_roundtrip() {
        let mut rec = record();
        let born = NaiveDate::from_ymd_opt(1999, 3, 4).unwrap();
        let seen = born.and_hms_opt(7, 8, 9).unwrap();

        rec.set_int("count", -42).unwrap();
        rec.set_float("price", 19.99).unwrap();
        rec.set_date("born", born).unwrap();
        rec.set_datetime("seen", seen).unwrap();
        rec.set_bool("active", true).unwrap();
        rec.set_bytes("blob", b"hello world").unwrap();

        assert_eq!(rec.get_int("count").unwrap(), Some(-42));
        assert_eq!(rec.get_float("price").unwrap(), Some(19.99));
        assert_eq!(rec.get_date("born").unwrap(), Some(born));
        assert_eq!(rec.get_datetime("seen").unwrap(), Some(seen));
        assert_eq!(rec.get_bool("active").unwrap(), Some(true));
        assert_eq!(rec.get_bytes("blob").unwrap(), Some(b"hello world".to_vec()));

        assert_eq!(rec.get("born").unwrap(), Some("1999-03-04"));
        assert_eq!(rec.get("seen").unwrap(), Some("1999-03-04 07:08:09"));
        assert_eq!(rec.get("blob").unwrap(), Some("aGVsbG8gd29ybGQ="));
    }

    #[test]
    fn test_float_text_has_no_exponent() {
        assert_eq!(float_to_str(7.0), "7");
        assert_eq!(float_to_str(0.1), "0.1");
        assert_eq!(float_to_str(1e21), "1000000000000000000000");
        assert_eq!(float_to_str(-2.5), "-2.5");
    }

    #[test]
    fn test_unset_and_default() {
        let rec = record();
        assert_eq!(rec.get("name").unwrap(), None);
        assert_eq!(rec.get_or("name", "anon").unwrap(), "anon");
        assert_eq!(rec.get_int("count").unwrap(), None);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let mut rec = record();
        assert!(matches!(rec.get("nope"), Err(TableError::UnknownField { .. })));
        assert!(matches!(rec.set("nope", "x"), Err(TableError::UnknownField { .. })));
        assert!(!rec.is_dirty());
    }

    #[test]
    fn test_bad_values_rejected() {
        let mut rec = record();
        rec.set("count", "twelve").unwrap();
        rec.set("active", "yes").unwrap();
        rec.set("born", "04/03/1999").unwrap();
        rec.set("blob", "not base64!").unwrap();

        assert!(matches!(rec.get_int("count"), Err(TableError::InvalidValue { expected: "int", .. })));
        assert!(matches!(rec.get_bool("active"), Err(TableError::InvalidValue { expected: "bool", .. })));
        assert!(matches!(rec.get_date("born"), Err(TableError::InvalidValue { .. })));
        assert!(matches!(rec.get_bytes("blob"), Err(TableError::InvalidValue { .. })));
    }

    #[test]
    fn test_short_date_fields_rejected() {
        let mut rec = record();
        rec.set("born", "2015-1-5").unwrap();
        rec.set("seen", "2015-01-05 7:08:09").unwrap();
        assert!(matches!(rec.get_date("born"), Err(TableError::InvalidValue { expected: "date", .. })));
        assert!(matches!(rec.get_datetime("seen"), Err(TableError::InvalidValue { expected: "datetime", .. })));

        rec.set("seen", "2015-1-5 7:8:9").unwrap();
        assert!(rec.get_datetime("seen").is_err());
        rec.set("born", "2015-01-05").unwrap();
        assert_eq!(rec.get_date("born").unwrap(), NaiveDate::from_ymd_opt(2015, 1, 5));
    }

    #[test]
    fn test_five_digit_years_rejected() {
        let mut rec = record();
        let far = NaiveDate::from_ymd_opt(12345, 1, 1).unwrap();
        assert!(matches!(rec.set_date("born", far), Err(TableError::InvalidValue { .. })));
        assert!(matches!(
            rec.set_datetime("seen", far.and_hms_opt(0, 0, 0).unwrap()),
            Err(TableError::InvalidValue { .. })
        ));
        assert!(!rec.is_dirty());

        let last = NaiveDate::from_ymd_opt(9999, 12, 31).unwrap();
        rec.set_date("born", last).unwrap();
        assert_eq!(rec.get("born").unwrap(), Some("9999-12-31"));
        // Stored text that chrono would read as a signed year
        rec.set("born", "+12345-01-01").unwrap();
        assert!(rec.get_date("born").is_err());
    }

    #[test]
    fn test_markers() {
        let mut rec = record();
        assert!(!rec.is_dirty());
        rec.set("name", "x").unwrap();
        assert!(rec.is_dirty());
        rec.mark_clean();
        assert!(!rec.is_dirty());
        rec.mark_deleted();
        assert!(rec.is_deleted());
        // Markers never show up as fields
        assert_eq!(rec.values().len(), 1);
    }
}
