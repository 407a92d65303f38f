//! Multi-key orderings over a table's records.
//!
//! An ordering is a plain `Vec` of record keys computed once. It is not kept
//! in sync with later mutations; rebuild it under the same name to refresh.

use std::cmp::Ordering;

use hashbrown::HashMap;

use crate::error::TableResult;
use crate::record::Record;
use crate::schema::{FieldType, Schema};

/// Name of the natural key order recorded by full, range and prefix loads.
pub const BY_KEY: &str = "byKey";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

/// One sort key: a field and its direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    pub field: String,
    pub direction: Direction,
}

impl SortSpec {
    pub fn asc(field: impl Into<String>) -> Self {
        Self { field: field.into(), direction: Direction::Asc }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self { field: field.into(), direction: Direction::Desc }
    }

    /// `"h:d"` or `"h:desc"` sorts descending; `"h"`, `"h:a"`, `"h:asc"` ascending.
    pub fn parse(spec: &str) -> Self {
        if let Some((field, suffix)) = spec.rsplit_once(':') {
            match suffix {
                "d" | "desc" => return Self::desc(field),
                "a" | "asc" => return Self::asc(field),
                _ => {}
            }
        }
        Self::asc(spec)
    }
}

impl From<&str> for SortSpec {
    fn from(spec: &str) -> Self {
        SortSpec::parse(spec)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum SortValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl SortValue {
    fn compare(&self, other: &SortValue) -> Ordering {
        match (self, other) {
            (SortValue::Int(a), SortValue::Int(b)) => a.cmp(b),
            (SortValue::Float(a), SortValue::Float(b)) => a.total_cmp(b),
            (SortValue::Text(a), SortValue::Text(b)) => a.cmp(b),
            // One spec always yields one variant
            _ => Ordering::Equal,
        }
    }
}

fn sort_value(record: &Record, field: &str, ty: FieldType) -> TableResult<SortValue> {
    Ok(match ty {
        FieldType::Int => SortValue::Int(record.get_int(field)?.unwrap_or(0)),
        FieldType::Float => SortValue::Float(record.get_float(field)?.unwrap_or(0.0)),
        // Dates sort as text once their fixed width is confirmed
        FieldType::Date => {
            record.get_date(field)?;
            SortValue::Text(record.get(field)?.unwrap_or("").to_string())
        }
        FieldType::DateTime => {
            record.get_datetime(field)?;
            SortValue::Text(record.get(field)?.unwrap_or("").to_string())
        }
        _ => SortValue::Text(record.get(field)?.unwrap_or("").to_string()),
    })
}

/// Sort the keys of `records` by `specs`, first spec first.
///
/// Records that compare equal on every spec end up in unspecified order.
pub fn build_order(
    records: &HashMap<String, Record>,
    schema: &Schema,
    specs: &[SortSpec],
) -> TableResult<Vec<String>> {
    let types = specs
        .iter()
        .map(|spec| schema.require(&spec.field))
        .collect::<TableResult<Vec<_>>>()?;

    let mut rows = Vec::with_capacity(records.len());
    for (key, record) in records {
        let values = specs
            .iter()
            .zip(&types)
            .map(|(spec, ty)| sort_value(record, &spec.field, *ty))
            .collect::<TableResult<Vec<_>>>()?;
        rows.push((key, values));
    }

    rows.sort_unstable_by(|(_, a), (_, b)| {
        for ((x, y), spec) in a.iter().zip(b).zip(specs) {
            let ord = match spec.direction {
                Direction::Asc => x.compare(y),
                Direction::Desc => y.compare(x),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });

    Ok(rows.into_iter().map(|(key, _)| key.clone()).collect())
}
