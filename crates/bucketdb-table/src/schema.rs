//! Field schemas: which fields a table has and how each one is typed.
//!
//! Every value is stored as a string. The type only decides which accessors
//! are meaningful and how the field compares when building an ordering.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{TableError, TableResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    String,
    /// Signed 64-bit decimal
    Int,
    /// 64-bit float, shortest round-trip text without exponent
    Float,
    /// `YYYY-MM-DD`
    Date,
    /// `YYYY-MM-DD HH:MM:SS`
    DateTime,
    /// `true` or `false`
    Bool,
    /// Standard base64
    Bytes,
}

impl FieldType {
    pub fn as_str(self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Int => "int",
            FieldType::Float => "float",
            FieldType::Date => "date",
            FieldType::DateTime => "datetime",
            FieldType::Bool => "bool",
            FieldType::Bytes => "bytes",
        }
    }
}

impl FromStr for FieldType {
    type Err = TableError;

    fn from_str(tag: &str) -> TableResult<Self> {
        match tag {
            "str" | "string" => Ok(FieldType::String),
            "int" => Ok(FieldType::Int),
            "float" => Ok(FieldType::Float),
            "date" => Ok(FieldType::Date),
            "datetime" | "dateTime" => Ok(FieldType::DateTime),
            "bool" => Ok(FieldType::Bool),
            "bytes" => Ok(FieldType::Bytes),
            other => Err(TableError::InvalidSchema(format!("unknown type tag {:?}", other))),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Field name to type. Names are kept sorted for stable display.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    fields: BTreeMap<String, FieldType>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form; see `try_field` for the checked variant.
    ///
    /// The name is stored unchecked. `Table::new` rejects a schema holding an
    /// invalid name through `validate`.
    pub fn field(mut self, name: impl Into<String>, ty: FieldType) -> Self {
        self.fields.insert(name.into(), ty);
        self
    }

    /// Add one field, rejecting reserved or unencodable names.
    pub fn try_field(mut self, name: impl Into<String>, ty: FieldType) -> TableResult<Self> {
        let name = name.into();
        check_name(&name)?;
        self.fields.insert(name, ty);
        Ok(self)
    }

    /// Build from `(name, tag)` pairs, e.g. `[("color", "str"), ("w", "int")]`.
    pub fn from_tags<I, N, T>(pairs: I) -> TableResult<Self>
    where
        I: IntoIterator<Item = (N, T)>,
        N: Into<String>,
        T: AsRef<str>,
    {
        pairs
            .into_iter()
            .try_fold(Schema::new(), |schema, (name, tag)| {
                let ty = tag.as_ref().parse()?;
                schema.try_field(name, ty)
            })
    }

    /// Check every field name.
    pub fn validate(&self) -> TableResult<()> {
        self.fields.keys().try_for_each(|name| check_name(name))
    }

    pub fn field_type(&self, name: &str) -> Option<FieldType> {
        self.fields.get(name).copied()
    }

    /// Type of `name`, or `UnknownField`.
    pub fn require(&self, name: &str) -> TableResult<FieldType> {
        self.field_type(name)
            .ok_or_else(|| TableError::UnknownField { field: name.to_string() })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, FieldType)> {
        self.fields.iter().map(|(name, ty)| (name.as_str(), *ty))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (name, ty)) in self.fields().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: {}", name, ty)?;
        }
        f.write_str("}")
    }
}

fn check_name(name: &str) -> TableResult<()> {
    if name.is_empty() {
        return Err(TableError::InvalidSchema("empty field name".to_string()));
    }
    if name.starts_with('#') {
        return Err(TableError::InvalidSchema(format!("field name {:?} uses the reserved '#' prefix", name)));
    }
    if name.contains('"') {
        return Err(TableError::InvalidSchema(format!("field name {:?} contains a quote", name)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_tags() {
        let schema = Schema::from_tags([
            ("color", "str"),
            ("w", "int"),
            ("price", "float"),
            ("born", "date"),
            ("seen", "dateTime"),
            ("active", "bool"),
            ("blob", "bytes"),
        ])
        .unwrap();
        assert_eq!(schema.len(), 7);
        assert_eq!(schema.field_type("color"), Some(FieldType::String));
        assert_eq!(schema.field_type("seen"), Some(FieldType::DateTime));
        assert_eq!(schema.field_type("missing"), None);
    }

    #[test]
    fn test_unknown_tag_rejected() {
        let err = Schema::from_tags([("x", "decimal")]).unwrap_err();
        assert!(matches!(err, TableError::InvalidSchema(_)));
    }

    #[test]
    fn test_reserved_names_rejected() {
        assert!(Schema::new().try_field("#deleted", FieldType::String).is_err());
        assert!(Schema::new().try_field("", FieldType::String).is_err());
        assert!(Schema::new().try_field("a\"b", FieldType::String).is_err());

        let unchecked = Schema::new().field("#c", FieldType::String);
        assert!(unchecked.validate().is_err());
    }

    #[test]
    fn test_require() {
        let schema = Schema::new().field("w", FieldType::Int);
        assert_eq!(schema.require("w").unwrap(), FieldType::Int);
        assert!(matches!(schema.require("h"), Err(TableError::UnknownField { field }) if field == "h"));
    }

    #[test]
    fn test_display_sorted() {
        let schema = Schema::new().field("w", FieldType::Int).field("color", FieldType::String);
        assert_eq!(schema.to_string(), "{color: string, w: int}");
    }
}
