//! Typed cell values of a Flux result.

use chrono::{DateTime, FixedOffset};
use ordered_float::OrderedFloat;

use crate::record::DataType;

/// A single cell of a Flux result row.
///
/// Every annotated CSV datatype has a variant. Empty non-string cells decode
/// to [`Value::Null`].
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// `string`
    String(String),
    /// `double`
    Double(OrderedFloat<f64>),
    /// `boolean`
    Bool(bool),
    /// `long`
    Long(i64),
    /// `unsignedLong`
    UnsignedLong(u64),
    /// `duration`, kept at nanosecond precision.
    Duration(chrono::Duration),
    /// `base64Binary`, already decoded.
    Base64Binary(Vec<u8>),
    /// `dateTime:RFC3339` and `dateTime:RFC3339Nano`
    TimeRFC(DateTime<FixedOffset>),
    /// Empty cell.
    Null,
}

impl Value {
    /// The annotated CSV datatype this value was decoded from, or `None` for
    /// null.
    pub fn data_type(&self) -> Option<DataType> {
        Some(match self {
            Value::String(_) => DataType::String,
            Value::Double(_) => DataType::Double,
            Value::Bool(_) => DataType::Bool,
            Value::Long(_) => DataType::Long,
            Value::UnsignedLong(_) => DataType::UnsignedLong,
            Value::Duration(_) => DataType::Duration,
            Value::Base64Binary(_) => DataType::Base64Binary,
            Value::TimeRFC(_) => DataType::TimeRFC,
            Value::Null => return None,
        })
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            Value::Double(f) => Some(f.into_inner()),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_long(&self) -> Option<i64> {
        match self {
            Value::Long(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_unsigned_long(&self) -> Option<u64> {
        match self {
            Value::UnsignedLong(u) => Some(*u),
            _ => None,
        }
    }

    pub fn as_duration(&self) -> Option<&chrono::Duration> {
        match self {
            Value::Duration(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_binary(&self) -> Option<&[u8]> {
        match self {
            Value::Base64Binary(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_time(&self) -> Option<&DateTime<FixedOffset>> {
        match self {
            Value::TimeRFC(t) => Some(t),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// True when this is a string cell equal to `literal`.
    ///
    /// Cells of any other type never match, even if their rendering would.
    pub fn is_string_eq(&self, literal: &str) -> bool {
        self.as_str() == Some(literal)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Double(OrderedFloat(f))
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Long(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::String(s) => f.write_str(s),
            Value::Double(d) => write!(f, "{}", d),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Long(i) => write!(f, "{}", i),
            Value::UnsignedLong(u) => write!(f, "{}", u),
            Value::Duration(d) => write!(f, "{}ns", d.num_nanoseconds().unwrap_or(0)),
            Value::Base64Binary(b) => write!(f, "<binary {} bytes>", b.len()),
            Value::TimeRFC(t) => f.write_str(&t.to_rfc3339()),
            Value::Null => f.write_str("null"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_equality_only_matches_strings() {
        assert!(Value::from("cpu0").is_string_eq("cpu0"));
        assert!(!Value::from("cpu1").is_string_eq("cpu0"));
        assert!(!Value::Long(0).is_string_eq("0"));
        assert!(!Value::Null.is_string_eq("null"));
        assert!(!Value::Bool(true).is_string_eq("true"));
    }

    #[test]
    fn test_data_type() {
        assert_eq!(Value::from("a").data_type(), Some(DataType::String));
        assert_eq!(Value::from(1.5).data_type(), Some(DataType::Double));
        assert_eq!(Value::UnsignedLong(7).data_type(), Some(DataType::UnsignedLong));
        assert_eq!(Value::Null.data_type(), None);
    }

    #[test]
    fn test_accessors_reject_other_types() {
        assert_eq!(Value::from(2.5).as_double(), Some(2.5));
        assert_eq!(Value::Long(2).as_double(), None);
        assert_eq!(Value::Long(-3).as_long(), Some(-3));
        assert_eq!(Value::UnsignedLong(3).as_long(), None);
        assert_eq!(Value::from(false).as_bool(), Some(false));
        assert_eq!(Value::from("x").as_bool(), None);
        assert_eq!(Value::Base64Binary(vec![1, 2]).as_binary(), Some(&[1u8, 2][..]));
        assert!(Value::Null.as_time().is_none());
        assert!(Value::Null.is_null());
        assert!(!Value::from("").is_null());
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::from("usage").to_string(), "usage");
        assert_eq!(Value::from(1.0).to_string(), "1");
        assert_eq!(Value::from(2.5).to_string(), "2.5");
        assert_eq!(Value::Long(-7).to_string(), "-7");
        assert_eq!(Value::UnsignedLong(u64::MAX).to_string(), "18446744073709551615");
        assert_eq!(
            Value::Duration(chrono::Duration::seconds(2)).to_string(),
            "2000000000ns"
        );
        assert_eq!(Value::Base64Binary(vec![0; 3]).to_string(), "<binary 3 bytes>");
        assert_eq!(Value::Null.to_string(), "null");

        let t = DateTime::parse_from_rfc3339("2020-02-17T22:19:49.747562847Z").unwrap();
        assert!(Value::TimeRFC(t).to_string().starts_with("2020-02-17T22:19:49"));
    }
}
