//! Records and table metadata of a Flux query result.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset};

use crate::error::Error;
use crate::value::Value;

pub const MEASUREMENT_COLUMN: &str = "_measurement";
pub const FIELD_COLUMN: &str = "_field";
pub const VALUE_COLUMN: &str = "_value";
pub const TIME_COLUMN: &str = "_time";
pub const START_COLUMN: &str = "_start";
pub const STOP_COLUMN: &str = "_stop";

/// Column datatypes of InfluxDB annotated CSV.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DataType {
    String,
    Double,
    Bool,
    Long,
    UnsignedLong,
    /// Go-style duration, e.g. `1h30m`.
    Duration,
    Base64Binary,
    /// RFC3339 timestamp, optionally with nanoseconds.
    TimeRFC,
}

impl FromStr for DataType {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input {
            "string" => Ok(Self::String),
            "double" => Ok(Self::Double),
            "boolean" => Ok(Self::Bool),
            "long" => Ok(Self::Long),
            "unsignedLong" => Ok(Self::UnsignedLong),
            "duration" => Ok(Self::Duration),
            "base64Binary" => Ok(Self::Base64Binary),
            "dateTime:RFC3339" | "dateTime:RFC3339Nano" => Ok(Self::TimeRFC),
            _ => Err(Error::UnknownDataType(input.to_string())),
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            DataType::String => "string",
            DataType::Double => "double",
            DataType::Bool => "boolean",
            DataType::Long => "long",
            DataType::UnsignedLong => "unsignedLong",
            DataType::Duration => "duration",
            DataType::Base64Binary => "base64Binary",
            DataType::TimeRFC => "dateTime:RFC3339",
        })
    }
}

/// A column of a result table, as described by its annotation rows.
#[derive(Clone, Debug, PartialEq)]
pub struct Column {
    pub name: String,
    pub data_type: DataType,
    /// Part of the table's group key (`#group` annotation).
    pub group: bool,
    /// Substituted for empty cells (`#default` annotation).
    pub default_value: String,
}

impl Default for Column {
    fn default() -> Self {
        Self {
            name: String::new(),
            data_type: DataType::String,
            group: false,
            default_value: String::new(),
        }
    }
}

/// Metadata of one table in a query response.
///
/// A response may carry several tables; each starts with a fresh annotation
/// block and gets the next position.
#[derive(Clone, Debug)]
pub struct TableMetadata {
    pub position: i32,
    pub columns: Vec<Column>,
}

impl TableMetadata {
    pub fn new(position: i32, column_count: usize) -> Self {
        Self {
            position,
            columns: vec![Column::default(); column_count],
        }
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Names of the group key columns, in column order.
    pub fn group_key(&self) -> impl Iterator<Item = &str> {
        self.columns
            .iter()
            .filter(|c| c.group)
            .map(|c| c.name.as_str())
    }
}

/// One row of a query result.
///
/// A record belongs to exactly one table and, through `_measurement`, to
/// exactly one measurement. Tag columns and the `_value` column are all
/// reachable with [`Record::value_by_key`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Record {
    /// Position of the table this record belongs to.
    pub table: i32,
    pub values: BTreeMap<String, Value>,
}

impl Record {
    pub fn new(table: i32) -> Self {
        Self {
            table,
            values: BTreeMap::new(),
        }
    }

    /// Builder-style insert, mostly useful for constructing records by hand.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Value of the column named `key`, if the record has it.
    pub fn value_by_key(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.value_by_key(key).and_then(Value::as_str)
    }

    pub fn get_double(&self, key: &str) -> Option<f64> {
        self.value_by_key(key).and_then(Value::as_double)
    }

    pub fn get_long(&self, key: &str) -> Option<i64> {
        self.value_by_key(key).and_then(Value::as_long)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.value_by_key(key).and_then(Value::as_bool)
    }

    /// `_measurement`
    pub fn measurement(&self) -> Option<&str> {
        self.get_str(MEASUREMENT_COLUMN)
    }

    /// `_field`
    pub fn field(&self) -> Option<&str> {
        self.get_str(FIELD_COLUMN)
    }

    /// `_value`, the primary value of the row.
    pub fn value(&self) -> Option<&Value> {
        self.value_by_key(VALUE_COLUMN)
    }

    /// `_time`
    pub fn time(&self) -> Option<&DateTime<FixedOffset>> {
        self.value_by_key(TIME_COLUMN).and_then(Value::as_time)
    }

    /// `_start`, the inclusive lower bound of the query range.
    pub fn start(&self) -> Option<&DateTime<FixedOffset>> {
        self.value_by_key(START_COLUMN).and_then(Value::as_time)
    }

    /// `_stop`, the exclusive upper bound of the query range.
    pub fn stop(&self) -> Option<&DateTime<FixedOffset>> {
        self.value_by_key(STOP_COLUMN).and_then(Value::as_time)
    }
}
