//! Streaming decoder for InfluxDB annotated CSV.
//!
//! `/api/v2/query` answers with one or more tables. Each table opens with
//! `#datatype`, `#group` and `#default` annotation rows, then a header row,
//! then data rows. The first CSV column is reserved for the annotation name
//! and is empty on header and data rows.
//!
//! A query that fails after the server has started responding is reported as
//! a table whose header starts with `error`; its single data row carries the
//! message and an optional reference.

use std::collections::BTreeMap;

use base64::Engine;
use chrono::DateTime;
use csv_async::{AsyncReader, AsyncReaderBuilder, StringRecord};
use go_parse_duration::parse_duration;
use ordered_float::OrderedFloat;
use tokio::io::AsyncRead;
use tracing::debug;

use crate::error::{Error, Result};
use crate::record::{DataType, Record, TableMetadata};
use crate::value::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    /// Between tables, or reading data rows.
    Normal,
    /// Inside an annotation block, waiting for the header row.
    Annotation,
    /// Header row announced an error table.
    Error,
}

/// Incremental decoder for annotated CSV.
///
/// Rows are read from the underlying reader only as [`next`](Self::next) is
/// called, so memory use stays flat regardless of response size.
///
/// ```ignore
/// let mut parser = AnnotatedCsvParser::new(response_body);
/// while let Some(record) = parser.next().await? {
///     println!("{:?}", record.measurement());
/// }
/// ```
pub struct AnnotatedCsvParser<R: AsyncRead + Unpin> {
    csv: AsyncReader<R>,
    row: StringRecord,
    tables: TableReader,
}

impl<R: AsyncRead + Unpin + Send> AnnotatedCsvParser<R> {
    pub fn new(reader: R) -> Self {
        let csv = AsyncReaderBuilder::new()
            .has_headers(false) // header rows are table-scoped, handled below
            .flexible(true)
            .create_reader(reader);

        Self {
            csv,
            row: StringRecord::new(),
            tables: TableReader::default(),
        }
    }

    /// Decode the next record.
    ///
    /// Returns `Ok(None)` at end of input. After an error the parser should
    /// not be polled again.
    pub async fn next(&mut self) -> Result<Option<Record>> {
        loop {
            let more = self
                .csv
                .read_record(&mut self.row)
                .await
                .map_err(|e| Error::Csv(format!("CSV read error: {}", e)))?;
            if !more {
                return Ok(None);
            }
            if let Some(record) = self.tables.accept(&self.row)? {
                return Ok(Some(record));
            }
        }
    }

    /// Metadata of the table currently being read.
    pub fn current_table(&self) -> Option<&TableMetadata> {
        self.tables.table.as_ref()
    }
}

/// Row-level state machine, separate from the reader so a borrowed row can
/// be fed to it.
#[derive(Debug)]
struct TableReader {
    next_position: i32,
    table: Option<TableMetadata>,
    state: State,
    datatype_seen: bool,
}

impl Default for TableReader {
    fn default() -> Self {
        Self {
            next_position: 0,
            table: None,
            state: State::Normal,
            datatype_seen: false,
        }
    }
}

impl TableReader {
    fn accept(&mut self, row: &StringRecord) -> Result<Option<Record>> {
        // blank line between tables
        if row.len() <= 1 {
            return Ok(None);
        }

        // annotation and header cells are trimmed; string data cells keep
        // their whitespace
        let first = row.get(0).unwrap_or_default().trim();
        if first.starts_with('#') && self.state == State::Normal {
            self.table = Some(TableMetadata::new(self.next_position, row.len() - 1));
            self.next_position += 1;
            self.state = State::Annotation;
            self.datatype_seen = false;
        }

        let Some(table) = self.table.as_mut() else {
            return Err(Error::MissingAnnotation(
                "No annotations found before data".to_string(),
            ));
        };

        if row.len() - 1 != table.columns.len() {
            return Err(Error::ColumnMismatch {
                expected: table.columns.len(),
                actual: row.len() - 1,
            });
        }

        let cells = row.iter().skip(1);
        match first {
            "#datatype" => {
                for (column, cell) in table.columns.iter_mut().zip(cells) {
                    column.data_type = cell.trim().parse()?;
                }
                self.datatype_seen = true;
                Ok(None)
            }
            "#group" => {
                for (column, cell) in table.columns.iter_mut().zip(cells) {
                    column.group = cell.trim() == "true";
                }
                Ok(None)
            }
            "#default" => {
                for (column, cell) in table.columns.iter_mut().zip(cells) {
                    column.default_value = cell.to_string();
                }
                Ok(None)
            }
            "" => match self.state {
                State::Annotation => {
                    if !self.datatype_seen {
                        return Err(Error::MissingAnnotation(
                            "#datatype annotation not found".to_string(),
                        ));
                    }
                    if row.get(1).map(str::trim) == Some("error") {
                        self.state = State::Error;
                    } else {
                        for (column, cell) in table.columns.iter_mut().zip(cells) {
                            column.name = cell.trim().to_string();
                        }
                        self.state = State::Normal;
                        debug!(
                            table = table.position,
                            columns = table.columns.len(),
                            "started result table"
                        );
                    }
                    Ok(None)
                }
                State::Error => Err(error_table_row(row)),
                State::Normal => decode_row(table, row).map(Some),
            },
            other => Err(Error::Parse {
                message: format!("Invalid first cell: {}", other),
            }),
        }
    }
}

fn error_table_row(row: &StringRecord) -> Error {
    let message = match row.get(1) {
        Some(m) if !m.is_empty() => m.to_string(),
        _ => "Unknown query error".to_string(),
    };
    let reference = row
        .get(2)
        .filter(|r| !r.is_empty())
        .map(str::to_string);
    Error::Query {
        status: None,
        message,
        reference,
    }
}

fn decode_row(table: &TableMetadata, row: &StringRecord) -> Result<Record> {
    let mut values = BTreeMap::new();
    for (column, cell) in table.columns.iter().zip(row.iter().skip(1)) {
        let raw = if cell.is_empty() {
            column.default_value.as_str()
        } else {
            cell
        };
        values.insert(
            column.name.clone(),
            parse_value(raw, column.data_type, &column.name)?,
        );
    }
    Ok(Record {
        table: table.position,
        values,
    })
}

/// Decode one cell according to its column datatype.
fn parse_value(s: &str, data_type: DataType, column: &str) -> Result<Value> {
    let s = match data_type {
        DataType::String => s,
        _ => s.trim(),
    };
    if s.is_empty() && data_type != DataType::String {
        return Ok(Value::Null);
    }

    let invalid = |detail: String| Error::Parse {
        message: format!(
            "Invalid {} '{}' for column '{}': {}",
            data_type, s, column, detail
        ),
    };

    Ok(match data_type {
        DataType::String => Value::String(s.to_string()),
        DataType::Double => Value::Double(OrderedFloat(
            s.parse::<f64>().map_err(|e| invalid(e.to_string()))?,
        )),
        DataType::Bool => Value::Bool(!s.eq_ignore_ascii_case("false")),
        DataType::Long => Value::Long(s.parse::<i64>().map_err(|e| invalid(e.to_string()))?),
        DataType::UnsignedLong => {
            Value::UnsignedLong(s.parse::<u64>().map_err(|e| invalid(e.to_string()))?)
        }
        DataType::Duration => {
            let nanos = parse_duration(s).map_err(|_| invalid("not a duration".to_string()))?;
            Value::Duration(chrono::Duration::nanoseconds(nanos))
        }
        DataType::Base64Binary => Value::Base64Binary(
            base64::engine::general_purpose::STANDARD
                .decode(s)
                .map_err(|e| invalid(e.to_string()))?,
        ),
        DataType::TimeRFC => {
            Value::TimeRFC(DateTime::parse_from_rfc3339(s).map_err(|e| invalid(e.to_string()))?)
        }
    })
}
