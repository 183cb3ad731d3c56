//! Typed builder for simple Flux queries.
//!
//! Covers the `from |> range |> filter |> limit` shape used for ad-hoc reads;
//! anything more involved can be passed to [`Query`](crate::Query) as text.
//!
//! ```ignore
//! let flux = Flux::from_bucket("my-bucket")
//!     .range(RangeBound::parse("-1d")?)
//!     .filter(
//!         Restriction::measurement()
//!             .equal("cpu")
//!             .and(Restriction::field().equal("usage_system")),
//!     );
//! assert!(flux.to_string().starts_with("from(bucket: \"my-bucket\")"));
//! ```

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use go_parse_duration::parse_duration;

use crate::error::{Error, Result};
use crate::record::{FIELD_COLUMN, MEASUREMENT_COLUMN};

const NANOS_PER_DAY: i64 = 86_400_000_000_000;

/// Start or stop of a `range()` call.
#[derive(Clone, Debug, PartialEq)]
pub enum RangeBound {
    /// Offset from now, e.g. `-1d`.
    Relative(chrono::Duration),
    Absolute(DateTime<Utc>),
}

impl RangeBound {
    /// Parse an RFC3339 instant, a whole number of days (`-7d`), or a
    /// Go-style duration (`-1h30m`).
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Ok(t) = DateTime::parse_from_rfc3339(s) {
            return Ok(RangeBound::Absolute(t.with_timezone(&Utc)));
        }
        let invalid = || Error::Config(format!("invalid range bound '{}'", s));

        if let Some(days) = s.strip_suffix('d').and_then(|d| d.parse::<i64>().ok()) {
            // rendering works in nanoseconds, so the offset has to fit there
            return chrono::Duration::try_days(days)
                .filter(|d| d.num_nanoseconds().is_some())
                .map(RangeBound::Relative)
                .ok_or_else(invalid);
        }
        let (sign, magnitude) = match s.strip_prefix('-') {
            Some(rest) => (-1, rest),
            None => (1, s),
        };
        parse_duration(magnitude)
            .map(|nanos| RangeBound::Relative(chrono::Duration::nanoseconds(sign * nanos)))
            .map_err(|_| invalid())
    }
}

impl fmt::Display for RangeBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RangeBound::Absolute(t) => f.write_str(&t.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            RangeBound::Relative(d) => {
                let Some(nanos) = d.num_nanoseconds() else {
                    // beyond ~292 years; whole seconds keep the sign
                    return write!(f, "{}s", d.num_seconds());
                };
                if nanos == 0 {
                    return f.write_str("0s");
                }
                // largest unit that divides evenly
                let units = [
                    (NANOS_PER_DAY, "d"),
                    (3_600_000_000_000, "h"),
                    (60_000_000_000, "m"),
                    (1_000_000_000, "s"),
                    (1_000_000, "ms"),
                    (1_000, "us"),
                ];
                for (size, suffix) in units {
                    if nanos % size == 0 {
                        return write!(f, "{}{}", nanos / size, suffix);
                    }
                }
                write!(f, "{}ns", nanos)
            }
        }
    }
}

/// Predicate body of a `filter()` call.
#[derive(Clone, Debug, PartialEq)]
pub enum Restriction {
    Equal { column: String, value: String },
    NotEqual { column: String, value: String },
    And(Vec<Restriction>),
    Or(Vec<Restriction>),
}

fn join(f: &mut fmt::Formatter<'_>, parts: &[Restriction], op: &str) -> fmt::Result {
    f.write_str("(")?;
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            write!(f, " {} ", op)?;
        }
        write!(f, "{}", part)?;
    }
    f.write_str(")")
}

/// A column awaiting a comparison; see [`Restriction::tag`].
#[derive(Clone, Debug)]
pub struct ColumnRestriction {
    column: String,
}

impl ColumnRestriction {
    pub fn equal(self, value: impl Into<String>) -> Restriction {
        Restriction::Equal {
            column: self.column,
            value: value.into(),
        }
    }

    pub fn not_equal(self, value: impl Into<String>) -> Restriction {
        Restriction::NotEqual {
            column: self.column,
            value: value.into(),
        }
    }
}

impl Restriction {
    pub fn measurement() -> ColumnRestriction {
        Self::tag(MEASUREMENT_COLUMN)
    }

    pub fn field() -> ColumnRestriction {
        Self::tag(FIELD_COLUMN)
    }

    /// Any column by name.
    pub fn tag(column: impl Into<String>) -> ColumnRestriction {
        ColumnRestriction {
            column: column.into(),
        }
    }

    pub fn and(self, other: Restriction) -> Restriction {
        match self {
            Restriction::And(mut all) => {
                all.push(other);
                Restriction::And(all)
            }
            first => Restriction::And(vec![first, other]),
        }
    }

    pub fn or(self, other: Restriction) -> Restriction {
        match self {
            Restriction::Or(mut any) => {
                any.push(other);
                Restriction::Or(any)
            }
            first => Restriction::Or(vec![first, other]),
        }
    }
}

impl fmt::Display for Restriction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Restriction::Equal { column, value } => {
                write!(f, "r[{}] == {}", quote(column), quote(value))
            }
            Restriction::NotEqual { column, value } => {
                write!(f, "r[{}] != {}", quote(column), quote(value))
            }
            Restriction::And(parts) => join(f, parts, "and"),
            Restriction::Or(parts) => join(f, parts, "or"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
enum Operator {
    Range {
        start: RangeBound,
        stop: Option<RangeBound>,
    },
    Filter(Restriction),
    Keep(Vec<String>),
    Limit(usize),
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operator::Range { start, stop: None } => write!(f, "range(start: {})", start),
            Operator::Range {
                start,
                stop: Some(stop),
            } => write!(f, "range(start: {}, stop: {})", start, stop),
            Operator::Filter(r) => write!(f, "filter(fn: (r) => {})", r),
            Operator::Keep(columns) => {
                let quoted: Vec<String> = columns.iter().map(|c| quote(c)).collect();
                write!(f, "keep(columns: [{}])", quoted.join(", "))
            }
            Operator::Limit(n) => write!(f, "limit(n: {})", n),
        }
    }
}

/// A `from()` source followed by piped operators. `Display` renders the
/// query text.
#[derive(Clone, Debug, PartialEq)]
pub struct Flux {
    bucket: String,
    operators: Vec<Operator>,
}

impl Flux {
    pub fn from_bucket(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            operators: Vec::new(),
        }
    }

    pub fn range(mut self, start: RangeBound) -> Self {
        self.operators.push(Operator::Range { start, stop: None });
        self
    }

    pub fn range_between(mut self, start: RangeBound, stop: RangeBound) -> Self {
        self.operators.push(Operator::Range {
            start,
            stop: Some(stop),
        });
        self
    }

    pub fn filter(mut self, restriction: Restriction) -> Self {
        self.operators.push(Operator::Filter(restriction));
        self
    }

    pub fn keep<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.operators
            .push(Operator::Keep(columns.into_iter().map(Into::into).collect()));
        self
    }

    /// Server-side limit, applied per table.
    pub fn limit(mut self, n: usize) -> Self {
        self.operators.push(Operator::Limit(n));
        self
    }
}

impl fmt::Display for Flux {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "from(bucket: {})", quote(&self.bucket))?;
        for op in &self.operators {
            write!(f, "\n\t|> {}", op)?;
        }
        Ok(())
    }
}

/// Flux string literal.
fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}
