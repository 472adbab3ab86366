use super::data_type::DataType;
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::str::FromStr;
use uuid::Uuid;

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIMESTAMP_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Decimal(Decimal),
    Text(String),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
    Uuid(Uuid),
    Bytea(Vec<u8>),
}

impl Value {
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Type of a non-null value
    #[must_use]
    pub const fn data_type(&self) -> Option<DataType> {
        match self {
            Self::Null => None,
            Self::Boolean(_) => Some(DataType::Boolean),
            Self::Integer(_) => Some(DataType::Integer),
            Self::Float(_) => Some(DataType::Float),
            Self::Decimal(_) => Some(DataType::Decimal),
            Self::Text(_) => Some(DataType::Text),
            Self::Date(_) => Some(DataType::Date),
            Self::Timestamp(_) => Some(DataType::Timestamp),
            Self::Uuid(_) => Some(DataType::Uuid),
            Self::Bytea(_) => Some(DataType::Bytea),
        }
    }

    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            Self::Decimal(d) => d.to_f64(),
            _ => None,
        }
    }

    /// Implicit conversion applied when a value is stored into or compared
    /// with a column of type `target`.
    ///
    /// Only lossless conversions are accepted: integers widen to float and
    /// decimal, text parses into date, timestamp and uuid, dates widen to
    /// timestamps. Everything else returns `None`.
    #[must_use]
    pub fn coerce(&self, target: DataType) -> Option<Self> {
        match (self, target) {
            (Self::Null, _) => Some(Self::Null),
            (v, t) if v.data_type() == Some(t) => Some(v.clone()),
            (Self::Integer(i), DataType::Float) => Some(Self::Float(*i as f64)),
            (Self::Integer(i), DataType::Decimal) => Some(Self::Decimal(Decimal::from(*i))),
            (Self::Float(f), DataType::Decimal) => Decimal::from_str(&f.to_string()).ok().map(Self::Decimal),
            (Self::Decimal(d), DataType::Float) => d.to_f64().map(Self::Float),
            (Self::Text(s), DataType::Date) => parse_date(s).map(Self::Date),
            (Self::Text(s), DataType::Timestamp) => parse_timestamp(s).map(Self::Timestamp),
            (Self::Text(s), DataType::Uuid) => Uuid::parse_str(s).ok().map(Self::Uuid),
            (Self::Date(d), DataType::Timestamp) => d.and_hms_opt(0, 0, 0).map(Self::Timestamp),
            _ => None,
        }
    }

    /// Explicit `CAST(value AS target)`, more permissive than [`Value::coerce`]
    pub fn cast(&self, target: DataType) -> Result<Self, String> {
        if let Some(value) = self.coerce(target) {
            return Ok(value);
        }

        let failed = || format!("Cannot cast {} to {target}", self.to_sql_literal());

        let value = match (self, target) {
            (Self::Text(s), DataType::Integer) => {
                Self::Integer(s.trim().parse().map_err(|_| failed())?)
            }
            (Self::Text(s), DataType::Float) => Self::Float(s.trim().parse().map_err(|_| failed())?),
            (Self::Text(s), DataType::Decimal) => {
                Self::Decimal(Decimal::from_str(s.trim()).map_err(|_| failed())?)
            }
            (Self::Text(s), DataType::Boolean) => match s.trim().to_uppercase().as_str() {
                "TRUE" | "T" | "1" => Self::Boolean(true),
                "FALSE" | "F" | "0" => Self::Boolean(false),
                _ => return Err(failed()),
            },
            (Self::Text(s), DataType::Bytea) => Self::Bytea(s.clone().into_bytes()),
            (Self::Float(f), DataType::Integer) => {
                let truncated = f.trunc();
                if truncated.is_finite()
                    && truncated >= i64::MIN as f64
                    && truncated <= i64::MAX as f64
                {
                    Self::Integer(truncated as i64)
                } else {
                    return Err(failed());
                }
            }
            (Self::Decimal(d), DataType::Integer) => {
                Self::Integer(d.trunc().to_i64().ok_or_else(failed)?)
            }
            (Self::Boolean(b), DataType::Integer) => Self::Integer(i64::from(*b)),
            (Self::Integer(i), DataType::Boolean) => Self::Boolean(*i != 0),
            (Self::Timestamp(t), DataType::Date) => Self::Date(t.date()),
            (v, DataType::Text) => Self::Text(v.to_string()),
            _ => return Err(failed()),
        };

        Ok(value)
    }

    /// SQL comparison; `None` when either side is NULL or the types are not
    /// comparable.
    #[must_use]
    pub fn sql_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Null, _) | (_, Self::Null) => None,
            (Self::Boolean(a), Self::Boolean(b)) => Some(a.cmp(b)),
            (Self::Integer(a), Self::Integer(b)) => Some(a.cmp(b)),
            (Self::Decimal(a), Self::Decimal(b)) => Some(a.cmp(b)),
            (Self::Integer(a), Self::Decimal(b)) => Some(Decimal::from(*a).cmp(b)),
            (Self::Decimal(a), Self::Integer(b)) => Some(a.cmp(&Decimal::from(*b))),
            (a, b) if a.data_type().is_some_and(DataType::is_numeric)
                && b.data_type().is_some_and(DataType::is_numeric) =>
            {
                a.as_f64()?.partial_cmp(&b.as_f64()?)
            }
            (Self::Text(a), Self::Text(b)) => Some(a.cmp(b)),
            (Self::Date(a), Self::Date(b)) => Some(a.cmp(b)),
            (Self::Timestamp(a), Self::Timestamp(b)) => Some(a.cmp(b)),
            (Self::Date(a), Self::Timestamp(b)) => a.and_hms_opt(0, 0, 0).map(|a| a.cmp(b)),
            (Self::Timestamp(a), Self::Date(b)) => b.and_hms_opt(0, 0, 0).map(|b| a.cmp(&b)),
            (Self::Uuid(a), Self::Uuid(b)) => Some(a.cmp(b)),
            (Self::Bytea(a), Self::Bytea(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Total order used by ORDER BY, GROUP BY and DISTINCT.
    ///
    /// NULL sorts after every other value and NaN after every other number;
    /// incomparable types fall back to a fixed rank per type.
    #[must_use]
    pub fn total_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Null, Self::Null) => Ordering::Equal,
            (Self::Null, _) => Ordering::Greater,
            (_, Self::Null) => Ordering::Less,
            _ if self.is_nan() || other.is_nan() => (self.type_rank(), self.is_nan())
                .cmp(&(other.type_rank(), other.is_nan())),
            _ => self
                .sql_cmp(other)
                .unwrap_or_else(|| self.type_rank().cmp(&other.type_rank())),
        }
    }

    fn is_nan(&self) -> bool {
        matches!(self, Self::Float(f) if f.is_nan())
    }

    const fn type_rank(&self) -> u8 {
        match self {
            Self::Boolean(_) => 0,
            Self::Integer(_) | Self::Float(_) | Self::Decimal(_) => 1,
            Self::Text(_) => 2,
            Self::Date(_) | Self::Timestamp(_) => 3,
            Self::Uuid(_) => 4,
            Self::Bytea(_) => 5,
            Self::Null => 6,
        }
    }

    /// Byte encoding whose lexicographic order follows [`Value::total_cmp`]
    /// among values of one type. `-0.0` encodes like `0.0` and every NaN
    /// alike.
    #[must_use]
    pub fn sort_key(&self) -> Vec<u8> {
        match self {
            Self::Null => Vec::new(),
            Self::Boolean(b) => vec![u8::from(*b)],
            Self::Integer(i) => sortable_i64(*i).to_vec(),
            Self::Float(f) => {
                // Adding 0.0 turns -0.0 into 0.0
                let f = if f.is_nan() { f64::NAN } else { f + 0.0 };
                let bits = f.to_bits();
                let bits = if bits >> 63 == 0 { bits ^ (1 << 63) } else { !bits };
                bits.to_be_bytes().to_vec()
            }
            Self::Decimal(d) => {
                let mut whole = d.trunc();
                whole.rescale(0);
                let mut fraction = d.fract();
                fraction.rescale(28);
                [sortable_i128(whole.mantissa()), sortable_i128(fraction.mantissa())].concat()
            }
            Self::Text(s) => s.as_bytes().to_vec(),
            Self::Date(d) => sortable_i64(i64::from(d.num_days_from_ce())).to_vec(),
            Self::Timestamp(t) => {
                let t = t.and_utc();
                let mut bytes = sortable_i64(t.timestamp()).to_vec();
                bytes.extend_from_slice(&t.timestamp_subsec_nanos().to_be_bytes());
                bytes
            }
            Self::Uuid(u) => u.as_bytes().to_vec(),
            Self::Bytea(b) => b.clone(),
        }
    }

    /// Renders the value as a SQL literal that parses back to the same value
    #[must_use]
    pub fn to_sql_literal(&self) -> String {
        match self {
            Self::Null => "NULL".to_string(),
            Self::Boolean(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
            Self::Integer(i) => i.to_string(),
            Self::Float(f) => format!("{f:?}"),
            Self::Decimal(d) => format!("CAST('{d}' AS DECIMAL)"),
            Self::Text(s) => format!("'{}'", s.replace('\'', "''")),
            Self::Date(d) => format!("DATE '{}'", d.format(DATE_FORMAT)),
            Self::Timestamp(t) => format!("TIMESTAMP '{}'", t.format("%Y-%m-%d %H:%M:%S%.f")),
            Self::Uuid(u) => format!("CAST('{u}' AS UUID)"),
            Self::Bytea(b) => format!("X'{}'", hex::encode(b)),
        }
    }
}

/// Big-endian with the sign bit flipped, so byte order is numeric order
const fn sortable_i64(i: i64) -> [u8; 8] {
    (u64::from_be_bytes(i.to_be_bytes()) ^ (1 << 63)).to_be_bytes()
}

const fn sortable_i128(i: i128) -> [u8; 16] {
    (u128::from_be_bytes(i.to_be_bytes()) ^ (1 << 127)).to_be_bytes()
}

pub fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT).ok()
}

pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| parse_date(s).and_then(|d| d.and_hms_opt(0, 0, 0)))
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Float(r) => write!(f, "{r}"),
            Self::Decimal(d) => write!(f, "{d}"),
            Self::Text(s) => write!(f, "{s}"),
            Self::Date(d) => write!(f, "{}", d.format(DATE_FORMAT)),
            Self::Timestamp(t) => write!(f, "{}", t.format("%Y-%m-%d %H:%M:%S%.f")),
            Self::Uuid(u) => write!(f, "{u}"),
            Self::Bytea(b) => write!(f, "\\x{}", hex::encode(b)),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}
