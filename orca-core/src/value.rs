use rust_decimal::Decimal;
use std::fmt::{self, Display};
use time::{Date, OffsetDateTime, PrimitiveDateTime, Time};

/// A backend independent value: bound as a statement argument, returned in rows and
/// carried between struct fields and storage by the marshaler.
///
/// Every variant carries an `Option` so that a typed null (a null with a known type) can be
/// represented, `Value::Null` is the untyped null.
#[derive(Default, Debug, Clone)]
pub enum Value {
    #[default]
    Null,
    Boolean(Option<bool>),
    Int8(Option<i8>),
    Int16(Option<i16>),
    Int32(Option<i32>),
    Int64(Option<i64>),
    UInt8(Option<u8>),
    UInt16(Option<u16>),
    UInt32(Option<u32>),
    UInt64(Option<u64>),
    Float32(Option<f32>),
    Float64(Option<f64>),
    Decimal(Option<Decimal>),
    Varchar(Option<String>),
    Blob(Option<Box<[u8]>>),
    Date(Option<Date>),
    Time(Option<Time>),
    Timestamp(Option<PrimitiveDateTime>),
    TimestampWithTimezone(Option<OffsetDateTime>),
    Json(Option<serde_json::Value>),
    /// Textual value of a type the driver could not decode.
    Unknown(Option<String>),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Boolean(l), Self::Boolean(r)) => l == r,
            (Self::Int8(l), Self::Int8(r)) => l == r,
            (Self::Int16(l), Self::Int16(r)) => l == r,
            (Self::Int32(l), Self::Int32(r)) => l == r,
            (Self::Int64(l), Self::Int64(r)) => l == r,
            (Self::UInt8(l), Self::UInt8(r)) => l == r,
            (Self::UInt16(l), Self::UInt16(r)) => l == r,
            (Self::UInt32(l), Self::UInt32(r)) => l == r,
            (Self::UInt64(l), Self::UInt64(r)) => l == r,
            (Self::Float32(l), Self::Float32(r)) => l == r,
            (Self::Float64(l), Self::Float64(r)) => l == r,
            (Self::Decimal(l), Self::Decimal(r)) => l == r,
            (Self::Varchar(l), Self::Varchar(r)) => l == r,
            (Self::Blob(l), Self::Blob(r)) => l == r,
            (Self::Date(l), Self::Date(r)) => l == r,
            (Self::Time(l), Self::Time(r)) => l == r,
            (Self::Timestamp(l), Self::Timestamp(r)) => l == r,
            (Self::TimestampWithTimezone(l), Self::TimestampWithTimezone(r)) => l == r,
            (Self::Json(l), Self::Json(r)) => l == r,
            (Self::Unknown(l), Self::Unknown(r)) => l == r,
            _ => self.is_null() && other.is_null(),
        }
    }
}

impl Value {
    pub fn same_type(&self, other: &Self) -> bool {
        core::mem::discriminant(self) == core::mem::discriminant(other)
    }

    /// True for `Value::Null` as well as for any typed null.
    pub fn is_null(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Boolean(v) => v.is_none(),
            Value::Int8(v) => v.is_none(),
            Value::Int16(v) => v.is_none(),
            Value::Int32(v) => v.is_none(),
            Value::Int64(v) => v.is_none(),
            Value::UInt8(v) => v.is_none(),
            Value::UInt16(v) => v.is_none(),
            Value::UInt32(v) => v.is_none(),
            Value::UInt64(v) => v.is_none(),
            Value::Float32(v) => v.is_none(),
            Value::Float64(v) => v.is_none(),
            Value::Decimal(v) => v.is_none(),
            Value::Varchar(v) => v.is_none(),
            Value::Blob(v) => v.is_none(),
            Value::Date(v) => v.is_none(),
            Value::Time(v) => v.is_none(),
            Value::Timestamp(v) => v.is_none(),
            Value::TimestampWithTimezone(v) => v.is_none(),
            Value::Json(v) => v.is_none(),
            Value::Unknown(v) => v.is_none(),
        }
    }

    /// Collapse typed nulls into `Value::Null`.
    pub fn normalized(self) -> Value {
        if self.is_null() { Value::Null } else { self }
    }

    /// Signed integer view of any integral value, when it fits.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::Int8(Some(v)) => Some(v as i64),
            Value::Int16(Some(v)) => Some(v as i64),
            Value::Int32(Some(v)) => Some(v as i64),
            Value::Int64(Some(v)) => Some(v),
            Value::UInt8(Some(v)) => Some(v as i64),
            Value::UInt16(Some(v)) => Some(v as i64),
            Value::UInt32(Some(v)) => Some(v as i64),
            Value::UInt64(Some(v)) => i64::try_from(v).ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Varchar(Some(v)) | Value::Unknown(Some(v)) => Some(v),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Boolean(..) => "BOOLEAN",
            Value::Int8(..) => "TINYINT",
            Value::Int16(..) => "SMALLINT",
            Value::Int32(..) => "INTEGER",
            Value::Int64(..) => "BIGINT",
            Value::UInt8(..) => "UTINYINT",
            Value::UInt16(..) => "USMALLINT",
            Value::UInt32(..) => "UINTEGER",
            Value::UInt64(..) => "UBIGINT",
            Value::Float32(..) => "FLOAT",
            Value::Float64(..) => "DOUBLE",
            Value::Decimal(..) => "DECIMAL",
            Value::Varchar(..) => "VARCHAR",
            Value::Blob(..) => "BLOB",
            Value::Date(..) => "DATE",
            Value::Time(..) => "TIME",
            Value::Timestamp(..) => "TIMESTAMP",
            Value::TimestampWithTimezone(..) => "TIMESTAMPTZ",
            Value::Json(..) => "JSON",
            Value::Unknown(..) => "UNKNOWN",
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            return f.write_str("NULL");
        }
        match self {
            Value::Boolean(Some(v)) => write!(f, "{}", v),
            Value::Int8(Some(v)) => write!(f, "{}", v),
            Value::Int16(Some(v)) => write!(f, "{}", v),
            Value::Int32(Some(v)) => write!(f, "{}", v),
            Value::Int64(Some(v)) => write!(f, "{}", v),
            Value::UInt8(Some(v)) => write!(f, "{}", v),
            Value::UInt16(Some(v)) => write!(f, "{}", v),
            Value::UInt32(Some(v)) => write!(f, "{}", v),
            Value::UInt64(Some(v)) => write!(f, "{}", v),
            Value::Float32(Some(v)) => write!(f, "{}", v),
            Value::Float64(Some(v)) => write!(f, "{}", v),
            Value::Decimal(Some(v)) => write!(f, "{}", v),
            Value::Varchar(Some(v)) | Value::Unknown(Some(v)) => write!(f, "{:?}", v),
            Value::Blob(Some(v)) => write!(f, "x'{}'", hex::encode(v)),
            Value::Date(Some(v)) => write!(f, "{}", v),
            Value::Time(Some(v)) => write!(f, "{}", v),
            Value::Timestamp(Some(v)) => write!(f, "{}", v),
            Value::TimestampWithTimezone(Some(v)) => write!(f, "{}", v),
            Value::Json(Some(v)) => write!(f, "{}", v),
            _ => f.write_str("NULL"),
        }
    }
}
