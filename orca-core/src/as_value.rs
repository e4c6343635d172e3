use crate::{Error, Result, Value, truncate_long};
use rust_decimal::{Decimal, prelude::FromPrimitive, prelude::ToPrimitive};
use std::{any, str::FromStr};
use time::{Date, OffsetDateTime, Time, UtcOffset, macros::datetime};

/// The zero instant: what a non nullable time field holds before anything is assigned.
pub const ZERO_TIME: OffsetDateTime = datetime!(0001-01-01 0:00 UTC);

/// Conversion between a native field type and the dynamically typed [`Value`].
///
/// Derived models call it for every column field: `as_value` on read access, `try_from_value`
/// when the marshaler writes a converted storage value back and `zero` to build an empty
/// instance. Implementations accept their canonical variant and the lossless neighbours
/// (other integer widths with a range check, textual forms), anything else is an error naming
/// both the value and the target type.
pub trait AsValue {
    /// A typed null carrying the variant this type converts to.
    fn as_empty_value() -> Value;
    fn as_value(self) -> Value;
    fn try_from_value(value: Value) -> Result<Self>
    where
        Self: Sized;
    /// The value a freshly created record holds.
    fn zero() -> Self
    where
        Self: Sized;
}

impl<T: AsValue> From<T> for Value {
    fn from(value: T) -> Self {
        value.as_value()
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Varchar(Some(value.into()))
    }
}

fn mismatch<T>(value: &Value) -> Error {
    Error::msg(format!(
        "Cannot convert {} `{}` into {}",
        value.type_name(),
        truncate_long!(value.to_string()),
        any::type_name::<T>()
    ))
}

macro_rules! impl_as_value_integer {
    ($source:ty, $destination:path) => {
        impl AsValue for $source {
            fn as_empty_value() -> Value {
                $destination(None)
            }
            fn as_value(self) -> Value {
                $destination(Some(self))
            }
            #[allow(unreachable_patterns)]
            fn try_from_value(value: Value) -> Result<Self> {
                let wide: i128 = match &value {
                    $destination(Some(v)) => return Ok(*v),
                    Value::Int8(Some(v)) => *v as i128,
                    Value::Int16(Some(v)) => *v as i128,
                    Value::Int32(Some(v)) => *v as i128,
                    Value::Int64(Some(v)) => *v as i128,
                    Value::UInt8(Some(v)) => *v as i128,
                    Value::UInt16(Some(v)) => *v as i128,
                    Value::UInt32(Some(v)) => *v as i128,
                    Value::UInt64(Some(v)) => *v as i128,
                    Value::Boolean(Some(v)) => *v as i128,
                    Value::Float64(Some(v)) if v.fract() == 0.0 => *v as i128,
                    Value::Float32(Some(v)) if v.fract() == 0.0 => *v as i128,
                    Value::Decimal(Some(v)) if v.fract().is_zero() => {
                        v.to_i128().ok_or_else(|| mismatch::<Self>(&value))?
                    }
                    Value::Varchar(Some(v)) | Value::Unknown(Some(v)) => v
                        .trim()
                        .parse::<i128>()
                        .map_err(|_| mismatch::<Self>(&value))?,
                    _ => return Err(mismatch::<Self>(&value)),
                };
                <$source>::try_from(wide).map_err(|_| {
                    Error::msg(format!(
                        "Value {} is out of range for {}",
                        wide,
                        any::type_name::<Self>()
                    ))
                })
            }
            fn zero() -> Self {
                0
            }
        }
    };
}

impl_as_value_integer!(i8, Value::Int8);
impl_as_value_integer!(i16, Value::Int16);
impl_as_value_integer!(i32, Value::Int32);
impl_as_value_integer!(i64, Value::Int64);
impl_as_value_integer!(u8, Value::UInt8);
impl_as_value_integer!(u16, Value::UInt16);
impl_as_value_integer!(u32, Value::UInt32);
impl_as_value_integer!(u64, Value::UInt64);

macro_rules! impl_as_value_float {
    ($source:ty, $destination:path) => {
        impl AsValue for $source {
            fn as_empty_value() -> Value {
                $destination(None)
            }
            fn as_value(self) -> Value {
                $destination(Some(self))
            }
            #[allow(unreachable_patterns)]
            fn try_from_value(value: Value) -> Result<Self> {
                Ok(match &value {
                    $destination(Some(v)) => *v,
                    Value::Float32(Some(v)) => *v as _,
                    Value::Float64(Some(v)) => *v as _,
                    Value::Decimal(Some(v)) => {
                        v.to_f64().ok_or_else(|| mismatch::<Self>(&value))? as _
                    }
                    Value::Varchar(Some(v)) | Value::Unknown(Some(v)) => {
                        fast_float::parse::<$source, _>(v.trim())
                            .map_err(|_| mismatch::<Self>(&value))?
                    }
                    v => v.as_i64().ok_or_else(|| mismatch::<Self>(&value))? as _,
                })
            }
            fn zero() -> Self {
                0.0
            }
        }
    };
}

impl_as_value_float!(f32, Value::Float32);
impl_as_value_float!(f64, Value::Float64);

impl AsValue for bool {
    fn as_empty_value() -> Value {
        Value::Boolean(None)
    }
    fn as_value(self) -> Value {
        Value::Boolean(Some(self))
    }
    fn try_from_value(value: Value) -> Result<Self> {
        match &value {
            Value::Boolean(Some(v)) => Ok(*v),
            Value::Varchar(Some(v)) | Value::Unknown(Some(v)) => match v.trim() {
                "1" | "t" | "T" | "true" | "TRUE" | "True" => Ok(true),
                "0" | "f" | "F" | "false" | "FALSE" | "False" => Ok(false),
                _ => Err(mismatch::<Self>(&value)),
            },
            v => match v.as_i64() {
                Some(0) => Ok(false),
                Some(1) => Ok(true),
                _ => Err(mismatch::<Self>(&value)),
            },
        }
    }
    fn zero() -> Self {
        false
    }
}

impl AsValue for String {
    fn as_empty_value() -> Value {
        Value::Varchar(None)
    }
    fn as_value(self) -> Value {
        Value::Varchar(Some(self))
    }
    fn try_from_value(value: Value) -> Result<Self> {
        match value {
            Value::Varchar(Some(v)) | Value::Unknown(Some(v)) => Ok(v),
            Value::Json(Some(v)) => Ok(v.to_string()),
            Value::Blob(Some(v)) => {
                String::from_utf8(v.into_vec()).map_err(|e| Error::new(e).context("Blob to String"))
            }
            v if !v.is_null() => Ok(v.to_string()),
            v => Err(mismatch::<Self>(&v)),
        }
    }
    fn zero() -> Self {
        String::new()
    }
}

impl AsValue for Decimal {
    fn as_empty_value() -> Value {
        Value::Decimal(None)
    }
    fn as_value(self) -> Value {
        Value::Decimal(Some(self))
    }
    fn try_from_value(value: Value) -> Result<Self> {
        match &value {
            Value::Decimal(Some(v)) => Ok(*v),
            Value::Float64(Some(v)) => Decimal::from_f64(*v).ok_or_else(|| mismatch::<Self>(&value)),
            Value::Float32(Some(v)) => Decimal::from_f32(*v).ok_or_else(|| mismatch::<Self>(&value)),
            Value::Varchar(Some(v)) | Value::Unknown(Some(v)) => {
                Decimal::from_str(v.trim()).map_err(|_| mismatch::<Self>(&value))
            }
            v => v
                .as_i64()
                .map(Decimal::from)
                .ok_or_else(|| mismatch::<Self>(&value)),
        }
    }
    fn zero() -> Self {
        Decimal::ZERO
    }
}

impl AsValue for Vec<u8> {
    fn as_empty_value() -> Value {
        Value::Blob(None)
    }
    fn as_value(self) -> Value {
        Value::Blob(Some(self.into_boxed_slice()))
    }
    fn try_from_value(value: Value) -> Result<Self> {
        match value {
            Value::Blob(Some(v)) => Ok(v.into_vec()),
            Value::Varchar(Some(v)) => Ok(v.into_bytes()),
            v => Err(mismatch::<Self>(&v)),
        }
    }
    fn zero() -> Self {
        Vec::new()
    }
}

impl AsValue for OffsetDateTime {
    fn as_empty_value() -> Value {
        Value::TimestampWithTimezone(None)
    }
    fn as_value(self) -> Value {
        Value::TimestampWithTimezone(Some(self))
    }
    fn try_from_value(value: Value) -> Result<Self> {
        match value {
            Value::TimestampWithTimezone(Some(v)) => Ok(v),
            Value::Timestamp(Some(v)) => Ok(v.assume_offset(UtcOffset::UTC)),
            Value::Date(Some(v)) => Ok(v.midnight().assume_offset(UtcOffset::UTC)),
            v => Err(mismatch::<Self>(&v)),
        }
    }
    fn zero() -> Self {
        ZERO_TIME
    }
}

impl AsValue for Date {
    fn as_empty_value() -> Value {
        Value::Date(None)
    }
    fn as_value(self) -> Value {
        Value::Date(Some(self))
    }
    fn try_from_value(value: Value) -> Result<Self> {
        match value {
            Value::Date(Some(v)) => Ok(v),
            Value::Timestamp(Some(v)) => Ok(v.date()),
            Value::TimestampWithTimezone(Some(v)) => Ok(v.date()),
            v => Err(mismatch::<Self>(&v)),
        }
    }
    fn zero() -> Self {
        ZERO_TIME.date()
    }
}

impl AsValue for Time {
    fn as_empty_value() -> Value {
        Value::Time(None)
    }
    fn as_value(self) -> Value {
        Value::Time(Some(self))
    }
    fn try_from_value(value: Value) -> Result<Self> {
        match value {
            Value::Time(Some(v)) => Ok(v),
            Value::Timestamp(Some(v)) => Ok(v.time()),
            Value::TimestampWithTimezone(Some(v)) => Ok(v.time()),
            v => Err(mismatch::<Self>(&v)),
        }
    }
    fn zero() -> Self {
        Time::MIDNIGHT
    }
}

impl AsValue for serde_json::Value {
    fn as_empty_value() -> Value {
        Value::Json(None)
    }
    fn as_value(self) -> Value {
        Value::Json(Some(self))
    }
    fn try_from_value(value: Value) -> Result<Self> {
        match value {
            Value::Json(Some(v)) => Ok(v),
            Value::Varchar(Some(v)) | Value::Unknown(Some(v)) => {
                serde_json::from_str(&v).map_err(|e| {
                    Error::new(e).context(format!("Cannot parse `{}` as json", truncate_long!(v)))
                })
            }
            v if v.is_null() => Ok(serde_json::Value::Null),
            v => Err(mismatch::<Self>(&v)),
        }
    }
    fn zero() -> Self {
        serde_json::Value::Null
    }
}

impl<T: AsValue> AsValue for Option<T> {
    fn as_empty_value() -> Value {
        T::as_empty_value()
    }
    fn as_value(self) -> Value {
        match self {
            Some(v) => v.as_value(),
            None => T::as_empty_value(),
        }
    }
    fn try_from_value(value: Value) -> Result<Self> {
        if value.is_null() {
            return Ok(None);
        }
        T::try_from_value(value).map(Some)
    }
    fn zero() -> Self {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_accept_other_widths() {
        assert_eq!(i32::try_from_value(Value::Int64(Some(77))).unwrap(), 77);
        assert_eq!(u8::try_from_value(Value::Varchar(Some(" 12".into()))).unwrap(), 12);
        assert!(u8::try_from_value(Value::Int64(Some(300))).is_err());
        assert!(i64::try_from_value(Value::Float64(Some(1.5))).is_err());
    }

    #[test]
    fn options_map_nulls() {
        assert_eq!(Option::<String>::try_from_value(Value::Varchar(None)).unwrap(), None);
        assert_eq!(
            Option::<bool>::try_from_value(Value::Int64(Some(1))).unwrap(),
            Some(true)
        );
        assert!(String::try_from_value(Value::Null).is_err());
        assert!(matches!(Option::<i16>::None.as_value(), Value::Int16(None)));
    }
}
