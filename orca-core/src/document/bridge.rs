use crate::{OrmError, Result, Value};
use bson::{Binary, Bson, spec::BinarySubtype};
use time::{OffsetDateTime, UtcOffset};

fn millis(instant: OffsetDateTime) -> bson::DateTime {
    bson::DateTime::from_millis((instant.unix_timestamp_nanos() / 1_000_000) as i64)
}

/// Bson form of a storage value. Plain timestamps are read in `tz`, times of day are kept as
/// `HH:MM:SS` text since bson has no such type.
pub fn value_to_bson(value: Value, tz: UtcOffset) -> Result<Bson> {
    if value.is_null() {
        return Ok(Bson::Null);
    }
    Ok(match value {
        Value::Boolean(Some(v)) => Bson::Boolean(v),
        Value::Int8(Some(v)) => Bson::Int32(v as i32),
        Value::Int16(Some(v)) => Bson::Int32(v as i32),
        Value::Int32(Some(v)) => Bson::Int32(v),
        Value::Int64(Some(v)) => Bson::Int64(v),
        Value::UInt8(Some(v)) => Bson::Int32(v as i32),
        Value::UInt16(Some(v)) => Bson::Int32(v as i32),
        Value::UInt32(Some(v)) => Bson::Int64(v as i64),
        Value::UInt64(Some(v)) => match i64::try_from(v) {
            Ok(v) => Bson::Int64(v),
            Err(..) => {
                let error = OrmError::conversion(
                    "",
                    v,
                    "does not fit the signed 64 bit integers of bson",
                );
                log::error!("{:#}", error);
                return Err(error);
            }
        },
        Value::Float32(Some(v)) => Bson::Double(v as f64),
        Value::Float64(Some(v)) => Bson::Double(v),
        Value::Decimal(Some(v)) => Bson::String(v.to_string()),
        Value::Varchar(Some(v)) | Value::Unknown(Some(v)) => Bson::String(v),
        Value::Blob(Some(v)) => Bson::Binary(Binary {
            subtype: BinarySubtype::Generic,
            bytes: v.into_vec(),
        }),
        Value::Date(Some(v)) => Bson::DateTime(millis(v.midnight().assume_utc())),
        Value::Time(Some(v)) => Bson::String(format!(
            "{:02}:{:02}:{:02}",
            v.hour(),
            v.minute(),
            v.second()
        )),
        Value::Timestamp(Some(v)) => Bson::DateTime(millis(v.assume_offset(tz))),
        Value::TimestampWithTimezone(Some(v)) => Bson::DateTime(millis(v)),
        Value::Json(Some(v)) => Bson::try_from(v).map_err(|e| {
            let error = OrmError::conversion("", "json", format!("{}", e));
            log::error!("{:#}", error);
            error
        })?,
        _ => Bson::Null,
    })
}

/// Value form of a bson field, refined by the marshaler to the field type.
pub fn bson_to_value(bson: Bson) -> Value {
    match bson {
        Bson::Null | Bson::Undefined => Value::Null,
        Bson::Boolean(v) => Value::Boolean(Some(v)),
        Bson::Int32(v) => Value::Int32(Some(v)),
        Bson::Int64(v) => Value::Int64(Some(v)),
        Bson::Double(v) => Value::Float64(Some(v)),
        Bson::String(v) => Value::Varchar(Some(v)),
        Bson::ObjectId(v) => Value::Varchar(Some(v.to_hex())),
        Bson::Binary(v) => Value::Blob(Some(v.bytes.into_boxed_slice())),
        Bson::DateTime(v) => Value::TimestampWithTimezone(
            OffsetDateTime::from_unix_timestamp_nanos(v.timestamp_millis() as i128 * 1_000_000)
                .ok(),
        ),
        v @ (Bson::Document(..) | Bson::Array(..)) => Value::Json(Some(v.into_relaxed_extjson())),
        v => Value::Unknown(Some(v.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{datetime, offset};

    #[test]
    fn timestamps_become_instants() {
        let bson = value_to_bson(
            Value::Timestamp(Some(datetime!(2024-05-01 10:00))),
            offset!(+2),
        )
        .unwrap();
        assert_eq!(
            bson_to_value(bson),
            Value::TimestampWithTimezone(Some(datetime!(2024-05-01 8:00 UTC)))
        );
    }

    #[test]
    fn scalars() {
        let tz = UtcOffset::UTC;
        assert_eq!(value_to_bson(Value::Int8(Some(3)), tz).unwrap(), Bson::Int32(3));
        assert_eq!(value_to_bson(Value::Varchar(None), tz).unwrap(), Bson::Null);
        assert!(value_to_bson(Value::UInt64(Some(u64::MAX)), tz).is_err());
        assert_eq!(
            bson_to_value(Bson::String("cat".into())),
            Value::Varchar(Some("cat".into()))
        );
        let id = bson::oid::ObjectId::new();
        assert_eq!(
            bson_to_value(Bson::ObjectId(id)),
            Value::Varchar(Some(id.to_hex()))
        );
    }
}
