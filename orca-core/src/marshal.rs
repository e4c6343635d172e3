use crate::{
    AsValue, FieldInfo, FieldType, ModelInfo, OrmError, Record, Result, Value, ZERO_TIME,
    truncate_long,
};
use rust_decimal::Decimal;
use time::{
    Date, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset, format_description::FormatItem,
    macros::format_description,
};

const DATETIME_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
const DATE_FORMAT: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]");
const TIME_FORMAT: &[FormatItem<'static>] = format_description!("[hour]:[minute]:[second]");

/// Texts some backends return for a zero time instead of NULL.
const ZERO_SENTINELS: [&str; 3] = ["00:00:00", "0000-00-00", "0000-00-00 00:00:00"];

/// The value a non nullable field of this type takes when storage returns NULL.
pub fn zero_value(field_type: FieldType) -> Value {
    match field_type {
        FieldType::Boolean => Value::Boolean(Some(false)),
        FieldType::Char | FieldType::VarChar | FieldType::Text => Value::Varchar(Some("".into())),
        FieldType::Int8 => Value::Int8(Some(0)),
        FieldType::Int16 => Value::Int16(Some(0)),
        FieldType::Int32 => Value::Int32(Some(0)),
        FieldType::Int64 => Value::Int64(Some(0)),
        FieldType::UInt8 => Value::UInt8(Some(0)),
        FieldType::UInt16 => Value::UInt16(Some(0)),
        FieldType::UInt32 => Value::UInt32(Some(0)),
        FieldType::UInt64 => Value::UInt64(Some(0)),
        FieldType::Float32 => Value::Float32(Some(0.0)),
        FieldType::Float64 => Value::Float64(Some(0.0)),
        FieldType::Decimal => Value::Decimal(Some(Decimal::ZERO)),
        FieldType::Date => Value::Date(Some(ZERO_TIME.date())),
        FieldType::Time => Value::Time(Some(Time::MIDNIGHT)),
        FieldType::DateTime => Value::TimestampWithTimezone(Some(ZERO_TIME)),
        FieldType::Json => Value::Json(Some(serde_json::Value::Null)),
        FieldType::Blob => Value::Blob(Some(Box::default())),
        FieldType::ForeignKey
        | FieldType::OneToOne
        | FieldType::ReverseOne
        | FieldType::ReverseMany => Value::Null,
    }
}

/// Null, numeric zero, empty text or the zero time: what an unset key or timestamp holds.
pub fn is_zero(value: &Value) -> bool {
    match value {
        v if v.is_null() => true,
        Value::Boolean(Some(v)) => !v,
        Value::Float32(Some(v)) => *v == 0.0,
        Value::Float64(Some(v)) => *v == 0.0,
        Value::Decimal(Some(v)) => v.is_zero(),
        Value::Varchar(Some(v)) => v.is_empty(),
        Value::Blob(Some(v)) => v.is_empty(),
        Value::TimestampWithTimezone(Some(v)) => *v == ZERO_TIME,
        Value::Timestamp(Some(v)) => v.assume_utc() == ZERO_TIME,
        Value::Date(Some(v)) => *v == ZERO_TIME.date(),
        v => v.as_i64() == Some(0),
    }
}

/// Instant truncated to the second, the precision every backend preserves.
pub fn now() -> OffsetDateTime {
    let now = OffsetDateTime::now_utc();
    now.replace_nanosecond(0).unwrap_or(now)
}

fn conversion_error(field: &FieldInfo, value: &Value, reason: impl ToString) -> crate::Error {
    let error = OrmError::conversion(
        field.name,
        truncate_long!(value.to_string()),
        reason.to_string(),
    );
    log::error!("{:#}", error);
    error
}

/// Convert a value read from a record into the value sent to storage.
///
/// Times move to the alias offset and become plain timestamps; a zero time of a nullable
/// column becomes NULL. Relation fields carry the related primary key, a required relation
/// without one is an error.
pub fn to_storage(field: &FieldInfo, value: Value, tz: UtcOffset) -> Result<Value> {
    if field.is_relation() {
        if is_zero(&value) {
            if field.nullable {
                return Ok(Value::Null);
            }
            let error = OrmError::usage(format!(
                "Field `{}` is a required relation but the related record is not set",
                field.name
            ));
            log::error!("{:#}", error);
            return Err(error);
        }
        return Ok(value);
    }
    if value.is_null() {
        return Ok(match field.field_type {
            FieldType::Json => json_default(field),
            _ => Value::Null,
        });
    }
    Ok(match (field.field_type, value) {
        (FieldType::DateTime, value) => {
            let instant = OffsetDateTime::try_from_value(value.clone())
                .map_err(|e| conversion_error(field, &value, format!("{:#}", e)))?;
            if instant == ZERO_TIME && field.nullable {
                return Ok(Value::Null);
            }
            let local = instant.to_offset(tz);
            Value::Timestamp(Some(PrimitiveDateTime::new(local.date(), local.time())))
        }
        (FieldType::Date, value) => {
            let date = Date::try_from_value(value.clone())
                .map_err(|e| conversion_error(field, &value, format!("{:#}", e)))?;
            if date == ZERO_TIME.date() && field.nullable {
                return Ok(Value::Null);
            }
            Value::Date(Some(date))
        }
        (FieldType::Time, value) => Value::Time(Some(
            Time::try_from_value(value.clone())
                .map_err(|e| conversion_error(field, &value, format!("{:#}", e)))?,
        )),
        (FieldType::Json, Value::Json(Some(serde_json::Value::Null))) => json_default(field),
        (FieldType::Json, Value::Json(Some(serde_json::Value::String(v)))) if v.is_empty() => {
            json_default(field)
        }
        (_, value) => value,
    })
}

fn json_default(field: &FieldInfo) -> Value {
    match field.default {
        Some(literal) => Value::Json(Some(
            serde_json::from_str(literal)
                .unwrap_or_else(|_| serde_json::Value::String(literal.into())),
        )),
        None => Value::Null,
    }
}

/// Convert a value returned by storage into the canonical value of the field type.
///
/// Text times are parsed by length (19+ datetime, 10+ date, 8+ time) in `tz`, datetimes are
/// returned in UTC. A NULL of a non nullable field becomes the zero value of its type.
pub fn from_storage(field: &FieldInfo, value: Value, tz: UtcOffset) -> Result<Value> {
    let storage_type = field.storage_type();
    if field.is_relation() && value.is_null() {
        return Ok(Value::Null);
    }
    if value.is_null() {
        if storage_type == FieldType::Json {
            return Ok(match json_default(field) {
                Value::Null if field.nullable => Value::Null,
                Value::Null => Value::Json(Some(serde_json::Value::Null)),
                v => v,
            });
        }
        return Ok(if field.nullable {
            Value::Null
        } else {
            zero_value(storage_type)
        });
    }
    let raw = value.clone();
    let fail = |e: crate::Error| conversion_error(field, &raw, format!("{:#}", e));
    Ok(match storage_type {
        FieldType::Boolean => bool::try_from_value(value).map_err(fail)?.as_value(),
        FieldType::Char | FieldType::VarChar | FieldType::Text => {
            String::try_from_value(value).map_err(fail)?.as_value()
        }
        FieldType::Int8 => i8::try_from_value(value).map_err(fail)?.as_value(),
        FieldType::Int16 => i16::try_from_value(value).map_err(fail)?.as_value(),
        FieldType::Int32 => i32::try_from_value(value).map_err(fail)?.as_value(),
        FieldType::Int64 => i64::try_from_value(value).map_err(fail)?.as_value(),
        FieldType::UInt8 => u8::try_from_value(value).map_err(fail)?.as_value(),
        FieldType::UInt16 => u16::try_from_value(value).map_err(fail)?.as_value(),
        FieldType::UInt32 => u32::try_from_value(value).map_err(fail)?.as_value(),
        FieldType::UInt64 => u64::try_from_value(value).map_err(fail)?.as_value(),
        FieldType::Float32 => f32::try_from_value(value).map_err(fail)?.as_value(),
        FieldType::Float64 => f64::try_from_value(value).map_err(fail)?.as_value(),
        FieldType::Decimal => Decimal::try_from_value(value).map_err(fail)?.as_value(),
        FieldType::Date | FieldType::Time | FieldType::DateTime => {
            time_from_storage(field, storage_type, value, tz)?
        }
        FieldType::Json => match value {
            Value::Varchar(Some(v)) | Value::Unknown(Some(v)) if v.trim().is_empty() => {
                return from_storage(field, Value::Null, tz);
            }
            v => serde_json::Value::try_from_value(v).map_err(fail)?.as_value(),
        },
        FieldType::Blob => Vec::<u8>::try_from_value(value).map_err(fail)?.as_value(),
        FieldType::ForeignKey
        | FieldType::OneToOne
        | FieldType::ReverseOne
        | FieldType::ReverseMany => {
            return Err(conversion_error(
                field,
                &raw,
                "reverse relations are not stored in a column",
            ));
        }
    })
}

fn time_from_storage(
    field: &FieldInfo,
    storage_type: FieldType,
    value: Value,
    tz: UtcOffset,
) -> Result<Value> {
    let instant = match value {
        Value::TimestampWithTimezone(Some(v)) => v,
        Value::Timestamp(Some(v)) => v.assume_offset(tz),
        Value::Date(Some(v)) => v.midnight().assume_offset(tz),
        Value::Time(Some(v)) => ZERO_TIME.date().with_time(v).assume_offset(tz),
        Value::Varchar(Some(ref v)) | Value::Unknown(Some(ref v)) => {
            let text = v.trim();
            if ZERO_SENTINELS.contains(&text) {
                return Ok(zero_value(storage_type));
            }
            parse_time_text(text, tz)
                .map_err(|e| conversion_error(field, &value, format!("{}", e)))?
        }
        v => {
            return Err(conversion_error(
                field,
                &v,
                format!("{} is not a time", v.type_name()),
            ));
        }
    };
    Ok(match storage_type {
        FieldType::Date => Value::Date(Some(instant.date())),
        FieldType::Time => Value::Time(Some(instant.time())),
        _ => Value::TimestampWithTimezone(Some(instant.to_offset(UtcOffset::UTC))),
    })
}

fn parse_time_text(text: &str, tz: UtcOffset) -> std::result::Result<OffsetDateTime, String> {
    let error = |e: time::error::Parse| format!("malformed time `{}`: {}", text, e);
    let prefix = |len: usize| text.get(..len).ok_or_else(|| format!("malformed time `{}`", text));
    if text.len() >= 19 {
        let normalized = prefix(19)?.replacen('T', " ", 1);
        PrimitiveDateTime::parse(&normalized, DATETIME_FORMAT)
            .map(|v| v.assume_offset(tz))
            .map_err(error)
    } else if text.len() >= 10 {
        Date::parse(prefix(10)?, DATE_FORMAT)
            .map(|v| v.midnight().assume_offset(tz))
            .map_err(error)
    } else if text.len() >= 8 {
        Time::parse(prefix(8)?, TIME_FORMAT)
            .map(|v| ZERO_TIME.date().with_time(v).assume_offset(tz))
            .map_err(error)
    } else {
        Err(format!("`{}` is too short to be a time", text))
    }
}

/// Normalize a condition argument for the field it is compared to.
pub fn to_param(field: &FieldInfo, value: Value, tz: UtcOffset) -> Result<Value> {
    match field.storage_type() {
        FieldType::DateTime | FieldType::Date | FieldType::Time if !value.is_null() => {
            if matches!(value, Value::Varchar(..)) {
                return Ok(value);
            }
            to_storage(
                &FieldInfo {
                    nullable: false,
                    ..field.clone()
                },
                value,
                tz,
            )
        }
        _ => Ok(value),
    }
}

/// The storage value of the declared default of `field`, used by `set_default` cascades.
pub fn default_value(field: &FieldInfo, tz: UtcOffset) -> Result<Value> {
    match field.default {
        Some(literal) => from_storage(field, Value::Varchar(Some(literal.into())), tz),
        None if field.nullable => Ok(Value::Null),
        None => Ok(zero_value(field.storage_type())),
    }
}

/// Whether values are collected to insert a new row or to update an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collect {
    Insert,
    Update,
    /// Values used as equality filters, nothing is stamped.
    Filter,
}

#[derive(Default, Debug)]
pub struct Collected {
    pub columns: Vec<&'static str>,
    pub values: Vec<Value>,
    /// Auto increment columns that were given an explicit value.
    pub auto_fields: Vec<&'static str>,
}

/// Storage values of `fields` taken from `record`.
///
/// Inserts skip auto increment fields holding zero and stamp zero auto time fields. Updates
/// skip auto increment fields, drop `auto_now_add` fields and always stamp and append
/// `auto_now` fields. Stamped times are written back into the record.
pub fn collect_values(
    info: &ModelInfo,
    record: &mut dyn Record,
    fields: &[&FieldInfo],
    mode: Collect,
    tz: UtcOffset,
) -> Result<Collected> {
    let mut targets = fields
        .iter()
        .copied()
        .filter(|f| f.is_column())
        .filter(|f| mode != Collect::Update || !(f.auto_increment || f.auto_now_add))
        .collect::<Vec<_>>();
    if mode == Collect::Update {
        for field in info.column_fields().filter(|f| f.auto_now) {
            if !targets.iter().any(|v| v.column == field.column) {
                targets.push(field);
            }
        }
    }
    let mut result = Collected::default();
    for field in targets {
        let mut value = record.get_value(field.name)?;
        if mode != Collect::Filter && field.field_type.is_time() {
            let stamp = match mode {
                Collect::Insert => (field.auto_now || field.auto_now_add) && is_zero(&value),
                _ => field.auto_now,
            };
            if stamp {
                let now = now();
                record.set_value(field.name, stamped(field.field_type, now))?;
                value = now.as_value();
            }
        }
        if mode == Collect::Insert && field.auto_increment {
            if is_zero(&value) {
                continue;
            }
            result.auto_fields.push(field.column);
        }
        result.columns.push(field.column);
        result.values.push(to_storage(field, value, tz)?);
    }
    Ok(result)
}

fn stamped(field_type: FieldType, now: OffsetDateTime) -> Value {
    match field_type {
        FieldType::Date => Value::Date(Some(now.date())),
        FieldType::Time => Value::Time(Some(now.time())),
        _ => Value::TimestampWithTimezone(Some(now)),
    }
}

/// Assign storage values to the matching fields of `record`.
pub fn set_cols_values(
    record: &mut dyn Record,
    fields: &[&FieldInfo],
    values: &[Value],
    tz: UtcOffset,
) -> Result<()> {
    for (field, raw) in fields.iter().zip(values) {
        let value = from_storage(field, raw.clone(), tz)?;
        record
            .set_value(field.name, value)
            .map_err(|e| conversion_error(field, raw, format!("{:#}", e)))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Action;
    use time::macros::{date, datetime, offset, time};

    fn field(name: &'static str, field_type: FieldType, nullable: bool) -> FieldInfo {
        FieldInfo {
            name,
            column: name,
            field_type,
            nullable,
            primary_key: false,
            auto_increment: false,
            auto_now: false,
            auto_now_add: false,
            default: None,
            on_delete: Action::NoAction,
            related: None,
            related_pk_type: None,
        }
    }

    #[test]
    fn round_trip_in_same_zone() {
        let tz = offset!(+8);
        let cases = [
            (field("b", FieldType::Boolean, false), Value::Boolean(Some(true))),
            (field("s", FieldType::VarChar, false), Value::Varchar(Some("abc".into()))),
            (field("i", FieldType::Int32, false), Value::Int32(Some(-42))),
            (field("f", FieldType::Float64, false), Value::Float64(Some(2.5))),
            (
                field("t", FieldType::DateTime, false),
                Value::TimestampWithTimezone(Some(datetime!(2024-03-01 10:20:30 UTC))),
            ),
        ];
        for (field, value) in cases {
            let stored = to_storage(&field, value.clone(), tz).unwrap();
            assert_eq!(from_storage(&field, stored, tz).unwrap(), value);
        }
    }

    #[test]
    fn text_times_by_length() {
        let tz = offset!(+2);
        let datetime = field("t", FieldType::DateTime, false);
        assert_eq!(
            from_storage(&datetime, "2024-03-01 12:00:00.123".into(), tz).unwrap(),
            Value::TimestampWithTimezone(Some(datetime!(2024-03-01 10:00:00 UTC)))
        );
        assert_eq!(
            from_storage(&datetime, "2024-03-01T12:00:00".into(), tz).unwrap(),
            Value::TimestampWithTimezone(Some(datetime!(2024-03-01 10:00:00 UTC)))
        );
        let date = field("d", FieldType::Date, false);
        assert_eq!(
            from_storage(&date, "2024-03-01".into(), tz).unwrap(),
            Value::Date(Some(date!(2024-03-01)))
        );
        let clock = field("c", FieldType::Time, false);
        assert_eq!(
            from_storage(&clock, "08:30:00".into(), tz).unwrap(),
            Value::Time(Some(time!(8:30)))
        );
        assert_eq!(
            from_storage(&datetime, "0000-00-00 00:00:00".into(), tz).unwrap(),
            Value::TimestampWithTimezone(Some(ZERO_TIME))
        );
        let error = from_storage(&datetime, "yesterday".into(), tz).unwrap_err();
        assert_eq!(OrmError::kind_of(&error), crate::ErrorKind::Conversion);
        assert!(error.to_string().contains("yesterday"));
    }

    #[test]
    fn nulls() {
        let tz = UtcOffset::UTC;
        assert_eq!(
            from_storage(&field("n", FieldType::Int64, false), Value::Null, tz).unwrap(),
            Value::Int64(Some(0))
        );
        assert_eq!(
            from_storage(&field("n", FieldType::Int64, true), Value::Null, tz).unwrap(),
            Value::Null
        );
        let nullable_time = field("t", FieldType::DateTime, true);
        assert_eq!(
            to_storage(&nullable_time, ZERO_TIME.as_value(), tz).unwrap(),
            Value::Null
        );
        let json = FieldInfo {
            default: Some("{\"a\":1}"),
            ..field("j", FieldType::Json, true)
        };
        assert_eq!(
            from_storage(&json, Value::Varchar(Some("".into())), tz).unwrap(),
            Value::Json(Some(serde_json::json!({"a": 1})))
        );
        assert_eq!(
            to_storage(&json, Value::Json(None), tz).unwrap(),
            Value::Json(Some(serde_json::json!({"a": 1})))
        );
    }

    #[test]
    fn required_relation() {
        let relation = FieldInfo {
            related: Some("tests::Parent"),
            related_pk_type: Some(FieldType::Int64),
            ..field("parent", FieldType::ForeignKey, false)
        };
        let error = to_storage(&relation, Value::Int64(None), UtcOffset::UTC).unwrap_err();
        assert_eq!(OrmError::kind_of(&error), crate::ErrorKind::Usage);
        assert_eq!(
            to_storage(&relation, Value::Int64(Some(7)), UtcOffset::UTC).unwrap(),
            Value::Int64(Some(7))
        );
        assert_eq!(
            from_storage(&relation, Value::Int32(Some(7)), UtcOffset::UTC).unwrap(),
            Value::Int64(Some(7))
        );
    }
}
