use crate::error_message_from_ptr;
use libsqlite3_sys::*;
use orca_core::{Error, Result, Value, truncate_long};
use std::{
    ffi::{CStr, c_int},
    os::raw::{c_char, c_void},
};
use time::{UtcOffset, format_description::FormatItem, macros::format_description};

const DATE: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]");
const TIME: &[FormatItem<'static>] = format_description!("[hour]:[minute]:[second]");
const DATETIME: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

unsafe fn bind_text(statement: *mut sqlite3_stmt, index: c_int, text: &str) -> c_int {
    unsafe {
        sqlite3_bind_text(
            statement,
            index,
            text.as_ptr() as *const c_char,
            text.len() as c_int,
            SQLITE_TRANSIENT(),
        )
    }
}

/// Textual storage of a value sqlite has no native type for. Times are kept at second
/// precision.
fn text_of(value: &Value) -> Result<Option<String>> {
    Ok(Some(match value {
        Value::Decimal(Some(v)) => v.to_string(),
        Value::Varchar(Some(v)) | Value::Unknown(Some(v)) => v.clone(),
        Value::Date(Some(v)) => v.format(DATE)?,
        Value::Time(Some(v)) => v.format(TIME)?,
        Value::Timestamp(Some(v)) => v.format(DATETIME)?,
        Value::TimestampWithTimezone(Some(v)) => v.to_offset(UtcOffset::UTC).format(DATETIME)?,
        Value::Json(Some(v)) => v.to_string(),
        _ => return Ok(None),
    }))
}

/// Bind `value` to the 1 based parameter `index` of `statement`.
pub(crate) unsafe fn bind_value(
    statement: *mut sqlite3_stmt,
    index: c_int,
    value: &Value,
) -> Result<()> {
    unsafe {
        let rc = match value {
            v if v.is_null() => sqlite3_bind_null(statement, index),
            Value::Boolean(Some(v)) => sqlite3_bind_int(statement, index, *v as c_int),
            Value::Int8(Some(v)) => sqlite3_bind_int(statement, index, *v as c_int),
            Value::Int16(Some(v)) => sqlite3_bind_int(statement, index, *v as c_int),
            Value::Int32(Some(v)) => sqlite3_bind_int(statement, index, *v),
            Value::Int64(Some(v)) => sqlite3_bind_int64(statement, index, *v),
            Value::UInt8(Some(v)) => sqlite3_bind_int(statement, index, *v as c_int),
            Value::UInt16(Some(v)) => sqlite3_bind_int(statement, index, *v as c_int),
            Value::UInt32(Some(v)) => sqlite3_bind_int64(statement, index, *v as sqlite3_int64),
            Value::UInt64(Some(v)) => {
                let Ok(v) = sqlite3_int64::try_from(*v) else {
                    let error = Error::msg(format!(
                        "Cannot bind the u64 value `{}` into a sqlite integer because it's out of bounds",
                        v
                    ));
                    log::error!("{:#}", error);
                    return Err(error);
                };
                sqlite3_bind_int64(statement, index, v)
            }
            Value::Float32(Some(v)) => sqlite3_bind_double(statement, index, *v as f64),
            Value::Float64(Some(v)) => sqlite3_bind_double(statement, index, *v),
            Value::Blob(Some(v)) => sqlite3_bind_blob(
                statement,
                index,
                v.as_ptr() as *const c_void,
                v.len() as c_int,
                SQLITE_TRANSIENT(),
            ),
            v => match text_of(v)? {
                Some(text) => bind_text(statement, index, &text),
                None => {
                    let error = Error::msg(format!("Cannot use a {:?} as a query parameter", v));
                    log::error!("{:#}", error);
                    return Err(error);
                }
            },
        };
        if rc != SQLITE_OK {
            let db = sqlite3_db_handle(statement);
            let query = sqlite3_sql(statement);
            let error = Error::msg(error_message_from_ptr(&sqlite3_errmsg(db)).to_string())
                .context(format!(
                    "Cannot bind parameter {} to query:\n{}",
                    index,
                    truncate_long!(CStr::from_ptr(query).to_string_lossy())
                ));
            log::error!("{:#}", error);
            return Err(error);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use time::macros::{date, datetime, time};

    #[test]
    fn text_storage() {
        assert_eq!(
            text_of(&Value::Date(Some(date!(2024 - 02 - 29)))).unwrap(),
            Some("2024-02-29".into())
        );
        assert_eq!(
            text_of(&Value::Time(Some(time!(7:05:09.25)))).unwrap(),
            Some("07:05:09".into())
        );
        assert_eq!(
            text_of(&Value::TimestampWithTimezone(Some(datetime!(2024-01-01 1:00 +2)))).unwrap(),
            Some("2023-12-31 23:00:00".into())
        );
        assert_eq!(
            text_of(&Value::Decimal(Some(Decimal::new(1050, 2)))).unwrap(),
            Some("10.50".into())
        );
        assert_eq!(text_of(&Value::Int32(Some(1))).unwrap(), None);
    }
}
