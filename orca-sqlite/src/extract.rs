use libsqlite3_sys::*;
use orca_core::{AsValue, Error, Result, Value};
use std::ffi::{CStr, c_int};

/// Value of column `index` in the current row, typed by sqlite's storage class.
pub(crate) fn extract_value(statement: *mut sqlite3_stmt, index: c_int) -> Result<Value> {
    unsafe {
        let column_type = sqlite3_column_type(statement, index);
        Ok(match column_type {
            SQLITE_NULL => Value::Null,
            SQLITE_INTEGER => sqlite3_column_int64(statement, index).as_value(),
            SQLITE_FLOAT => sqlite3_column_double(statement, index).as_value(),
            SQLITE_BLOB => {
                let ptr = sqlite3_column_blob(statement, index) as *const u8;
                let len = sqlite3_column_bytes(statement, index) as usize;
                if ptr.is_null() {
                    Value::Blob(Some(Box::default()))
                } else {
                    Value::Blob(Some(std::slice::from_raw_parts(ptr, len).into()))
                }
            }
            SQLITE_TEXT => {
                let ptr = sqlite3_column_text(statement, index);
                let len = sqlite3_column_bytes(statement, index) as usize;
                if ptr.is_null() {
                    Value::Varchar(Some(String::new()))
                } else {
                    String::from_utf8_lossy(std::slice::from_raw_parts(ptr, len))
                        .into_owned()
                        .as_value()
                }
            }
            _ => {
                let error = Error::msg(format!("Unexpected sqlite column type {}", column_type));
                log::error!("{:#}", error);
                return Err(error);
            }
        })
    }
}

pub(crate) fn extract_name(statement: *mut sqlite3_stmt, index: c_int) -> Result<String> {
    unsafe {
        let name = sqlite3_column_name(statement, index);
        if name.is_null() {
            return Err(Error::msg(format!("Column {} has no name", index)));
        }
        Ok(CStr::from_ptr(name).to_str()?.into())
    }
}
