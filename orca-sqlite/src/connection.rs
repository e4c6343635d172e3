use crate::{
    CBox, SqliteTransaction,
    bind::bind_value,
    cache::StatementCache,
    error_message_from_ptr,
    extract::{extract_name, extract_value},
};
use async_stream::try_stream;
use libsqlite3_sys::{
    SQLITE_DONE, SQLITE_OK, SQLITE_OPEN_CREATE, SQLITE_OPEN_FULLMUTEX, SQLITE_OPEN_READWRITE,
    SQLITE_OPEN_URI, SQLITE_ROW, sqlite3, sqlite3_bind_parameter_count, sqlite3_busy_timeout,
    sqlite3_changes64, sqlite3_clear_bindings, sqlite3_close, sqlite3_column_count,
    sqlite3_errmsg, sqlite3_finalize, sqlite3_last_insert_rowid, sqlite3_open_v2,
    sqlite3_prepare_v2, sqlite3_reset, sqlite3_step, sqlite3_stmt,
};
use orca_core::{
    Connection, Context, Error, Executor, OrmError, Query, QueryResult, Result, RowLabeled,
    RowNames, RowsAffected, Value, printable_query, stream::Stream,
};
use std::{
    ffi::{CStr, CString, c_char},
    ptr,
    sync::{
        Arc,
        atomic::{AtomicPtr, Ordering},
    },
};
use tokio::task::spawn_blocking;

const PREFIX: &str = "sqlite://";
const BUSY_TIMEOUT_MS: i32 = 5_000;

/// A single sqlite database handle. Statements run on the blocking thread pool one at a time,
/// single statement queries are prepared once and reused.
pub struct SqliteConnection {
    pub(crate) cache: Arc<StatementCache>,
    pub(crate) connection: CBox<sqlite3>,
}

fn last_error(connection: *mut sqlite3) -> Error {
    unsafe { Error::msg(error_message_from_ptr(&sqlite3_errmsg(connection)).to_string()) }
}

fn is_blank(tail: *const c_char) -> bool {
    unsafe { CStr::from_ptr(tail) }
        .to_bytes()
        .iter()
        .all(|c| c.is_ascii_whitespace() || *c == b';')
}

/// Binds the next arguments to `statement`, steps it to completion and leaves it reset.
fn execute_statement<'a>(
    connection: *mut sqlite3,
    statement: *mut sqlite3_stmt,
    args: &mut impl Iterator<Item = &'a Value>,
    provided: usize,
    out: &mut Vec<QueryResult>,
) -> Result<()> {
    let result = (|| unsafe {
        for index in 1..=sqlite3_bind_parameter_count(statement) {
            let Some(value) = args.next() else {
                return Err(OrmError::usage(format!(
                    "The statement expects more arguments than the {} provided",
                    provided
                )));
            };
            bind_value(statement, index, value)?;
        }
        let count = sqlite3_column_count(statement);
        let labels = (0..count)
            .map(|i| extract_name(statement, i))
            .collect::<Result<RowNames>>()?;
        loop {
            match sqlite3_step(statement) {
                SQLITE_ROW => out.push(QueryResult::Row(RowLabeled::new(
                    labels.clone(),
                    (0..count)
                        .map(|i| extract_value(statement, i))
                        .collect::<Result<_>>()?,
                ))),
                SQLITE_DONE => break,
                _ => return Err(last_error(connection)),
            }
        }
        if count == 0 {
            out.push(QueryResult::Affected(RowsAffected {
                rows_affected: sqlite3_changes64(connection) as u64,
                last_affected_id: Some(sqlite3_last_insert_rowid(connection)),
            }));
        }
        Ok(())
    })();
    unsafe {
        sqlite3_reset(statement);
        sqlite3_clear_bindings(statement);
    }
    result
}

/// Runs every statement in `query.sql`, each consuming as many arguments as it has
/// placeholders. Stops at the first failure, keeping the results produced before it.
fn run_blocking(
    connection: *mut sqlite3,
    cache: &StatementCache,
    query: &Query,
    out: &mut Vec<QueryResult>,
) -> Result<()> {
    let provided = query.args.len();
    let mut args = query.args.iter();
    if let Some(statement) = cache.get(&query.sql) {
        execute_statement(connection, **statement, &mut args, provided, out)?;
    } else {
        let sql = CString::new(query.sql.as_bytes())
            .context("Could not create a CString from the query String")?;
        let mut tail: *const c_char = sql.as_ptr();
        let mut first = true;
        while !is_blank(tail) {
            let mut statement = CBox::new(ptr::null_mut(), |p: *mut sqlite3_stmt| {
                unsafe { sqlite3_finalize(p) };
            });
            let rc =
                unsafe { sqlite3_prepare_v2(connection, tail, -1, &mut *statement, &mut tail) };
            if rc != SQLITE_OK {
                return Err(last_error(connection));
            }
            if statement.is_null() {
                continue;
            }
            execute_statement(connection, *statement, &mut args, provided, out)?;
            if first && is_blank(tail) {
                cache.insert(query.sql.clone(), statement);
            }
            first = false;
        }
    }
    if args.next().is_some() {
        return Err(OrmError::usage(format!(
            "The statement uses fewer arguments than the {} provided",
            provided
        )));
    }
    Ok(())
}

impl SqliteConnection {
    /// Number of prepared statements kept for reuse.
    pub fn cached_statements(&self) -> usize {
        self.cache.len()
    }
}

impl Executor for SqliteConnection {
    fn run(&mut self, query: Query) -> impl Stream<Item = Result<QueryResult>> + Send {
        let connection = AtomicPtr::new(*self.connection);
        let cache = self.cache.clone();
        try_stream! {
            let context = format!(
                "While executing the query:\n{}",
                printable_query!(query.sql, query.args)
            );
            let (results, outcome) = spawn_blocking(move || {
                let connection = connection.load(Ordering::Relaxed);
                let mut results = Vec::new();
                let outcome = run_blocking(connection, &cache, &query, &mut results);
                (results, outcome)
            })
            .await?;
            for result in results {
                yield result;
            }
            if let Err(error) = outcome {
                let error = error.context(context);
                log::error!("{:#}", error);
                Err::<(), Error>(error)?;
            }
        }
    }
}

impl Connection for SqliteConnection {
    /// Opens `sqlite://path`, creating the file when missing. `sqlite://:memory:` opens a
    /// private in memory database; a query string is forwarded as sqlite URI parameters.
    async fn connect(url: &str) -> Result<SqliteConnection> {
        let Some(location) = url.strip_prefix(PREFIX) else {
            let error = OrmError::config(format!(
                "Expected sqlite connection url to start with `{}`",
                PREFIX
            ));
            log::error!("{:#}", error);
            return Err(error);
        };
        let context = || format!("Error while decoding connection URL: `{}`", url);
        let mut location = urlencoding::decode(location)
            .with_context(context)?
            .into_owned();
        if location.is_empty() {
            location = ":memory:".into();
        } else if location.contains('?') {
            location = format!("file:{}", location);
        }
        let path = CString::new(location).with_context(context)?;
        let mut connection = CBox::new(ptr::null_mut(), |p: *mut sqlite3| {
            unsafe { sqlite3_close(p) };
        });
        let rc = unsafe {
            sqlite3_open_v2(
                path.as_ptr(),
                &mut *connection,
                SQLITE_OPEN_READWRITE | SQLITE_OPEN_CREATE | SQLITE_OPEN_URI | SQLITE_OPEN_FULLMUTEX,
                ptr::null(),
            )
        };
        if rc != SQLITE_OK {
            let error = last_error(*connection).context(format!("Cannot open `{}`", url));
            log::error!("{:#}", error);
            return Err(error);
        }
        unsafe { sqlite3_busy_timeout(*connection, BUSY_TIMEOUT_MS) };
        log::debug!("Opened sqlite database `{}`", url);
        Ok(Self {
            cache: Default::default(),
            connection,
        })
    }

    #[allow(refining_impl_trait)]
    async fn begin(&mut self) -> Result<SqliteTransaction<'_>> {
        SqliteTransaction::new(self).await
    }
}
