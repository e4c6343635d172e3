use crate::{
    Query, QueryResult, Result, RowLabeled, RowsAffected,
    stream::{Stream, StreamExt, TryStreamExt},
};
use std::future::Future;

/// Something that can run a parameterized statement: a connection, a transaction, a pooled
/// handle. This is the whole contract the SQL backend consumes.
pub trait Executor: Send {
    /// Send any statement and stream back rows and modify results.
    fn run(&mut self, query: Query) -> impl Stream<Item = Result<QueryResult>> + Send;

    /// Execute the query and return the rows.
    fn fetch(&mut self, query: Query) -> impl Stream<Item = Result<RowLabeled>> + Send {
        self.run(query).filter_map(|v| async move {
            match v {
                Ok(QueryResult::Row(v)) => Some(Ok(v)),
                Err(e) => Some(Err(e)),
                _ => None,
            }
        })
    }

    /// Execute the query and return the total number of rows affected.
    fn execute(&mut self, query: Query) -> impl Future<Output = Result<RowsAffected>> + Send {
        self.run(query)
            .filter_map(|v| async move {
                match v {
                    Ok(QueryResult::Affected(v)) => Some(Ok(v)),
                    Err(e) => Some(Err(e)),
                    _ => None,
                }
            })
            .try_collect()
    }
}

impl<E: Executor> Executor for &mut E {
    fn run(&mut self, query: Query) -> impl Stream<Item = Result<QueryResult>> + Send {
        (**self).run(query)
    }

    fn fetch(&mut self, query: Query) -> impl Stream<Item = Result<RowLabeled>> + Send {
        (**self).fetch(query)
    }

    fn execute(&mut self, query: Query) -> impl Future<Output = Result<RowsAffected>> + Send {
        (**self).execute(query)
    }
}
