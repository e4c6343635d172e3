use crate::SqliteConnection;
use orca_core::{
    Dialect, Executor, Query, QueryResult, Result, SqlWriter, Transaction, stream::Stream,
};

/// `BEGIN` .. `COMMIT` scope over a borrowed connection. Dropping it without committing leaves
/// the transaction open on the connection until the next `ROLLBACK`.
pub struct SqliteTransaction<'c> {
    connection: &'c mut SqliteConnection,
}

fn statement(write: impl FnOnce(&Dialect, &mut String)) -> Query {
    let mut sql = String::new();
    write(&Dialect::Sqlite, &mut sql);
    Query::new(sql)
}

impl<'c> SqliteTransaction<'c> {
    pub async fn new(connection: &'c mut SqliteConnection) -> Result<Self> {
        connection
            .execute(statement(|d, out| d.write_transaction_begin(out)))
            .await?;
        Ok(Self { connection })
    }
}

impl<'c> Executor for SqliteTransaction<'c> {
    fn run(&mut self, query: Query) -> impl Stream<Item = Result<QueryResult>> + Send {
        self.connection.run(query)
    }
}

impl<'c> Transaction<'c> for SqliteTransaction<'c> {
    async fn commit(self) -> Result<()> {
        self.connection
            .execute(statement(|d, out| d.write_transaction_commit(out)))
            .await
            .map(|_| ())
    }

    async fn rollback(self) -> Result<()> {
        self.connection
            .execute(statement(|d, out| d.write_transaction_rollback(out)))
            .await
            .map(|_| ())
    }
}
