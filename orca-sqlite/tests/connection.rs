#[cfg(test)]
mod tests {
    use orca::{Connection, Executor, Query, QueryResult, Transaction, Value, stream::TryStreamExt};
    use orca_sqlite::SqliteConnection;
    use orca_tests::{init_logs, silent_logs};
    use std::{path::Path, sync::Mutex};
    use tokio::fs;

    static MUTEX: Mutex<()> = Mutex::new(());

    #[tokio::test]
    async fn create_database() {
        init_logs();
        const DB_PATH: &'static str = "../target/debug/creation.sqlite";
        let _guard = MUTEX.lock().unwrap();
        if Path::new(DB_PATH).exists() {
            fs::remove_file(DB_PATH)
                .await
                .expect(format!("Failed to remove test database file {}", DB_PATH).as_str());
        }
        SqliteConnection::connect(&format!("sqlite://{}?mode=rwc", DB_PATH))
            .await
            .expect("Could not open the database");
        assert!(
            Path::new(DB_PATH).exists(),
            "Database file should be created after connection"
        );
        fs::remove_file(DB_PATH)
            .await
            .expect(format!("Failed to remove existing test database file {}", DB_PATH).as_str());
        silent_logs! {
            assert!(
                SqliteConnection::connect(&format!("sqlite://{}?mode=ro", DB_PATH))
                    .await
                    .is_err(),
                "Should not be able to open in read only unexisting database"
            );
        };
    }

    #[tokio::test]
    async fn wrong_url() {
        silent_logs! {
            assert!(
                SqliteConnection::connect("mongodb://some_value")
                    .await
                    .is_err()
            );
        };
    }

    #[tokio::test]
    async fn statements_share_arguments() {
        init_logs();
        let mut connection = SqliteConnection::connect("sqlite://:memory:")
            .await
            .expect("Could not open the database");
        let results = connection
            .run(Query::with_args(
                "CREATE TABLE t (a INTEGER, b TEXT);
                 INSERT INTO t VALUES (?, ?), (?, NULL);
                 SELECT a, b FROM t WHERE a > ? ORDER BY a;",
                vec![1.into(), "one".into(), 2.into(), 0.into()],
            ))
            .try_collect::<Vec<_>>()
            .await
            .expect("Could not run the statements");
        assert_eq!(results.len(), 4);
        let QueryResult::Affected(inserted) = &results[1] else {
            panic!("Expected the insert result, got {:?}", results[1]);
        };
        assert_eq!(inserted.rows_affected, 2);
        assert_eq!(inserted.last_affected_id, Some(2));
        let QueryResult::Row(row) = &results[2] else {
            panic!("Expected a row, got {:?}", results[2]);
        };
        assert_eq!(row.names(), ["a", "b"]);
        assert_eq!(row.values(), [Value::Int64(Some(1)), Value::from("one")]);
        let QueryResult::Row(row) = &results[3] else {
            panic!("Expected a row, got {:?}", results[3]);
        };
        assert_eq!(row.get_column("b"), Some(&Value::Null));

        silent_logs! {
            assert!(connection.execute(Query::new("SELECT ?")).await.is_err());
            assert!(
                connection
                    .execute(Query::with_args("SELECT 1", vec![1.into()]))
                    .await
                    .is_err()
            );
            assert!(connection.execute(Query::new("SELEC 1")).await.is_err());
        };
    }

    #[tokio::test]
    async fn single_statements_are_reused() {
        init_logs();
        let mut connection = SqliteConnection::connect("sqlite://:memory:")
            .await
            .expect("Could not open the database");
        for i in 1..=3 {
            let rows = connection
                .fetch(Query::new("SELECT ? + 1 AS next").bind(i))
                .try_collect::<Vec<_>>()
                .await
                .unwrap();
            assert_eq!(rows[0].get_column("next"), Some(&Value::Int64(Some(i as i64 + 1))));
        }
        assert_eq!(connection.cached_statements(), 1);
        connection
            .execute(Query::new("CREATE TABLE a (x INTEGER); CREATE TABLE b (y INTEGER)"))
            .await
            .unwrap();
        assert_eq!(connection.cached_statements(), 1);
    }

    #[tokio::test]
    async fn transaction_scope() {
        init_logs();
        let mut connection = SqliteConnection::connect("sqlite://:memory:")
            .await
            .expect("Could not open the database");
        connection
            .execute(Query::new("CREATE TABLE t (a INTEGER)"))
            .await
            .unwrap();
        let mut tx = connection.begin().await.expect("Could not begin");
        tx.execute(Query::new("INSERT INTO t VALUES (1)"))
            .await
            .unwrap();
        tx.rollback().await.expect("Could not rollback");
        let mut tx = connection.begin().await.expect("Could not begin");
        tx.execute(Query::new("INSERT INTO t VALUES (2)"))
            .await
            .unwrap();
        tx.commit().await.expect("Could not commit");
        let rows = connection
            .fetch(Query::new("SELECT a FROM t"))
            .try_collect::<Vec<_>>()
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].values(), [Value::Int64(Some(2))]);
    }
}
