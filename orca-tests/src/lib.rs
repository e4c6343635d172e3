mod cascade;
mod pets;
mod transaction;
mod users;

use crate::{cascade::cascade, pets::pets, transaction::transaction, users::users};
use log::LevelFilter;
use orca::{Alias, Connection, Dialect, Orm, Registry, SqlBackend};
use std::{env, sync::Arc};

pub fn init_logs() {
    let mut logger = env_logger::builder();
    logger
        .is_test(true)
        .format_file(true)
        .format_line_number(true);
    if env::var("RUST_LOG").is_err() {
        logger.filter_level(LevelFilter::Warn);
    }
    let _ = logger.try_init();
}

/// Run every scenario over `connection`. `url` configures the alias the handle is bound to.
pub async fn execute_tests<C: Connection>(connection: C, url: &str) {
    let alias = Alias::from_url("default", url).expect("Could not build the alias from the url");
    let registry = Arc::new(Registry::new());
    let mut orm = Orm::sql(registry, Arc::new(alias), connection)
        .expect("Could not build the handle over the connection");
    users(&mut orm).await;
    pets(&mut orm).await;
    cascade(&mut orm).await;
    #[cfg(not(feature = "disable-transactions"))]
    transaction(&mut orm).await;
}

/// Auto increment integer primary key declaration.
pub(crate) fn auto_key(dialect: Dialect) -> &'static str {
    match dialect {
        Dialect::Sqlite => "INTEGER PRIMARY KEY AUTOINCREMENT",
        Dialect::Postgres => "BIGSERIAL PRIMARY KEY",
        _ => "BIGINT AUTO_INCREMENT PRIMARY KEY",
    }
}

/// Drop and create `table` with the given column declarations after the `id` key.
pub(crate) async fn recreate<C: orca::Executor>(
    orm: &mut Orm<SqlBackend<C>>,
    table: &str,
    columns: &str,
) {
    let dialect = orm.backend().dialect();
    let result = orm
        .raw(&format!("DROP TABLE IF EXISTS {}", table), vec![])
        .exec()
        .await;
    assert!(result.is_ok(), "Failed to drop {}: {:?}", table, result.unwrap_err());
    let result = orm
        .raw(
            &format!("CREATE TABLE {} (id {}, {})", table, auto_key(dialect), columns),
            vec![],
        )
        .exec()
        .await;
    assert!(result.is_ok(), "Failed to create {}: {:?}", table, result.unwrap_err());
}

#[macro_export]
macro_rules! silent_logs {
    ($($code:tt)+) => {{
        let level = log::max_level();
        log::set_max_level(log::LevelFilter::Off);
        let result = { $($code)+ };
        log::set_max_level(level);
        result
    }};
}
