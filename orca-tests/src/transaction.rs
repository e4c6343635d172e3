use crate::recreate;
use orca::{Connection, Model, Orm, SqlBackend, Transaction, Value};
use std::sync::LazyLock;
use tokio::sync::Mutex;

static MUTEX: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

#[derive(Model, Debug, Clone)]
#[orca(table = "ledger")]
struct Entry {
    id: i64,
    amount: i64,
}

pub async fn transaction<C: Connection>(orm: &mut Orm<SqlBackend<C>>) {
    let _lock = MUTEX.lock().await;
    orm.registry()
        .register::<Entry>(false)
        .expect("Could not register Entry");
    recreate(orm, "ledger", "amount BIGINT NOT NULL").await;
    let registry = orm.registry().clone();
    let alias = orm.alias().clone();

    // Rolled back
    {
        let connection = orm.backend_mut().executor();
        let mut tx = connection.begin().await.expect("Could not begin");
        let mut scoped = Orm::sql(registry.clone(), alias.clone(), &mut tx).unwrap();
        let mut entry = Entry {
            amount: 10,
            ..Entry::zeroed()
        };
        scoped.insert(&mut entry).await.expect("Could not insert");
        assert_eq!(
            scoped.query_table::<Entry>().unwrap().count(&mut scoped).await.unwrap(),
            1
        );
        drop(scoped);
        tx.rollback().await.expect("Could not rollback");
    }
    let entries = orm.query_table::<Entry>().unwrap();
    assert_eq!(entries.count(orm).await.unwrap(), 0);

    // Committed
    {
        let connection = orm.backend_mut().executor();
        let mut tx = connection.begin().await.expect("Could not begin");
        let mut scoped = Orm::sql(registry.clone(), alias.clone(), &mut tx).unwrap();
        let mut rows = [5, 6].map(|amount| Entry {
            amount,
            ..Entry::zeroed()
        });
        scoped
            .insert_multi(2, &mut rows)
            .await
            .expect("Could not insert");
        drop(scoped);
        tx.commit().await.expect("Could not commit");
    }
    let amounts = entries
        .order_by(["amount"])
        .values_flat(orm, "amount")
        .await
        .unwrap();
    assert_eq!(amounts, [Value::Int64(Some(5)), Value::Int64(Some(6))]);
}
