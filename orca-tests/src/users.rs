use crate::recreate;
use orca::{ErrorKind, Executor, Model, Orm, OrmError, Record, SqlBackend, Value, ZERO_TIME};
use std::{sync::LazyLock, time::Duration};
use time::{OffsetDateTime, macros::datetime};
use tokio::sync::Mutex;

static MUTEX: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

#[derive(Model, Debug, Clone)]
#[orca(table = "users")]
struct User {
    id: i64,
    #[orca(column = "user_name")]
    name: String,
    email: Option<String>,
    visits: i32,
    active: bool,
    #[orca(auto_now_add)]
    created_at: OffsetDateTime,
    #[orca(auto_now)]
    updated_at: OffsetDateTime,
}

impl User {
    fn named(name: &str) -> Self {
        User {
            name: name.into(),
            active: true,
            ..User::zeroed()
        }
    }
}

pub async fn users<C: Executor>(orm: &mut Orm<SqlBackend<C>>) {
    let _lock = MUTEX.lock().await;
    orm.registry()
        .register::<User>(false)
        .expect("Could not register User");

    // Setup
    recreate(
        orm,
        "users",
        "user_name VARCHAR(64) NOT NULL, email VARCHAR(128), visits INTEGER NOT NULL, \
         active BOOLEAN NOT NULL, created_at TIMESTAMP, updated_at TIMESTAMP",
    )
    .await;

    // Insert
    let mut user = User::named("a");
    let id = orm.insert(&mut user).await.expect("Could not insert the user");
    assert_ne!(id, Value::Null);
    assert_ne!(user.id, 0);
    assert_ne!(user.created_at, ZERO_TIME);
    assert_eq!(user.created_at, user.updated_at);

    // Read by primary key
    let mut read = User {
        id: user.id,
        ..User::zeroed()
    };
    orm.read(&mut read, &[]).await.expect("Could not read the user");
    assert_eq!(read.name, "a");
    assert!(read.active);
    assert!(read.email.is_none());
    assert_eq!(read.created_at.unix_timestamp(), user.created_at.unix_timestamp());

    // Read by other columns
    let mut by_name = User::named("a");
    orm.read(&mut by_name, &["name"])
        .await
        .expect("Could not read the user by name");
    assert_eq!(by_name.id, user.id);

    let mut missing = User::named("nobody");
    let error = crate::silent_logs! {
        orm.read(&mut missing, &["name"]).await.unwrap_err()
    };
    assert!(OrmError::is_not_found(&error));

    // Read or create
    let mut created = User::named("b");
    let (was_created, key) = orm
        .read_or_create(&mut created, &["name"])
        .await
        .expect("Could not read or create");
    assert!(was_created);
    assert_eq!(key, created.primary_key_value().unwrap());
    let mut existing = User::named("b");
    let (was_created, _) = orm
        .read_or_create(&mut existing, &["name"])
        .await
        .expect("Could not read or create");
    assert!(!was_created);
    assert_eq!(existing.id, created.id);

    // Update selected columns only
    read.email = Some("a@example.com".into());
    read.visits = 99;
    let updated = orm
        .update(&mut read, &["email"])
        .await
        .expect("Could not update the user");
    assert_eq!(updated, 1);
    let mut check = User {
        id: user.id,
        ..User::zeroed()
    };
    orm.read(&mut check, &[]).await.expect("Could not read the user");
    assert_eq!(check.email.as_deref(), Some("a@example.com"));
    assert_eq!(check.visits, 0);

    // Creation time is never overwritten, modification time always moves
    let stored = check.clone();
    tokio::time::sleep(Duration::from_millis(1100)).await;
    check.email = Some("new@example.com".into());
    check.created_at = datetime!(2000-01-01 0:00 UTC);
    orm.update(&mut check, &["email", "created_at"])
        .await
        .expect("Could not update the user");
    assert!(check.updated_at > stored.updated_at);
    let mut check = User {
        id: user.id,
        ..User::zeroed()
    };
    orm.read(&mut check, &[]).await.expect("Could not read the user");
    assert_eq!(check.email.as_deref(), Some("new@example.com"));
    assert_eq!(
        check.created_at.unix_timestamp(),
        stored.created_at.unix_timestamp()
    );
    assert!(check.updated_at.unix_timestamp() > stored.updated_at.unix_timestamp());

    // Multi insert
    let mut many = ["c", "d", "e"].map(User::named);
    let inserted = orm
        .insert_multi(2, &mut many)
        .await
        .expect("Could not insert many users");
    assert_eq!(inserted, 3);
    let users = orm.query_table::<User>().unwrap();
    assert_eq!(users.count(orm).await.unwrap(), 5);

    // Delete
    let deleted = orm.delete(&mut check, &[]).await.expect("Could not delete");
    assert_eq!(deleted, 1);
    assert!(
        !users
            .filter("name", ["a"])
            .unwrap()
            .exist(orm)
            .await
            .unwrap()
    );
    let error = crate::silent_logs! {
        orm.update(&mut User::named("z"), &[]).await.unwrap_err()
    };
    assert_eq!(OrmError::kind_of(&error), ErrorKind::Usage);
}
