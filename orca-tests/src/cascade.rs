use crate::recreate;
use orca::{ErrorKind, Executor, Model, Orm, OrmError, SqlBackend, Value};
use std::sync::LazyLock;
use tokio::sync::Mutex;

static MUTEX: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

#[derive(Model, Debug, Clone)]
struct Parent {
    #[orca(primary_key)]
    id: i64,
    name: String,
}

#[derive(Model, Debug, Clone)]
struct Child {
    id: i64,
    name: String,
    #[orca(foreign_key, null, on_delete = "set_null")]
    parent: Option<Box<Parent>>,
}

#[derive(Model, Debug, Clone)]
struct Sticker {
    id: i64,
    #[orca(foreign_key, null, on_delete = "set_default", default = "1")]
    parent: Option<Box<Parent>>,
}

#[derive(Model, Debug, Clone)]
struct Toy {
    id: i64,
    label: String,
    #[orca(foreign_key, on_delete = "cascade")]
    child: Option<Box<Child>>,
}

pub async fn cascade<C: Executor>(orm: &mut Orm<SqlBackend<C>>) {
    let _lock = MUTEX.lock().await;
    for result in [
        orm.registry().register::<Parent>(false),
        orm.registry().register::<Child>(false),
        orm.registry().register::<Toy>(false),
        orm.registry().register::<Sticker>(false),
    ] {
        assert!(result.is_ok(), "Could not register: {:?}", result.unwrap_err());
    }

    // Setup
    recreate(orm, "parent", "name VARCHAR(64) NOT NULL").await;
    recreate(orm, "child", "name VARCHAR(64) NOT NULL, parent BIGINT").await;
    recreate(orm, "toy", "label VARCHAR(64) NOT NULL, child BIGINT NOT NULL").await;
    recreate(orm, "sticker", "parent BIGINT").await;

    let mut parent = Parent {
        id: 7,
        name: "p".into(),
    };
    let key = orm.insert(&mut parent).await.expect("Could not insert the parent");
    assert_eq!(key, Value::Int64(Some(7)));
    let mut children = ["x", "y"].map(|name| Child {
        name: name.into(),
        parent: Some(Box::new(parent.clone())),
        ..Child::zeroed()
    });
    for child in children.iter_mut() {
        orm.insert(child).await.expect("Could not insert a child");
        assert_ne!(child.id, 0);
    }
    let mut toys = children.each_ref().map(|child| Toy {
        label: format!("{}'s ball", child.name),
        child: Some(Box::new(child.clone())),
        ..Toy::zeroed()
    });
    orm.insert_multi(1, &mut toys)
        .await
        .expect("Could not insert the toys");
    let mut sticker = Sticker {
        parent: Some(Box::new(parent.clone())),
        ..Sticker::zeroed()
    };
    orm.insert(&mut sticker)
        .await
        .expect("Could not insert the sticker");

    let child_query = orm.query_table::<Child>().unwrap();
    let toy_query = orm.query_table::<Toy>().unwrap();

    // Deleting the parent clears the reference of its children
    let deleted = orm.delete(&mut parent, &[]).await.expect("Could not delete");
    assert_eq!(deleted, 1);
    assert_eq!(parent.id, 0);
    assert_eq!(
        child_query
            .filter("parent__isnull", [true])
            .unwrap()
            .count(orm)
            .await
            .unwrap(),
        2
    );

    // And moves the reference of its stickers to the declared default
    let moved = orm
        .query_table::<Sticker>()
        .unwrap()
        .filter("id", [sticker.id])
        .unwrap()
        .one::<Sticker, _>(orm)
        .await
        .expect("Could not read the sticker");
    assert_eq!(moved.parent.as_ref().map(|v| v.id), Some(1));

    // Deleting a child removes its toys
    let deleted = child_query
        .filter("name", ["x"])
        .unwrap()
        .delete(orm)
        .await
        .expect("Could not delete the child");
    assert_eq!(deleted, 1);
    let labels = toy_query.values_flat(orm, "label").await.unwrap();
    assert_eq!(labels, [Value::from("y's ball")]);

    // A batch delete without condition is refused and deletes nothing
    let error = crate::silent_logs! {
        toy_query.delete(orm).await.unwrap_err()
    };
    assert_eq!(OrmError::kind_of(&error), ErrorKind::Usage);
    assert_eq!(toy_query.count(orm).await.unwrap(), 1);
}
