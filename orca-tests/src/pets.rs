use crate::recreate;
use orca::{Condition, Executor, Model, Orm, OrmError, Params, SqlBackend, Value};
use std::sync::LazyLock;
use tokio::sync::Mutex;

static MUTEX: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

#[derive(Model, Debug, Clone)]
struct Owner {
    id: i64,
    name: String,
    #[orca(reverse_many)]
    pets: Vec<Pet>,
}

#[derive(Model, Debug, Clone)]
struct Pet {
    id: i64,
    name: String,
    age: i32,
    #[orca(foreign_key, null, on_delete = "set_null")]
    owner: Option<Box<Owner>>,
}

fn pet(name: &str, age: i32, owner: &Owner) -> Pet {
    Pet {
        name: name.into(),
        age,
        owner: Some(Box::new(owner.clone())),
        ..Pet::zeroed()
    }
}

pub async fn pets<C: Executor>(orm: &mut Orm<SqlBackend<C>>) {
    let _lock = MUTEX.lock().await;
    orm.registry()
        .register::<Owner>(false)
        .expect("Could not register Owner");
    orm.registry()
        .register::<Pet>(false)
        .expect("Could not register Pet");

    // Setup
    recreate(orm, "pet", "name VARCHAR(64) NOT NULL, age INTEGER NOT NULL, owner BIGINT").await;
    recreate(orm, "owner", "name VARCHAR(64) NOT NULL").await;

    let mut ann = Owner {
        name: "ann".into(),
        ..Owner::zeroed()
    };
    let mut bob = Owner {
        name: "bob".into(),
        ..Owner::zeroed()
    };
    orm.insert(&mut ann).await.expect("Could not insert ann");
    orm.insert(&mut bob).await.expect("Could not insert bob");
    let mut pets = vec![
        pet("cat", 3, &ann),
        pet("dog", 5, &ann),
        pet("hot_dog", 1, &bob),
        pet("Parrot", 12, &bob),
        Pet {
            name: "stray".into(),
            age: 2,
            ..Pet::zeroed()
        },
    ];
    let inserted = orm
        .insert_multi(10, &mut pets)
        .await
        .expect("Could not insert the pets");
    assert_eq!(inserted, 5);

    let query = orm.query_table::<Pet>().unwrap();

    // Pattern filters, the wildcard in `hot_dog` is matched literally
    let names = query
        .filter("name__contains", ["dog"])
        .unwrap()
        .order_by(["name"])
        .values_flat(orm, "name")
        .await
        .unwrap();
    assert_eq!(names, [Value::from("dog"), Value::from("hot_dog")]);
    let names = query
        .filter("name__contains", ["t_d"])
        .unwrap()
        .values_flat(orm, "name")
        .await
        .unwrap();
    assert_eq!(names, [Value::from("hot_dog")]);
    let found = query
        .filter("name__istartswith", ["par"])
        .unwrap()
        .one::<Pet, _>(orm)
        .await
        .unwrap();
    assert_eq!(found.age, 12);

    // Comparisons, membership, nulls
    assert_eq!(query.filter("age__gte", [3]).unwrap().count(orm).await.unwrap(), 3);
    assert_eq!(
        query
            .filter("age__between", [2, 5])
            .unwrap()
            .count(orm)
            .await
            .unwrap(),
        3
    );
    assert_eq!(
        query
            .filter("name__in", ["cat", "stray", "lion"])
            .unwrap()
            .count(orm)
            .await
            .unwrap(),
        2
    );
    assert_eq!(
        query
            .filter("owner__isnull", [true])
            .unwrap()
            .values_flat(orm, "name")
            .await
            .unwrap(),
        [Value::from("stray")]
    );
    let either = Condition::new()
        .and("age__lt", [2])
        .unwrap()
        .or("age__gt", [10])
        .unwrap();
    assert_eq!(query.set_cond(either).count(orm).await.unwrap(), 2);
    assert_eq!(
        query
            .exclude("owner__name", ["ann"])
            .unwrap()
            .filter("owner__isnull", [false])
            .unwrap()
            .count(orm)
            .await
            .unwrap(),
        2
    );

    // Crossing relations both ways
    let owners = orm.query_table::<Owner>().unwrap();
    let names = owners
        .filter("pets__age__gt", [10])
        .unwrap()
        .values_flat(orm, "name")
        .await
        .unwrap();
    assert_eq!(names, [Value::from("bob")]);
    let found = owners
        .filter("pets__name__in", ["cat", "dog"])
        .unwrap()
        .distinct()
        .all::<Owner, _>(orm)
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, ann.id);
    assert!(found[0].pets.is_empty());

    // Ordering and windows
    let ordered = query
        .order_by(["-age"])
        .limit(2)
        .offset(1)
        .all::<Pet, _>(orm)
        .await
        .unwrap();
    assert_eq!(
        ordered.iter().map(|v| v.name.as_str()).collect::<Vec<_>>(),
        ["dog", "cat"]
    );

    // Eager loading fills the related record
    let loaded = query
        .filter("name", ["dog"])
        .unwrap()
        .related_sel(["owner"])
        .one::<Pet, _>(orm)
        .await
        .unwrap();
    let owner = loaded.owner.as_ref().expect("The owner should be loaded");
    assert_eq!(owner.name, "ann");
    assert_eq!(owner.id, ann.id);
    assert!(owner.pets.is_empty());
    let lazy = query
        .filter("name", ["dog"])
        .unwrap()
        .one::<Pet, _>(orm)
        .await
        .unwrap();
    let owner = lazy.owner.as_ref().expect("The owner key should be set");
    assert_eq!(owner.id, ann.id);
    assert!(owner.name.is_empty());

    // Projections
    let rows = query
        .filter("owner__name", ["bob"])
        .unwrap()
        .order_by(["age"])
        .values(orm, &["name", "owner__name"])
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["name"], Value::from("hot_dog"));
    assert_eq!(rows[1]["owner__name"], Value::from("bob"));
    let rows = query
        .filter("name", ["cat"])
        .unwrap()
        .values_list(orm, &["name", "age"])
        .await
        .unwrap();
    assert_eq!(rows, [vec![Value::from("cat"), Value::Int32(Some(3))]]);

    // Batch update
    let updated = query
        .filter("owner__name", ["ann"])
        .unwrap()
        .update(orm, Params::new().add("age", 1))
        .await
        .unwrap();
    assert_eq!(updated, 2);
    let ages = query
        .filter("owner", [ann.id])
        .unwrap()
        .order_by(["age"])
        .values_flat(orm, "age")
        .await
        .unwrap();
    assert_eq!(ages, [Value::Int32(Some(4)), Value::Int32(Some(6))]);
    let error = crate::silent_logs! {
        query.update(orm, Params::new().set("age", 0)).await.unwrap_err()
    };
    assert_eq!(OrmError::kind_of(&error), orca::ErrorKind::Usage);

    // Raw statements
    let rows = orm
        .raw("SELECT name FROM pet WHERE age > ? ORDER BY age", vec![Value::from(5)])
        .values_flat()
        .await
        .unwrap();
    assert_eq!(rows, [Value::from("dog"), Value::from("Parrot")]);
    let all = orm
        .raw("SELECT * FROM pet WHERE name = ?", vec![Value::from("cat")])
        .all::<Pet>()
        .await
        .unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].age, 4);
    assert_eq!(
        all[0].owner.as_ref().map(|v| v.id),
        Some(ann.id)
    );
}
