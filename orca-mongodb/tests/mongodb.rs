#[cfg(test)]
mod tests {
    use orca::{Alias, Model, Orm, OrmError, Params, Registry, UpdateOperator, Value};
    use orca_mongodb::MongoConnection;
    use orca_tests::init_logs;
    use std::{env, sync::Arc};

    #[derive(Model, Debug, Clone)]
    #[orca(table = "orca_books")]
    struct Book {
        #[orca(primary_key)]
        id: String,
        title: String,
        pages: i32,
        tag: Option<String>,
    }

    /// Runs only when `ORCA_MONGODB_URL` names a reachable server, like
    /// `mongodb://localhost:27017/orca_test`.
    #[tokio::test]
    async fn mongodb() {
        init_logs();
        let Ok(url) = env::var("ORCA_MONGODB_URL") else {
            return;
        };
        let connection = MongoConnection::connect(&url)
            .await
            .expect("Could not connect to mongodb");
        connection.ping().await.expect("Could not reach the server");
        connection
            .database()
            .collection::<orca::bson::Document>("orca_books")
            .drop()
            .await
            .expect("Could not drop the collection");

        let registry = Arc::new(Registry::new());
        registry.register::<Book>(false).unwrap();
        let alias = Arc::new(Alias::from_url("docs", &url).unwrap());
        let mut orm = Orm::document(registry, alias, connection).unwrap();

        let mut books = ["dune", "emma", "ulysses"].map(|title| Book {
            title: title.into(),
            pages: title.len() as i32 * 100,
            ..Book::zeroed()
        });
        assert_eq!(orm.insert_multi(2, &mut books).await.unwrap(), 3);
        assert!(books.iter().all(|v| !v.id.is_empty()));

        let mut read = Book {
            id: books[0].id.clone(),
            ..Book::zeroed()
        };
        orm.read(&mut read, &[]).await.unwrap();
        assert_eq!(read.title, "dune");

        let query = orm.query_table::<Book>().unwrap();
        assert_eq!(
            query
                .filter("pages__gt", [400])
                .unwrap()
                .count(&mut orm)
                .await
                .unwrap(),
            1
        );
        let titles = query
            .filter("title__icontains", ["M"])
            .unwrap()
            .values_flat(&mut orm, "title")
            .await
            .unwrap();
        assert_eq!(titles, [Value::from("emma")]);

        let updated = query
            .filter("pages", [400])
            .unwrap()
            .update(&mut orm, Params::new().set("tag", "short"))
            .await
            .unwrap();
        assert_eq!(updated, 2);
        let updated = query
            .filter("title", ["dune"])
            .unwrap()
            .update_with(&mut orm, UpdateOperator::Unset, Params::new().set("tag", ""))
            .await
            .unwrap();
        assert_eq!(updated, 1);
        orm.read(&mut read, &[]).await.unwrap();
        assert!(read.tag.is_none());

        assert_eq!(orm.delete(&mut read, &[]).await.unwrap(), 1);
        let error = orm.read(&mut read, &["title"]).await.unwrap_err();
        assert!(OrmError::is_not_found(&error));
        assert_eq!(query.unlimited().count(&mut orm).await.unwrap(), 2);
    }
}
