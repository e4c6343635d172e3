#[cfg(test)]
mod tests {
    use indoc::indoc;
    use orca::{
        Dialect, ErrorKind, Model, OrmError, Params, QuerySet, Registry, SqlCompiler, Value,
    };
    use time::UtcOffset;

    #[derive(Model, Clone, Debug)]
    #[orca(table = "owner")]
    struct Owner {
        id: i64,
        name: String,
        #[orca(reverse_many)]
        pets: Vec<Pet>,
    }

    #[derive(Model, Clone, Debug)]
    #[orca(table = "pet")]
    struct Pet {
        id: i64,
        name: String,
        age: i32,
        #[orca(foreign_key, null, on_delete = "set_null")]
        owner: Option<Box<Owner>>,
    }

    fn registry() -> Registry {
        let registry = Registry::new();
        registry.register::<Owner>(false).unwrap();
        registry.register::<Pet>(false).unwrap();
        registry
    }

    fn pets(registry: &Registry) -> QuerySet {
        QuerySet::new(registry.model::<Pet>().unwrap())
    }

    fn compiler(registry: &Registry, dialect: Dialect) -> SqlCompiler<'_> {
        SqlCompiler::new(registry, dialect, UtcOffset::UTC)
    }

    fn one_line(sql: &str) -> String {
        sql.trim().lines().map(str::trim).collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn select_filter_order_limit() {
        let registry = registry();
        let query = pets(&registry)
            .filter("name__contains", ["a_b"])
            .unwrap()
            .order_by(["-age", "name"])
            .limit(10);
        let select = compiler(&registry, Dialect::Sqlite)
            .select(query.info(), query.spec(), &[])
            .unwrap();
        assert_eq!(
            select.query.sql,
            one_line(indoc! {r#"
                SELECT T0."id", T0."name", T0."age", T0."owner"
                FROM "pet" T0
                WHERE T0."name" LIKE ? ESCAPE '\'
                ORDER BY T0."age" DESC, T0."name" ASC
                LIMIT 10
            "#})
        );
        assert_eq!(select.query.args, [Value::Varchar(Some(r"%a\_b%".into()))]);
        assert!(select.joined.is_empty());
    }

    #[test]
    fn filters_crossing_relations_join() {
        let registry = registry();
        let query = pets(&registry)
            .filter("owner__name", ["ann"])
            .unwrap()
            .filter("owner__pk", [3i64])
            .unwrap();
        let select = compiler(&registry, Dialect::Sqlite)
            .select(query.info(), query.spec(), &["name"])
            .unwrap();
        assert_eq!(
            select.query.sql,
            one_line(indoc! {r#"
                SELECT T0."name"
                FROM "pet" T0 LEFT OUTER JOIN "owner" T1 ON T1."id" = T0."owner"
                WHERE T1."name" = ? AND T0."owner" = ?
            "#})
        );
        assert_eq!(
            select.query.args,
            [Value::Varchar(Some("ann".into())), Value::Int64(Some(3))]
        );

        let owners = QuerySet::new(registry.model::<Owner>().unwrap())
            .filter("pets__age__gt", [2])
            .unwrap();
        let select = compiler(&registry, Dialect::Sqlite)
            .select(owners.info(), owners.spec(), &[])
            .unwrap();
        assert_eq!(
            select.query.sql,
            one_line(indoc! {r#"
                SELECT T0."id", T0."name"
                FROM "owner" T0 LEFT OUTER JOIN "pet" T1 ON T1."owner" = T0."id"
                WHERE T1."age" > ?
            "#})
        );
    }

    #[test]
    fn eager_load_selects_joined_columns() {
        let registry = registry();
        let query = pets(&registry).related_sel(["owner"]);
        let select = compiler(&registry, Dialect::Sqlite)
            .select(query.info(), query.spec(), &[])
            .unwrap();
        assert_eq!(
            select.query.sql,
            one_line(indoc! {r#"
                SELECT T0."id", T0."name", T0."age", T0."owner", T1."id", T1."name"
                FROM "pet" T0 LEFT OUTER JOIN "owner" T1 ON T1."id" = T0."owner"
            "#})
        );
        assert_eq!(select.joined.len(), 1);
        assert_eq!(select.joined[0].path, ["owner"]);
    }

    #[test]
    fn postgres_placeholders_match_arguments() {
        let registry = registry();
        let query = pets(&registry)
            .filter("age__between", [1, 5])
            .unwrap()
            .filter("name__in", ["rex", "fido", "tom"])
            .unwrap()
            .offset(20);
        let select = compiler(&registry, Dialect::Postgres)
            .select(query.info(), query.spec(), &["id"])
            .unwrap();
        assert_eq!(
            select.query.sql,
            one_line(indoc! {r#"
                SELECT T0."id"
                FROM "pet" T0
                WHERE T0."age" BETWEEN $1 AND $2 AND T0."name" IN ($3, $4, $5)
                OFFSET 20
            "#})
        );
        assert_eq!(select.query.args.len(), 5);

        let query = pets(&registry)
            .filter("name__icontains", ["Re"])
            .unwrap();
        let select = compiler(&registry, Dialect::Postgres)
            .select(query.info(), query.spec(), &["id"])
            .unwrap();
        assert_eq!(
            select.query.sql,
            r#"SELECT T0."id" FROM "pet" T0 WHERE UPPER(T0."name"::text) LIKE UPPER($1)"#
        );
        assert_eq!(select.query.args, [Value::Varchar(Some("%Re%".into()))]);
    }

    #[test]
    fn sqlite_offset_without_limit() {
        let registry = registry();
        let query = pets(&registry).offset(5);
        let select = compiler(&registry, Dialect::Sqlite)
            .select(query.info(), query.spec(), &["id"])
            .unwrap();
        assert_eq!(
            select.query.sql,
            r#"SELECT T0."id" FROM "pet" T0 LIMIT 9223372036854775807 OFFSET 5"#
        );
    }

    #[test]
    fn isnull_binds_nothing() {
        let registry = registry();
        let query = pets(&registry)
            .filter("owner__isnull", [true])
            .unwrap()
            .exclude("name__isnull", [false])
            .unwrap();
        let select = compiler(&registry, Dialect::Sqlite)
            .select(query.info(), query.spec(), &["id"])
            .unwrap();
        assert_eq!(
            select.query.sql,
            r#"SELECT T0."id" FROM "pet" T0 WHERE T0."owner" IS NULL AND NOT T0."name" IS NOT NULL"#
        );
        assert!(select.query.args.is_empty());

        let error = pets(&registry).filter("name__isnull", ["yes"]).unwrap_err();
        assert_eq!(OrmError::kind_of(&error), ErrorKind::Usage);
    }

    #[test]
    fn arity_is_checked() {
        let registry = registry();
        let error = pets(&registry).filter("age__between", [1]).unwrap_err();
        assert_eq!(OrmError::kind_of(&error), ErrorKind::Usage);
        assert!(format!("{:#}", error).contains("between"));
        let error = pets(&registry)
            .filter("age__in", Vec::<i32>::new())
            .unwrap_err();
        assert_eq!(OrmError::kind_of(&error), ErrorKind::Usage);
        let error = pets(&registry).filter("age", [1, 2]).unwrap_err();
        assert_eq!(OrmError::kind_of(&error), ErrorKind::Usage);
    }

    #[test]
    fn unknown_column_is_refused() {
        let registry = registry();
        let query = pets(&registry);
        let error = compiler(&registry, Dialect::Sqlite)
            .select(query.info(), query.spec(), &["color"])
            .unwrap_err();
        assert_eq!(OrmError::kind_of(&error), ErrorKind::Usage);
    }

    #[test]
    fn count_wraps_grouped_selections() {
        let registry = registry();
        let query = pets(&registry).filter("age__gt", [1]).unwrap();
        let sql = compiler(&registry, Dialect::Sqlite)
            .count(query.info(), query.spec())
            .unwrap()
            .sql;
        assert_eq!(sql, r#"SELECT COUNT(*) FROM "pet" T0 WHERE T0."age" > ?"#);

        let query = pets(&registry).group_by(["owner"]);
        let sql = compiler(&registry, Dialect::Postgres)
            .count(query.info(), query.spec())
            .unwrap()
            .sql;
        assert_eq!(
            sql,
            r#"SELECT COUNT(*) FROM (SELECT T0."owner" FROM "pet" T0 GROUP BY T0."owner") AS T"#
        );
    }

    #[test]
    fn update_batch_forms() {
        let registry = registry();
        let params = Params::new().add("age", 1);
        let query = pets(&registry).filter("name", ["rex"]).unwrap();
        let update = compiler(&registry, Dialect::Sqlite)
            .update_batch(query.info(), query.spec(), &params)
            .unwrap();
        assert_eq!(
            update.sql,
            r#"UPDATE "pet" SET "age" = "age" + ? WHERE "name" = ?"#
        );
        assert_eq!(
            update.args,
            [Value::Int32(Some(1)), Value::Varchar(Some("rex".into()))]
        );

        let params = Params::new().set("name", "x");
        let query = pets(&registry).filter("owner__name", ["ann"]).unwrap();
        let update = compiler(&registry, Dialect::MySql)
            .update_batch(query.info(), query.spec(), &params)
            .unwrap();
        assert_eq!(
            update.sql,
            one_line(indoc! {r#"
                UPDATE `pet` T0 LEFT OUTER JOIN `owner` T1 ON T1.`id` = T0.`owner`
                SET T0.`name` = ?
                WHERE T1.`name` = ?
            "#})
        );
        let update = compiler(&registry, Dialect::Postgres)
            .update_batch(query.info(), query.spec(), &params)
            .unwrap();
        assert_eq!(
            update.sql,
            one_line(indoc! {r#"
                UPDATE "pet" SET "name" = $1
                WHERE "id" IN (SELECT T0."id"
                FROM "pet" T0 LEFT OUTER JOIN "owner" T1 ON T1."id" = T0."owner"
                WHERE T1."name" = $2)
            "#})
        );
        let update = compiler(&registry, Dialect::ClickHouse)
            .update_batch(
                query.info(),
                pets(&registry).filter("age", [3]).unwrap().spec(),
                &params,
            )
            .unwrap();
        assert_eq!(update.sql, "ALTER TABLE `pet` UPDATE `name` = ? WHERE `age` = ?");
    }

    #[test]
    fn update_batch_refuses_empty_condition() {
        let registry = registry();
        let query = pets(&registry);
        let error = compiler(&registry, Dialect::Sqlite)
            .update_batch(query.info(), query.spec(), &Params::new().set("age", 0))
            .unwrap_err();
        assert_eq!(OrmError::kind_of(&error), ErrorKind::Usage);
    }

    #[test]
    fn insert_and_delete_statements() {
        let registry = registry();
        let info = registry.model::<Pet>().unwrap();
        let rows = vec![
            vec![Value::from("rex"), Value::from(3)],
            vec![Value::from("tom"), Value::from(5)],
        ];
        let insert = compiler(&registry, Dialect::Sqlite).insert(&info, &["name", "age"], rows, false);
        assert_eq!(
            insert.sql,
            r#"INSERT INTO "pet" ("name", "age") VALUES (?, ?), (?, ?)"#
        );
        assert_eq!(insert.args.len(), 4);
        let insert = compiler(&registry, Dialect::Postgres).insert(
            &info,
            &["name"],
            vec![vec![Value::from("rex")]],
            true,
        );
        assert_eq!(
            insert.sql,
            r#"INSERT INTO "pet" ("name") VALUES ($1) RETURNING "id""#
        );
        let insert = compiler(&registry, Dialect::MySql).insert(&info, &[], vec![vec![]], false);
        assert_eq!(insert.sql, "INSERT INTO `pet` () VALUES ()");

        let delete = compiler(&registry, Dialect::ClickHouse)
            .delete_in(&info, vec![Value::from(1i64), Value::from(2i64)]);
        assert_eq!(delete.sql, "ALTER TABLE `pet` DELETE WHERE `id` IN (?, ?)");
    }

    #[test]
    fn values_project_across_relations() {
        let registry = registry();
        let query = pets(&registry).distinct();
        let projection = compiler(&registry, Dialect::Sqlite)
            .values(query.info(), query.spec(), &["name", "owner__name"])
            .unwrap();
        assert_eq!(
            projection.query.sql,
            one_line(indoc! {r#"
                SELECT DISTINCT T0."name", T1."name"
                FROM "pet" T0 LEFT OUTER JOIN "owner" T1 ON T1."id" = T0."owner"
            "#})
        );
        assert_eq!(projection.labels, ["name", "owner__name"]);
    }

    #[test]
    fn raw_statements_translate_marks() {
        let registry = registry();
        let query = compiler(&registry, Dialect::Postgres)
            .raw("SELECT * FROM pet WHERE age > ? AND name <> '?'", vec![Value::from(1)]);
        assert_eq!(query.sql, "SELECT * FROM pet WHERE age > $1 AND name <> '?'");
        assert_eq!(
            compiler(&registry, Dialect::Postgres)
                .key_sync(&registry.model::<Pet>().unwrap())
                .unwrap()
                .sql,
            r#"SELECT setval(pg_get_serial_sequence('pet', 'id'), (SELECT MAX("id") FROM "pet"))"#
        );
        assert!(
            compiler(&registry, Dialect::Sqlite)
                .key_sync(&registry.model::<Pet>().unwrap())
                .is_none()
        );
    }

    #[test]
    fn shared_prefixes_stay_independent() {
        let registry = registry();
        let base = pets(&registry).filter("age__gte", [1]).unwrap();
        let young = base.filter("age__lt", [5]).unwrap();
        let named = base.filter("name", ["rex"]).unwrap();
        assert_eq!(base.spec().cond.len(), 1);
        assert_eq!(young.spec().cond.len(), 2);
        assert_eq!(named.spec().cond.len(), 2);
        let sqlite = compiler(&registry, Dialect::Sqlite);
        assert_eq!(
            sqlite.select(young.info(), young.spec(), &["id"]).unwrap().query.sql,
            r#"SELECT T0."id" FROM "pet" T0 WHERE T0."age" >= ? AND T0."age" < ?"#
        );
    }
}
