#[cfg(test)]
mod tests {
    use orca::{
        Action, ErrorKind, FieldType, Model, OrmError, Record, Registry, Value, ZERO_TIME,
    };
    use rust_decimal::Decimal;
    use std::sync::Arc;
    use time::{Date, OffsetDateTime};

    #[derive(Model, Clone, Debug)]
    struct Author {
        #[orca(primary_key, auto_increment)]
        key: u32,
        #[orca(column = "full_name")]
        name: String,
        nickname: Option<String>,
        #[orca(auto_now_add)]
        created: OffsetDateTime,
        #[orca(auto_now)]
        updated: OffsetDateTime,
        born: Option<Date>,
        royalties: Decimal,
        #[orca(default = "{}")]
        extra: serde_json::Value,
        #[orca(reverse_one)]
        profile: Option<Box<Profile>>,
    }

    #[derive(Model, Clone, Debug)]
    #[orca(table = "author_profile")]
    struct Profile {
        id: i64,
        #[orca(one_to_one, on_delete = "cascade")]
        author: Option<Box<Author>>,
        #[orca(field_type = Text)]
        bio: String,
        #[orca(foreign_key, null, on_delete = "set_default", default = "1")]
        mentor: Option<Box<Author>>,
    }

    #[test]
    fn definition_from_attributes() {
        let definition = Author::definition();
        assert_eq!(definition.table, "author");
        assert!(definition.name.ends_with("::Author"));
        let pk = definition.primary_key().unwrap();
        assert_eq!(pk.name, "key");
        assert!(pk.auto_increment);

        let name = &definition.fields[1];
        assert_eq!((name.name, name.column), ("name", "full_name"));
        assert_eq!(name.field_type, FieldType::VarChar);
        assert!(!name.nullable);
        assert!(definition.fields[2].nullable);
        assert_eq!(definition.fields[3].field_type, FieldType::DateTime);
        assert!(definition.fields[3].auto_now_add);
        assert!(definition.fields[4].auto_now);
        assert_eq!(definition.fields[5].field_type, FieldType::Date);
        assert_eq!(definition.fields[6].field_type, FieldType::Decimal);
        assert_eq!(definition.fields[7].field_type, FieldType::Json);
        assert_eq!(definition.fields[7].default, Some("{}"));
        assert_eq!(definition.fields[8].field_type, FieldType::ReverseOne);

        let profile = Profile::definition();
        assert_eq!(profile.table, "author_profile");
        assert_eq!(profile.fields[1].field_type, FieldType::OneToOne);
        assert_eq!(profile.fields[1].on_delete, Action::Cascade);
        assert_eq!(profile.fields[2].field_type, FieldType::Text);
        assert_eq!(profile.fields[3].on_delete, Action::SetDefault);
        assert!(profile.fields[3].nullable);
        assert_eq!(
            profile.fields[3].related.map(|v| v().name),
            Some(definition.name)
        );
    }

    #[test]
    fn registration() {
        let registry = Registry::new();
        let error = registry.register::<Profile>(false).unwrap_err();
        assert_eq!(OrmError::kind_of(&error), ErrorKind::Config);

        let author = registry.register::<Author>(false).unwrap();
        let profile = registry.register::<Profile>(false).unwrap();
        for column in author.columns() {
            assert_eq!(author.get_by_column(column).unwrap().column, *column);
        }
        assert!(author.get_by_column("profile").is_none());
        assert_eq!(author.get_by_any("full_name").unwrap().name, "name");
        assert_eq!(author.get_by_any("name").unwrap().column, "full_name");

        let pk = profile.primary_key();
        assert_eq!(pk.name, "id");
        assert!(pk.auto_increment);
        assert_eq!(
            profile.get_by_name("author").unwrap().storage_type(),
            FieldType::UInt32
        );

        let again = registry.register::<Author>(false).unwrap();
        assert!(Arc::ptr_eq(&author, &again));
        let dependents = registry.dependents(author.name);
        assert_eq!(dependents.len(), 2);
    }

    #[test]
    fn zeroed_record() {
        let author = Author::zeroed();
        assert_eq!(author.key, 0);
        assert!(author.name.is_empty());
        assert!(author.nickname.is_none());
        assert_eq!(author.created, ZERO_TIME);
        assert!(author.profile.is_none());
        assert_eq!(author.get_value("nickname").unwrap(), Value::Null);
    }

    #[test]
    fn field_access_by_name() {
        let mut author = Author::zeroed();
        author.set_value("name", Value::from("ann")).unwrap();
        author.set_value("key", Value::UInt32(Some(7))).unwrap();
        assert_eq!(author.name, "ann");
        assert_eq!(author.primary_key_value().unwrap(), Value::UInt32(Some(7)));
        assert_eq!(author.get_value("name").unwrap(), Value::from("ann"));

        let error = author.get_value("missing").unwrap_err();
        assert_eq!(OrmError::kind_of(&error), ErrorKind::Usage);
        assert!(author.set_value("key", Value::from("seven")).is_err());
    }

    #[test]
    fn relations_hold_lazy_references() {
        let mut profile = Profile::zeroed();
        assert_eq!(profile.get_value("author").unwrap(), Value::Null);
        assert!(profile.related("author").is_none());

        profile.set_value("author", Value::UInt32(Some(3))).unwrap();
        let author = profile.author.as_ref().unwrap();
        assert_eq!(author.key, 3);
        assert!(author.name.is_empty());
        assert_eq!(profile.get_value("author").unwrap(), Value::UInt32(Some(3)));

        let related = profile.related_mut("mentor").unwrap();
        related.set_value("name", Value::from("bob")).unwrap();
        assert_eq!(profile.mentor.as_ref().unwrap().name, "bob");

        profile.set_value("author", Value::Null).unwrap();
        assert!(profile.author.is_none());
        assert!(profile.related_mut("bio").is_none());
    }
}
