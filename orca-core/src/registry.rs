use crate::{Action, FieldType, Model, ModelDef, OrmError, Result};
use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

/// Resolved field metadata.
#[derive(Debug, Clone)]
pub struct FieldInfo {
    pub name: &'static str,
    pub column: &'static str,
    pub field_type: FieldType,
    pub nullable: bool,
    pub primary_key: bool,
    pub auto_increment: bool,
    pub auto_now: bool,
    pub auto_now_add: bool,
    pub default: Option<&'static str>,
    pub on_delete: Action,
    /// Fully qualified name of the related model, for relation and reverse fields.
    pub related: Option<&'static str>,
    /// Type of the related primary key, the storage type of a relation column.
    pub related_pk_type: Option<FieldType>,
}

impl FieldInfo {
    pub fn is_column(&self) -> bool {
        !self.field_type.is_reverse()
    }
    pub fn is_relation(&self) -> bool {
        self.field_type.is_relation()
    }
    pub fn is_reverse(&self) -> bool {
        self.field_type.is_reverse()
    }
    /// The type the marshaler converts to: relations store the key of the related model.
    pub fn storage_type(&self) -> FieldType {
        if self.is_relation() {
            self.related_pk_type.unwrap_or(FieldType::Int64)
        } else {
            self.field_type
        }
    }
}

/// Immutable metadata of a registered model.
#[derive(Debug)]
pub struct ModelInfo {
    pub name: &'static str,
    pub table: &'static str,
    pub fields: Box<[FieldInfo]>,
    primary_key: usize,
    by_column: HashMap<&'static str, usize>,
    by_name: HashMap<&'static str, usize>,
    columns: Box<[&'static str]>,
    relations: Box<[usize]>,
    reverse: Box<[usize]>,
}

impl ModelInfo {
    pub fn primary_key(&self) -> &FieldInfo {
        &self.fields[self.primary_key]
    }
    pub fn get_by_column(&self, column: &str) -> Option<&FieldInfo> {
        self.by_column.get(column).map(|i| &self.fields[*i])
    }
    pub fn get_by_name(&self, name: &str) -> Option<&FieldInfo> {
        self.by_name.get(name).map(|i| &self.fields[*i])
    }
    /// Field name first, column second. `pk` names the primary key.
    pub fn get_by_any(&self, key: &str) -> Option<&FieldInfo> {
        self.get_by_name(key)
            .or_else(|| self.get_by_column(key))
            .or_else(|| (key == "pk").then(|| self.primary_key()))
    }
    /// Column names of the fields stored in the table, in declaration order.
    pub fn columns(&self) -> &[&'static str] {
        &self.columns
    }
    /// Fields that are stored as columns, in declaration order.
    pub fn column_fields(&self) -> impl Iterator<Item = &FieldInfo> {
        self.fields.iter().filter(|f| f.is_column())
    }
    pub fn relations(&self) -> impl Iterator<Item = &FieldInfo> {
        self.relations.iter().map(|i| &self.fields[*i])
    }
    pub fn reverse_relations(&self) -> impl Iterator<Item = &FieldInfo> {
        self.reverse.iter().map(|i| &self.fields[*i])
    }
}

/// A foreign key of another model pointing to the model it is listed under.
#[derive(Debug, Clone)]
pub struct Dependent {
    pub model: &'static str,
    pub field: &'static str,
    pub column: &'static str,
    pub on_delete: Action,
    pub default: Option<&'static str>,
}

#[derive(Default)]
struct RegistryState {
    models: HashMap<&'static str, Arc<ModelInfo>>,
    tables: HashMap<&'static str, &'static str>,
    dependents: HashMap<&'static str, Vec<Dependent>>,
}

/// Model metadata owned by an ORM handle.
///
/// Lookups take a read lock and hand out `Arc`s, registration holds the write lock for the whole
/// validation so that a model becomes visible only once complete.
#[derive(Default)]
pub struct Registry {
    state: RwLock<RegistryState>,
}

impl Registry {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn register<M: Model>(&self, force: bool) -> Result<Arc<ModelInfo>> {
        self.register_definition(M::definition(), force)
    }

    pub fn register_definition(
        &self,
        definition: &'static ModelDef,
        force: bool,
    ) -> Result<Arc<ModelInfo>> {
        let mut guard = self
            .state
            .write()
            .map_err(|_| OrmError::config("The model registry lock is poisoned"))?;
        let state = &mut *guard;
        if let Some(existing) = state.models.get(definition.name) {
            if !force {
                return Ok(existing.clone());
            }
            let previous = existing.table;
            state.tables.remove(previous);
            for dependents in state.dependents.values_mut() {
                dependents.retain(|d| d.model != definition.name);
            }
        }
        let info = Arc::new(build_info(state, definition).inspect_err(|e| {
            log::error!("{:#}", e);
        })?);
        if let Some(other) = state.tables.get(info.table).filter(|v| **v != info.name) {
            let error = OrmError::config(format!(
                "Table `{}` of model `{}` is already used by model `{}`",
                info.table, info.name, other
            ));
            log::error!("{:#}", error);
            return Err(error);
        }
        for field in info.relations() {
            if let Some(target) = field.related {
                state.dependents.entry(target).or_default().push(Dependent {
                    model: info.name,
                    field: field.name,
                    column: field.column,
                    on_delete: field.on_delete,
                    default: field.default,
                });
            }
        }
        state.tables.insert(info.table, info.name);
        state.models.insert(info.name, info.clone());
        log::debug!("Registered model `{}` as table `{}`", info.name, info.table);
        Ok(info)
    }

    pub fn get(&self, name: &str) -> Option<Arc<ModelInfo>> {
        self.state.read().ok()?.models.get(name).cloned()
    }

    pub fn get_by_table(&self, table: &str) -> Option<Arc<ModelInfo>> {
        let state = self.state.read().ok()?;
        state
            .tables
            .get(table)
            .and_then(|name| state.models.get(name))
            .cloned()
    }

    /// Metadata of `M`, which must have been registered.
    pub fn model<M: Model>(&self) -> Result<Arc<ModelInfo>> {
        self.model_named(M::definition().name)
    }

    pub fn model_named(&self, name: &str) -> Result<Arc<ModelInfo>> {
        self.get(name).ok_or_else(|| {
            let error = OrmError::config(format!("Model `{}` is not registered", name));
            log::error!("{:#}", error);
            error
        })
    }

    /// Foreign keys of other models referencing `name`, in registration order.
    pub fn dependents(&self, name: &str) -> Vec<Dependent> {
        self.state
            .read()
            .ok()
            .and_then(|s| s.dependents.get(name).cloned())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.state.read().map(|s| s.models.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every registered model.
    pub fn clear(&self) {
        if let Ok(mut state) = self.state.write() {
            *state = Default::default();
        }
    }
}

fn build_info(state: &RegistryState, definition: &'static ModelDef) -> Result<ModelInfo> {
    let Some(pk_def) = definition.primary_key() else {
        return Err(OrmError::config(format!(
            "Model `{}` has no primary key: mark a field with `primary_key` or add an integer `id`",
            definition.name
        )));
    };
    let explicit = definition.fields.iter().filter(|f| f.primary_key).count();
    if explicit > 1 {
        return Err(OrmError::config(format!(
            "Model `{}` declares {} primary keys, exactly one is allowed",
            definition.name, explicit
        )));
    }
    let mut fields = Vec::with_capacity(definition.fields.len());
    let mut by_column = HashMap::new();
    let mut by_name = HashMap::new();
    let mut primary_key = 0;
    for (i, def) in definition.fields.iter().enumerate() {
        let is_pk = std::ptr::eq(def, pk_def);
        if by_name.insert(def.name, i).is_some() {
            return Err(OrmError::config(format!(
                "Model `{}` declares the field `{}` twice",
                definition.name, def.name
            )));
        }
        if def.is_column() && by_column.insert(def.column, i).is_some() {
            return Err(OrmError::config(format!(
                "Model `{}` declares the column `{}` twice",
                definition.name, def.column
            )));
        }
        let mut related = None;
        let mut related_pk_type = None;
        if def.field_type.is_relation() || def.field_type.is_reverse() {
            let Some(target) = def.related else {
                return Err(OrmError::config(format!(
                    "Relation field `{}` of model `{}` does not name the related model",
                    def.name, definition.name
                )));
            };
            let target = target();
            related = Some(target.name);
            if def.field_type.is_relation() {
                related_pk_type = Some(if target.name == definition.name {
                    pk_def.field_type
                } else {
                    state
                        .models
                        .get(target.name)
                        .map(|m| m.primary_key().field_type)
                        .ok_or_else(|| {
                            OrmError::config(format!(
                                "Relation field `{}` of model `{}` references the unregistered model `{}`",
                                def.name, definition.name, target.name
                            ))
                        })?
                });
            }
        }
        if is_pk {
            primary_key = i;
        }
        fields.push(FieldInfo::resolve(def, is_pk, related, related_pk_type));
    }
    let pk = &fields[primary_key];
    if pk.is_reverse() || pk.nullable {
        return Err(OrmError::config(format!(
            "The primary key `{}` of model `{}` must be a non nullable column",
            pk.name, definition.name
        )));
    }
    let columns = fields
        .iter()
        .filter(|f| f.is_column())
        .map(|f| f.column)
        .collect();
    let relations = fields
        .iter()
        .enumerate()
        .filter(|(_, f)| f.is_relation())
        .map(|(i, _)| i)
        .collect();
    let reverse = fields
        .iter()
        .enumerate()
        .filter(|(_, f)| f.is_reverse())
        .map(|(i, _)| i)
        .collect();
    Ok(ModelInfo {
        name: definition.name,
        table: definition.table,
        fields: fields.into_boxed_slice(),
        primary_key,
        by_column,
        by_name,
        columns,
        relations,
        reverse,
    })
}

impl FieldInfo {
    fn resolve(
        def: &crate::FieldDef,
        primary_key: bool,
        related: Option<&'static str>,
        related_pk_type: Option<FieldType>,
    ) -> Self {
        let inferred = primary_key && !def.primary_key;
        Self {
            name: def.name,
            column: def.column,
            field_type: def.field_type,
            nullable: def.nullable,
            primary_key,
            auto_increment: def.auto_increment || inferred,
            auto_now: def.auto_now,
            auto_now_add: def.auto_now_add,
            default: def.default,
            on_delete: def.on_delete,
            related,
            related_pk_type,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FieldDef, FieldType};

    static PARENT: ModelDef = ModelDef {
        name: "tests::Parent",
        table: "parent",
        fields: &[
            FieldDef::new("id", FieldType::Int64),
            FieldDef::new("name", FieldType::VarChar),
        ],
    };

    fn parent() -> &'static ModelDef {
        &PARENT
    }

    static CHILD: ModelDef = ModelDef {
        name: "tests::Child",
        table: "child",
        fields: &[
            FieldDef {
                primary_key: true,
                auto_increment: true,
                ..FieldDef::new("id", FieldType::Int32)
            },
            FieldDef {
                column: "parent_id",
                nullable: true,
                related: Some(parent),
                on_delete: Action::SetNull,
                ..FieldDef::new("parent", FieldType::ForeignKey)
            },
        ],
    };

    static NO_PK: ModelDef = ModelDef {
        name: "tests::NoPk",
        table: "no_pk",
        fields: &[FieldDef::new("name", FieldType::VarChar)],
    };

    static DUPLICATE: ModelDef = ModelDef {
        name: "tests::Duplicate",
        table: "duplicate",
        fields: &[
            FieldDef::new("id", FieldType::Int64),
            FieldDef {
                column: "id",
                ..FieldDef::new("other", FieldType::Int64)
            },
        ],
    };

    #[test]
    fn lookups_match_columns() {
        let registry = Registry::new();
        let info = registry.register_definition(&PARENT, false).unwrap();
        for column in info.columns() {
            assert_eq!(info.get_by_column(column).unwrap().column, *column);
        }
        let pk = info.primary_key();
        assert_eq!(pk.name, "id");
        assert!(pk.auto_increment);
        assert_eq!(info.get_by_any("pk").unwrap().name, "id");
    }

    #[test]
    fn registration_is_idempotent() {
        let registry = Registry::new();
        let first = registry.register_definition(&PARENT, false).unwrap();
        let second = registry.register_definition(&PARENT, false).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        let forced = registry.register_definition(&PARENT, true).unwrap();
        assert!(!Arc::ptr_eq(&first, &forced));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn configuration_errors() {
        let registry = Registry::new();
        let error = registry.register_definition(&CHILD, false).unwrap_err();
        assert_eq!(OrmError::kind_of(&error), crate::ErrorKind::Config);
        assert!(format!("{error}").contains("unregistered model `tests::Parent`"));
        assert!(registry.register_definition(&NO_PK, false).is_err());
        assert!(registry.register_definition(&DUPLICATE, false).is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn relations_record_dependents() {
        let registry = Registry::new();
        registry.register_definition(&PARENT, false).unwrap();
        let child = registry.register_definition(&CHILD, false).unwrap();
        assert_eq!(
            child.get_by_name("parent").unwrap().storage_type(),
            FieldType::Int64
        );
        let dependents = registry.dependents("tests::Parent");
        assert_eq!(dependents.len(), 1);
        assert_eq!(dependents[0].column, "parent_id");
        assert_eq!(dependents[0].on_delete, Action::SetNull);
        registry.register_definition(&CHILD, true).unwrap();
        assert_eq!(registry.dependents("tests::Parent").len(), 1);
    }
}
