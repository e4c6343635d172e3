use crate::{OrmError, Result, Value};
use std::fmt::{self, Debug};

/// Semantic type of a field, drives the marshaler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    Boolean,
    Char,
    VarChar,
    Text,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    Decimal,
    Date,
    Time,
    DateTime,
    Json,
    Blob,
    /// Column holding the primary key of another model.
    ForeignKey,
    OneToOne,
    /// Not a column: the other side of a foreign key or one to one declared elsewhere.
    ReverseOne,
    ReverseMany,
}

impl FieldType {
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            FieldType::Int8
                | FieldType::Int16
                | FieldType::Int32
                | FieldType::Int64
                | FieldType::UInt8
                | FieldType::UInt16
                | FieldType::UInt32
                | FieldType::UInt64
        )
    }
    pub fn is_unsigned(&self) -> bool {
        matches!(
            self,
            FieldType::UInt8 | FieldType::UInt16 | FieldType::UInt32 | FieldType::UInt64
        )
    }
    pub fn is_string(&self) -> bool {
        matches!(self, FieldType::Char | FieldType::VarChar | FieldType::Text)
    }
    pub fn is_float(&self) -> bool {
        matches!(
            self,
            FieldType::Float32 | FieldType::Float64 | FieldType::Decimal
        )
    }
    pub fn is_time(&self) -> bool {
        matches!(
            self,
            FieldType::Date | FieldType::Time | FieldType::DateTime
        )
    }
    /// Forward relation, stored as a column.
    pub fn is_relation(&self) -> bool {
        matches!(self, FieldType::ForeignKey | FieldType::OneToOne)
    }
    pub fn is_reverse(&self) -> bool {
        matches!(self, FieldType::ReverseOne | FieldType::ReverseMany)
    }
}

/// Policy applied to dependent rows when the referenced row is deleted.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    #[default]
    NoAction,
    Cascade,
    SetNull,
    SetDefault,
}

/// Static description of a related model, taken by function pointer so that definitions can
/// reference each other (and themselves) from `static` initializers.
pub type ModelDefFn = fn() -> &'static ModelDef;

/// Field description as written by `#[derive(Model)]`, before registration resolves it.
#[derive(Clone, Copy)]
pub struct FieldDef {
    /// Rust field name.
    pub name: &'static str,
    /// Column (or document key) name.
    pub column: &'static str,
    pub field_type: FieldType,
    pub nullable: bool,
    pub primary_key: bool,
    pub auto_increment: bool,
    pub auto_now: bool,
    pub auto_now_add: bool,
    /// Literal used by `set_default` cascades and empty json values.
    pub default: Option<&'static str>,
    pub related: Option<ModelDefFn>,
    pub on_delete: Action,
}

impl FieldDef {
    /// A plain column field, the starting point for hand written definitions.
    pub const fn new(name: &'static str, field_type: FieldType) -> Self {
        Self {
            name,
            column: name,
            field_type,
            nullable: false,
            primary_key: false,
            auto_increment: false,
            auto_now: false,
            auto_now_add: false,
            default: None,
            related: None,
            on_delete: Action::NoAction,
        }
    }
    pub fn is_column(&self) -> bool {
        !self.field_type.is_reverse()
    }
}

impl Debug for FieldDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDef")
            .field("name", &self.name)
            .field("column", &self.column)
            .field("field_type", &self.field_type)
            .field("nullable", &self.nullable)
            .field("primary_key", &self.primary_key)
            .field("related", &self.related.map(|v| v().name))
            .finish_non_exhaustive()
    }
}

/// Model description as written by `#[derive(Model)]`.
#[derive(Debug)]
pub struct ModelDef {
    /// Fully qualified name: `module::path::Type`.
    pub name: &'static str,
    pub table: &'static str,
    pub fields: &'static [FieldDef],
}

impl ModelDef {
    /// The explicit primary key or, missing that, an integer field called `id`.
    pub fn primary_key(&self) -> Option<&'static FieldDef> {
        let explicit = self.fields.iter().find(|f| f.primary_key);
        explicit.or_else(|| {
            self.fields
                .iter()
                .find(|f| f.name == "id" && f.field_type.is_integer())
        })
    }
}

/// Field level access to a record, generated by `#[derive(Model)]`.
///
/// This is the accessor table the core works through: values are read and written by field
/// name so that the same code paths serve every model.
pub trait Record: Send + Sync {
    fn model_def(&self) -> &'static ModelDef;

    /// Current value of a column field; for relations, the primary key of the related record.
    fn get_value(&self, field: &str) -> Result<Value>;

    /// Assign a column field. For relations a lazy reference is created holding `value` as key.
    fn set_value(&mut self, field: &str, value: Value) -> Result<()>;

    /// The related record of a relation field, if one is present.
    fn related(&self, field: &str) -> Option<&dyn Record>;

    /// The related record of a relation field, creating an empty one when absent.
    fn related_mut(&mut self, field: &str) -> Option<&mut dyn Record>;

    fn primary_key_value(&self) -> Result<Value> {
        let definition = self.model_def();
        let Some(pk) = definition.primary_key() else {
            return Err(OrmError::config(format!(
                "Model `{}` has no primary key",
                definition.name
            )));
        };
        self.get_value(pk.name)
    }

    fn set_primary_key(&mut self, value: Value) -> Result<()> {
        let definition = self.model_def();
        let Some(pk) = definition.primary_key() else {
            return Err(OrmError::config(format!(
                "Model `{}` has no primary key",
                definition.name
            )));
        };
        self.set_value(pk.name, value)
    }
}

/// A struct mapped to a table or collection.
pub trait Model: Record + Clone + Sized + 'static {
    fn definition() -> &'static ModelDef;

    /// A new record where every field holds its zero value and relations are unset.
    fn zeroed() -> Self;
}

/// Used by generated code to report a field name that does not exist.
pub fn unknown_field_error(model: &str, field: &str) -> crate::Error {
    OrmError::usage(format!("Unknown field `{}` on model `{}`", field, model))
}
