use crate::Value;

/// The value a batch update assigns to a column.
#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    Set(Value),
    /// `column = column + value`
    Add(Value),
    Subtract(Value),
    Multiply(Value),
    Divide(Value),
}

impl Update {
    pub fn value(&self) -> &Value {
        match self {
            Update::Set(v)
            | Update::Add(v)
            | Update::Subtract(v)
            | Update::Multiply(v)
            | Update::Divide(v) => v,
        }
    }

    /// SQL operator applied to the current column value, `None` for plain assignment.
    pub fn arithmetic(&self) -> Option<char> {
        match self {
            Update::Set(..) => None,
            Update::Add(..) => Some('+'),
            Update::Subtract(..) => Some('-'),
            Update::Multiply(..) => Some('*'),
            Update::Divide(..) => Some('/'),
        }
    }
}

/// How a document update applies its parameters. SQL backends always assign.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOperator {
    /// `$set`: replace the listed keys.
    #[default]
    Set,
    /// `$unset`: remove the listed keys.
    Unset,
    /// `$setOnInsert`
    SetOnInsert,
}

impl UpdateOperator {
    pub fn tag(&self) -> &'static str {
        match self {
            UpdateOperator::Set => "$set",
            UpdateOperator::Unset => "$unset",
            UpdateOperator::SetOnInsert => "$setOnInsert",
        }
    }
}

/// Ordered field to update list of a batch update.
///
/// ```
/// use orca_core::Params;
/// let params = Params::new().set("name", "renamed").add("visits", 1);
/// assert_eq!(params.len(), 2);
/// ```
#[derive(Default, Debug, Clone, PartialEq)]
pub struct Params(Vec<(String, Update)>);

impl Params {
    pub fn new() -> Self {
        Default::default()
    }
    pub fn with(mut self, field: impl Into<String>, update: Update) -> Self {
        self.0.push((field.into(), update));
        self
    }
    pub fn set(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(field, Update::Set(value.into()))
    }
    pub fn add(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(field, Update::Add(value.into()))
    }
    pub fn subtract(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(field, Update::Subtract(value.into()))
    }
    pub fn multiply(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(field, Update::Multiply(value.into()))
    }
    pub fn divide(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(field, Update::Divide(value.into()))
    }
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Update)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
    pub fn len(&self) -> usize {
        self.0.len()
    }
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
