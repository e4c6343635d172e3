use crate::{OrmError, Result, Value};
use std::fmt::{self, Display};

/// Separator between the segments of a field path and before the operator suffix.
pub const EXPR_SEP: &str = "__";

/// The fixed operator vocabulary of condition leaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Exact,
    IExact,
    Contains,
    IContains,
    Gt,
    Gte,
    Lt,
    Lte,
    Eq,
    Ne,
    StartsWith,
    EndsWith,
    IStartsWith,
    IEndsWith,
    In,
    Between,
    IsNull,
    Regex,
}

impl Operator {
    pub fn from_name(name: &str) -> Option<Operator> {
        Some(match name {
            "exact" => Operator::Exact,
            "iexact" => Operator::IExact,
            "contains" => Operator::Contains,
            "icontains" => Operator::IContains,
            "gt" => Operator::Gt,
            "gte" => Operator::Gte,
            "lt" => Operator::Lt,
            "lte" => Operator::Lte,
            "eq" => Operator::Eq,
            "ne" | "nq" => Operator::Ne,
            "startswith" => Operator::StartsWith,
            "endswith" => Operator::EndsWith,
            "istartswith" => Operator::IStartsWith,
            "iendswith" => Operator::IEndsWith,
            "in" => Operator::In,
            "between" => Operator::Between,
            "isnull" => Operator::IsNull,
            "regex" => Operator::Regex,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Operator::Exact => "exact",
            Operator::IExact => "iexact",
            Operator::Contains => "contains",
            Operator::IContains => "icontains",
            Operator::Gt => "gt",
            Operator::Gte => "gte",
            Operator::Lt => "lt",
            Operator::Lte => "lte",
            Operator::Eq => "eq",
            Operator::Ne => "ne",
            Operator::StartsWith => "startswith",
            Operator::EndsWith => "endswith",
            Operator::IStartsWith => "istartswith",
            Operator::IEndsWith => "iendswith",
            Operator::In => "in",
            Operator::Between => "between",
            Operator::IsNull => "isnull",
            Operator::Regex => "regex",
        }
    }

    /// Operators compiled to a LIKE pattern, the argument gets wildcards around it.
    pub fn is_like(&self) -> bool {
        matches!(
            self,
            Operator::IExact
                | Operator::Contains
                | Operator::IContains
                | Operator::StartsWith
                | Operator::EndsWith
                | Operator::IStartsWith
                | Operator::IEndsWith
        )
    }

    pub fn is_case_insensitive(&self) -> bool {
        matches!(
            self,
            Operator::IExact | Operator::IContains | Operator::IStartsWith | Operator::IEndsWith
        )
    }

    /// Validate the values of a leaf using this operator.
    pub fn check_arity(&self, values: &[Value]) -> Result<()> {
        let error = |expected: &str| {
            let error = OrmError::usage(format!(
                "Operator `{}` needs {} but got {}",
                self.name(),
                expected,
                values.len()
            ));
            log::error!("{:#}", error);
            Err(error)
        };
        match self {
            Operator::Between if values.len() != 2 => error("exactly 2 values"),
            Operator::In if values.is_empty() => error("at least 1 value"),
            Operator::IsNull if values.len() != 1 => error("exactly 1 boolean value"),
            Operator::IsNull if !matches!(values[0], Value::Boolean(Some(..))) => {
                let error = OrmError::usage(format!(
                    "Operator `isnull` needs a boolean value, not {}",
                    values[0]
                ));
                log::error!("{:#}", error);
                Err(error)
            }
            Operator::Between | Operator::In | Operator::IsNull => Ok(()),
            _ if values.len() != 1 => error("exactly 1 value"),
            _ => Ok(()),
        }
    }
}

impl Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Split `path__operator` into the field path segments and the operator (`exact` when absent).
pub fn split_path(expr: &str) -> (Vec<String>, Operator) {
    let mut segments = expr
        .split(EXPR_SEP)
        .map(ToString::to_string)
        .collect::<Vec<_>>();
    if segments.len() > 1 {
        if let Some(operator) = segments.last().and_then(|v| Operator::from_name(v)) {
            segments.pop();
            return (segments, operator);
        }
    }
    (segments, Operator::Exact)
}

/// A single filter on a field path.
#[derive(Debug, Clone, PartialEq)]
pub struct Leaf {
    pub path: Vec<String>,
    pub operator: Operator,
    pub values: Vec<Value>,
}

impl Leaf {
    pub fn path_str(&self) -> String {
        self.path.join(EXPR_SEP)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClauseKind {
    Leaf(Leaf),
    Group(Condition),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
    pub kind: ClauseKind,
    /// Joined to the previous clause with OR instead of AND. Ignored on the first clause.
    pub or: bool,
    pub negated: bool,
}

/// Ordered AND/OR composition of filter leaves and nested conditions.
///
/// Builder methods take `&self` and return an extended copy so a shared prefix can be reused:
///
/// ```
/// use orca_core::Condition;
/// let base = Condition::new().and("active", [true]).unwrap();
/// let cats = base.and("name__contains", ["cat"]).unwrap();
/// let dogs = base.and_not("name__startswith", ["dog"]).unwrap();
/// assert_eq!(base.len(), 1);
/// assert_eq!(cats.len(), 2);
/// assert_eq!(dogs.len(), 2);
/// ```
#[derive(Default, Debug, Clone, PartialEq)]
pub struct Condition {
    clauses: Vec<Clause>,
}

impl Condition {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn len(&self) -> usize {
        self.clauses.len()
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    fn push_leaf<I, V>(&self, expr: &str, values: I, or: bool, negated: bool) -> Result<Self>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let (path, operator) = split_path(expr);
        if path.iter().any(String::is_empty) {
            let error = OrmError::usage(format!("Malformed field path `{}`", expr));
            log::error!("{:#}", error);
            return Err(error);
        }
        let values = values.into_iter().map(Into::into).collect::<Vec<_>>();
        operator.check_arity(&values)?;
        let mut result = self.clone();
        result.clauses.push(Clause {
            kind: ClauseKind::Leaf(Leaf {
                path,
                operator,
                values,
            }),
            or,
            negated,
        });
        Ok(result)
    }

    fn push_group(&self, condition: &Condition, or: bool, negated: bool) -> Result<Self> {
        if condition.is_empty() {
            let error = OrmError::usage("Cannot nest an empty condition");
            log::error!("{:#}", error);
            return Err(error);
        }
        let mut result = self.clone();
        result.clauses.push(Clause {
            kind: ClauseKind::Group(condition.clone()),
            or,
            negated,
        });
        Ok(result)
    }

    pub fn and<I, V>(&self, expr: &str, values: I) -> Result<Self>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.push_leaf(expr, values, false, false)
    }

    pub fn and_not<I, V>(&self, expr: &str, values: I) -> Result<Self>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.push_leaf(expr, values, false, true)
    }

    pub fn or<I, V>(&self, expr: &str, values: I) -> Result<Self>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.push_leaf(expr, values, true, false)
    }

    pub fn or_not<I, V>(&self, expr: &str, values: I) -> Result<Self>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.push_leaf(expr, values, true, true)
    }

    pub fn and_cond(&self, condition: &Condition) -> Result<Self> {
        self.push_group(condition, false, false)
    }

    pub fn and_not_cond(&self, condition: &Condition) -> Result<Self> {
        self.push_group(condition, false, true)
    }

    pub fn or_cond(&self, condition: &Condition) -> Result<Self> {
        self.push_group(condition, true, false)
    }

    pub fn or_not_cond(&self, condition: &Condition) -> Result<Self> {
        self.push_group(condition, true, true)
    }

    /// Every leaf, depth first and left to right.
    pub fn leaves(&self) -> Vec<&Leaf> {
        let mut result = Vec::new();
        fn visit<'a>(condition: &'a Condition, out: &mut Vec<&'a Leaf>) {
            for clause in &condition.clauses {
                match &clause.kind {
                    ClauseKind::Leaf(leaf) => out.push(leaf),
                    ClauseKind::Group(group) => visit(group, out),
                }
            }
        }
        visit(self, &mut result);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn operator_suffix() {
        assert_eq!(
            split_path("parent__name__icontains"),
            (vec!["parent".into(), "name".into()], Operator::IContains)
        );
        assert_eq!(split_path("name"), (vec!["name".into()], Operator::Exact));
        assert_eq!(split_path("in"), (vec!["in".into()], Operator::Exact));
        assert_eq!(
            split_path("profile__age__nq"),
            (vec!["profile".into(), "age".into()], Operator::Ne)
        );
    }

    #[test]
    fn arity() {
        let condition = Condition::new();
        assert!(condition.and("age__between", [18, 30]).is_ok());
        let error = condition.and("age__between", [18]).unwrap_err();
        assert_eq!(OrmError::kind_of(&error), ErrorKind::Usage);
        assert!(error.to_string().contains("`between` needs exactly 2 values"));
        assert!(condition.and("id__in", Vec::<i32>::new()).is_err());
        assert!(condition.and("id__in", [1, 2, 3]).is_ok());
        assert!(condition.and("name__isnull", [true]).is_ok());
        assert!(condition.and("name__isnull", ["yes"]).is_err());
        assert!(condition.and("name", ["a", "b"]).is_err());
    }

    #[test]
    fn shared_prefix_is_untouched() {
        let base = Condition::new().and("a", [1]).unwrap();
        let extended = base
            .or_cond(&Condition::new().and("b", [2]).unwrap().or("c", [3]).unwrap())
            .unwrap();
        assert_eq!(base.len(), 1);
        assert_eq!(extended.len(), 2);
        assert_eq!(extended.leaves().len(), 3);
        assert!(extended.clauses()[1].or);
        assert!(Condition::new().and_cond(&Condition::new()).is_err());
    }
}
