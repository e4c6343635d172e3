use crate::{
    ClauseKind, Condition, FieldInfo, FindSpec, Leaf, Limit, ModelInfo, Operator, OrmError,
    Params, QuerySpec, Registry, Result, Update, UpdateOperator, Value, document::value_to_bson,
    marshal::to_param,
};
use bson::{Bson, Document, doc};
use time::UtcOffset;

/// Document key of the primary key.
pub const ID_KEY: &str = "_id";

pub fn document_key(field: &FieldInfo) -> &'static str {
    if field.primary_key { ID_KEY } else { field.column }
}

fn usage(message: String) -> crate::Error {
    let error = OrmError::usage(message);
    log::error!("{:#}", error);
    error
}

/// Escape the characters `$regex` gives a meaning to.
pub fn escape_regex(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 4);
    for c in text.chars() {
        if matches!(
            c,
            '\\' | '.' | '+' | '*' | '?' | '(' | ')' | '|' | '[' | ']' | '{' | '}' | '^' | '$'
        ) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Compiles conditions, orderings and update parameters of one model to bson documents.
///
/// Paths cannot cross relations: a document store has no joins. The only multi segment path
/// accepted is `relation__pk`, the key stored in the relation field itself.
pub struct DocumentCompiler<'a> {
    registry: &'a Registry,
    info: &'a ModelInfo,
    tz: UtcOffset,
}

impl<'a> DocumentCompiler<'a> {
    pub fn new(registry: &'a Registry, info: &'a ModelInfo, tz: UtcOffset) -> Self {
        Self { registry, info, tz }
    }

    pub fn resolve(&self, path: &[String]) -> Result<&'a FieldInfo> {
        let info = self.info;
        let Some(field) = path.first().and_then(|v| info.get_by_any(v)) else {
            return Err(usage(format!(
                "Unknown field `{}` of model `{}`",
                path.join("__"),
                info.name
            )));
        };
        match path.len() {
            1 if field.is_column() => Ok(field),
            2 if field.is_relation() => {
                let related = self.registry.model_named(field.related.unwrap_or_default())?;
                let pk = related.primary_key();
                let next = path[1].as_str();
                if next == "pk" || next == pk.name || next == pk.column {
                    Ok(field)
                } else {
                    Err(usage(format!(
                        "Document filters cannot cross the relation `{}`",
                        path.join("__")
                    )))
                }
            }
            _ => Err(usage(format!(
                "Document filters cannot cross the relation `{}`",
                path.join("__")
            ))),
        }
    }

    fn bson(&self, field: &FieldInfo, value: &Value) -> Result<Bson> {
        value_to_bson(to_param(field, value.clone(), self.tz)?, self.tz)
    }

    /// Filter document of `cond`. AND binds tighter than OR, as in SQL.
    pub fn filter(&self, cond: &Condition) -> Result<Document> {
        let mut alternatives: Vec<Vec<Document>> = Vec::new();
        for (i, clause) in cond.clauses().iter().enumerate() {
            let mut term = match &clause.kind {
                ClauseKind::Leaf(leaf) => self.leaf(leaf)?,
                ClauseKind::Group(group) => self.filter(group)?,
            };
            if clause.negated {
                term = doc! { "$nor": [term] };
            }
            match alternatives.last_mut() {
                Some(terms) if i == 0 || !clause.or => terms.push(term),
                _ => alternatives.push(vec![term]),
            }
        }
        let mut alternatives = alternatives
            .into_iter()
            .map(|mut terms| {
                if terms.len() == 1 {
                    terms.remove(0)
                } else {
                    doc! { "$and": terms }
                }
            })
            .collect::<Vec<_>>();
        Ok(match alternatives.len() {
            0 => Document::new(),
            1 => alternatives.remove(0),
            _ => doc! { "$or": alternatives },
        })
    }

    fn leaf(&self, leaf: &Leaf) -> Result<Document> {
        leaf.operator.check_arity(&leaf.values)?;
        let field = self.resolve(&leaf.path)?;
        let key = document_key(field);
        if leaf.operator == Operator::IsNull {
            return Ok(if matches!(leaf.values[0], Value::Boolean(Some(true))) {
                doc! { key: Bson::Null }
            } else {
                doc! { key: { "$ne": Bson::Null } }
            });
        }
        let value = self.bson(field, &leaf.values[0])?;
        let text = || match leaf.values[0].as_str() {
            Some(v) => escape_regex(v),
            None => escape_regex(&leaf.values[0].to_string()),
        };
        let pattern = |regex: String| {
            if leaf.operator.is_case_insensitive() {
                doc! { key: { "$regex": regex, "$options": "i" } }
            } else {
                doc! { key: { "$regex": regex } }
            }
        };
        Ok(match leaf.operator {
            Operator::Exact | Operator::Eq => doc! { key: value },
            Operator::Ne => doc! { key: { "$ne": value } },
            Operator::Gt => doc! { key: { "$gt": value } },
            Operator::Gte => doc! { key: { "$gte": value } },
            Operator::Lt => doc! { key: { "$lt": value } },
            Operator::Lte => doc! { key: { "$lte": value } },
            Operator::IExact => pattern(format!("^{}$", text())),
            Operator::Contains | Operator::IContains => pattern(text()),
            Operator::StartsWith | Operator::IStartsWith => pattern(format!("^{}", text())),
            Operator::EndsWith | Operator::IEndsWith => pattern(format!("{}$", text())),
            Operator::Regex => doc! { key: { "$regex": value } },
            Operator::In => {
                let values = leaf
                    .values
                    .iter()
                    .map(|v| self.bson(field, v))
                    .collect::<Result<Vec<_>>>()?;
                doc! { key: { "$in": values } }
            }
            Operator::Between => {
                let upper = self.bson(field, &leaf.values[1])?;
                doc! { key: { "$gte": value, "$lte": upper } }
            }
            Operator::IsNull => Document::new(),
        })
    }

    /// `{key: 1 | -1}` in the given order, a leading `-` sorts descending.
    pub fn sort(&self, orders: &[String]) -> Result<Option<Document>> {
        if orders.is_empty() {
            return Ok(None);
        }
        let mut sort = Document::new();
        for order in orders {
            let (name, direction) = match order.strip_prefix('-') {
                Some(name) => (name, -1),
                None => (order.as_str(), 1),
            };
            let path = name.split("__").map(String::from).collect::<Vec<_>>();
            sort.insert(document_key(self.resolve(&path)?), direction);
        }
        Ok(Some(sort))
    }

    pub fn projection(&self, fields: &[&FieldInfo]) -> Document {
        let mut projection = Document::new();
        for field in fields {
            projection.insert(document_key(field), 1);
        }
        if !fields.iter().any(|f| f.primary_key) {
            projection.insert(ID_KEY, 0);
        }
        projection
    }

    /// Cursor options of `spec`. Grouping and eager loading have no document equivalent.
    pub fn find_spec(&self, spec: &QuerySpec) -> Result<FindSpec> {
        if !spec.groups.is_empty() || spec.distinct {
            return Err(usage(format!(
                "Grouped and distinct queries of `{}` need a SQL backend",
                self.info.name
            )));
        }
        if !spec.related.is_empty() || spec.rel_depth > 0 {
            return Err(usage(format!(
                "Eager loading the relations of `{}` needs a SQL backend",
                self.info.name
            )));
        }
        Ok(FindSpec {
            sort: self.sort(&spec.orders)?,
            skip: (spec.offset > 0).then_some(spec.offset),
            limit: match spec.limit {
                Some(Limit::Rows(rows)) => Some(i64::try_from(rows).unwrap_or(i64::MAX)),
                _ => None,
            },
            projection: None,
        })
    }

    /// Update document of `params`. Assignments go under the tag of `operator`, arithmetic
    /// goes under `$inc` and `$mul`.
    pub fn update(&self, operator: UpdateOperator, params: &Params) -> Result<Document> {
        if params.is_empty() {
            return Err(usage(format!("Update of `{}` without values", self.info.name)));
        }
        let mut update = Document::new();
        for (name, param) in params.iter() {
            let field = self.resolve(&[name.to_string()])?;
            let key = document_key(field);
            let value = self.bson(field, param.value())?;
            let (tag, value) = match param {
                Update::Set(..) if operator == UpdateOperator::Unset => (operator.tag(), Bson::String("".into())),
                Update::Set(..) => (operator.tag(), value),
                Update::Add(..) => ("$inc", value),
                Update::Subtract(..) => ("$inc", negated(name, value)?),
                Update::Multiply(..) => ("$mul", value),
                Update::Divide(..) => {
                    return Err(usage(format!(
                        "Document updates cannot divide `{}`, there is no division operator",
                        name
                    )));
                }
            };
            match update.get_mut(tag) {
                Some(Bson::Document(section)) => {
                    section.insert(key, value);
                }
                _ => {
                    update.insert(tag, doc! { key: value });
                }
            }
        }
        Ok(update)
    }
}

fn negated(name: &str, value: Bson) -> Result<Bson> {
    Ok(match value {
        Bson::Int32(v) => Bson::Int32(-v),
        Bson::Int64(v) => Bson::Int64(-v),
        Bson::Double(v) => Bson::Double(-v),
        v => {
            return Err(usage(format!(
                "Cannot subtract the non numeric value {} from `{}`",
                v, name
            )));
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FieldDef, FieldType, ModelDef};

    static PET: ModelDef = ModelDef {
        name: "tests::Pet",
        table: "pet",
        fields: &[
            FieldDef {
                primary_key: true,
                ..FieldDef::new("id", FieldType::VarChar)
            },
            FieldDef::new("name", FieldType::VarChar),
            FieldDef::new("age", FieldType::Int32),
            FieldDef {
                nullable: true,
                ..FieldDef::new("owner", FieldType::VarChar)
            },
        ],
    };

    fn compile(cond: &Condition) -> Document {
        let registry = Registry::new();
        let info = registry.register_definition(&PET, false).unwrap();
        let compiler = DocumentCompiler::new(&registry, &info, UtcOffset::UTC);
        compiler.filter(cond).unwrap()
    }

    #[test]
    fn leaves() {
        let cond = Condition::new()
            .and("name__icontains", ["c.t"])
            .unwrap()
            .and("age__between", [1, 5])
            .unwrap()
            .and("owner__isnull", [false])
            .unwrap();
        assert_eq!(
            compile(&cond),
            doc! {
                "$and": [
                    { "name": { "$regex": "c\\.t", "$options": "i" } },
                    { "age": { "$gte": 1, "$lte": 5 } },
                    { "owner": { "$ne": null } },
                ]
            }
        );
        let cond = Condition::new().and("pk__in", ["a", "b"]).unwrap();
        assert_eq!(compile(&cond), doc! { "_id": { "$in": ["a", "b"] } });
    }

    #[test]
    fn and_binds_tighter_than_or() {
        let cond = Condition::new()
            .and("name", ["cat"])
            .unwrap()
            .and("age__gt", [2])
            .unwrap()
            .or_not("name__startswith", ["d"])
            .unwrap();
        assert_eq!(
            compile(&cond),
            doc! {
                "$or": [
                    { "$and": [{ "name": "cat" }, { "age": { "$gt": 2 } }] },
                    { "$nor": [{ "name": { "$regex": "^d" } }] },
                ]
            }
        );
        assert_eq!(compile(&Condition::new()), Document::new());
    }

    #[test]
    fn updates() {
        let registry = Registry::new();
        let info = registry.register_definition(&PET, false).unwrap();
        let compiler = DocumentCompiler::new(&registry, &info, UtcOffset::UTC);
        let params = Params::new()
            .set("name", "rex")
            .add("age", 2)
            .subtract("age", 1);
        assert_eq!(
            compiler.update(UpdateOperator::Set, &params).unwrap(),
            doc! { "$set": { "name": "rex" }, "$inc": { "age": -1 } }
        );
        let params = Params::new().set("owner", Value::Null);
        assert_eq!(
            compiler.update(UpdateOperator::Unset, &params).unwrap(),
            doc! { "$unset": { "owner": "" } }
        );
        let params = Params::new().divide("age", 2);
        assert!(compiler.update(UpdateOperator::Set, &params).is_err());
    }
}
