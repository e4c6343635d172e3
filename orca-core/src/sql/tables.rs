use crate::{
    ClauseKind, Condition, Dialect, EXPR_SEP, FieldInfo, Leaf, Limit, ModelInfo, Operator,
    OrmError, Registry, Result, SqlWriter, Value, marshal::to_param, separated_by,
};
use super::sql_writer::write_integer;
use std::sync::Arc;
use time::UtcOffset;

pub const BASE_ALIAS: &str = "T0";

/// A table joined while compiling one statement.
#[derive(Debug, Clone)]
pub struct JoinTable {
    /// `T1`, `T2`, ... in creation order.
    pub alias: String,
    /// Field names walked from the base model to reach this table.
    pub path: Vec<String>,
    pub model: Arc<ModelInfo>,
    pub parent_alias: String,
    /// Column of the parent table in the ON clause.
    pub parent_column: &'static str,
    /// Column of this table in the ON clause.
    pub column: &'static str,
    pub inner: bool,
    /// The columns of this table are part of the SELECT list (eager load).
    pub selected: bool,
}

/// Join alias table of a single compilation: `T0` is the base model, every relation hop walked
/// by a related path, a filter, a grouping or an ordering gets the next alias.
pub struct Tables<'a> {
    registry: &'a Registry,
    dialect: Dialect,
    tz: UtcOffset,
    base: Arc<ModelInfo>,
    base_alias: &'static str,
    tables: Vec<JoinTable>,
}

impl<'a> Tables<'a> {
    pub fn new(registry: &'a Registry, dialect: Dialect, tz: UtcOffset, base: Arc<ModelInfo>) -> Self {
        Self {
            registry,
            dialect,
            tz,
            base,
            base_alias: BASE_ALIAS,
            tables: Vec::new(),
        }
    }

    /// Base table columns are written without alias, for single table statements.
    pub fn unaliased(mut self) -> Self {
        self.base_alias = "";
        self
    }

    pub fn base_alias(&self) -> &'static str {
        self.base_alias
    }

    pub fn base(&self) -> &Arc<ModelInfo> {
        &self.base
    }

    pub fn tables(&self) -> &[JoinTable] {
        &self.tables
    }

    /// Joined tables whose columns are selected, in the order their columns appear.
    pub fn selected(&self) -> impl Iterator<Item = &JoinTable> {
        self.tables.iter().filter(|t| t.selected)
    }

    fn related_model(&self, owner: &ModelInfo, field: &FieldInfo) -> Result<Arc<ModelInfo>> {
        let Some(name) = field.related else {
            let error = OrmError::usage(format!(
                "Field `{}` of model `{}` is not a relation",
                field.name, owner.name
            ));
            log::error!("{:#}", error);
            return Err(error);
        };
        self.registry.model_named(name)
    }

    /// Join the table reached from `parent_alias` through `field`, or reuse it when the same
    /// path was already joined.
    fn hop(
        &mut self,
        path: &[String],
        parent_alias: &str,
        parent: &ModelInfo,
        field: &FieldInfo,
        inner: bool,
        select: bool,
    ) -> Result<(String, Arc<ModelInfo>)> {
        if let Some(table) = self.tables.iter_mut().find(|t| t.path == path) {
            table.selected |= select;
            table.inner &= inner;
            return Ok((table.alias.clone(), table.model.clone()));
        }
        let model = self.related_model(parent, field)?;
        let (parent_column, column, inner) = if field.is_relation() {
            (field.column, model.primary_key().column, inner)
        } else {
            let Some(back) = model
                .relations()
                .find(|f| f.related == Some(parent.name))
            else {
                let error = OrmError::config(format!(
                    "Reverse field `{}` of model `{}`: model `{}` has no relation pointing back",
                    field.name, parent.name, model.name
                ));
                log::error!("{:#}", error);
                return Err(error);
            };
            (parent.primary_key().column, back.column, false)
        };
        let alias = format!("T{}", self.tables.len() + 1);
        self.tables.push(JoinTable {
            alias: alias.clone(),
            path: path.to_vec(),
            model: model.clone(),
            parent_alias: parent_alias.to_string(),
            parent_column,
            column,
            inner,
            selected: select,
        });
        Ok((alias, model))
    }

    /// Join and select the forward relations named by `related` (`a__b` paths), or all of
    /// them up to `depth` hops when no path is given.
    pub fn parse_related(&mut self, related: &[String], depth: usize) -> Result<()> {
        if related.is_empty() {
            let base = self.base.clone();
            return self.related_depth(Vec::new(), base, self.base_alias.into(), depth, true);
        }
        for expr in related {
            let names = expr.split(EXPR_SEP).map(String::from).collect::<Vec<_>>();
            let mut model = self.base.clone();
            let mut alias = self.base_alias.to_string();
            let mut inner = true;
            for i in 0..names.len() {
                let Some(field) = model
                    .get_by_name(&names[i])
                    .filter(|f| f.is_relation())
                    .cloned()
                else {
                    let error = OrmError::usage(format!(
                        "`{}` is not a relation path of model `{}`",
                        expr, self.base.name
                    ));
                    log::error!("{:#}", error);
                    return Err(error);
                };
                inner &= !field.nullable;
                (alias, model) = self.hop(&names[..=i], &alias, &model, &field, inner, true)?;
            }
        }
        Ok(())
    }

    fn related_depth(
        &mut self,
        prefix: Vec<String>,
        model: Arc<ModelInfo>,
        alias: String,
        depth: usize,
        inner: bool,
    ) -> Result<()> {
        if depth == 0 {
            return Ok(());
        }
        for field in model.relations() {
            let mut path = prefix.clone();
            path.push(field.name.to_string());
            let inner = inner && !field.nullable;
            let (next_alias, next) = self.hop(&path, &alias, &model, field, inner, true)?;
            self.related_depth(path, next, next_alias, depth - 1, inner)?;
        }
        Ok(())
    }

    /// Alias and field a filter, group or order path points to, joining what it crosses.
    ///
    /// A path ending on the key of a forward relation (`parent`, `parent__pk`,
    /// `parent__id`) stops at the foreign key column without joining.
    pub fn resolve(&mut self, path: &[String]) -> Result<(String, FieldInfo)> {
        let mut model = self.base.clone();
        let mut alias = self.base_alias.to_string();
        let mut inner = true;
        for (i, name) in path.iter().enumerate() {
            let Some(field) = model.get_by_any(name).cloned() else {
                let error = OrmError::usage(format!(
                    "Unknown field `{}` in `{}` of model `{}`",
                    name,
                    path.join(EXPR_SEP),
                    model.name
                ));
                log::error!("{:#}", error);
                return Err(error);
            };
            if i + 1 == path.len() {
                if field.is_reverse() {
                    let (alias, related) =
                        self.hop(path, &alias, &model, &field, false, false)?;
                    return Ok((alias, related.primary_key().clone()));
                }
                return Ok((alias, field));
            }
            if field.is_relation() && i + 2 == path.len() {
                let related = self.related_model(&model, &field)?;
                let pk = related.primary_key();
                let next = path[i + 1].as_str();
                if next == "pk" || next == pk.name || next == pk.column {
                    return Ok((alias, field));
                }
            }
            if !field.is_relation() && !field.is_reverse() {
                let error = OrmError::usage(format!(
                    "Field `{}` in `{}` is not a relation and cannot be traversed",
                    name,
                    path.join(EXPR_SEP)
                ));
                log::error!("{:#}", error);
                return Err(error);
            }
            inner &= field.is_relation() && !field.nullable;
            (alias, model) = self.hop(&path[..=i], &alias, &model, &field, inner, false)?;
        }
        let error = OrmError::usage("Empty field path");
        log::error!("{:#}", error);
        Err(error)
    }

    pub fn write_join(&self, out: &mut String) {
        for table in &self.tables {
            out.push_str(if table.inner {
                " INNER JOIN "
            } else {
                " LEFT OUTER JOIN "
            });
            self.dialect.write_identifier_quoted(out, table.model.table);
            out.push(' ');
            out.push_str(&table.alias);
            out.push_str(" ON ");
            self.dialect.write_column(out, &table.alias, table.column);
            out.push_str(" = ");
            self.dialect
                .write_column(out, &table.parent_alias, table.parent_column);
        }
    }

    /// ` WHERE ...` for a non empty condition, arguments are appended depth first.
    pub fn write_where(
        &mut self,
        out: &mut String,
        condition: &Condition,
        args: &mut Vec<Value>,
    ) -> Result<()> {
        if condition.is_empty() {
            return Ok(());
        }
        out.push_str(" WHERE ");
        self.write_condition(out, condition, args)
    }

    pub fn write_condition(
        &mut self,
        out: &mut String,
        condition: &Condition,
        args: &mut Vec<Value>,
    ) -> Result<()> {
        for (i, clause) in condition.clauses().iter().enumerate() {
            if i > 0 {
                out.push_str(if clause.or { " OR " } else { " AND " });
            }
            if clause.negated {
                out.push_str("NOT ");
            }
            match &clause.kind {
                ClauseKind::Leaf(leaf) => self.write_leaf(out, leaf, args)?,
                ClauseKind::Group(group) => {
                    out.push('(');
                    self.write_condition(out, group, args)?;
                    out.push(')');
                }
            }
        }
        Ok(())
    }

    fn write_leaf(&mut self, out: &mut String, leaf: &Leaf, args: &mut Vec<Value>) -> Result<()> {
        leaf.operator.check_arity(&leaf.values)?;
        let (alias, field) = self.resolve(&leaf.path)?;
        let mut column = String::new();
        self.dialect.write_column(&mut column, &alias, field.column);
        if leaf.operator == Operator::IsNull {
            out.push_str(&column);
            out.push_str(if matches!(leaf.values[0], Value::Boolean(Some(true))) {
                " IS NULL"
            } else {
                " IS NOT NULL"
            });
            return Ok(());
        }
        let mut values = leaf
            .values
            .iter()
            .map(|v| to_param(&field, v.clone(), self.tz))
            .collect::<Result<Vec<_>>>()?;
        match leaf.operator {
            Operator::Exact if values[0].is_null() => {
                out.push_str(&column);
                out.push_str(" IS NULL");
            }
            Operator::In => {
                out.push_str(&column);
                out.push_str(" IN (");
                separated_by(out, &values, |out, _| out.push('?'), ", ");
                out.push(')');
                args.append(&mut values);
            }
            Operator::Between => {
                out.push_str(&column);
                out.push_str(" BETWEEN ? AND ?");
                args.append(&mut values);
            }
            operator => {
                self.dialect.write_operator_left(out, operator, &column);
                out.push(' ');
                let sql = self.dialect.operator_sql(operator);
                out.push_str(sql);
                let value = values.swap_remove(0);
                args.push(if sql.contains("LIKE") {
                    like_pattern(operator, &value)
                } else if operator.is_like() {
                    Value::Varchar(Some(value_text(&value)))
                } else {
                    value
                });
            }
        }
        Ok(())
    }

    fn write_paths(&mut self, out: &mut String, exprs: &[String], order: bool) -> Result<()> {
        let mut columns = Vec::with_capacity(exprs.len());
        for expr in exprs {
            let (name, descending) = match expr.strip_prefix('-') {
                Some(name) if order => (name, true),
                _ => (expr.as_str(), false),
            };
            let path = name.split(EXPR_SEP).map(String::from).collect::<Vec<_>>();
            let (alias, field) = self.resolve(&path)?;
            columns.push((alias, field.column, descending));
        }
        separated_by(
            out,
            columns,
            |out, (alias, column, descending)| {
                self.dialect.write_column(out, &alias, column);
                if order {
                    out.push_str(if descending { " DESC" } else { " ASC" });
                }
            },
            ", ",
        );
        Ok(())
    }

    /// Comma separated columns of `exprs`.
    pub fn write_columns(&mut self, out: &mut String, exprs: &[String]) -> Result<()> {
        self.write_paths(out, exprs, false)
    }

    pub fn write_group(&mut self, out: &mut String, groups: &[String]) -> Result<()> {
        if groups.is_empty() {
            return Ok(());
        }
        out.push_str(" GROUP BY ");
        self.write_paths(out, groups, false)
    }

    /// ` ORDER BY ...`, a leading `-` sorts descending.
    pub fn write_order(&mut self, out: &mut String, orders: &[String]) -> Result<()> {
        if orders.is_empty() {
            return Ok(());
        }
        out.push_str(" ORDER BY ");
        self.write_paths(out, orders, true)
    }

    /// Nothing when neither a limit nor an offset is requested. An offset alone, or an
    /// explicit unlimited, uses the dialect maximum.
    pub fn write_limit(&self, out: &mut String, limit: Option<Limit>, offset: u64) {
        let rows = match limit {
            Some(Limit::Rows(rows)) => Some(rows),
            Some(Limit::Unlimited) => self.dialect.max_limit(),
            None if offset > 0 => self.dialect.max_limit(),
            None => None,
        };
        if let Some(rows) = rows {
            out.push_str(" LIMIT ");
            write_integer!(out, rows);
        }
        if offset > 0 {
            out.push_str(" OFFSET ");
            write_integer!(out, offset);
        }
    }
}

fn value_text(value: &Value) -> String {
    match value.as_str() {
        Some(v) => v.to_string(),
        None => value.to_string(),
    }
}

/// Argument of a LIKE operator: wildcards escaped, then added around the text.
fn like_pattern(operator: Operator, value: &Value) -> Value {
    let text = value_text(value);
    let mut escaped = String::with_capacity(text.len() + 2);
    if matches!(
        operator,
        Operator::Contains | Operator::IContains | Operator::EndsWith | Operator::IEndsWith
    ) {
        escaped.push('%');
    }
    for c in text.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    if matches!(
        operator,
        Operator::Contains | Operator::IContains | Operator::StartsWith | Operator::IStartsWith
    ) {
        escaped.push('%');
    }
    Value::Varchar(Some(escaped))
}
