use super::tables::{JoinTable, Tables};
use crate::{
    Dialect, EXPR_SEP, FieldInfo, ModelInfo, OrmError, Params, Query, QuerySpec, Registry,
    Result, SqlWriter, Value, marshal::to_param, separated_by,
};
use std::sync::Arc;
use time::UtcOffset;

/// A compiled SELECT and the layout of its rows.
#[derive(Debug)]
pub struct Select {
    pub query: Query,
    /// Fields of the base model, the first columns of every row.
    pub fields: Vec<FieldInfo>,
    /// Eager loaded tables, each contributes all of its columns after the previous ones.
    pub joined: Vec<JoinTable>,
}

/// A compiled projection: one label and one field per output column.
#[derive(Debug)]
pub struct Projection {
    pub query: Query,
    pub labels: Vec<String>,
    pub fields: Vec<FieldInfo>,
}

/// Compiles model operations to SQL text and positional arguments for one dialect.
pub struct SqlCompiler<'a> {
    registry: &'a Registry,
    dialect: Dialect,
    tz: UtcOffset,
}

impl<'a> SqlCompiler<'a> {
    pub fn new(registry: &'a Registry, dialect: Dialect, tz: UtcOffset) -> Self {
        Self {
            registry,
            dialect,
            tz,
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn tables(&self, info: &Arc<ModelInfo>) -> Tables<'a> {
        Tables::new(self.registry, self.dialect, self.tz, info.clone())
    }

    fn finish(&self, sql: String, args: Vec<Value>) -> Query {
        Query::with_args(self.dialect.replace_marks(sql), args)
    }

    /// Fields named by `cols` (field or column names), all columns when empty.
    pub fn fields<'m>(&self, info: &'m ModelInfo, cols: &[&str]) -> Result<Vec<&'m FieldInfo>> {
        if cols.is_empty() {
            return Ok(info.column_fields().collect());
        }
        cols.iter()
            .map(|col| match info.get_by_any(col).filter(|f| f.is_column()) {
                Some(field) => Ok(field),
                None => {
                    let error = OrmError::usage(format!(
                        "Unknown column `{}` of model `{}`",
                        col, info.name
                    ));
                    log::error!("{:#}", error);
                    Err(error)
                }
            })
            .collect()
    }

    /// WHERE, GROUP BY, ORDER BY and LIMIT of `spec`, compiled before the join list because
    /// resolving their paths can add joins.
    fn modifiers(
        &self,
        tables: &mut Tables,
        spec: &QuerySpec,
        args: &mut Vec<Value>,
    ) -> Result<(String, String)> {
        let mut filter = String::new();
        tables.write_where(&mut filter, &spec.cond, args)?;
        let mut tail = String::new();
        tables.write_group(&mut tail, &spec.groups)?;
        tables.write_order(&mut tail, &spec.orders)?;
        tables.write_limit(&mut tail, spec.limit, spec.offset);
        Ok((filter, tail))
    }

    fn write_from(&self, out: &mut String, tables: &Tables) {
        out.push_str(" FROM ");
        self.dialect
            .write_identifier_quoted(out, tables.base().table);
        let alias = tables.base_alias();
        if !alias.is_empty() {
            out.push(' ');
            out.push_str(alias);
        }
        tables.write_join(out);
    }

    /// `SELECT ... FROM "table" T0 ...` with the eager loaded relations of `spec`.
    pub fn select(&self, info: &Arc<ModelInfo>, spec: &QuerySpec, cols: &[&str]) -> Result<Select> {
        let mut tables = self.tables(info);
        let mut fields = self.fields(info, cols)?;
        let eager = !spec.related.is_empty() || spec.rel_depth > 0;
        if eager {
            tables.parse_related(&spec.related, spec.rel_depth)?;
            for relation in info.relations() {
                if !fields.iter().any(|f| f.column == relation.column) {
                    fields.push(relation);
                }
            }
        }
        let mut args = Vec::new();
        let (filter, tail) = self.modifiers(&mut tables, spec, &mut args)?;
        let joined = tables.selected().cloned().collect::<Vec<_>>();
        let mut sql = String::with_capacity(128);
        sql.push_str("SELECT ");
        if spec.distinct {
            sql.push_str("DISTINCT ");
        }
        let base = tables.base_alias();
        separated_by(
            &mut sql,
            &fields,
            |out, f| self.dialect.write_column(out, base, f.column),
            ", ",
        );
        for table in &joined {
            for column in table.model.columns() {
                sql.push_str(", ");
                self.dialect.write_column(&mut sql, &table.alias, column);
            }
        }
        self.write_from(&mut sql, &tables);
        sql.push_str(&filter);
        sql.push_str(&tail);
        if spec.for_update {
            sql.push_str(" FOR UPDATE");
        }
        Ok(Select {
            query: self.finish(sql, args),
            fields: fields.into_iter().cloned().collect(),
            joined,
        })
    }

    /// `SELECT COUNT(*)`, wrapping the grouped or distinct selection in a subquery.
    pub fn count(&self, info: &Arc<ModelInfo>, spec: &QuerySpec) -> Result<Query> {
        let mut tables = self.tables(info);
        let mut args = Vec::new();
        let mut filter = String::new();
        tables.write_where(&mut filter, &spec.cond, &mut args)?;
        let mut group = String::new();
        tables.write_group(&mut group, &spec.groups)?;
        let wrapped = !spec.groups.is_empty() || spec.distinct;
        let mut sql = String::with_capacity(128);
        sql.push_str(if wrapped {
            "SELECT COUNT(*) FROM (SELECT "
        } else {
            "SELECT COUNT(*)"
        });
        if wrapped {
            if spec.distinct {
                sql.push_str("DISTINCT ");
            }
            if spec.groups.is_empty() {
                let base = tables.base_alias();
                separated_by(
                    &mut sql,
                    info.columns(),
                    |out, c| self.dialect.write_column(out, base, c),
                    ", ",
                );
            } else {
                tables.write_columns(&mut sql, &spec.groups)?;
            }
        }
        self.write_from(&mut sql, &tables);
        sql.push_str(&filter);
        sql.push_str(&group);
        if wrapped {
            sql.push_str(") AS T");
        }
        Ok(self.finish(sql, args))
    }

    /// Projection of `exprs`, paths that may cross relations. All columns, labeled by field
    /// name, when `exprs` is empty.
    pub fn values(
        &self,
        info: &Arc<ModelInfo>,
        spec: &QuerySpec,
        exprs: &[&str],
    ) -> Result<Projection> {
        let mut tables = self.tables(info);
        let mut columns = Vec::new();
        let mut labels = Vec::new();
        let mut fields = Vec::new();
        if exprs.is_empty() {
            for field in info.column_fields() {
                columns.push((tables.base_alias().to_string(), field.column));
                labels.push(field.name.to_string());
                fields.push(field.clone());
            }
        } else {
            for expr in exprs {
                let path = expr.split(EXPR_SEP).map(String::from).collect::<Vec<_>>();
                let (alias, field) = tables.resolve(&path)?;
                columns.push((alias, field.column));
                labels.push(expr.to_string());
                fields.push(field);
            }
        }
        let mut args = Vec::new();
        let (filter, tail) = self.modifiers(&mut tables, spec, &mut args)?;
        let mut sql = String::with_capacity(128);
        sql.push_str("SELECT ");
        if spec.distinct {
            sql.push_str("DISTINCT ");
        }
        separated_by(
            &mut sql,
            &columns,
            |out, (alias, column)| self.dialect.write_column(out, alias, column),
            ", ",
        );
        self.write_from(&mut sql, &tables);
        sql.push_str(&filter);
        sql.push_str(&tail);
        Ok(Projection {
            query: self.finish(sql, args),
            labels,
            fields,
        })
    }

    /// Single table SELECT of `fields`, filtered by equality on the `filters` columns.
    pub fn read(
        &self,
        info: &ModelInfo,
        fields: &[&FieldInfo],
        filters: &[&'static str],
        values: Vec<Value>,
        for_update: bool,
    ) -> Query {
        let mut sql = String::with_capacity(128);
        sql.push_str("SELECT ");
        separated_by(
            &mut sql,
            fields,
            |out, f| self.dialect.write_identifier_quoted(out, f.column),
            ", ",
        );
        sql.push_str(" FROM ");
        self.dialect.write_identifier_quoted(&mut sql, info.table);
        self.write_equalities(&mut sql, filters);
        sql.push_str(" LIMIT 1");
        if for_update {
            sql.push_str(" FOR UPDATE");
        }
        self.finish(sql, values)
    }

    fn write_equalities(&self, out: &mut String, columns: &[&'static str]) {
        out.push_str(" WHERE ");
        separated_by(
            out,
            columns,
            |out, c| {
                self.dialect.write_identifier_quoted(out, c);
                out.push_str(" = ?");
            },
            " AND ",
        );
    }

    /// `INSERT INTO ... VALUES (...), (...)`, optionally returning the primary key.
    pub fn insert(
        &self,
        info: &ModelInfo,
        columns: &[&'static str],
        rows: Vec<Vec<Value>>,
        returning: bool,
    ) -> Query {
        let mut sql = String::with_capacity(128);
        sql.push_str("INSERT INTO ");
        self.dialect.write_identifier_quoted(&mut sql, info.table);
        if columns.is_empty() {
            self.dialect.write_insert_defaults(&mut sql);
        } else {
            sql.push_str(" (");
            separated_by(
                &mut sql,
                columns,
                |out, c| self.dialect.write_identifier_quoted(out, c),
                ", ",
            );
            sql.push_str(") VALUES ");
            separated_by(
                &mut sql,
                &rows,
                |out, row| {
                    out.push('(');
                    separated_by(out, row, |out, _| out.push('?'), ", ");
                    out.push(')');
                },
                ", ",
            );
        }
        if returning {
            sql.push_str(" RETURNING ");
            self.dialect
                .write_identifier_quoted(&mut sql, info.primary_key().column);
        }
        self.finish(sql, rows.into_iter().flatten().collect())
    }

    /// Update of the row identified by `pk`.
    pub fn update_one(
        &self,
        info: &ModelInfo,
        columns: &[&'static str],
        mut values: Vec<Value>,
        pk: Value,
    ) -> Query {
        let mut sql = String::with_capacity(128);
        self.dialect.write_update_head(&mut sql, info.table);
        separated_by(
            &mut sql,
            columns,
            |out, c| {
                self.dialect.write_identifier_quoted(out, c);
                out.push_str(" = ?");
            },
            ", ",
        );
        self.write_equalities(&mut sql, &[info.primary_key().column]);
        values.push(pk);
        self.finish(sql, values)
    }

    /// Primary keys of the rows matching `spec`.
    pub fn select_pks(&self, info: &Arc<ModelInfo>, spec: &QuerySpec) -> Result<Query> {
        let mut tables = self.tables(info);
        let mut args = Vec::new();
        let (filter, tail) = self.modifiers(&mut tables, spec, &mut args)?;
        let mut sql = String::with_capacity(128);
        sql.push_str("SELECT ");
        self.dialect
            .write_column(&mut sql, tables.base_alias(), info.primary_key().column);
        self.write_from(&mut sql, &tables);
        sql.push_str(&filter);
        sql.push_str(&tail);
        Ok(self.finish(sql, args))
    }

    /// Delete of the rows whose primary key is one of `pks`.
    pub fn delete_in(&self, info: &ModelInfo, pks: Vec<Value>) -> Query {
        let mut sql = String::with_capacity(64);
        self.dialect.write_delete_head(&mut sql, info.table);
        sql.push_str(" WHERE ");
        self.dialect
            .write_identifier_quoted(&mut sql, info.primary_key().column);
        sql.push_str(" IN (");
        separated_by(&mut sql, &pks, |out, _| out.push('?'), ", ");
        sql.push(')');
        self.finish(sql, pks)
    }

    /// Update of every row matching `spec`. The condition must not be empty.
    ///
    /// Conditions crossing relations use `UPDATE ... JOIN` where supported and a primary key
    /// subquery otherwise.
    pub fn update_batch(
        &self,
        info: &Arc<ModelInfo>,
        spec: &QuerySpec,
        params: &Params,
    ) -> Result<Query> {
        if spec.cond.is_empty() {
            let error = OrmError::usage(format!(
                "Refusing to update every row of `{}`: the condition is empty",
                info.table
            ));
            log::error!("{:#}", error);
            return Err(error);
        }
        if params.is_empty() {
            let error = OrmError::usage(format!("Update of `{}` without values", info.table));
            log::error!("{:#}", error);
            return Err(error);
        }
        let mut sets = Vec::with_capacity(params.len());
        let mut args = Vec::with_capacity(params.len());
        for (name, update) in params.iter() {
            let Some(field) = info.get_by_any(name).filter(|f| f.is_column()) else {
                let error = OrmError::usage(format!(
                    "Cannot update `{}`: not a column of model `{}`",
                    name, info.name
                ));
                log::error!("{:#}", error);
                return Err(error);
            };
            sets.push((field.column, update.arithmetic()));
            args.push(to_param(field, update.value().clone(), self.tz)?);
        }
        let mut tables = self.tables(info);
        let mut filter = String::new();
        tables.write_where(&mut filter, &spec.cond, &mut args)?;
        let joined = !tables.tables().is_empty();
        if !joined {
            tables = self.tables(info).unaliased();
            filter.clear();
            args.truncate(params.len());
            tables.write_where(&mut filter, &spec.cond, &mut args)?;
        }
        let mut sql = String::with_capacity(128);
        if !joined {
            self.dialect.write_update_head(&mut sql, info.table);
            self.write_sets(&mut sql, "", &sets);
            sql.push_str(&filter);
        } else if self.dialect.supports_update_join() {
            sql.push_str("UPDATE ");
            self.dialect.write_identifier_quoted(&mut sql, info.table);
            sql.push(' ');
            sql.push_str(tables.base_alias());
            tables.write_join(&mut sql);
            sql.push_str(" SET ");
            self.write_sets(&mut sql, tables.base_alias(), &sets);
            sql.push_str(&filter);
        } else {
            let pk = info.primary_key().column;
            self.dialect.write_update_head(&mut sql, info.table);
            self.write_sets(&mut sql, "", &sets);
            sql.push_str(" WHERE ");
            self.dialect.write_identifier_quoted(&mut sql, pk);
            sql.push_str(" IN (SELECT ");
            self.dialect.write_column(&mut sql, tables.base_alias(), pk);
            self.write_from(&mut sql, &tables);
            sql.push_str(&filter);
            sql.push(')');
        }
        Ok(self.finish(sql, args))
    }

    fn write_sets(&self, out: &mut String, alias: &str, sets: &[(&'static str, Option<char>)]) {
        separated_by(
            out,
            sets,
            |out, (column, arithmetic)| {
                self.dialect.write_column(out, alias, column);
                out.push_str(" = ");
                if let Some(op) = arithmetic {
                    self.dialect.write_column(out, alias, column);
                    out.push(' ');
                    out.push(*op);
                    out.push(' ');
                }
                out.push('?');
            },
            ", ",
        );
    }

    /// Statement realigning the key generator of `info`, when the dialect needs one.
    pub fn key_sync(&self, info: &ModelInfo) -> Option<Query> {
        self.dialect
            .key_sync_sql(info.table, info.primary_key().column)
            .map(Query::new)
    }

    pub fn transaction_begin(&self) -> Query {
        let mut sql = String::new();
        self.dialect.write_transaction_begin(&mut sql);
        Query::new(sql)
    }

    pub fn transaction_commit(&self) -> Query {
        let mut sql = String::new();
        self.dialect.write_transaction_commit(&mut sql);
        Query::new(sql)
    }

    pub fn transaction_rollback(&self) -> Query {
        let mut sql = String::new();
        self.dialect.write_transaction_rollback(&mut sql);
        Query::new(sql)
    }

    /// Raw statement written with `?` markers.
    pub fn raw(&self, sql: &str, args: Vec<Value>) -> Query {
        self.finish(sql.to_string(), args)
    }
}
