use crate::{
    Alias, AsValue, Backend, Collect, Compiled, Context, Dialect, Executor, FieldInfo, Model,
    ModelInfo, OrmError, Params, Query, QuerySpec, Record, Registry, Result, RowLabeled,
    RowsAffected, SqlCompiler, SqlWriter, UpdateOperator, Value,
    backend::{log_query, missing_pk_error, required_pk},
    marshal::{collect_values, from_storage, set_cols_values},
    printable_query,
    stream::TryStreamExt,
};
use std::{sync::Arc, time::Instant};

/// Backend of the SQL family: compiles through [`SqlCompiler`] and runs on an [`Executor`].
pub struct SqlBackend<E: Executor> {
    executor: E,
    registry: Arc<Registry>,
    alias: Arc<Alias>,
    dialect: Dialect,
}

impl<E: Executor> SqlBackend<E> {
    pub fn new(registry: Arc<Registry>, alias: Arc<Alias>, executor: E) -> Result<Self> {
        let Some(dialect) = alias.driver.dialect() else {
            let error = OrmError::config(format!(
                "Alias `{}` uses the document driver `{}`, not a SQL one",
                alias.name, alias.driver
            ));
            log::error!("{:#}", error);
            return Err(error);
        };
        Ok(Self {
            executor,
            registry,
            alias,
            dialect,
        })
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn executor(&mut self) -> &mut E {
        &mut self.executor
    }

    pub fn into_executor(self) -> E {
        self.executor
    }

    pub fn compiler(&self) -> SqlCompiler<'_> {
        SqlCompiler::new(&self.registry, self.dialect, self.alias.time_zone)
    }

    pub async fn fetch_all(&mut self, operation: &str, query: Query) -> Result<Vec<RowLabeled>> {
        let start = Instant::now();
        let logged = query.clone();
        let result = self.executor.fetch(query).try_collect::<Vec<_>>().await;
        log_query(
            &self.alias.name,
            operation,
            start.elapsed(),
            &logged,
            &logged.args,
            result.as_ref().err(),
        );
        result.with_context(|| {
            format!(
                "While executing the query:\n{}",
                printable_query!(logged.sql, logged.args)
            )
        })
    }

    pub async fn execute(&mut self, operation: &str, query: Query) -> Result<RowsAffected> {
        let start = Instant::now();
        let logged = query.clone();
        let result = self.executor.execute(query).await;
        log_query(
            &self.alias.name,
            operation,
            start.elapsed(),
            &logged,
            &logged.args,
            result.as_ref().err(),
        );
        result.with_context(|| {
            format!(
                "While executing the query:\n{}",
                printable_query!(logged.sql, logged.args)
            )
        })
    }

    /// Insert the rows of one chunk. Rows sharing the same column set go in one statement.
    async fn insert_chunk(
        &mut self,
        info: &ModelInfo,
        records: &mut [&mut dyn Record],
        explicit_keys: &mut bool,
    ) -> Result<u64> {
        let tz = self.alias.time_zone;
        let fields = info.column_fields().collect::<Vec<_>>();
        let mut collected = Vec::with_capacity(records.len());
        for record in records.iter_mut() {
            let values = collect_values(info, &mut **record, &fields, Collect::Insert, tz)?;
            *explicit_keys |= !values.auto_fields.is_empty();
            collected.push(values);
        }
        let same = collected.windows(2).all(|w| w[0].columns == w[1].columns);
        if !same {
            let mut total = 0;
            for (record, values) in records.iter_mut().zip(collected) {
                total += self
                    .insert_statement(info, std::slice::from_mut(record), vec![values])
                    .await?;
            }
            return Ok(total);
        }
        self.insert_statement(info, records, collected).await
    }

    async fn insert_statement(
        &mut self,
        info: &ModelInfo,
        records: &mut [&mut dyn Record],
        collected: Vec<crate::Collected>,
    ) -> Result<u64> {
        let tz = self.alias.time_zone;
        let pk = info.primary_key();
        let columns = collected
            .first()
            .map(|v| v.columns.clone())
            .unwrap_or_default();
        let generated = pk.auto_increment && !columns.contains(&pk.column);
        let returning = generated && self.dialect.has_returning_id();
        let rows = collected.into_iter().map(|v| v.values).collect();
        let query = self.compiler().insert(info, &columns, rows, returning);
        if returning {
            let rows = self.fetch_all("insert", query).await?;
            for (record, row) in records.iter_mut().zip(&rows) {
                if let Some(key) = row.values.first() {
                    write_back_key(pk, &mut **record, key.clone(), tz)?;
                }
            }
            return Ok(rows.len() as u64);
        }
        let affected = self.execute("insert", query).await?;
        if generated && records.len() == 1 {
            if let Some(id) = affected.last_affected_id {
                write_back_key(pk, &mut *records[0], id.as_value(), tz)?;
            }
        }
        Ok(affected.rows_affected)
    }

    /// Per row inserts bracketed in a transaction, rolled back on the first failure.
    async fn insert_in_transaction(
        &mut self,
        info: &ModelInfo,
        records: &mut [&mut dyn Record],
        explicit_keys: &mut bool,
    ) -> Result<u64> {
        let begin = self.compiler().transaction_begin();
        self.execute("begin", begin).await?;
        let mut total = 0;
        for record in records.iter_mut() {
            match self
                .insert_chunk(info, std::slice::from_mut(record), explicit_keys)
                .await
            {
                Ok(inserted) => total += inserted,
                Err(error) => {
                    let rollback = self.compiler().transaction_rollback();
                    if let Err(e) = self.execute("rollback", rollback).await {
                        log::warn!("Rollback after a failed insert also failed: {:#}", e);
                    }
                    return Err(error);
                }
            }
        }
        let commit = self.compiler().transaction_commit();
        self.execute("commit", commit).await?;
        Ok(total)
    }
}

fn write_back_key(pk: &FieldInfo, record: &mut dyn Record, value: Value, tz: time::UtcOffset) -> Result<()> {
    let value = from_storage(pk, value, tz)?;
    record.set_value(pk.name, value)
}

/// Walk the relation `path` from `record`, creating lazy references along the way.
pub(crate) fn related_at<'r>(
    mut record: &'r mut dyn Record,
    path: &[String],
) -> Option<&'r mut dyn Record> {
    for name in path {
        record = record.related_mut(name)?;
    }
    Some(record)
}

fn related_ref<'r>(mut record: &'r dyn Record, path: &[String]) -> Option<&'r dyn Record> {
    for name in path {
        record = record.related(name)?;
    }
    Some(record)
}

impl<E: Executor> Backend for SqlBackend<E> {
    fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    fn alias(&self) -> &Arc<Alias> {
        &self.alias
    }

    fn compile(&self, info: &Arc<ModelInfo>, spec: &QuerySpec) -> Result<Compiled> {
        Ok(Compiled::Sql(self.compiler().select(info, spec, &[])?.query))
    }

    async fn read(
        &mut self,
        info: &Arc<ModelInfo>,
        record: &mut dyn Record,
        cols: &[&str],
        for_update: bool,
    ) -> Result<()> {
        let tz = self.alias.time_zone;
        let (query, fields) = {
            let compiler = self.compiler();
            let filters = if cols.is_empty() {
                required_pk(info, record, &self.alias)?;
                vec![info.primary_key()]
            } else {
                compiler.fields(info, cols)?
            };
            let columns = filters.iter().map(|f| f.column).collect::<Vec<_>>();
            let values =
                collect_values(info, record, &filters, Collect::Filter, tz)?.values;
            let fields = info.column_fields().collect::<Vec<_>>();
            let query = compiler.read(info, &fields, &columns, values, for_update);
            (query, fields)
        };
        let rows = self.fetch_all("read", query).await?;
        let Some(row) = rows.into_iter().next() else {
            log::debug!("No `{}` row matches the read", info.name);
            return Err(OrmError::NotFound.into());
        };
        set_cols_values(record, &fields, &row.values, tz)
    }

    async fn insert(
        &mut self,
        info: &Arc<ModelInfo>,
        records: &mut [&mut dyn Record],
        bulk: usize,
    ) -> Result<u64> {
        let mut explicit_keys = false;
        let inserted = if self.dialect.bulk_insert_in_transaction() && records.len() > 1 {
            self.insert_in_transaction(info, records, &mut explicit_keys)
                .await?
        } else {
            let mut total = 0;
            for chunk in records.chunks_mut(bulk.max(1)) {
                total += self.insert_chunk(info, chunk, &mut explicit_keys).await?;
            }
            total
        };
        if explicit_keys {
            if let Some(query) = self.compiler().key_sync(info) {
                self.fetch_all("key_sync", query).await?;
            }
        }
        Ok(inserted)
    }

    async fn update(
        &mut self,
        info: &Arc<ModelInfo>,
        record: &mut dyn Record,
        cols: &[&str],
    ) -> Result<u64> {
        let tz = self.alias.time_zone;
        let pk = required_pk(info, record, &self.alias)?;
        let query = {
            let compiler = self.compiler();
            let fields = compiler.fields(info, cols)?;
            let fields = fields
                .into_iter()
                .filter(|f| !f.primary_key)
                .collect::<Vec<_>>();
            let collected = collect_values(info, record, &fields, Collect::Update, tz)?;
            if collected.columns.is_empty() {
                return Ok(0);
            }
            compiler.update_one(info, &collected.columns, collected.values, pk)
        };
        Ok(self.execute("update", query).await?.rows_affected)
    }

    async fn select_pks(&mut self, info: &Arc<ModelInfo>, spec: &QuerySpec) -> Result<Vec<Value>> {
        let query = self.compiler().select_pks(info, spec)?;
        let rows = self.fetch_all("select_pks", query).await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| row.values.into_vec().into_iter().next())
            .collect())
    }

    async fn delete_pks(&mut self, info: &Arc<ModelInfo>, pks: Vec<Value>) -> Result<u64> {
        if pks.is_empty() {
            return Err(missing_pk_error(info));
        }
        let query = self.compiler().delete_in(info, pks);
        Ok(self.execute("delete", query).await?.rows_affected)
    }

    async fn update_batch(
        &mut self,
        info: &Arc<ModelInfo>,
        spec: &QuerySpec,
        _operator: UpdateOperator,
        params: &Params,
    ) -> Result<u64> {
        let query = self.compiler().update_batch(info, spec, params)?;
        Ok(self.execute("update_batch", query).await?.rows_affected)
    }

    async fn count(&mut self, info: &Arc<ModelInfo>, spec: &QuerySpec) -> Result<u64> {
        let query = self.compiler().count(info, spec)?;
        let rows = self.fetch_all("count", query).await?;
        match rows.into_iter().next().and_then(|r| r.values.into_vec().into_iter().next()) {
            Some(value) => u64::try_from_value(value).context("COUNT(*) returned a non integer"),
            None => Ok(0),
        }
    }

    async fn read_batch<M: Model>(
        &mut self,
        info: &Arc<ModelInfo>,
        spec: &QuerySpec,
        container: &mut Vec<M>,
    ) -> Result<u64> {
        let tz = self.alias.time_zone;
        let select = self.compiler().select(info, spec, &[])?;
        let rows = self.fetch_all("read_batch", select.query).await?;
        let fields = select.fields.iter().collect::<Vec<_>>();
        let joined = select
            .joined
            .iter()
            .map(|table| {
                let parent = match table.path.len() {
                    1 => info.clone(),
                    n => select
                        .joined
                        .iter()
                        .find(|t| t.path == table.path[..n - 1])
                        .map(|t| t.model.clone())
                        .unwrap_or_else(|| info.clone()),
                };
                let back = table
                    .model
                    .reverse_relations()
                    .find(|f| {
                        f.field_type == crate::FieldType::ReverseOne
                            && f.related == Some(parent.name)
                    })
                    .map(|f| f.name);
                (table, table.model.column_fields().collect::<Vec<_>>(), back)
            })
            .collect::<Vec<_>>();
        container.clear();
        container.reserve(rows.len());
        for row in rows {
            let mut record = M::zeroed();
            let (own, mut rest) = row.values.split_at(fields.len().min(row.values.len()));
            set_cols_values(&mut record, &fields, own, tz)?;
            for (table, columns, back) in &joined {
                let (slice, tail) = rest.split_at(columns.len().min(rest.len()));
                rest = tail;
                if slice.iter().all(Value::is_null) {
                    continue;
                }
                let parent_pk = match back {
                    Some(..) => related_ref(&record, &table.path[..table.path.len() - 1])
                        .map(|parent| parent.primary_key_value())
                        .transpose()?,
                    None => None,
                };
                let Some(target) = related_at(&mut record, &table.path) else {
                    continue;
                };
                set_cols_values(target, columns, slice, tz)?;
                if let (Some(back), Some(pk)) = (back, parent_pk) {
                    target.set_value(back, pk)?;
                }
            }
            container.push(record);
        }
        Ok(container.len() as u64)
    }

    async fn values(
        &mut self,
        info: &Arc<ModelInfo>,
        spec: &QuerySpec,
        exprs: &[&str],
    ) -> Result<(Vec<String>, Vec<Vec<Value>>)> {
        let tz = self.alias.time_zone;
        let projection = self.compiler().values(info, spec, exprs)?;
        let rows = self.fetch_all("values", projection.query).await?;
        let rows = rows
            .into_iter()
            .map(|row| {
                projection
                    .fields
                    .iter()
                    .zip(row.values.into_vec())
                    .map(|(field, value)| from_storage(field, value, tz))
                    .collect::<Result<Vec<_>>>()
            })
            .collect::<Result<Vec<_>>>()?;
        Ok((projection.labels, rows))
    }
}
