use crate::{
    Alias, Backend, Compiled, DocumentBackend, DocumentExecutor, Executor, Model, ModelInfo,
    OrmError, QuerySet, Record, Registry, Result, RowsAffected, SqlBackend, Value, delete_record,
    marshal::from_storage,
};
use std::{collections::HashMap, sync::Arc};

/// Entry point of every record operation: a backend bound to an alias and to the registry
/// holding the model metadata.
///
/// A transaction is used by building the handle over it, every executor reference is an
/// executor too:
///
/// ```ignore
/// let mut tx = connection.begin().await?;
/// let mut orm = Orm::sql(registry.clone(), alias.clone(), &mut tx)?;
/// orm.insert(&mut user).await?;
/// drop(orm);
/// tx.commit().await?;
/// ```
pub struct Orm<B: Backend> {
    backend: B,
}

impl<E: Executor> Orm<SqlBackend<E>> {
    /// Handle over a SQL executor. The alias must name a SQL driver.
    pub fn sql(registry: Arc<Registry>, alias: Arc<Alias>, executor: E) -> Result<Self> {
        Ok(Self {
            backend: SqlBackend::new(registry, alias, executor)?,
        })
    }

    /// A statement written with `?` placeholders, translated to the dialect.
    pub fn raw(&mut self, sql: &str, args: Vec<Value>) -> RawQuery<'_, E> {
        let query = self.backend.compiler().raw(sql, args);
        RawQuery {
            backend: &mut self.backend,
            query,
        }
    }
}

impl<E: DocumentExecutor> Orm<DocumentBackend<E>> {
    /// Handle over a document executor. The alias must name a document driver.
    pub fn document(registry: Arc<Registry>, alias: Arc<Alias>, executor: E) -> Result<Self> {
        Ok(Self {
            backend: DocumentBackend::new(registry, alias, executor)?,
        })
    }
}

impl<B: Backend> Orm<B> {
    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn into_inner(self) -> B {
        self.backend
    }

    pub fn registry(&self) -> &Arc<Registry> {
        self.backend.registry()
    }

    pub fn alias(&self) -> &Arc<Alias> {
        self.backend.alias()
    }

    fn info<M: Model>(&self) -> Result<Arc<ModelInfo>> {
        self.backend.registry().model::<M>()
    }

    /// Fill `record` from the row matching its `cols`, by primary key when `cols` is empty.
    /// A not found error when nothing matches.
    pub async fn read<M: Model>(&mut self, record: &mut M, cols: &[&str]) -> Result<()> {
        let info = self.info::<M>()?;
        self.backend.read(&info, record, cols, false).await
    }

    /// Like [`read`](Self::read), locking the row for the current transaction.
    pub async fn read_for_update<M: Model>(&mut self, record: &mut M, cols: &[&str]) -> Result<()> {
        let info = self.info::<M>()?;
        self.backend.read(&info, record, cols, true).await
    }

    /// Read by `cols`, insert when nothing matches. Returns whether the record was created
    /// and its primary key.
    pub async fn read_or_create<M: Model>(
        &mut self,
        record: &mut M,
        cols: &[&str],
    ) -> Result<(bool, Value)> {
        let info = self.info::<M>()?;
        match self.backend.read(&info, record, cols, false).await {
            Ok(()) => Ok((false, record.primary_key_value()?)),
            Err(error) if OrmError::is_not_found(&error) => {
                let id = self.insert(record).await?;
                Ok((true, id))
            }
            Err(error) => Err(error),
        }
    }

    /// Insert one record, returning its primary key (generated keys are written back).
    pub async fn insert<M: Model>(&mut self, record: &mut M) -> Result<Value> {
        let info = self.info::<M>()?;
        self.backend
            .insert(&info, &mut [record as &mut dyn Record], 1)
            .await?;
        record.primary_key_value()
    }

    /// Insert `records` in statements of at most `bulk` rows. Returns the inserted count.
    pub async fn insert_multi<M: Model>(&mut self, bulk: usize, records: &mut [M]) -> Result<u64> {
        if records.is_empty() {
            return Ok(0);
        }
        let info = self.info::<M>()?;
        let mut refs = records
            .iter_mut()
            .map(|v| v as &mut dyn Record)
            .collect::<Vec<_>>();
        self.backend.insert(&info, &mut refs, bulk).await
    }

    /// Update `cols` of the record row, every column when empty. Requires a primary key.
    pub async fn update<M: Model>(&mut self, record: &mut M, cols: &[&str]) -> Result<u64> {
        let info = self.info::<M>()?;
        self.backend.update(&info, record, cols).await
    }

    /// Delete the row matching `cols`, by primary key when empty, and apply the delete
    /// policies of the models referencing it.
    pub async fn delete<M: Model>(&mut self, record: &mut M, cols: &[&str]) -> Result<u64> {
        let info = self.info::<M>()?;
        delete_record(&mut self.backend, &info, record, cols).await
    }

    pub fn query_table<M: Model>(&self) -> Result<QuerySet> {
        Ok(QuerySet::new(self.info::<M>()?))
    }

    /// Query set of a registered model, by model name or by table name.
    pub fn query_table_name(&self, name: &str) -> Result<QuerySet> {
        let registry = self.backend.registry();
        match registry.get(name).or_else(|| registry.get_by_table(name)) {
            Some(info) => Ok(QuerySet::new(info)),
            None => {
                let error = OrmError::config(format!("No registered model or table `{}`", name));
                log::error!("{:#}", error);
                Err(error)
            }
        }
    }

    pub fn compile(&self, query_set: &QuerySet) -> Result<Compiled> {
        query_set.compile(self)
    }
}

/// A raw SQL statement bound to its handle, see [`Orm::raw`].
pub struct RawQuery<'o, E: Executor> {
    backend: &'o mut SqlBackend<E>,
    query: crate::Query,
}

impl<'o, E: Executor> RawQuery<'o, E> {
    pub fn query(&self) -> &crate::Query {
        &self.query
    }

    /// Run the statement, returning the affected count and the last inserted id.
    pub async fn exec(self) -> Result<RowsAffected> {
        self.backend.execute("raw", self.query).await
    }

    /// One map per row, keyed by column label.
    pub async fn values(self) -> Result<Vec<HashMap<String, Value>>> {
        let rows = self.backend.fetch_all("raw", self.query).await?;
        Ok(rows
            .into_iter()
            .map(|row| {
                row.labels
                    .iter()
                    .cloned()
                    .zip(row.values.into_vec())
                    .map(|(k, v)| (k, v.normalized()))
                    .collect()
            })
            .collect())
    }

    pub async fn values_list(self) -> Result<Vec<Vec<Value>>> {
        let rows = self.backend.fetch_all("raw", self.query).await?;
        Ok(rows
            .into_iter()
            .map(|row| row.values.into_vec().into_iter().map(Value::normalized).collect())
            .collect())
    }

    /// The first column of every row.
    pub async fn values_flat(self) -> Result<Vec<Value>> {
        let rows = self.backend.fetch_all("raw", self.query).await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| row.values.into_vec().into_iter().next())
            .map(Value::normalized)
            .collect())
    }

    /// The rows converted to records of `M`, columns matched by name.
    pub async fn all<M: Model>(self) -> Result<Vec<M>> {
        let info = self.backend.registry().model::<M>()?;
        let tz = self.backend.alias().time_zone;
        let rows = self.backend.fetch_all("raw", self.query).await?;
        let mut result = Vec::with_capacity(rows.len());
        for row in rows {
            let mut record = M::zeroed();
            for (label, value) in row.labels.iter().zip(row.values.into_vec()) {
                if let Some(field) = info.get_by_column(label) {
                    record.set_value(field.name, from_storage(field, value, tz)?)?;
                }
            }
            result.push(record);
        }
        Ok(result)
    }
}
