use crate::{
    Action, Alias, Condition, FindSpec, Model, ModelInfo, OrmError, Params, Query, QuerySpec,
    Record, Registry, Result, UpdateOperator, Value,
    future::{BoxFuture, FutureExt},
    marshal::{default_value, is_zero, to_storage, zero_value},
};
use std::{future::Future, sync::Arc, time::Duration};

/// What a backend would send for a query, without running it.
#[derive(Debug, Clone, PartialEq)]
pub enum Compiled {
    Sql(Query),
    Document {
        collection: String,
        filter: bson::Document,
        find: FindSpec,
    },
}

mod sealed {
    pub trait Sealed {}
    impl<E: crate::Executor> Sealed for crate::SqlBackend<E> {}
    impl<E: crate::DocumentExecutor> Sealed for crate::DocumentBackend<E> {}
}

/// The storage families an [`Orm`](crate::Orm) runs on: [`SqlBackend`](crate::SqlBackend) and
/// [`DocumentBackend`](crate::DocumentBackend). Closed, each alias resolves to one of them.
///
/// Records are passed as `&mut dyn Record` so that nested relations, whose concrete types the
/// backend does not know, travel through the same methods.
pub trait Backend: Send + sealed::Sealed {
    fn registry(&self) -> &Arc<Registry>;

    fn alias(&self) -> &Arc<Alias>;

    fn compile(&self, info: &Arc<ModelInfo>, spec: &QuerySpec) -> Result<Compiled>;

    /// Fill `record` from the row matching its `cols` (the primary key when empty).
    fn read(
        &mut self,
        info: &Arc<ModelInfo>,
        record: &mut dyn Record,
        cols: &[&str],
        for_update: bool,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Insert `records` in statements of at most `bulk` rows, writing generated keys back.
    fn insert(
        &mut self,
        info: &Arc<ModelInfo>,
        records: &mut [&mut dyn Record],
        bulk: usize,
    ) -> impl Future<Output = Result<u64>> + Send;

    /// Update the `cols` (every column when empty) of the row with the record primary key.
    fn update(
        &mut self,
        info: &Arc<ModelInfo>,
        record: &mut dyn Record,
        cols: &[&str],
    ) -> impl Future<Output = Result<u64>> + Send;

    fn select_pks(
        &mut self,
        info: &Arc<ModelInfo>,
        spec: &QuerySpec,
    ) -> impl Future<Output = Result<Vec<Value>>> + Send;

    fn delete_pks(
        &mut self,
        info: &Arc<ModelInfo>,
        pks: Vec<Value>,
    ) -> impl Future<Output = Result<u64>> + Send;

    fn update_batch(
        &mut self,
        info: &Arc<ModelInfo>,
        spec: &QuerySpec,
        operator: UpdateOperator,
        params: &Params,
    ) -> impl Future<Output = Result<u64>> + Send;

    fn count(
        &mut self,
        info: &Arc<ModelInfo>,
        spec: &QuerySpec,
    ) -> impl Future<Output = Result<u64>> + Send;

    /// Replace the content of `container` with the matching records.
    fn read_batch<M: Model>(
        &mut self,
        info: &Arc<ModelInfo>,
        spec: &QuerySpec,
        container: &mut Vec<M>,
    ) -> impl Future<Output = Result<u64>> + Send;

    /// Labels and rows of a projection.
    fn values(
        &mut self,
        info: &Arc<ModelInfo>,
        spec: &QuerySpec,
        exprs: &[&str],
    ) -> impl Future<Output = Result<(Vec<String>, Vec<Vec<Value>>)>> + Send;
}

pub(crate) fn empty_condition_error(info: &ModelInfo, operation: &str) -> crate::Error {
    let error = OrmError::usage(format!(
        "Refusing to {} every row of `{}`: the condition is empty",
        operation, info.table
    ));
    log::error!("{:#}", error);
    error
}

pub(crate) fn missing_pk_error(info: &ModelInfo) -> crate::Error {
    let error: crate::Error = OrmError::MissingPrimaryKey(info.name.to_string()).into();
    log::error!("{:#}", error);
    error
}

/// The storage value of the record primary key, an error when it holds the zero value.
pub(crate) fn required_pk(info: &ModelInfo, record: &dyn Record, alias: &Alias) -> Result<Value> {
    let pk = info.primary_key();
    let value = record.get_value(pk.name)?;
    if is_zero(&value) {
        return Err(missing_pk_error(info));
    }
    to_storage(pk, value, alias.time_zone)
}

/// Delete the row of `record`, identified by `cols` or by its primary key, then apply the
/// delete policies of the models referencing it. The primary key is reset to zero.
pub async fn delete_record<B: Backend>(
    backend: &mut B,
    info: &Arc<ModelInfo>,
    record: &mut dyn Record,
    cols: &[&str],
) -> Result<u64> {
    let pk = info.primary_key();
    let deleted = if cols.is_empty() {
        let value = required_pk(info, record, backend.alias())?;
        let deleted = backend.delete_pks(info, vec![value.clone()]).await?;
        cascade(backend, info, vec![value]).await?;
        deleted
    } else {
        let mut cond = Condition::new();
        for col in cols {
            let Some(field) = info.get_by_any(col).filter(|f| f.is_column()) else {
                let error = OrmError::usage(format!(
                    "Unknown column `{}` of model `{}`",
                    col, info.name
                ));
                log::error!("{:#}", error);
                return Err(error);
            };
            cond = cond.and(field.name, [record.get_value(field.name)?])?;
        }
        delete_batch(backend, info.clone(), QuerySpec::filtered(cond)).await?
    };
    if deleted > 0 {
        record.set_value(pk.name, zero_value(pk.storage_type()))?;
    }
    Ok(deleted)
}

/// Delete the rows matching `spec` and cascade to their dependents. Boxed because cascading
/// re-enters it for the dependent models.
pub fn delete_batch<B: Backend>(
    backend: &mut B,
    info: Arc<ModelInfo>,
    spec: QuerySpec,
) -> BoxFuture<'_, Result<u64>> {
    async move {
        if spec.cond.is_empty() {
            return Err(empty_condition_error(&info, "delete"));
        }
        let pks = backend.select_pks(&info, &spec).await?;
        if pks.is_empty() {
            return Ok(0);
        }
        let deleted = backend.delete_pks(&info, pks.clone()).await?;
        cascade(backend, &info, pks).await?;
        Ok(deleted)
    }
    .boxed()
}

/// Apply the delete policy of every relation pointing to the deleted `pks` of `info`.
async fn cascade<B: Backend>(backend: &mut B, info: &ModelInfo, pks: Vec<Value>) -> Result<()> {
    let dependents = backend.registry().dependents(info.name);
    let tz = backend.alias().time_zone;
    for dependent in dependents {
        if dependent.on_delete == Action::NoAction {
            continue;
        }
        let child = backend.registry().model_named(dependent.model)?;
        let cond = Condition::new().and(
            &format!("{}__in", dependent.field),
            pks.iter().cloned(),
        )?;
        let spec = QuerySpec::filtered(cond);
        log::debug!(
            "Cascading {:?} from `{}` to `{}.{}`",
            dependent.on_delete,
            info.name,
            dependent.model,
            dependent.field
        );
        match dependent.on_delete {
            Action::Cascade => {
                delete_batch(backend, child, spec).await?;
            }
            Action::SetNull => {
                let params = Params::new().set(dependent.field, Value::Null);
                backend
                    .update_batch(&child, &spec, UpdateOperator::Set, &params)
                    .await?;
            }
            Action::SetDefault => {
                let Some(field) = child.get_by_name(dependent.field) else {
                    continue;
                };
                let params = Params::new().set(dependent.field, default_value(field, tz)?);
                backend
                    .update_batch(&child, &spec, UpdateOperator::Set, &params)
                    .await?;
            }
            Action::NoAction => {}
        }
    }
    Ok(())
}

/// Debug line of every statement, error line of every failure.
pub(crate) fn log_query(
    alias: &str,
    operation: &str,
    elapsed: Duration,
    statement: &dyn std::fmt::Display,
    args: &[Value],
    error: Option<&crate::Error>,
) {
    let ms = elapsed.as_secs_f64() * 1000.0;
    let args = args.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(", ");
    match error {
        None => log::debug!(
            "[Queries/{}] - [OK / {} / {:.1}ms] - [{}] - [{}]",
            alias,
            operation,
            ms,
            statement,
            args
        ),
        Some(error) => log::error!(
            "[Queries/{}] - [FAIL / {} / {:.1}ms] - [{}] - [{}] - {:#}",
            alias,
            operation,
            ms,
            statement,
            args,
            error
        ),
    }
}
