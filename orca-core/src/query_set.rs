use crate::{
    Backend, Compiled, Condition, Model, ModelInfo, Orm, OrmError, Params, Result, UpdateOperator,
    Value,
};
use std::{collections::HashMap, sync::Arc};

/// Row bound of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    Rows(u64),
    /// As many rows as the backend can return, written as its maximum count.
    Unlimited,
}

/// Everything a query carries besides its model.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct QuerySpec {
    pub cond: Condition,
    /// `None` writes no LIMIT unless an offset is given.
    pub limit: Option<Limit>,
    pub offset: u64,
    /// Field paths, a leading `-` sorts descending.
    pub orders: Vec<String>,
    pub groups: Vec<String>,
    pub distinct: bool,
    /// Relation paths loaded together with the base rows.
    pub related: Vec<String>,
    /// Relation depth loaded when `related` is empty, 0 to load nothing.
    pub rel_depth: usize,
    pub for_update: bool,
}

impl QuerySpec {
    pub fn filtered(cond: Condition) -> Self {
        Self {
            cond,
            ..Default::default()
        }
    }
}

/// A lazily evaluated query over one model.
///
/// Builder methods return a modified copy, terminal methods compile and run it through an
/// [`Orm`] handle:
///
/// ```ignore
/// let adults = orm
///     .query_table::<User>()?
///     .filter("age__gte", [18])?
///     .order_by(["-created"])
///     .limit(10)
///     .all::<User, _>(&mut orm)
///     .await?;
/// ```
#[derive(Debug, Clone)]
pub struct QuerySet {
    info: Arc<ModelInfo>,
    spec: QuerySpec,
}

impl QuerySet {
    pub fn new(info: Arc<ModelInfo>) -> Self {
        Self {
            info,
            spec: Default::default(),
        }
    }

    pub fn info(&self) -> &Arc<ModelInfo> {
        &self.info
    }

    pub fn spec(&self) -> &QuerySpec {
        &self.spec
    }

    pub fn filter<I, V>(&self, expr: &str, values: I) -> Result<Self>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let mut result = self.clone();
        result.spec.cond = self.spec.cond.and(expr, values)?;
        Ok(result)
    }

    pub fn exclude<I, V>(&self, expr: &str, values: I) -> Result<Self>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let mut result = self.clone();
        result.spec.cond = self.spec.cond.and_not(expr, values)?;
        Ok(result)
    }

    /// Replace the condition.
    pub fn set_cond(&self, cond: Condition) -> Self {
        let mut result = self.clone();
        result.spec.cond = cond;
        result
    }

    pub fn limit(&self, rows: u64) -> Self {
        let mut result = self.clone();
        result.spec.limit = Some(Limit::Rows(rows));
        result
    }

    pub fn unlimited(&self) -> Self {
        let mut result = self.clone();
        result.spec.limit = Some(Limit::Unlimited);
        result
    }

    pub fn offset(&self, rows: u64) -> Self {
        let mut result = self.clone();
        result.spec.offset = rows;
        result
    }

    pub fn order_by<I, S>(&self, exprs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut result = self.clone();
        result.spec.orders = exprs.into_iter().map(Into::into).collect();
        result
    }

    pub fn group_by<I, S>(&self, exprs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut result = self.clone();
        result.spec.groups = exprs.into_iter().map(Into::into).collect();
        result
    }

    pub fn distinct(&self) -> Self {
        let mut result = self.clone();
        result.spec.distinct = true;
        result
    }

    /// Load the given relation paths with the rows, every relation one level deep when empty.
    pub fn related_sel<I, S>(&self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut result = self.clone();
        result.spec.related = paths.into_iter().map(Into::into).collect();
        if result.spec.related.is_empty() {
            result.spec.rel_depth = result.spec.rel_depth.max(1);
        }
        result
    }

    /// Load every relation up to `depth` hops.
    pub fn related_depth(&self, depth: usize) -> Self {
        let mut result = self.clone();
        result.spec.related.clear();
        result.spec.rel_depth = depth;
        result
    }

    pub fn for_update(&self) -> Self {
        let mut result = self.clone();
        result.spec.for_update = true;
        result
    }

    fn check_model<M: Model>(&self) -> Result<()> {
        let name = M::definition().name;
        if name != self.info.name {
            let error = OrmError::usage(format!(
                "Cannot load rows of `{}` into a container of `{}`",
                self.info.name, name
            ));
            log::error!("{:#}", error);
            return Err(error);
        }
        Ok(())
    }

    /// The statement or filter document the backend would run for `all`.
    pub fn compile<B: Backend>(&self, orm: &Orm<B>) -> Result<Compiled> {
        orm.backend().compile(&self.info, &self.spec)
    }

    pub async fn all<M: Model, B: Backend>(&self, orm: &mut Orm<B>) -> Result<Vec<M>> {
        let mut result = Vec::new();
        self.all_into(orm, &mut result).await?;
        Ok(result)
    }

    /// Load the matching rows into `container`, replacing its content. Returns the count.
    pub async fn all_into<M: Model, B: Backend>(
        &self,
        orm: &mut Orm<B>,
        container: &mut Vec<M>,
    ) -> Result<u64> {
        self.check_model::<M>()?;
        orm.backend_mut()
            .read_batch(&self.info, &self.spec, container)
            .await
    }

    /// The single first matching row, a not found error when nothing matches.
    pub async fn one<M: Model, B: Backend>(&self, orm: &mut Orm<B>) -> Result<M> {
        let mut result = Vec::with_capacity(1);
        self.limit(1).all_into(orm, &mut result).await?;
        match result.pop() {
            Some(v) => Ok(v),
            None => Err(OrmError::NotFound.into()),
        }
    }

    pub async fn count<B: Backend>(&self, orm: &mut Orm<B>) -> Result<u64> {
        orm.backend_mut().count(&self.info, &self.spec).await
    }

    pub async fn exist<B: Backend>(&self, orm: &mut Orm<B>) -> Result<bool> {
        Ok(self.count(orm).await? > 0)
    }

    /// Update every matching row, refused when the condition is empty.
    pub async fn update<B: Backend>(&self, orm: &mut Orm<B>, params: Params) -> Result<u64> {
        self.update_with(orm, UpdateOperator::Set, params).await
    }

    /// Like [`update`](Self::update), `operator` selects the document update operator.
    pub async fn update_with<B: Backend>(
        &self,
        orm: &mut Orm<B>,
        operator: UpdateOperator,
        params: Params,
    ) -> Result<u64> {
        orm.backend_mut()
            .update_batch(&self.info, &self.spec, operator, &params)
            .await
    }

    /// Delete every matching row and apply the delete policies of the dependents. Refused
    /// when the condition is empty.
    pub async fn delete<B: Backend>(&self, orm: &mut Orm<B>) -> Result<u64> {
        crate::delete_batch(orm.backend_mut(), self.info.clone(), self.spec.clone()).await
    }

    /// One map per row, keyed by the requested expressions (field names when none).
    pub async fn values<B: Backend>(
        &self,
        orm: &mut Orm<B>,
        exprs: &[&str],
    ) -> Result<Vec<HashMap<String, Value>>> {
        let (labels, rows) = orm
            .backend_mut()
            .values(&self.info, &self.spec, exprs)
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| labels.iter().cloned().zip(row).collect())
            .collect())
    }

    pub async fn values_list<B: Backend>(
        &self,
        orm: &mut Orm<B>,
        exprs: &[&str],
    ) -> Result<Vec<Vec<Value>>> {
        let (_, rows) = orm
            .backend_mut()
            .values(&self.info, &self.spec, exprs)
            .await?;
        Ok(rows)
    }

    /// The values of a single expression.
    pub async fn values_flat<B: Backend>(&self, orm: &mut Orm<B>, expr: &str) -> Result<Vec<Value>> {
        let (_, rows) = orm
            .backend_mut()
            .values(&self.info, &self.spec, &[expr])
            .await?;
        Ok(rows.into_iter().filter_map(|v| v.into_iter().next()).collect())
    }
}
