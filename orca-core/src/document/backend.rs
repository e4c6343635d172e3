use crate::{
    Alias, Backend, Collect, Compiled, DocumentCompiler, DocumentExecutor, FindSpec, Model,
    ModelInfo, OrmError, Params, QuerySpec, Record, Registry, Result, UpdateOperator, Value,
    backend::{log_query, missing_pk_error, required_pk},
    document::{ID_KEY, bson_to_value, document_key, value_to_bson},
    marshal::{collect_values, from_storage, is_zero},
};
use bson::{Document, doc};
use std::{sync::Arc, time::Instant};

/// Backend of the document family: filters compile to bson documents and run on a
/// [`DocumentExecutor`]. Collections are named after the model table.
pub struct DocumentBackend<E: DocumentExecutor> {
    executor: E,
    registry: Arc<Registry>,
    alias: Arc<Alias>,
}

impl<E: DocumentExecutor> DocumentBackend<E> {
    pub fn new(registry: Arc<Registry>, alias: Arc<Alias>, executor: E) -> Result<Self> {
        if !alias.driver.is_document() {
            let error = OrmError::config(format!(
                "Alias `{}` uses the SQL driver `{}`, not a document one",
                alias.name, alias.driver
            ));
            log::error!("{:#}", error);
            return Err(error);
        }
        Ok(Self {
            executor,
            registry,
            alias,
        })
    }

    pub fn executor(&mut self) -> &mut E {
        &mut self.executor
    }

    pub fn into_executor(self) -> E {
        self.executor
    }

    pub fn compiler<'a>(&'a self, info: &'a ModelInfo) -> DocumentCompiler<'a> {
        DocumentCompiler::new(&self.registry, info, self.alias.time_zone)
    }

    fn logged<T>(
        &self,
        operation: &str,
        collection: &str,
        filter: &Document,
        start: Instant,
        result: Result<T>,
    ) -> Result<T> {
        let statement = format!("{} {}", collection, filter);
        log_query(
            &self.alias.name,
            operation,
            start.elapsed(),
            &statement,
            &[],
            result.as_ref().err(),
        );
        result
    }

    async fn find(
        &mut self,
        collection: &str,
        filter: Document,
        spec: FindSpec,
    ) -> Result<Vec<Document>> {
        let start = Instant::now();
        let logged = filter.clone();
        let result = self.executor.find(collection, filter, spec).await;
        self.logged("find", collection, &logged, start, result)
    }

    /// Equality filter on the given fields, the primary key when empty.
    fn record_filter(
        &self,
        info: &ModelInfo,
        record: &mut dyn Record,
        cols: &[&str],
    ) -> Result<Document> {
        let tz = self.alias.time_zone;
        let fields = if cols.is_empty() {
            required_pk(info, record, &self.alias)?;
            vec![info.primary_key()]
        } else {
            cols.iter()
                .map(|col| {
                    info.get_by_any(col).filter(|f| f.is_column()).ok_or_else(|| {
                        let error = OrmError::usage(format!(
                            "Unknown column `{}` of model `{}`",
                            col, info.name
                        ));
                        log::error!("{:#}", error);
                        error
                    })
                })
                .collect::<Result<Vec<_>>>()?
        };
        let collected = collect_values(info, record, &fields, Collect::Filter, tz)?;
        let mut filter = Document::new();
        for (field, value) in fields.iter().zip(collected.values) {
            filter.insert(document_key(field), value_to_bson(value, tz)?);
        }
        Ok(filter)
    }

    fn set_from_document(
        &self,
        info: &ModelInfo,
        record: &mut dyn Record,
        mut document: Document,
    ) -> Result<()> {
        let tz = self.alias.time_zone;
        for field in info.column_fields() {
            let raw = document
                .remove(document_key(field))
                .map(bson_to_value)
                .unwrap_or_default();
            let value = from_storage(field, raw, tz)?;
            record.set_value(field.name, value)?;
        }
        Ok(())
    }
}

impl<E: DocumentExecutor> Backend for DocumentBackend<E> {
    fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    fn alias(&self) -> &Arc<Alias> {
        &self.alias
    }

    fn compile(&self, info: &Arc<ModelInfo>, spec: &QuerySpec) -> Result<Compiled> {
        let compiler = self.compiler(info);
        Ok(Compiled::Document {
            collection: info.table.to_string(),
            filter: compiler.filter(&spec.cond)?,
            find: compiler.find_spec(spec)?,
        })
    }

    async fn read(
        &mut self,
        info: &Arc<ModelInfo>,
        record: &mut dyn Record,
        cols: &[&str],
        _for_update: bool,
    ) -> Result<()> {
        let filter = self.record_filter(info, record, cols)?;
        let spec = FindSpec {
            limit: Some(1),
            ..Default::default()
        };
        let documents = self.find(info.table, filter, spec).await?;
        let Some(document) = documents.into_iter().next() else {
            log::debug!("No `{}` document matches the read", info.name);
            return Err(OrmError::NotFound.into());
        };
        self.set_from_document(info, record, document)
    }

    async fn insert(
        &mut self,
        info: &Arc<ModelInfo>,
        records: &mut [&mut dyn Record],
        bulk: usize,
    ) -> Result<u64> {
        let tz = self.alias.time_zone;
        let pk = info.primary_key();
        let fields = info.column_fields().collect::<Vec<_>>();
        let mut total = 0;
        for chunk in records.chunks_mut(bulk.max(1)) {
            let mut documents = Vec::with_capacity(chunk.len());
            let mut generated = Vec::with_capacity(chunk.len());
            for record in chunk.iter_mut() {
                let collected = collect_values(info, &mut **record, &fields, Collect::Insert, tz)?;
                let mut document = Document::new();
                let mut has_key = false;
                for (column, value) in collected.columns.iter().zip(collected.values) {
                    let field = info.get_by_column(column).unwrap_or(pk);
                    if field.primary_key {
                        if is_zero(&value) {
                            continue;
                        }
                        has_key = true;
                    }
                    document.insert(document_key(field), value_to_bson(value, tz)?);
                }
                if !has_key && !pk.storage_type().is_string() {
                    let error = OrmError::usage(format!(
                        "`{}` has no key value and the document store only generates text keys",
                        info.name
                    ));
                    log::error!("{:#}", error);
                    return Err(error);
                }
                generated.push(!has_key);
                documents.push(document);
            }
            let start = Instant::now();
            let result = self.executor.insert_many(info.table, documents).await;
            let ids = self.logged("insert_many", info.table, &Document::new(), start, result)?;
            for ((record, generated), id) in chunk.iter_mut().zip(generated).zip(&ids) {
                if generated {
                    let value = from_storage(pk, bson_to_value(id.clone()), tz)?;
                    record.set_value(pk.name, value)?;
                }
            }
            total += ids.len() as u64;
        }
        Ok(total)
    }

    async fn update(
        &mut self,
        info: &Arc<ModelInfo>,
        record: &mut dyn Record,
        cols: &[&str],
    ) -> Result<u64> {
        let tz = self.alias.time_zone;
        let filter = self.record_filter(info, record, &[])?;
        let fields = if cols.is_empty() {
            info.column_fields().filter(|f| !f.primary_key).collect::<Vec<_>>()
        } else {
            let mut fields = Vec::with_capacity(cols.len());
            for col in cols {
                match info.get_by_any(col).filter(|f| f.is_column() && !f.primary_key) {
                    Some(field) => fields.push(field),
                    None => {
                        let error = OrmError::usage(format!(
                            "Cannot update `{}` of model `{}`",
                            col, info.name
                        ));
                        log::error!("{:#}", error);
                        return Err(error);
                    }
                }
            }
            fields
        };
        let collected = collect_values(info, record, &fields, Collect::Update, tz)?;
        if collected.columns.is_empty() {
            return Ok(0);
        }
        let mut set = Document::new();
        for (column, value) in collected.columns.iter().zip(collected.values) {
            let key = info.get_by_column(column).map(document_key).unwrap_or(column);
            set.insert(key, value_to_bson(value, tz)?);
        }
        let start = Instant::now();
        let logged = filter.clone();
        let result = self
            .executor
            .update_many(info.table, filter, doc! { "$set": set })
            .await;
        self.logged("update", info.table, &logged, start, result)
    }

    async fn select_pks(&mut self, info: &Arc<ModelInfo>, spec: &QuerySpec) -> Result<Vec<Value>> {
        let (filter, mut find) = {
            let compiler = self.compiler(info);
            (compiler.filter(&spec.cond)?, compiler.find_spec(spec)?)
        };
        find.projection = Some(doc! { ID_KEY: 1 });
        let documents = self.find(info.table, filter, find).await?;
        Ok(documents
            .into_iter()
            .filter_map(|mut d| d.remove(ID_KEY))
            .map(bson_to_value)
            .collect())
    }

    async fn delete_pks(&mut self, info: &Arc<ModelInfo>, pks: Vec<Value>) -> Result<u64> {
        if pks.is_empty() {
            return Err(missing_pk_error(info));
        }
        let tz = self.alias.time_zone;
        let ids = pks
            .into_iter()
            .map(|v| value_to_bson(v, tz))
            .collect::<Result<Vec<_>>>()?;
        let filter = doc! { ID_KEY: { "$in": ids } };
        let start = Instant::now();
        let logged = filter.clone();
        let result = self.executor.delete_many(info.table, filter).await;
        self.logged("delete", info.table, &logged, start, result)
    }

    async fn update_batch(
        &mut self,
        info: &Arc<ModelInfo>,
        spec: &QuerySpec,
        operator: UpdateOperator,
        params: &Params,
    ) -> Result<u64> {
        if spec.cond.is_empty() {
            return Err(crate::backend::empty_condition_error(info, "update"));
        }
        let (filter, update) = {
            let compiler = self.compiler(info);
            (compiler.filter(&spec.cond)?, compiler.update(operator, params)?)
        };
        let start = Instant::now();
        let logged = filter.clone();
        let result = self.executor.update_many(info.table, filter, update).await;
        self.logged("update_batch", info.table, &logged, start, result)
    }

    async fn count(&mut self, info: &Arc<ModelInfo>, spec: &QuerySpec) -> Result<u64> {
        let filter = self.compiler(info).filter(&spec.cond)?;
        let start = Instant::now();
        let logged = filter.clone();
        let result = self.executor.count(info.table, filter).await;
        self.logged("count", info.table, &logged, start, result)
    }

    async fn read_batch<M: Model>(
        &mut self,
        info: &Arc<ModelInfo>,
        spec: &QuerySpec,
        container: &mut Vec<M>,
    ) -> Result<u64> {
        let (filter, find) = {
            let compiler = self.compiler(info);
            (compiler.filter(&spec.cond)?, compiler.find_spec(spec)?)
        };
        let documents = self.find(info.table, filter, find).await?;
        container.clear();
        container.reserve(documents.len());
        for document in documents {
            let mut record = M::zeroed();
            self.set_from_document(info, &mut record, document)?;
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
        let registry = self.registry.clone();
        let (filter, find, labels, fields) = {
            let compiler = DocumentCompiler::new(&registry, info, tz);
            let (labels, fields) = if exprs.is_empty() {
                info.column_fields()
                    .map(|f| (f.name.to_string(), f))
                    .unzip::<_, _, Vec<_>, Vec<_>>()
            } else {
                let mut labels = Vec::with_capacity(exprs.len());
                let mut fields = Vec::with_capacity(exprs.len());
                for expr in exprs {
                    let path = expr.split("__").map(String::from).collect::<Vec<_>>();
                    labels.push(expr.to_string());
                    fields.push(compiler.resolve(&path)?);
                }
                (labels, fields)
            };
            let filter = compiler.filter(&spec.cond)?;
            let mut find = compiler.find_spec(spec)?;
            find.projection = Some(compiler.projection(&fields));
            (filter, find, labels, fields)
        };
        let documents = self.find(info.table, filter, find).await?;
        let rows = documents
            .into_iter()
            .map(|document| {
                fields
                    .iter()
                    .map(|field| {
                        let raw = document
                            .get(document_key(field))
                            .cloned()
                            .map(bson_to_value)
                            .unwrap_or_default();
                        from_storage(field, raw, tz)
                    })
                    .collect::<Result<Vec<_>>>()
            })
            .collect::<Result<Vec<_>>>()?;
        Ok((labels, rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        Action, AsValue, Condition, DriverKind, FieldDef, FieldType, ModelDef, delete_batch,
        delete_record, unknown_field_error,
    };
    use bson::Bson;
    use std::collections::VecDeque;

    /// Records every call and answers from a queue of canned results.
    #[derive(Default)]
    struct Recorder {
        calls: Vec<(String, String, Document)>,
        found: VecDeque<Vec<Document>>,
        counts: VecDeque<u64>,
    }

    impl DocumentExecutor for Recorder {
        async fn find(
            &mut self,
            collection: &str,
            filter: Document,
            _spec: FindSpec,
        ) -> Result<Vec<Document>> {
            self.calls.push(("find".into(), collection.into(), filter));
            Ok(self.found.pop_front().unwrap_or_default())
        }
        async fn count(&mut self, collection: &str, filter: Document) -> Result<u64> {
            self.calls.push(("count".into(), collection.into(), filter));
            Ok(self.counts.pop_front().unwrap_or_default())
        }
        async fn insert_many(
            &mut self,
            collection: &str,
            documents: Vec<Document>,
        ) -> Result<Vec<Bson>> {
            let ids = documents
                .iter()
                .map(|d| d.get(ID_KEY).cloned().unwrap_or(Bson::String("generated".into())))
                .collect();
            for document in documents {
                self.calls.push(("insert".into(), collection.into(), document));
            }
            Ok(ids)
        }
        async fn update_many(
            &mut self,
            collection: &str,
            filter: Document,
            update: Document,
        ) -> Result<u64> {
            self.calls
                .push(("update".into(), collection.into(), doc! { "filter": filter, "update": update }));
            Ok(self.counts.pop_front().unwrap_or_default())
        }
        async fn delete_many(&mut self, collection: &str, filter: Document) -> Result<u64> {
            self.calls.push(("delete".into(), collection.into(), filter));
            Ok(self.counts.pop_front().unwrap_or_default())
        }
    }

    #[derive(Clone, Default)]
    struct Owner {
        id: String,
        name: String,
    }

    static OWNER: ModelDef = ModelDef {
        name: "tests::Owner",
        table: "owner",
        fields: &[
            FieldDef {
                primary_key: true,
                ..FieldDef::new("id", FieldType::VarChar)
            },
            FieldDef::new("name", FieldType::VarChar),
        ],
    };

    static PET: ModelDef = ModelDef {
        name: "tests::Pet",
        table: "pet",
        fields: &[
            FieldDef {
                primary_key: true,
                ..FieldDef::new("id", FieldType::VarChar)
            },
            FieldDef {
                nullable: true,
                related: Some(|| &OWNER),
                on_delete: Action::SetNull,
                ..FieldDef::new("owner", FieldType::ForeignKey)
            },
        ],
    };

    impl Record for Owner {
        fn model_def(&self) -> &'static ModelDef {
            &OWNER
        }
        fn get_value(&self, field: &str) -> Result<Value> {
            match field {
                "id" => Ok(self.id.clone().as_value()),
                "name" => Ok(self.name.clone().as_value()),
                _ => Err(unknown_field_error(OWNER.name, field)),
            }
        }
        fn set_value(&mut self, field: &str, value: Value) -> Result<()> {
            match field {
                "id" => self.id = String::try_from_value(value)?,
                "name" => self.name = String::try_from_value(value)?,
                _ => return Err(unknown_field_error(OWNER.name, field)),
            }
            Ok(())
        }
        fn related(&self, _field: &str) -> Option<&dyn Record> {
            None
        }
        fn related_mut(&mut self, _field: &str) -> Option<&mut dyn Record> {
            None
        }
    }

    impl Model for Owner {
        fn definition() -> &'static ModelDef {
            &OWNER
        }
        fn zeroed() -> Self {
            Default::default()
        }
    }

    fn backend() -> DocumentBackend<Recorder> {
        let registry = Arc::new(Registry::new());
        registry.register_definition(&OWNER, false).unwrap();
        registry.register_definition(&PET, false).unwrap();
        let alias = Arc::new(Alias::new("docs", DriverKind::Mongo));
        DocumentBackend::new(registry, alias, Recorder::default()).unwrap()
    }

    #[tokio::test]
    async fn insert_writes_back_generated_key() {
        let mut backend = backend();
        let info = backend.registry().model::<Owner>().unwrap();
        let mut owner = Owner {
            name: "ann".into(),
            ..Default::default()
        };
        let inserted = backend
            .insert(&info, &mut [&mut owner as &mut dyn Record], 10)
            .await
            .unwrap();
        assert_eq!(inserted, 1);
        assert_eq!(owner.id, "generated");
        assert_eq!(
            backend.executor().calls[0],
            ("insert".into(), "owner".into(), doc! { "name": "ann" })
        );
    }

    #[tokio::test]
    async fn read_by_key() {
        let mut backend = backend();
        let info = backend.registry().model::<Owner>().unwrap();
        backend
            .executor()
            .found
            .push_back(vec![doc! { "_id": "o1", "name": "bob" }]);
        let mut owner = Owner {
            id: "o1".into(),
            ..Default::default()
        };
        backend.read(&info, &mut owner, &[], false).await.unwrap();
        assert_eq!(owner.name, "bob");
        let error = backend.read(&info, &mut owner, &[], false).await.unwrap_err();
        assert!(OrmError::is_not_found(&error));
    }

    #[tokio::test]
    async fn delete_sets_dependents_null() {
        let mut backend = backend();
        let info = backend.registry().model::<Owner>().unwrap();
        backend.executor().counts.extend([1, 2]);
        let mut owner = Owner {
            id: "o7".into(),
            name: "carl".into(),
        };
        let deleted = delete_record(&mut backend, &info, &mut owner, &[])
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        assert!(owner.id.is_empty());
        let calls = &backend.executor().calls;
        assert_eq!(calls[0], ("delete".into(), "owner".into(), doc! { "_id": { "$in": ["o7"] } }));
        assert_eq!(
            calls[1],
            (
                "update".into(),
                "pet".into(),
                doc! {
                    "filter": { "owner": { "$in": ["o7"] } },
                    "update": { "$set": { "owner": null } },
                }
            )
        );
    }

    #[tokio::test]
    async fn empty_batch_is_refused() {
        let mut backend = backend();
        let info = backend.registry().model::<Owner>().unwrap();
        let error = delete_batch(&mut backend, info, QuerySpec::filtered(Condition::new()))
            .await
            .unwrap_err();
        assert_eq!(OrmError::kind_of(&error), crate::ErrorKind::Usage);
        assert!(backend.executor().calls.is_empty());
    }
}
