use crate::MongoConnection;
use bson::{Bson, Document, oid::ObjectId};
use futures::TryStreamExt;
use orca_core::{Context, DocumentExecutor, FindSpec, ID_KEY, Result};

impl DocumentExecutor for MongoConnection {
    async fn find(
        &mut self,
        collection: &str,
        filter: Document,
        spec: FindSpec,
    ) -> Result<Vec<Document>> {
        let handle = self.collection(collection);
        let mut find = handle.find(filter);
        if let Some(sort) = spec.sort {
            find = find.sort(sort);
        }
        if let Some(skip) = spec.skip {
            find = find.skip(skip);
        }
        if let Some(limit) = spec.limit {
            find = find.limit(limit);
        }
        if let Some(projection) = spec.projection {
            find = find.projection(projection);
        }
        let cursor = find
            .await
            .with_context(|| format!("While querying the collection `{}`", collection))?;
        cursor
            .try_collect()
            .await
            .with_context(|| format!("While reading the collection `{}`", collection))
    }

    async fn count(&mut self, collection: &str, filter: Document) -> Result<u64> {
        self.collection(collection)
            .count_documents(filter)
            .await
            .with_context(|| format!("While counting the collection `{}`", collection))
    }

    async fn insert_many(
        &mut self,
        collection: &str,
        mut documents: Vec<Document>,
    ) -> Result<Vec<Bson>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }
        // Keys are generated as text so that filters on the key read them back unchanged
        for document in documents.iter_mut() {
            if !document.contains_key(ID_KEY) {
                document.insert(ID_KEY, ObjectId::new().to_hex());
            }
        }
        let result = self
            .collection(collection)
            .insert_many(documents)
            .await
            .with_context(|| format!("While inserting into the collection `{}`", collection))?;
        let mut ids = result.inserted_ids.into_iter().collect::<Vec<_>>();
        ids.sort_by_key(|(index, _)| *index);
        Ok(ids.into_iter().map(|(_, id)| id).collect())
    }

    async fn update_many(
        &mut self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> Result<u64> {
        let result = self
            .collection(collection)
            .update_many(filter, update)
            .await
            .with_context(|| format!("While updating the collection `{}`", collection))?;
        Ok(result.matched_count)
    }

    async fn delete_many(&mut self, collection: &str, filter: Document) -> Result<u64> {
        let result = self
            .collection(collection)
            .delete_many(filter)
            .await
            .with_context(|| format!("While deleting from the collection `{}`", collection))?;
        Ok(result.deleted_count)
    }
}
