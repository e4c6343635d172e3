use crate::Result;
use bson::{Bson, Document};
use std::future::Future;

/// Cursor options of a find.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct FindSpec {
    pub sort: Option<Document>,
    pub skip: Option<u64>,
    pub limit: Option<i64>,
    pub projection: Option<Document>,
}

/// The operations the document backend consumes from a driver. Collections are addressed
/// by name inside the database the executor was opened on.
pub trait DocumentExecutor: Send {
    fn find(
        &mut self,
        collection: &str,
        filter: Document,
        spec: FindSpec,
    ) -> impl Future<Output = Result<Vec<Document>>> + Send;

    fn count(
        &mut self,
        collection: &str,
        filter: Document,
    ) -> impl Future<Output = Result<u64>> + Send;

    /// Identifiers of the inserted documents, in insertion order.
    fn insert_many(
        &mut self,
        collection: &str,
        documents: Vec<Document>,
    ) -> impl Future<Output = Result<Vec<Bson>>> + Send;

    /// Number of documents matched by `filter`, changed or not.
    fn update_many(
        &mut self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> impl Future<Output = Result<u64>> + Send;

    fn delete_many(
        &mut self,
        collection: &str,
        filter: Document,
    ) -> impl Future<Output = Result<u64>> + Send;
}

impl<E: DocumentExecutor> DocumentExecutor for &mut E {
    fn find(
        &mut self,
        collection: &str,
        filter: Document,
        spec: FindSpec,
    ) -> impl Future<Output = Result<Vec<Document>>> + Send {
        (**self).find(collection, filter, spec)
    }

    fn count(
        &mut self,
        collection: &str,
        filter: Document,
    ) -> impl Future<Output = Result<u64>> + Send {
        (**self).count(collection, filter)
    }

    fn insert_many(
        &mut self,
        collection: &str,
        documents: Vec<Document>,
    ) -> impl Future<Output = Result<Vec<Bson>>> + Send {
        (**self).insert_many(collection, documents)
    }

    fn update_many(
        &mut self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> impl Future<Output = Result<u64>> + Send {
        (**self).update_many(collection, filter, update)
    }

    fn delete_many(
        &mut self,
        collection: &str,
        filter: Document,
    ) -> impl Future<Output = Result<u64>> + Send {
        (**self).delete_many(collection, filter)
    }
}
