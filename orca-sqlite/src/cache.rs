use crate::CBox;
use libsqlite3_sys::sqlite3_stmt;
use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
};

const CAPACITY: usize = 256;

/// Prepared statements of a connection keyed by their SQL text. Lookups share the lock,
/// inserts take it exclusively. Only single statement queries are kept.
#[derive(Default)]
pub(crate) struct StatementCache {
    statements: RwLock<HashMap<String, Arc<CBox<sqlite3_stmt>>>>,
}

impl StatementCache {
    pub(crate) fn get(&self, sql: &str) -> Option<Arc<CBox<sqlite3_stmt>>> {
        self.statements
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(sql)
            .cloned()
    }

    /// Keep `statement` for `sql`, the whole cache is dropped once it is full.
    pub(crate) fn insert(&self, sql: String, statement: CBox<sqlite3_stmt>) {
        let mut statements = self
            .statements
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if statements.len() >= CAPACITY {
            log::debug!("Clearing {} cached sqlite statements", statements.len());
            statements.clear();
        }
        statements.insert(sql, Arc::new(statement));
    }

    pub(crate) fn len(&self) -> usize {
        self.statements
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        ptr,
        sync::atomic::{AtomicUsize, Ordering},
    };

    static RELEASED: AtomicUsize = AtomicUsize::new(0);

    fn statement(address: usize) -> CBox<sqlite3_stmt> {
        CBox::new(ptr::without_provenance_mut(address), |_| {
            RELEASED.fetch_add(1, Ordering::Relaxed);
        })
    }

    #[test]
    fn keyed_by_text_and_bounded() {
        let cache = StatementCache::default();
        cache.insert("SELECT 1".into(), statement(8));
        assert_eq!(cache.get("SELECT 1").map(|v| v.ptr as usize), Some(8));
        assert!(cache.get("SELECT 2").is_none());
        for i in 1..CAPACITY {
            cache.insert(format!("SELECT {}", i + 1), statement(8 * (i + 1)));
        }
        assert_eq!(cache.len(), CAPACITY);
        cache.insert("SELECT 0".into(), statement(16));
        assert_eq!(cache.len(), 1);
        assert_eq!(RELEASED.load(Ordering::Relaxed), CAPACITY);
    }
}
