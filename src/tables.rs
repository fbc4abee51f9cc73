//! Lazily loaded secondary indexes: brand -> models and OS -> versions.
//!
//! Tables are built in full from one bulk fetch and swapped in atomically.
//! A per-table gate lets concurrent first callers share a single fetch; the
//! data lock itself is never held across the network call.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use crate::error::Result;

/// Keys in first-seen order plus the values grouped under each key
#[derive(Debug, Clone)]
pub struct AuxIndex<V> {
    keys: Vec<String>,
    values: HashMap<String, Vec<V>>,
}

impl<V> AuxIndex<V> {
    pub fn build<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, V)>,
    {
        let mut keys = Vec::new();
        let mut values: HashMap<String, Vec<V>> = HashMap::new();
        for (key, value) in entries {
            match values.get_mut(&key) {
                Some(group) => group.push(value),
                None => {
                    keys.push(key.clone());
                    values.insert(key, vec![value]);
                }
            }
        }
        Self { keys, values }
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn values(&self, key: &str) -> Option<&[V]> {
        self.values.get(key).map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[derive(Debug)]
struct Slot<V> {
    current: Option<Arc<AuxIndex<V>>>,
    /// Last table dropped by invalidation, served only when a reload fails
    previous: Option<Arc<AuxIndex<V>>>,
}

/// A lazily loaded [`AuxIndex`] shared by every caller of a client
#[derive(Debug)]
pub struct AuxTable<V> {
    name: &'static str,
    slot: Mutex<Slot<V>>,
    gate: tokio::sync::Mutex<()>,
}

impl<V> AuxTable<V> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            slot: Mutex::new(Slot {
                current: None,
                previous: None,
            }),
            gate: tokio::sync::Mutex::new(()),
        }
    }

    /// The current table, if one has been loaded and holds data
    pub fn loaded(&self) -> Option<Arc<AuxIndex<V>>> {
        self.slot
            .lock()
            .current
            .as_ref()
            .filter(|index| !index.is_empty())
            .cloned()
    }

    /// Drop the current table; the next access reloads it
    pub fn invalidate(&self) {
        let mut slot = self.slot.lock();
        if let Some(current) = slot.current.take() {
            slot.previous = Some(current);
        }
    }

    /// Drop the table and any stale fallback
    pub fn reset(&self) {
        let mut slot = self.slot.lock();
        slot.current = None;
        slot.previous = None;
    }

    /// Return the loaded table, fetching and building it first if needed.
    ///
    /// When the fetch fails and a stale table from before the last
    /// invalidation exists, the stale table is served and the error logged.
    pub async fn get_or_load<F, Fut>(&self, fetch: F) -> Result<Arc<AuxIndex<V>>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<AuxIndex<V>>>,
    {
        if let Some(index) = self.loaded() {
            return Ok(index);
        }

        let _gate = self.gate.lock().await;
        if let Some(index) = self.loaded() {
            return Ok(index);
        }

        match fetch().await {
            Ok(index) => {
                let index = Arc::new(index);
                tracing::debug!("{} table loaded with {} keys", self.name, index.keys().len());
                let mut slot = self.slot.lock();
                slot.current = Some(index.clone());
                slot.previous = None;
                Ok(index)
            }
            Err(e) => {
                let stale = self
                    .slot
                    .lock()
                    .previous
                    .as_ref()
                    .filter(|index| !index.is_empty())
                    .cloned();
                match stale {
                    Some(index) => {
                        tracing::warn!("Failed to reload {} table, serving stale data: {}", self.name, e);
                        Ok(index)
                    }
                    None => Err(e),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WmError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn os_entries() -> Vec<(String, String)> {
        vec![
            ("Android".to_string(), "7.0".to_string()),
            ("Android".to_string(), "".to_string()),
            ("iOS".to_string(), "10.2".to_string()),
        ]
    }

    #[test]
    fn test_build_keeps_first_seen_order() {
        let index = AuxIndex::build(os_entries());
        assert_eq!(index.keys(), ["Android", "iOS"]);
        assert_eq!(index.values("Android").unwrap(), ["7.0", ""]);
        assert_eq!(index.values("iOS").unwrap(), ["10.2"]);
        assert!(index.values("Symbian").is_none());
    }

    #[tokio::test]
    async fn test_loads_once() {
        let table: AuxTable<String> = AuxTable::new("os");
        let fetches = AtomicUsize::new(0);

        for _ in 0..3 {
            let index = table
                .get_or_load(|| async {
                    fetches.fetch_add(1, Ordering::SeqCst);
                    Ok(AuxIndex::build(os_entries()))
                })
                .await
                .unwrap();
            assert_eq!(index.keys().len(), 2);
        }
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalidate_forces_reload() {
        let table: AuxTable<String> = AuxTable::new("os");
        table
            .get_or_load(|| async { Ok(AuxIndex::build(os_entries())) })
            .await
            .unwrap();
        table.invalidate();
        assert!(table.loaded().is_none());

        let index = table
            .get_or_load(|| async {
                Ok(AuxIndex::build(vec![("Tizen".to_string(), "3.0".to_string())]))
            })
            .await
            .unwrap();
        assert_eq!(index.keys(), ["Tizen"]);
    }

    #[tokio::test]
    async fn test_failed_reload_serves_stale_table() {
        let table: AuxTable<String> = AuxTable::new("os");
        table
            .get_or_load(|| async { Ok(AuxIndex::build(os_entries())) })
            .await
            .unwrap();
        table.invalidate();

        let index = table
            .get_or_load(|| async { Err(WmError::InvalidServerInfo) })
            .await
            .unwrap();
        assert_eq!(index.keys(), ["Android", "iOS"]);
        // stale data is not promoted back to current
        assert!(table.loaded().is_none());
    }

    #[tokio::test]
    async fn test_failed_first_load_errors() {
        let table: AuxTable<String> = AuxTable::new("os");
        let result = table
            .get_or_load(|| async { Err(WmError::InvalidServerInfo) })
            .await;
        assert!(matches!(result, Err(WmError::InvalidServerInfo)));

        table.reset();
        assert!(table.loaded().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_first_callers_share_fetch() {
        let table: Arc<AuxTable<String>> = Arc::new(AuxTable::new("os"));
        let fetches = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let table = table.clone();
                let fetches = fetches.clone();
                tokio::spawn(async move {
                    table
                        .get_or_load(|| async move {
                            fetches.fetch_add(1, Ordering::SeqCst);
                            tokio::task::yield_now().await;
                            Ok(AuxIndex::build(os_entries()))
                        })
                        .await
                        .map(|index| index.keys().len())
                })
            })
            .collect();

        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap(), 2);
        }
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }
}
