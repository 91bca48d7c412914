//! Collection store contract.
//!
//! The local replica is authoritative and lives outside the core. The
//! coordinator and resolver only read and write whole versions through
//! this trait; document content never flows through the sync layer.
//!
//! Retrieval is deliberately oblivious to cultural-validation state: a
//! version loads the same whether its status is pending, approved,
//! rejected, or disputed.

use crate::error::{SyncError, SyncResult};
use arkivo_types::{CollectionId, CollectionVersion};

/// The authoritative local replica of every collection.
pub trait CollectionStore: Send + Sync {
    /// Loads the current local version, or `None` if the collection is not
    /// held locally.
    fn load_collection(&self, id: &CollectionId) -> SyncResult<Option<CollectionVersion>>;

    /// Writes a new current version for the collection.
    fn save_collection(&self, id: &CollectionId, version: CollectionVersion) -> SyncResult<()>;

    /// Lists every collection id held locally.
    fn list_collection_ids(&self) -> SyncResult<Vec<CollectionId>>;
}

/// An in-memory store for tests and demos.
pub mod memory {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// A `CollectionStore` backed by a map, with write-failure injection
    /// for exercising apply-failure paths.
    #[derive(Default)]
    pub struct MemoryCollectionStore {
        collections: Mutex<HashMap<CollectionId, CollectionVersion>>,
        fail_writes: AtomicBool,
    }

    impl MemoryCollectionStore {
        /// Creates an empty store.
        pub fn new() -> Self {
            Self::default()
        }

        /// Makes every subsequent save fail until cleared.
        pub fn set_fail_writes(&self, fail: bool) {
            self.fail_writes.store(fail, Ordering::SeqCst);
        }

        /// Number of collections held.
        pub fn len(&self) -> usize {
            self.collections.lock().unwrap().len()
        }

        /// Whether the store is empty.
        pub fn is_empty(&self) -> bool {
            self.len() == 0
        }
    }

    impl CollectionStore for MemoryCollectionStore {
        fn load_collection(&self, id: &CollectionId) -> SyncResult<Option<CollectionVersion>> {
            Ok(self.collections.lock().unwrap().get(id).cloned())
        }

        fn save_collection(
            &self,
            id: &CollectionId,
            version: CollectionVersion,
        ) -> SyncResult<()> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(SyncError::Store("write rejected".into()));
            }
            self.collections.lock().unwrap().insert(*id, version);
            Ok(())
        }

        fn list_collection_ids(&self) -> SyncResult<Vec<CollectionId>> {
            let mut ids: Vec<CollectionId> =
                self.collections.lock().unwrap().keys().copied().collect();
            ids.sort();
            Ok(ids)
        }
    }
}
