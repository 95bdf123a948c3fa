use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use retrieval_core::config::Settings;
use retrieval_core::error::{Error, Result};
use retrieval_core::types::{Chunk, Hit, HitBundle, QueryRequest, SearchType};
use retrieval_vector::{chunk_table_path, load_chunks};

use crate::indexing;
use crate::retriever::HybridRetriever;
use crate::snapshot;

fn poisoned<T>(_: T) -> Error { Error::Operation("collection lock poisoned".to_string()) }

/// A named collection: its storage directory and live retriever.
pub struct Collection {
    name: String,
    path: PathBuf,
    retriever: Mutex<HybridRetriever>,
}

impl Collection {
    pub fn name(&self) -> &str { &self.name }

    pub fn path(&self) -> &Path { &self.path }

    /// Number of live chunks.
    pub fn len(&self) -> Result<usize> { Ok(self.lock()?.len()) }

    pub fn is_empty(&self) -> Result<bool> { Ok(self.len()? == 0) }

    fn lock(&self) -> Result<MutexGuard<'_, HybridRetriever>> { self.retriever.lock().map_err(poisoned) }
}

/// Owns every collection of the process.
///
/// Collections are created on first use of an unknown name. Each one is
/// guarded by its own mutex, which every mutation, query, flush and snapshot
/// operation on it holds for its whole duration.
pub struct CollectionManager {
    settings: Settings,
    paths: RwLock<BTreeMap<String, PathBuf>>,
    collections: RwLock<HashMap<String, Arc<Collection>>>,
}

impl CollectionManager {
    pub fn new(settings: Settings) -> Self {
        let paths = settings.collections.clone();
        Self { settings, paths: RwLock::new(paths), collections: RwLock::new(HashMap::new()) }
    }

    pub fn settings(&self) -> &Settings { &self.settings }

    /// Rebuild the retriever of every configured collection and of every
    /// directory under `<base_dir>/collections/` that holds a chunk table.
    /// Returns the number of collections loaded.
    pub fn init(&self) -> Result<usize> {
        let mut names: BTreeSet<String> = self.paths.read().map_err(poisoned)?.keys().cloned().collect();
        let root = self.settings.collections_root();
        if root.is_dir() {
            for entry in fs::read_dir(&root)? {
                let entry = entry?;
                if entry.file_type()?.is_dir() && chunk_table_path(&entry.path()).is_some() {
                    if let Some(name) = entry.file_name().to_str() {
                        names.insert(name.to_string());
                    }
                }
            }
        }
        for name in &names {
            self.reload(name)?;
        }
        tracing::info!(collections = names.len(), root = %root.display(), "collection manager initialized");
        Ok(names.len())
    }

    /// Rebuild the live retriever of `name` from its persisted chunk table.
    ///
    /// The swap happens inside the existing collection while its lock is
    /// held, so it is ordered with every other operation on it. Upserts that
    /// were never persisted are dropped. Returns the number of chunks loaded.
    pub fn reload(&self, name: &str) -> Result<usize> {
        let collection = self.ensure(name)?;
        let mut live = collection.lock()?;
        let chunks = load_chunks(&collection.path)?;
        let mut rebuilt = self.new_retriever()?;
        rebuilt.upsert(&chunks)?;
        *live = rebuilt;
        tracing::info!(collection = name, chunks = chunks.len(), "loaded collection from disk");
        Ok(chunks.len())
    }

    /// Storage directory of `name`: the configured path, else
    /// `<base_dir>/collections/<name>`.
    pub fn path_for(&self, name: &str) -> PathBuf {
        match self.paths.read() {
            Ok(paths) => paths.get(name).cloned().unwrap_or_else(|| self.settings.collection_path(name)),
            Err(_) => self.settings.collection_path(name),
        }
    }

    /// Configured and live collection names, sorted.
    pub fn collections(&self) -> Result<Vec<String>> {
        let mut names: BTreeSet<String> = self.paths.read().map_err(poisoned)?.keys().cloned().collect();
        names.extend(self.collections.read().map_err(poisoned)?.keys().cloned());
        Ok(names.into_iter().collect())
    }

    pub fn get(&self, name: &str) -> Result<Option<Arc<Collection>>> {
        Ok(self.collections.read().map_err(poisoned)?.get(name).cloned())
    }

    fn new_retriever(&self) -> Result<HybridRetriever> { HybridRetriever::with_keyword_backend(self.settings.search.keyword_backend) }

    fn ensure(&self, name: &str) -> Result<Arc<Collection>> {
        if let Some(existing) = self.get(name)? {
            return Ok(existing);
        }
        let mut collections = self.collections.write().map_err(poisoned)?;
        if let Some(existing) = collections.get(name) {
            return Ok(Arc::clone(existing));
        }
        let path = self.path_for(name);
        self.paths.write().map_err(poisoned)?.entry(name.to_string()).or_insert_with(|| path.clone());
        let collection =
            Arc::new(Collection { name: name.to_string(), path, retriever: Mutex::new(self.new_retriever()?) });
        collections.insert(name.to_string(), Arc::clone(&collection));
        tracing::info!(collection = name, path = %collection.path.display(), "created collection");
        Ok(collection)
    }

    pub fn upsert(&self, name: &str, chunks: &[Chunk]) -> Result<usize> { self.ensure(name)?.lock()?.upsert(chunks) }

    pub fn delete(&self, name: &str, ids: &[String]) -> Result<usize> { self.ensure(name)?.lock()?.delete(ids) }

    pub fn query(
        &self,
        name: &str,
        texts: &[String],
        k: usize,
        where_filter: Option<&Value>,
        where_document: Option<&Value>,
        search_type: SearchType,
    ) -> Result<Vec<Hit>> {
        self.ensure(name)?.lock()?.query(texts, k, where_filter, where_document, search_type)
    }

    /// Answer an API request, filling `k` and `search_type` from settings.
    pub fn search(&self, request: &QueryRequest) -> Result<HitBundle> {
        let k = request.k.unwrap_or(self.settings.search.default_k);
        let search_type = request.search_type.unwrap_or(self.settings.search.search_type);
        let hits = self.query(
            &request.collection,
            &[request.query.clone()],
            k,
            request.where_filter.as_ref(),
            request.where_document.as_ref(),
            search_type,
        )?;
        Ok(HitBundle::from(hits))
    }

    /// Upsert into the live retriever and persist exactly `chunks`.
    pub fn index_chunks(&self, name: &str, chunks: &[Chunk]) -> Result<usize> {
        let collection = self.ensure(name)?;
        let mut retriever = collection.lock()?;
        indexing::index_chunks(chunks, Some(&mut *retriever), &collection.path)
    }

    /// Persist the full live chunk set of a loaded collection.
    pub fn flush(&self, name: &str) -> Result<usize> {
        let collection = self.get(name)?.ok_or_else(|| Error::NotFound(format!("collection '{name}' is not loaded")))?;
        let retriever = collection.lock()?;
        indexing::index_chunks(&retriever.chunks(), None, &collection.path)
    }

    /// Flush every loaded collection.
    pub fn shutdown(&self) -> Result<()> {
        let loaded: Vec<String> = self.collections.read().map_err(poisoned)?.keys().cloned().collect();
        for name in loaded {
            self.flush(&name)?;
        }
        Ok(())
    }

    /// Archive the persisted artifacts of `name`. Persist first (`flush` or
    /// `index_chunks`) for the archive to include recent upserts.
    pub fn export_snapshot(&self, name: &str, snapshot_name: Option<&str>) -> Result<PathBuf> {
        let collection = self.get(name)?;
        let _guard = collection.as_ref().map(|c| c.lock()).transpose()?;
        snapshot::export_snapshot(&self.path_for(name), snapshot_name)
    }

    /// Restore the files of `name` from `archive`.
    ///
    /// The live retriever is left as it was; call [`Self::reload`] for
    /// queries to reflect the restored files.
    pub fn rollback_snapshot(&self, name: &str, archive: &Path) -> Result<Vec<String>> {
        let collection = self.get(name)?;
        let _guard = collection.as_ref().map(|c| c.lock()).transpose()?;
        let restored = snapshot::rollback_snapshot(&self.path_for(name), archive)?;
        if collection.is_some() {
            tracing::warn!(collection = name, "live index not refreshed after rollback; reload to apply");
        }
        Ok(restored)
    }
}
