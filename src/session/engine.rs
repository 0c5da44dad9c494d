//! Engine: the long-lived owner of everything sessions share

use std::sync::Arc;

use crate::cache::GlobalCache;
use crate::config::EngineConfig;
use crate::errors::{CvlError, CvlErrorCode, CvlResult};
use crate::observability::{log_event_with_fields, Event};
use crate::processor::{BuiltinProcessor, SchemaProcessor};
use crate::schema::{SchemaIndex, SchemaLoader};
use crate::store::ConfigStore;

use super::ValidationSession;

/// Shared validation context: schema, store, global cache and processor.
///
/// Sessions opened from one engine share its cache; nothing here is
/// reached through global state.
pub struct Engine {
    config: EngineConfig,
    schema: Arc<SchemaIndex>,
    store: Arc<dyn ConfigStore>,
    cache: GlobalCache,
    processor: Arc<dyn SchemaProcessor>,
}

impl Engine {
    /// Loads the schema from `config.schema_dir` and validates with the
    /// built-in processor.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn new(config: EngineConfig, store: Arc<dyn ConfigStore>) -> CvlResult<Self> {
        let schema = Arc::new(load_schema(&config)?);
        let processor = Arc::new(BuiltinProcessor::new(Arc::clone(&schema)));
        Self::from_parts(config, schema, store, processor).await
    }

    /// Like [`Engine::new`] with an external processor.
    pub async fn with_processor(
        config: EngineConfig,
        store: Arc<dyn ConfigStore>,
        processor: Arc<dyn SchemaProcessor>,
    ) -> CvlResult<Self> {
        let schema = Arc::new(load_schema(&config)?);
        Self::from_parts(config, schema, store, processor).await
    }

    /// Assembles an engine around an already built schema index and
    /// populates the configured cached tables.
    pub async fn from_parts(
        config: EngineConfig,
        schema: Arc<SchemaIndex>,
        store: Arc<dyn ConfigStore>,
        processor: Arc<dyn SchemaProcessor>,
    ) -> CvlResult<Self> {
        config
            .validate()
            .map_err(|e| CvlError::new(CvlErrorCode::InternalUnknown, e.to_string()))?;

        let cache = GlobalCache::new(
            Arc::clone(&schema),
            Arc::clone(&store),
            config.db_index,
            config.fetch_batch_size,
        );
        for cached in &config.cached_tables {
            cache.set(&cached.table, cached.expiry_secs).await?;
        }

        let tables = schema.table_count().to_string();
        let cached = config.cached_tables.len().to_string();
        log_event_with_fields(
            Event::EngineStart,
            &[("cached_tables", cached.as_str()), ("tables", tables.as_str())],
        );

        Ok(Self {
            config,
            schema,
            store,
            cache,
            processor,
        })
    }

    /// Opens a new session sharing this engine's cache.
    pub fn open_session(&self) -> ValidationSession {
        ValidationSession::new(
            Arc::clone(&self.schema),
            Arc::clone(&self.store),
            self.cache.clone(),
            Arc::clone(&self.processor),
            self.config.fetch_batch_size,
        )
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn schema(&self) -> &Arc<SchemaIndex> {
        &self.schema
    }

    pub fn cache(&self) -> &GlobalCache {
        &self.cache
    }

    pub fn store(&self) -> &Arc<dyn ConfigStore> {
        &self.store
    }

    /// Stops the cache listener.
    pub async fn shutdown(&self) {
        self.cache.shutdown().await;
        log_event_with_fields(Event::EngineShutdown, &[]);
    }
}

fn load_schema(config: &EngineConfig) -> CvlResult<SchemaIndex> {
    match SchemaLoader::load(&config.schema_dir, &config.key_delimiter) {
        Ok(index) => {
            let tables = index.table_count().to_string();
            let dir = config.schema_dir.display().to_string();
            log_event_with_fields(Event::SchemaLoaded, &[("dir", dir.as_str()), ("tables", tables.as_str())]);
            Ok(index)
        }
        Err(e) => {
            let code = e.code().code();
            log_event_with_fields(Event::SchemaLoadFailed, &[("code", code), ("error", e.message())]);
            Err(e.into())
        }
    }
}
