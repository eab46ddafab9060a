use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::config::STUB_MODEL_ID;

use super::Generator;
use super::backend::CandleGenerator;
use super::error::GenerationResult;
use super::stub::StubGenerator;

/// Builds a [`Generator`] for a model identifier.
pub trait GeneratorLoader: Send + Sync {
    fn load(&self, model_id: &str) -> GenerationResult<Arc<dyn Generator>>;
}

/// `stub` selects [`StubGenerator`]; anything else is a GGUF path for [`CandleGenerator`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultLoader;

impl GeneratorLoader for DefaultLoader {
    fn load(&self, model_id: &str) -> GenerationResult<Arc<dyn Generator>> {
        if model_id == STUB_MODEL_ID {
            return Ok(Arc::new(StubGenerator::new()));
        }

        Ok(Arc::new(CandleGenerator::load(Path::new(model_id))?))
    }
}

/// Caches one loaded generator per model identifier for the registry's lifetime.
///
/// Entries are never evicted. Construct one per process and hand it to the
/// orchestrator; tests substitute doubles with [`ModelRegistry::insert`].
pub struct ModelRegistry {
    loader: Box<dyn GeneratorLoader>,
    models: RwLock<HashMap<String, Arc<dyn Generator>>>,
}

impl std::fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("models", &self.models.read().keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new(DefaultLoader)
    }
}

impl ModelRegistry {
    pub fn new<L: GeneratorLoader + 'static>(loader: L) -> Self {
        Self {
            loader: Box::new(loader),
            models: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the cached generator for `model_id`, loading it on first use.
    pub fn get_or_load(&self, model_id: &str) -> GenerationResult<Arc<dyn Generator>> {
        if let Some(generator) = self.models.read().get(model_id) {
            debug!(model_id, "Model registry hit");
            return Ok(Arc::clone(generator));
        }

        let mut models = self.models.write();
        // Another caller may have loaded it between the read and write locks.
        if let Some(generator) = models.get(model_id) {
            return Ok(Arc::clone(generator));
        }

        info!(model_id, "Loading generation model");
        let generator = self.loader.load(model_id)?;
        models.insert(model_id.to_string(), Arc::clone(&generator));
        Ok(generator)
    }

    /// Registers an already-built generator under its own identifier.
    pub fn insert(&self, generator: Arc<dyn Generator>) {
        let model_id = generator.model_id().to_string();
        self.models.write().insert(model_id, generator);
    }

    pub fn contains(&self, model_id: &str) -> bool {
        self.models.read().contains_key(model_id)
    }

    pub fn len(&self) -> usize {
        self.models.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.read().is_empty()
    }
}
