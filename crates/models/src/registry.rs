//! Pattern-keyed model registry.
//!
//! An explicit, ordered list of (pattern, factory) pairs built at process
//! start and injected wherever models are resolved — never hidden global
//! state. The first pattern that fully matches the model name wins.

use std::sync::Arc;

use canopy_core::ModelError;
use regex_lite::Regex;
use tracing::debug;

use crate::model::Model;

/// Builds a model binding for a concrete model name.
pub type ModelFactory =
    Arc<dyn Fn(&str) -> std::result::Result<Arc<dyn Model>, ModelError> + Send + Sync>;

/// Ordered pattern → factory registry.
#[derive(Clone, Default)]
pub struct ModelRegistry {
    entries: Vec<(Regex, ModelFactory)>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory for model names matching `pattern` (anchored).
    pub fn register(
        &mut self,
        pattern: &str,
        factory: ModelFactory,
    ) -> std::result::Result<(), ModelError> {
        let anchored = format!("^(?:{pattern})$");
        let regex = Regex::new(&anchored)
            .map_err(|e| ModelError::NotConfigured(format!("invalid model pattern '{pattern}': {e}")))?;
        self.entries.push((regex, factory));
        Ok(())
    }

    /// Resolve a model name to a binding; first matching pattern wins.
    pub fn resolve(&self, model_name: &str) -> std::result::Result<Arc<dyn Model>, ModelError> {
        for (pattern, factory) in &self.entries {
            if pattern.is_match(model_name) {
                debug!(model = model_name, pattern = %pattern, "Resolved model binding");
                return factory(model_name);
            }
        }
        Err(ModelError::NotFound(model_name.to_string()))
    }

    /// Number of registered patterns.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
