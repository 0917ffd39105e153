use std::collections::BTreeMap;
use std::sync::Arc;

use crate::model::ModelLayer;

/// Model name → model layer. Relationship traversal, `_ret` and schema
/// population resolve target models through it.
#[derive(Clone, Default)]
pub struct ModelCatalog {
    models: BTreeMap<String, Arc<dyn ModelLayer>>,
}

impl ModelCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a model under its descriptor name. The first model registered under
    /// a name wins.
    pub fn insert(&mut self, model: Arc<dyn ModelLayer>) {
        let name = model.descriptor().name.clone();
        self.models.entry(name).or_insert(model);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn ModelLayer>> {
        self.models.get(name)
    }
}

impl std::fmt::Debug for ModelCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.models.keys()).finish()
    }
}
