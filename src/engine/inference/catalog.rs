// Inference — Edge model catalog.
// Descriptors returned by device registration, keyed by id. Read-only from
// the router's point of view; replaced wholesale on each registration.

use crate::atoms::types::{EdgeModel, FallbackStrategy};
use parking_lot::RwLock;

#[derive(Default)]
pub struct ModelCatalog {
    models: RwLock<Vec<EdgeModel>>,
}

impl ModelCatalog {
    pub fn new(models: Vec<EdgeModel>) -> Self {
        ModelCatalog { models: RwLock::new(models) }
    }

    pub fn replace(&self, models: Vec<EdgeModel>) {
        *self.models.write() = models;
    }

    pub fn all(&self) -> Vec<EdgeModel> {
        self.models.read().clone()
    }

    pub fn len(&self) -> usize {
        self.models.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, model_id: &str) -> Option<EdgeModel> {
        self.models.read().iter().find(|m| m.id == model_id).cloned()
    }

    /// Fallback strategy declared for a task; `Remote` when undeclared.
    pub fn fallback_for(&self, task_type: &str) -> FallbackStrategy {
        self.models
            .read()
            .iter()
            .find(|m| m.capability == task_type)
            .map(|m| m.deployment.fallback_strategy)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::types::ModelDeployment;

    fn model(id: &str, capability: &str, fallback: FallbackStrategy) -> EdgeModel {
        EdgeModel {
            id: id.into(),
            capability: capability.into(),
            version: "1.0.0".into(),
            performance: Default::default(),
            deployment: ModelDeployment {
                format: "onnx".into(),
                url: None,
                fallback_strategy: fallback,
            },
        }
    }

    #[test]
    fn fallback_defaults_to_remote() {
        let catalog = ModelCatalog::new(vec![model("m1", "intent", FallbackStrategy::Heuristic)]);
        assert_eq!(catalog.fallback_for("intent"), FallbackStrategy::Heuristic);
        assert_eq!(catalog.fallback_for("sentiment"), FallbackStrategy::Remote);
        assert_eq!(catalog.get("m1").unwrap().capability, "intent");

        catalog.replace(Vec::new());
        assert!(catalog.is_empty());
    }
}
