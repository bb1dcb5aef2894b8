//! Model catalog and cost accounting.
//!
//! Pricing ships with the binary as a fixed catalog keyed by provider
//! model id. All money amounts are integer micro-USD (1 USD = 1_000_000),
//! so cost arithmetic never touches floating point.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Model used when neither the request nor the conversation picks one.
pub const DEFAULT_MODEL_ID: &str = "openai/gpt-5-mini";

const MICRO_PER_UNIT: u128 = 1_000_000;

/// Pricing descriptor for one chat model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Provider-scoped identifier (e.g. "openai/gpt-5-mini").
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Cost per 1M prompt tokens, micro-USD.
    pub input_cost_per_1m_micro: u64,
    /// Cost per 1M completion tokens, micro-USD.
    pub output_cost_per_1m_micro: u64,
}

impl ModelInfo {
    /// Cost of one exchange in micro-USD, rounded half up.
    pub fn cost_micro(&self, prompt_tokens: u32, completion_tokens: u32) -> u64 {
        let input = u128::from(prompt_tokens) * u128::from(self.input_cost_per_1m_micro);
        let output = u128::from(completion_tokens) * u128::from(self.output_cost_per_1m_micro);
        let total = (input + output + MICRO_PER_UNIT / 2) / MICRO_PER_UNIT;
        total as u64
    }
}

/// Lookup table of supported models.
pub struct ModelCatalog {
    models: HashMap<String, ModelInfo>,
}

impl ModelCatalog {
    /// The built-in catalog.
    pub fn new() -> Self {
        let seed = [
            ModelInfo {
                id: DEFAULT_MODEL_ID.to_string(),
                name: "GPT-5 Mini".to_string(),
                input_cost_per_1m_micro: 250_000,
                output_cost_per_1m_micro: 2_000_000,
            },
            ModelInfo {
                id: "openai/gpt-4o-mini".to_string(),
                name: "GPT-4o Mini".to_string(),
                input_cost_per_1m_micro: 150_000,
                output_cost_per_1m_micro: 600_000,
            },
            ModelInfo {
                id: "anthropic/claude-3.5-haiku".to_string(),
                name: "Claude 3.5 Haiku".to_string(),
                input_cost_per_1m_micro: 800_000,
                output_cost_per_1m_micro: 4_000_000,
            },
            ModelInfo {
                id: "google/gemini-2.0-flash".to_string(),
                name: "Gemini 2.0 Flash".to_string(),
                input_cost_per_1m_micro: 100_000,
                output_cost_per_1m_micro: 400_000,
            },
        ];
        let models = seed.into_iter().map(|m| (m.id.clone(), m)).collect();
        Self { models }
    }

    /// A catalog with caller-provided entries. Used by tests and hosts
    /// with their own pricing source.
    pub fn with_models(entries: Vec<ModelInfo>) -> Self {
        let models = entries.into_iter().map(|m| (m.id.clone(), m)).collect();
        Self { models }
    }

    pub fn get(&self, id: &str) -> Option<&ModelInfo> {
        self.models.get(id)
    }

    pub fn is_valid(&self, id: &str) -> bool {
        self.models.contains_key(id)
    }

    /// The global default entry, absent only from caller-built catalogs
    /// that left it out.
    pub fn default_model(&self) -> Option<&ModelInfo> {
        self.models.get(DEFAULT_MODEL_ID)
    }

    /// Pick the model for a request: explicit choice first, then the
    /// conversation default, then the global default. `None` when the
    /// winning id is not in the catalog.
    pub fn resolve(&self, requested: Option<&str>, conversation: Option<&str>) -> Option<&ModelInfo> {
        let id = requested.or(conversation).unwrap_or(DEFAULT_MODEL_ID);
        self.get(id)
    }

    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.models.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_model_is_present() {
        let catalog = ModelCatalog::new();
        assert!(catalog.is_valid(DEFAULT_MODEL_ID));
        assert_eq!(catalog.default_model().unwrap().id, DEFAULT_MODEL_ID);
    }

    #[test]
    fn resolve_prefers_request_over_conversation() {
        let catalog = ModelCatalog::new();
        let picked = catalog
            .resolve(Some("openai/gpt-4o-mini"), Some("google/gemini-2.0-flash"))
            .unwrap();
        assert_eq!(picked.id, "openai/gpt-4o-mini");

        let fallback = catalog
            .resolve(None, Some("google/gemini-2.0-flash"))
            .unwrap();
        assert_eq!(fallback.id, "google/gemini-2.0-flash");

        let global = catalog.resolve(None, None).unwrap();
        assert_eq!(global.id, DEFAULT_MODEL_ID);
    }

    #[test]
    fn resolve_rejects_unknown_id() {
        let catalog = ModelCatalog::new();
        assert!(catalog.resolve(Some("made-up/model"), None).is_none());
    }

    #[test]
    fn cost_is_prorated_per_million() {
        let model = ModelInfo {
            id: "t".into(),
            name: "t".into(),
            input_cost_per_1m_micro: 250_000,
            output_cost_per_1m_micro: 2_000_000,
        };
        // 1M prompt + 1M completion tokens cost exactly the listed rates.
        assert_eq!(model.cost_micro(1_000_000, 1_000_000), 2_250_000);
        // 1k prompt tokens at $0.25/1M is 250 micro-USD.
        assert_eq!(model.cost_micro(1_000, 0), 250);
        assert_eq!(model.cost_micro(0, 0), 0);
    }

    #[test]
    fn cost_rounds_half_up() {
        let model = ModelInfo {
            id: "t".into(),
            name: "t".into(),
            input_cost_per_1m_micro: 1,
            output_cost_per_1m_micro: 0,
        };
        // 499_999 token-micro products round down, 500_000 rounds up.
        assert_eq!(model.cost_micro(499_999, 0), 0);
        assert_eq!(model.cost_micro(500_000, 0), 1);
    }

    #[test]
    fn cost_survives_large_counts() {
        let model = ModelInfo {
            id: "t".into(),
            name: "t".into(),
            input_cost_per_1m_micro: u64::MAX / 2,
            output_cost_per_1m_micro: u64::MAX / 2,
        };
        // No overflow panic even at absurd magnitudes.
        let _ = model.cost_micro(u32::MAX, u32::MAX);
    }
}
