//! Static model catalog.
//!
//! Maps public model identifiers to their capabilities.  A turn request
//! naming a model outside this catalog fails fast with `ProviderNotFound`
//! before any registry or store write happens.

use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, Serialize, ToSchema)]
pub struct ModelCapabilities {
    pub supports_images: bool,
    pub supports_reasoning: bool,
}

#[derive(Debug, Clone, Copy, Serialize, ToSchema)]
pub struct ModelConfig {
    /// Provider-scoped identifier, e.g. `"openai/gpt-4.1-nano"`.
    pub id: &'static str,
    /// Human-readable display name.
    pub name: &'static str,
    pub max_tokens: u32,
    pub capabilities: ModelCapabilities,
}

pub const MODELS: &[ModelConfig] = &[
    ModelConfig {
        id: "openai/gpt-4.1-nano",
        name: "GPT-4.1-Nano",
        max_tokens: 8192,
        capabilities: ModelCapabilities {
            supports_images: true,
            supports_reasoning: false,
        },
    },
    ModelConfig {
        id: "deepseek/deepseek-r1-0528",
        name: "DeepSeek-R1",
        max_tokens: 16384,
        capabilities: ModelCapabilities {
            supports_images: true,
            supports_reasoning: true,
        },
    },
    ModelConfig {
        id: "qwen/qwen3-30b-a3b:free",
        name: "Qwen-3.3-30B",
        max_tokens: 4096,
        capabilities: ModelCapabilities {
            supports_images: true,
            supports_reasoning: false,
        },
    },
    ModelConfig {
        id: "google/gemini-2.5-flash-preview",
        name: "Gemini-2.5-Flash",
        max_tokens: 8192,
        capabilities: ModelCapabilities {
            supports_images: true,
            supports_reasoning: false,
        },
    },
];

/// Look up a model by its public identifier.
pub fn find(id: &str) -> Option<&'static ModelConfig> {
    MODELS.iter().find(|m| m.id == id)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn known_model_is_found() {
        let model = find("deepseek/deepseek-r1-0528").unwrap();
        assert!(model.capabilities.supports_reasoning);
    }

    #[test]
    fn unknown_model_is_none() {
        assert!(find("acme/imaginary-model").is_none());
    }
}
