use std::env;
use std::path::PathBuf;

use serde::Serialize;

/// Immutable connection and sampling parameters for the model server.
///
/// Read once at engine construction; nothing here is mutated afterwards.
/// The wire protocol is Ollama's: `GET /api/tags` for the catalog,
/// `POST /api/generate` for generation.
#[derive(Debug, Clone, Serialize)]
pub struct EngineConfig {
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub top_p: f32,
    pub repeat_penalty: f32,
    pub max_new_tokens: u32,
    pub num_gpu: u32,
    pub timeout_secs: u64,
    pub output_dir: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "janus:latest".to_string(),
            temperature: 0.7,
            top_p: 0.9,
            repeat_penalty: 1.1,
            max_new_tokens: 1024,
            num_gpu: 99,
            timeout_secs: 120,
            output_dir: PathBuf::from("out/generated_images"),
        }
    }
}

impl EngineConfig {
    /// Defaults with the endpoint overridable via `TEASER_OLLAMA_URL`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(base) = env::var("TEASER_OLLAMA_URL")
            .ok()
            .map(|value| value.trim().trim_end_matches('/').to_string())
            .filter(|value| !value.is_empty())
        {
            config.base_url = base;
        }
        config
    }

    /// Identifying substring of the model, used by the availability probe.
    /// For `janus:latest` this is `janus`.
    pub fn model_stem(&self) -> &str {
        self.model
            .split_once(':')
            .map(|(stem, _)| stem)
            .unwrap_or(self.model.as_str())
            .trim()
    }
}
