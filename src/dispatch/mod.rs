pub mod http;

use std::time::Instant;

pub const DEFAULT_MAX_TOKENS: u32 = 1200;

/// Low temperature: output should track the skill, not wander.
pub const DEFAULT_TEMPERATURE: f64 = 0.2;

/// One completion call.
#[derive(Debug, Clone)]
pub struct ProviderRequest {
    pub model: String,
    pub system_prompt: String,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f64,
    /// The call fails with `Timeout` once this passes; no partial output.
    pub deadline: Instant,
}

impl ProviderRequest {
    /// Request with the service's fixed token budget and temperature.
    pub fn new(
        model: impl Into<String>,
        system_prompt: impl Into<String>,
        prompt: impl Into<String>,
        deadline: Instant,
    ) -> Self {
        Self {
            model: model.into(),
            system_prompt: system_prompt.into(),
            prompt: prompt.into(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            deadline,
        }
    }
}

#[derive(Debug)]
pub struct ProviderResult {
    pub text: String,
    pub model: String,
    pub provider: String,
    pub latency_ms: u64,
}
