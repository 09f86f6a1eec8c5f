// Sandbox configuration with env-var overrides
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Resource and scheduling limits for the execution sandbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Docker image the submission runs in.
    pub image: String,
    /// Hard wall-clock limit per invocation, in milliseconds.
    pub timeout_ms: u64,
    /// Container memory limit in MB.
    pub memory_limit_mb: u32,
    /// Container CPU limit (1.0 = one full core).
    pub cpu_limit: f32,
    /// Max test cases graded concurrently within one batch. Each case still
    /// gets its own container, so isolation holds at any setting.
    pub max_parallel: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            image: "python:3.12-slim".to_string(),
            timeout_ms: 5_000,
            memory_limit_mb: 256,
            cpu_limit: 0.5,
            max_parallel: 1,
        }
    }
}

impl SandboxConfig {
    /// Build a config from defaults overridden by `GRADEBOX_*` env vars.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Ok(image) = std::env::var("GRADEBOX_IMAGE") {
            config.image = image;
        }
        if let Ok(raw) = std::env::var("GRADEBOX_TIMEOUT_MS") {
            config.timeout_ms = raw.parse().context("invalid GRADEBOX_TIMEOUT_MS")?;
        }
        if let Ok(raw) = std::env::var("GRADEBOX_MEMORY_LIMIT_MB") {
            config.memory_limit_mb = raw.parse().context("invalid GRADEBOX_MEMORY_LIMIT_MB")?;
        }
        if let Ok(raw) = std::env::var("GRADEBOX_CPU_LIMIT") {
            config.cpu_limit = raw.parse().context("invalid GRADEBOX_CPU_LIMIT")?;
        }
        if let Ok(raw) = std::env::var("GRADEBOX_MAX_PARALLEL") {
            config.max_parallel = raw.parse().context("invalid GRADEBOX_MAX_PARALLEL")?;
        }
        Ok(config)
    }
}
