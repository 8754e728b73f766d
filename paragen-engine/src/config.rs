//! Tuning constants for the constrained generation kernel.
//!
//! A baseline configuration is embedded in the binary from `defaults.toml`
//! and parsed once into a process-wide static. Callers that need different
//! values (a different value-token range, a larger pose digit cap, ...)
//! load their own TOML file with [`EngineConfig::from_toml_str`] instead of
//! going through the embedded default.

use serde::Deserialize;
use std::sync::OnceLock;

use crate::error::{EngineError, Result};

/// Numeric constants that parameterize the FSM and parameter processor.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct EngineConfig {
    /// First token id of the reserved value-token range `[v0, v0 + n_bins)`.
    pub v0: u32,
    /// Number of quantile bins / value tokens.
    pub n_bins: u32,
    /// Token budget for a `wait` state before it is considered stuck.
    pub wait_max_tokens: usize,
    /// Maximum digits accepted per pose-array number.
    pub pose_max_digits: usize,
    /// Upper bound on total tokens emitted for one document.
    pub max_document_tokens: usize,
}

impl EngineConfig {
    /// Parse an `EngineConfig` from a TOML document, e.g. one loaded from disk.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(EngineError::ConfigParse)
    }

    /// The end of the reserved value-token range (exclusive).
    pub fn value_token_end(&self) -> u32 {
        self.v0 + self.n_bins
    }

    /// Whether a token id falls inside the reserved value-token range.
    pub fn is_value_token(&self, token: u32) -> bool {
        token >= self.v0 && token < self.value_token_end()
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        static DEFAULT: OnceLock<EngineConfig> = OnceLock::new();
        *DEFAULT.get_or_init(|| {
            let toml_str = include_str!("../defaults.toml");
            toml::from_str(toml_str).expect("failed to parse embedded defaults.toml")
        })
    }
}
