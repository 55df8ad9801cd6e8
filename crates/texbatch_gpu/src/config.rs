//! Batching configuration and backend capabilities

use crate::target::MAX_INDEXED_QUADS;

fn env_usize(name: &str) -> Option<usize> {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
}

fn env_bool(name: &str) -> Option<bool> {
    std::env::var(name).ok().and_then(|v| match v.trim() {
        "1" | "true" | "on" => Some(true),
        "0" | "false" | "off" => Some(false),
        _ => None,
    })
}

/// Backend capabilities consulted while combining ops
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Caps {
    /// The backend can bind a different texture for each mesh of one draw,
    /// which lets ops over different textures chain into a single submission
    pub dynamic_texture_binding: bool,
}

impl Default for Caps {
    fn default() -> Self {
        Self {
            dynamic_texture_binding: true,
        }
    }
}

/// Configuration for op recording and flushing
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchConfig {
    /// How many recorded chains a new op is compared against
    pub max_op_lookback: usize,
    /// Quads covered by one repetition of the shared quad index pattern
    pub max_quads_per_draw: u32,
    pub caps: Caps,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_op_lookback: 10,
            max_quads_per_draw: 4096, // 24K indices, 16K vertices
            caps: Caps::default(),
        }
    }
}

impl BatchConfig {
    /// Defaults with environment overrides applied.
    ///
    /// Env:
    /// - TEXBATCH_MAX_OP_LOOKBACK=10
    /// - TEXBATCH_DYNAMIC_TEXTURE_BINDING=1
    /// - TEXBATCH_MAX_QUADS_PER_DRAW=4096
    pub fn from_env() -> Self {
        let config = apply_batch_config_overrides(Self::default());
        log_batch_config(&config);
        config
    }

    pub fn with_caps(mut self, caps: Caps) -> Self {
        self.caps = caps;
        self
    }

    pub fn with_max_op_lookback(mut self, lookback: usize) -> Self {
        self.max_op_lookback = lookback;
        self
    }
}

fn apply_batch_config_overrides(mut config: BatchConfig) -> BatchConfig {
    if let Some(v) = env_usize("TEXBATCH_MAX_OP_LOOKBACK") {
        config.max_op_lookback = v;
    }
    if let Some(v) = env_bool("TEXBATCH_DYNAMIC_TEXTURE_BINDING") {
        config.caps.dynamic_texture_binding = v;
    }
    if let Some(v) = env_usize("TEXBATCH_MAX_QUADS_PER_DRAW") {
        // 16-bit indices address at most 16K quads.
        config.max_quads_per_draw = v.clamp(1, MAX_INDEXED_QUADS as usize) as u32;
    }
    config
}

fn log_batch_config(config: &BatchConfig) {
    tracing::info!(
        "texbatch config: max_op_lookback={}, max_quads_per_draw={}, dynamic_texture_binding={}",
        config.max_op_lookback,
        config.max_quads_per_draw,
        config.caps.dynamic_texture_binding
    );
}
