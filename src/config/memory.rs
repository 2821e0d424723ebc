//! Memory management configuration for lvmem.
//!
//! Controls the alignment handed out by the aligned allocator, the minimum
//! size of arena pools and whether the width engine may use SIMD registers
//! for its widest chunks.

use super::{parse_env_bool, parse_env_var, Config, ValidationError};
use crate::error::{MemError, Result};
use crate::memory::{DEFAULT_ALIGNMENT, DEFAULT_ARENA_SIZE};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Largest alignment accepted by validation; one page.
pub const MAX_ALIGNMENT: usize = 4096;

/// Memory subsystem configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Alignment in bytes of every block returned by the aligned allocator
    pub alignment: usize,
    /// Minimum capacity in bytes of a freshly created arena pool
    pub arena_pool_size: usize,
    /// Allow SSE2/AVX2 for 128-bit chunks when the CPU supports them
    pub enable_simd: bool,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            alignment: DEFAULT_ALIGNMENT,
            arena_pool_size: DEFAULT_ARENA_SIZE,
            enable_simd: true,
        }
    }
}

impl Config for MemoryConfig {
    fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        if self.alignment == 0 || !self.alignment.is_power_of_two() {
            errors.push(
                ValidationError::new(
                    "alignment",
                    &self.alignment.to_string(),
                    "alignment must be a power of 2",
                )
                .with_suggestion("typical values: 16, 32, 64, 128"),
            );
        } else if self.alignment > MAX_ALIGNMENT {
            errors.push(ValidationError::new(
                "alignment",
                &self.alignment.to_string(),
                "alignment must not exceed one page (4096 bytes)",
            ));
        }

        if self.arena_pool_size == 0 {
            errors.push(
                ValidationError::new(
                    "arena_pool_size",
                    &self.arena_pool_size.to_string(),
                    "arena pool size must be greater than 0",
                )
                .with_suggestion("default: 16392 bytes on 64-bit targets"),
            );
        }

        if !errors.is_empty() {
            return Err(MemError::configuration(format!(
                "Memory configuration validation failed: {}",
                errors
                    .into_iter()
                    .map(|e| e.to_string())
                    .collect::<Vec<_>>()
                    .join("; ")
            )));
        }

        Ok(())
    }

    fn from_env_with_prefix(prefix: &str) -> Result<Self> {
        let mut config = Self::default();

        config.alignment = parse_env_var(&format!("{}MEMORY_ALIGNMENT", prefix), config.alignment);
        config.arena_pool_size = parse_env_var(
            &format!("{}MEMORY_ARENA_POOL_SIZE", prefix),
            config.arena_pool_size,
        );
        config.enable_simd = parse_env_bool(&format!("{}MEMORY_SIMD", prefix), config.enable_simd);

        config.validate()?;
        Ok(config)
    }

    fn performance_preset() -> Self {
        Self {
            alignment: 64,
            arena_pool_size: 1024 * 1024,
            enable_simd: true,
        }
    }

    fn memory_preset() -> Self {
        Self {
            alignment: DEFAULT_ALIGNMENT,
            arena_pool_size: DEFAULT_ARENA_SIZE / 4,
            enable_simd: true,
        }
    }

    fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let serialized = serde_json::to_string_pretty(self)
            .map_err(|e| MemError::serialization(format!("Failed to serialize memory config: {}", e)))?;

        std::fs::write(path, serialized)?;

        Ok(())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;

        let config: Self = serde_json::from_str(&content)
            .map_err(|e| MemError::serialization(format!("Failed to parse memory config file: {}", e)))?;

        config.validate()?;
        Ok(config)
    }
}

impl MemoryConfig {
    /// Create a new memory configuration builder.
    pub fn builder() -> MemoryConfigBuilder {
        MemoryConfigBuilder::new()
    }
}

/// Builder for constructing memory configurations.
#[derive(Debug, Clone, Default)]
pub struct MemoryConfigBuilder {
    config: MemoryConfig,
}

impl MemoryConfigBuilder {
    /// Create a new memory configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set memory alignment.
    pub fn alignment(mut self, alignment: usize) -> Self {
        self.config.alignment = alignment;
        self
    }

    /// Set the minimum arena pool size.
    pub fn arena_pool_size(mut self, size: usize) -> Self {
        self.config.arena_pool_size = size;
        self
    }

    /// Enable or disable SIMD chunks.
    pub fn enable_simd(mut self, enabled: bool) -> Self {
        self.config.enable_simd = enabled;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> Result<MemoryConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
