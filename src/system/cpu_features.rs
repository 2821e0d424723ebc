//! # CPU Feature Detection
//!
//! Runtime detection of the vector extensions the width engine can use for
//! its 128-bit chunks. Detection runs once and is cached for the process.

use std::sync::OnceLock;

/// Vector extensions relevant to bulk memory operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CpuFeatures {
    /// SSE2 (baseline on x86_64)
    pub has_sse2: bool,
    /// AVX2 256-bit integer operations
    pub has_avx2: bool,
}

impl CpuFeatures {
    /// Detect available CPU features at runtime
    pub fn detect() -> Self {
        #[cfg(target_arch = "x86_64")]
        {
            Self {
                has_sse2: is_x86_feature_detected!("sse2"),
                has_avx2: is_x86_feature_detected!("avx2"),
            }
        }
        #[cfg(not(target_arch = "x86_64"))]
        {
            Self::default()
        }
    }

    /// Features with every vector extension switched off
    pub const fn scalar() -> Self {
        Self {
            has_sse2: false,
            has_avx2: false,
        }
    }

    /// Whether any vector extension is usable
    pub fn has_simd(&self) -> bool {
        self.has_sse2 || self.has_avx2
    }
}

static CPU_FEATURES: OnceLock<CpuFeatures> = OnceLock::new();

/// Get the cached CPU feature set
pub fn get_cpu_features() -> &'static CpuFeatures {
    CPU_FEATURES.get_or_init(|| {
        let features = CpuFeatures::detect();
        log::debug!("detected CPU features: {:?}", features);
        features
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detection_is_cached() {
        let a = get_cpu_features();
        let b = get_cpu_features();
        assert!(std::ptr::eq(a, b));
        assert_eq!(*a, CpuFeatures::detect());
    }

    #[test]
    fn test_scalar_has_no_simd() {
        assert!(!CpuFeatures::scalar().has_simd());
    }

    #[cfg(target_arch = "x86_64")]
    #[test]
    fn test_x86_64_baseline() {
        // SSE2 is part of the x86_64 baseline
        assert!(get_cpu_features().has_sse2);
    }
}
