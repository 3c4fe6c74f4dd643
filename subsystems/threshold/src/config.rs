//! # Subsystem Configuration
//!
//! Boot-time facts the subsystem cannot discover from the banks themselves:
//! the bank count, which MCA features the processor advertises, the family
//! and model (for errata), and the interrupt vectors to use.

use mca_hal::{DEFERRED_ERROR_VECTOR, THRESHOLD_APIC_VECTOR};

use crate::addressing::AddressingScheme;
use crate::error::{McaError, McaResult};
use crate::MAX_NR_BANKS;

bitflags::bitflags! {
    /// MCA features advertised by the processor
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct McaFeatures: u32 {
        /// Scalable MCA register layout
        const SCALABLE = 1 << 0;
        /// Deferred error interrupts (SUCCOR)
        const SUCCOR = 1 << 1;
        /// Error thresholding
        const THRESHOLD = 1 << 2;
    }
}

/// Processor family and model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuModel {
    /// Family
    pub family: u8,
    /// Model
    pub model: u8,
}

impl CpuModel {
    /// Create a family/model pair
    pub const fn new(family: u8, model: u8) -> Self {
        Self { family, model }
    }

    /// Family matches and model lies in `lo..=hi`
    pub const fn is(&self, family: u8, lo: u8, hi: u8) -> bool {
        self.family == family && self.model >= lo && self.model <= hi
    }
}

/// Threshold subsystem configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThresholdConfig {
    /// Number of MCA banks per CPU
    pub num_banks: u32,
    /// Advertised features
    pub features: McaFeatures,
    /// Processor family and model
    pub model: CpuModel,
    /// Vector for threshold interrupts
    pub threshold_vector: u8,
    /// Vector for deferred-error interrupts
    pub deferred_vector: u8,
}

impl ThresholdConfig {
    /// Legacy thresholding on `num_banks` banks with the default vectors
    pub const fn new(num_banks: u32) -> Self {
        Self {
            num_banks,
            features: McaFeatures::THRESHOLD,
            model: CpuModel::new(0, 0),
            threshold_vector: THRESHOLD_APIC_VECTOR,
            deferred_vector: DEFERRED_ERROR_VECTOR,
        }
    }

    /// Set the feature flags
    pub const fn with_features(mut self, features: McaFeatures) -> Self {
        self.features = features;
        self
    }

    /// Set the processor family and model
    pub const fn with_model(mut self, family: u8, model: u8) -> Self {
        self.model = CpuModel::new(family, model);
        self
    }

    /// Set the interrupt vectors
    pub const fn with_vectors(mut self, threshold: u8, deferred: u8) -> Self {
        self.threshold_vector = threshold;
        self.deferred_vector = deferred;
        self
    }

    /// Register addressing selected by the feature flags
    pub fn scheme(&self) -> AddressingScheme {
        if self.features.contains(McaFeatures::SCALABLE) {
            AddressingScheme::Scalable
        } else {
            AddressingScheme::Legacy
        }
    }

    /// Check the configuration for consistency
    pub fn validate(&self) -> McaResult<()> {
        if self.num_banks > MAX_NR_BANKS {
            return Err(McaError::InvalidConfig("too many banks"));
        }
        if self.threshold_vector < 0x20 || self.deferred_vector < 0x20 {
            return Err(McaError::InvalidConfig("vector in exception range"));
        }
        if self.threshold_vector == self.deferred_vector {
            return Err(McaError::InvalidConfig("threshold and deferred vectors collide"));
        }
        Ok(())
    }
}
