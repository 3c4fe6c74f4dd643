//! # MCA Threshold Subsystem
//!
//! Error-count thresholding and deferred-error interrupts for the
//! machine-check banks of AMD processors.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        THRESHOLD SUBSYSTEM                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                          │
//! │   on_core_feature_init(cpu)                                              │
//! │   ┌──────────┐   ┌──────────┐   ┌──────────┐   ┌──────────┐   ┌───────┐ │
//! │   │ classify │──▶│  errata  │──▶│ discover │──▶│  vector  │──▶│program│ │
//! │   │ (SMCA)   │   │          │   │ (blocks) │   │ (EILVT)  │   │       │ │
//! │   └──────────┘   └──────────┘   └──────────┘   └──────────┘   └───────┘ │
//! │                                                                          │
//! │   threshold / deferred interrupt                                         │
//! │   ┌──────────┐   ┌──────────┐   ┌──────────┐   ┌──────────┐             │
//! │   │ handler  │──▶│  record  │──▶│  errata  │──▶│   sink   │             │
//! │   │          │   │ extract  │   │  filter  │   │ forward  │             │
//! │   └────┬─────┘   └──────────┘   └──────────┘   └──────────┘             │
//! │        └──────────▶ program(Reset)                                       │
//! │                                                                          │
//! │   CpuState (one per logical CPU, behind a spin::Mutex)                   │
//! │   ┌────────────────────────────────────────────────────────────────┐    │
//! │   │ scheme │ classes │ bank map │ misc map │ vectors │ banks handle │    │
//! │   └────────────────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Register Generations
//!
//! | Scheme   | Block 0              | Blocks 1..4                         |
//! |----------|----------------------|-------------------------------------|
//! | Legacy   | `MCi_MISC`           | `MCG_XBLK_ADDR + BLKPTR*8`, then +1 |
//! | Scalable | `MCA_MISC0`          | `MCA_MISC1..4` when advertised      |
//!
//! Every hardware access goes through the traits of [`mca_hal`], so the
//! subsystem runs unchanged on bare metal and against the simulated
//! platform in tests.

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

extern crate alloc;

use mca_hal::{Clock, CrossCall, ExtendedLvt, MsrAccess};

// =============================================================================
// MODULE DECLARATIONS
// =============================================================================

/// Register addressing for legacy and scalable banks
pub mod addressing;

/// Threshold blocks, banks and bank bitmaps
pub mod block;

/// Bank type catalog
pub mod catalog;

/// Bank classification from MCA_IPID
pub mod classify;

/// Subsystem configuration
pub mod config;

/// Per-CPU context
pub mod cpu;

/// Threshold block discovery
pub mod discovery;

/// Processor errata
pub mod errata;

/// Error types
pub mod error;

/// Threshold and deferred-error interrupt handlers
pub mod handler;

/// Diagnostic names for banks and blocks
pub mod naming;

/// Threshold block programming
pub mod program;

/// Error records and classification predicates
pub mod record;

/// Error sink
pub mod sink;

/// Lifecycle, tunables and interrupt entry points
pub mod subsystem;

/// Extended LVT offset allocation
pub mod vector;

// =============================================================================
// RE-EXPORTS
// =============================================================================

pub use addressing::AddressingScheme;
pub use block::{BankMap, ThresholdBank, ThresholdBlock};
pub use catalog::{BankType, BankTypeDescriptor};
pub use classify::BankClassification;
pub use config::{CpuModel, McaFeatures, ThresholdConfig};
pub use cpu::CpuState;
pub use error::{McaError, McaResult};
pub use program::ProgramMode;
pub use record::{ErrorRecord, Syndrome};
pub use sink::{ErrorSink, LogSink};
pub use subsystem::ThresholdSubsystem;
pub use vector::{VectorAllocator, VectorKind};

// =============================================================================
// CONSTANTS
// =============================================================================

/// Maximum number of threshold blocks per bank
pub const NR_BLOCKS: u32 = 5;

/// Largest threshold limit; the counter interrupts when it reaches this
pub const THRESHOLD_MAX: u16 = 0xFFF;

/// Maximum number of MCA banks per CPU
pub const MAX_NR_BANKS: u32 = 64;

// =============================================================================
// PLATFORM
// =============================================================================

/// Everything the subsystem needs from the hardware
pub trait Platform: MsrAccess + ExtendedLvt + CrossCall + Clock {}

impl<T: MsrAccess + ExtendedLvt + CrossCall + Clock + ?Sized> Platform for T {}
