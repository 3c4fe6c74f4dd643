//! # Error Handling
//!
//! Nothing in the subsystem is fatal to the kernel. The worst outcome of any
//! error is reduced or no threshold monitoring on one CPU.
//!
//! | Error                 | Source                          | Effect               |
//! |-----------------------|---------------------------------|----------------------|
//! | `Msr`                 | register read/write failed      | current step skipped |
//! | `Apic`                | LVT offset registration failed  | blocks not routed    |
//! | `OutOfMemory`         | bookkeeping allocation failed   | bring-up aborted     |
//! | `NoDevice`            | target CPU unreachable          | tunable not applied  |
//! | `InvalidCpu`          | CPU index out of range          | request rejected     |
//! | `NotFound`            | bank/block does not exist       | request rejected     |
//! | `InvalidArgument`     | tunable not supported by block  | request rejected     |
//! | `InvalidConfig`       | configuration inconsistent      | subsystem not built  |

use core::fmt;

use mca_hal::{ApicError, CpuId, MsrError};

/// Threshold subsystem error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum McaError {
    /// Register access failed
    Msr(MsrError),
    /// Extended LVT registration failed
    Apic(ApicError),
    /// Bookkeeping allocation failed
    OutOfMemory,
    /// The owning CPU could not run the request
    NoDevice,
    /// CPU index out of range
    InvalidCpu(CpuId),
    /// Bank or block does not exist
    NotFound,
    /// Request not supported by the target
    InvalidArgument,
    /// Configuration rejected
    InvalidConfig(&'static str),
}

impl fmt::Display for McaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            McaError::Msr(err) => write!(f, "{}", err),
            McaError::Apic(err) => write!(f, "{}", err),
            McaError::OutOfMemory => write!(f, "Out of memory"),
            McaError::NoDevice => write!(f, "No such device"),
            McaError::InvalidCpu(cpu) => write!(f, "Invalid CPU {}", cpu),
            McaError::NotFound => write!(f, "Not found"),
            McaError::InvalidArgument => write!(f, "Invalid argument"),
            McaError::InvalidConfig(reason) => write!(f, "Invalid configuration: {}", reason),
        }
    }
}

impl From<MsrError> for McaError {
    fn from(err: MsrError) -> Self {
        McaError::Msr(err)
    }
}

impl From<ApicError> for McaError {
    fn from(err: ApicError) -> Self {
        McaError::Apic(err)
    }
}

/// Result type for the threshold subsystem
pub type McaResult<T> = Result<T, McaError>;
