//! Error types for the Kernel.

use consent_kernel_core::{ConsentError, ErrorKind};
use consent_kernel_store::StoreError;
use thiserror::Error;

/// Errors that can occur during Kernel operations.
#[derive(Debug, Error)]
pub enum KernelError {
    /// The operation was rejected by the consent rules.
    #[error(transparent)]
    Consent(#[from] ConsentError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Invalid kernel configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl KernelError {
    /// The consent error kind, when the rules rejected the call.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            KernelError::Consent(e) => Some(e.kind()),
            _ => None,
        }
    }

    /// Stable numeric code: the consent kind's code, or 1 for
    /// infrastructure failures.
    pub fn code(&self) -> u32 {
        self.kind().map(ErrorKind::code).unwrap_or(1)
    }
}

/// Result type for Kernel operations.
pub type Result<T> = std::result::Result<T, KernelError>;
