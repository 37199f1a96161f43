//! Unified error type for the periphd-lib crate.
//!
//! [`PeriphdError`] wraps module-specific errors (`DeviceError`,
//! `BringUpError`) plus I/O and configuration failures. `From` impls allow
//! `?` to propagate across module boundaries.

use std::fmt;

use crate::bringup::BringUpError;
use crate::device::DeviceError;

#[derive(Debug)]
pub enum PeriphdError {
    /// Backend communication error.
    Device(DeviceError),
    /// Device bring-up aborted.
    BringUp(BringUpError),
    /// Standard I/O error (config persistence).
    Io(std::io::Error),
    /// Configuration or argument validation error.
    Config(String),
}

impl fmt::Display for PeriphdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeriphdError::Device(e) => write!(f, "{e}"),
            PeriphdError::BringUp(e) => write!(f, "Bring-up failed: {e}"),
            PeriphdError::Io(e) => write!(f, "I/O error: {e}"),
            PeriphdError::Config(e) => write!(f, "Config error: {e}"),
        }
    }
}

impl std::error::Error for PeriphdError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PeriphdError::Device(e) => Some(e),
            PeriphdError::BringUp(e) => Some(e),
            PeriphdError::Io(e) => Some(e),
            PeriphdError::Config(_) => None,
        }
    }
}

impl From<DeviceError> for PeriphdError {
    fn from(e: DeviceError) -> Self {
        PeriphdError::Device(e)
    }
}

impl From<BringUpError> for PeriphdError {
    fn from(e: BringUpError) -> Self {
        PeriphdError::BringUp(e)
    }
}

impl From<std::io::Error> for PeriphdError {
    fn from(e: std::io::Error) -> Self {
        PeriphdError::Io(e)
    }
}

/// Crate-level Result alias using [`PeriphdError`].
pub type Result<T> = std::result::Result<T, PeriphdError>;
