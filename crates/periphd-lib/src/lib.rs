//! periphd: per-device locking and bring-up for RGB keyboards and mice.

pub mod bringup;
pub mod config;
pub mod device;
pub mod error;
pub mod features;
pub mod mode_switch;
pub mod models;
pub mod queued_mutex;
pub mod slots;
pub mod wake;

pub use error::PeriphdError;
