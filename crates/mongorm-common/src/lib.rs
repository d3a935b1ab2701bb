//! Common utilities for mongorm
//!
//! This crate provides the error type shared by the mongorm crates.

pub mod error;

pub use error::{MongormError, Result};
