#![forbid(unsafe_code)]

//! Small shared utilities for the modular runtime.

pub mod humantime_serde;
pub mod secret_string;

pub use secret_string::SecretString;
