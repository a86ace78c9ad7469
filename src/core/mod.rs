//! Core module - Common types, time decoding, and error handling

pub mod error;
pub mod time;
pub mod types;

pub use error::{Error, Result};
pub use types::*;
