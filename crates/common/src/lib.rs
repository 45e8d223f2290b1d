//! Common utilities and types shared across hostwatch components.

pub mod error;
pub mod logging;

pub use error::{Error, Result};
