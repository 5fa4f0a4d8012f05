//! # Warden Common
//!
//! Shared types, errors, and constants used across Warden components.
//!
//! ## Modules
//! - `types` - Identities, challenge and pending-verification records, outcomes
//! - `error` - Common error type
//! - `constants` - Defaults shared by configuration and the gate

pub mod constants;
pub mod error;
pub mod types;

pub use error::WardenError;
pub use types::*;
