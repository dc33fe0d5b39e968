//! Support Chat Shared Types
//!
//! This crate contains the wire-level types shared by every support chat consumer.

pub mod error;
pub mod types;

pub use error::*;
pub use types::*;
