//! Shared vocabulary of the policyqa workspace: chunk and ranking types, the
//! error taxonomy, the collaborator traits, and configuration loading.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
