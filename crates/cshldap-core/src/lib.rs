//! # cshldap-core
//!
//! Shared types for the CSH member directory client.
//!
//! ## Modules
//!
//! - [`error`] - Error type and result alias used across the workspace
//! - [`credentials`] - Bind credentials for service accounts and interactive users

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod credentials;
pub mod error;

// Re-export commonly used types
pub use credentials::BindCredentials;
pub use error::{Error, Result};
