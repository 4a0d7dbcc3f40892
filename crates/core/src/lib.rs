//! Core domain types and shared logic for the plinth static-site host.
//!
//! This crate defines the data model shared by every other crate:
//! - Site identifiers and their public URLs
//! - Token scopes and the caller identity they confer
//! - Application configuration

pub mod config;
pub mod error;
pub mod identifier;
pub mod token;

pub use error::{Error, Result};
pub use identifier::{SiteIdentifier, site_url};
pub use token::{Actor, Token, TokenScope};

/// Length of a randomly allocated site identifier.
pub const GENERATED_IDENTIFIER_LEN: usize = 5;

/// Minimum length of a user-chosen identifier.
pub const MIN_IDENTIFIER_LEN: usize = 3;

/// Maximum length of an identifier (one DNS label).
pub const MAX_IDENTIFIER_LEN: usize = 63;
