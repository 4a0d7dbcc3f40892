//! HTTP request handlers.

pub mod admin;
pub mod auth;
pub mod common;
pub mod health;
pub mod sites;

pub use admin::*;
pub use auth::*;
pub use common::*;
pub use health::*;
pub use sites::*;
