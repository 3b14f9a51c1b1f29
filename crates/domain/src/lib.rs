//! # ssogate Domain
//!
//! Domain types and models for the SSO gateway.
//!
//! This crate contains:
//! - Credentials, tickets, cookie sets, and service sessions
//! - The outward `GateError` type and `Result` alias
//! - Configuration structures and endpoint resolution
//! - Backend records (BYKC courses, JWXT terms) and protocol constants
//!
//! ## Architecture
//! - Depends only on the foundation tier of `ssogate-common`
//! - No I/O; every network exchange lives in `ssogate-infra`

pub mod config;
pub mod constants;
pub mod endpoints;
pub mod errors;
pub mod types;

// Re-export commonly used items
pub use config::*;
pub use endpoints::Endpoints;
pub use errors::*;
pub use types::*;
