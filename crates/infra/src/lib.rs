//! # ssogate Infrastructure
//!
//! Every network exchange of the gateway.
//!
//! This crate contains:
//! - The blocking HTTP transport and its redirect follower
//! - The SSO login ceremony, captcha seam, and tunnel gateway login
//! - Service redemption and the lazily refreshed service session
//! - The enveloped RPC codec and the BYKC / JWXT clients
//! - Configuration loading and tracing setup
//!
//! ## Architecture
//! - Depends on `ssogate-domain` for types and `ssogate-common` for crypto
//!   and retry orchestration
//! - Fully synchronous; callers in async code wrap calls in
//!   `spawn_blocking`

pub mod clients;
pub mod config;
pub mod envelope;
pub mod errors;
pub mod http;
pub mod observability;
pub mod session;
pub mod sso;

// Re-export commonly used items
pub use clients::{
    AuthenticatedSession, BykcClient, GatePolicy, JwxtClient, RequestBody, ServiceClient,
};
pub use envelope::EnvelopeCodec;
pub use errors::InfraError;
pub use http::HttpClient;
pub use observability::{init_tracing, LogFormat};
pub use session::SessionBroker;
pub use sso::{CaptchaSolver, PromptSolver, RefuseCaptcha, TicketIssuer, TunnelGateway};
