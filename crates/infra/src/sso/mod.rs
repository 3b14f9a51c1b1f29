//! SSO front end: login ceremony, captcha seam, and tunnel gateway

pub mod captcha;
pub mod ticket;
pub mod tunnel;

pub use captcha::{CaptchaSolver, PromptSolver, RefuseCaptcha};
pub use ticket::TicketIssuer;
pub use tunnel::TunnelGateway;
