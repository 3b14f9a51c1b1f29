//! Domain types and models

pub mod course;
pub mod credential;
pub mod payload;
pub mod session;
pub mod term;

pub use course::{CampusZone, Course};
pub use credential::{Credential, TunnelVariant};
pub use payload::ApiPayload;
pub use session::{CookieSet, LoginForm, ServiceSession, Ticket};
pub use term::{jwxt_term, normalize_course_id, JwxtTerm};
