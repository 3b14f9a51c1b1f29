//! SSO-to-service session hand-off

pub mod broker;

pub use broker::{encode_form, redemption_url, url_escape, SessionBroker};
