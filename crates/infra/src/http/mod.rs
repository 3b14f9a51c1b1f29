//! Blocking HTTP transport shared by every gateway component

pub mod client;

pub use client::{absorb_cookies, Hop, HttpClient, HttpClientBuilder, Landing};
