//! Cryptographic primitives for enveloped RPC.

pub mod envelope;

pub use envelope::{sign, Envelope, KeyWrapper, OpenError, SessionKey, SESSION_KEY_LEN};
