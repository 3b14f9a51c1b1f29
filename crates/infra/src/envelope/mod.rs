//! Hybrid-crypto transport
//!
//! Key generation, sealing, and opening live in `ssogate_common::crypto`;
//! this module puts envelopes on the wire.

pub mod codec;

pub use codec::{decode_reply, status_of, EnvelopeCodec};
