//! Login credentials

use std::fmt;

use serde::{Deserialize, Serialize};

/// Numeric id of the WebVPN tunnel a deployment is reached through.
///
/// Variant `n` maps hosts such as `bykc.buaa.edu.cn` onto
/// `bykc.e<n>.buaa.edu.cn`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TunnelVariant(pub u16);

impl fmt::Display for TunnelVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unified identity account used for every login ceremony
///
/// Immutable once built; the password never appears in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    username: String,
    password: String,
    tunnel: Option<TunnelVariant>,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("tunnel", &self.tunnel)
            .finish()
    }
}

impl Credential {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self { username: username.into(), password: password.into(), tunnel: None }
    }

    /// Route every request through the given tunnel gateway.
    pub fn with_tunnel(mut self, tunnel: TunnelVariant) -> Self {
        self.tunnel = Some(tunnel);
        self
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn tunnel(&self) -> Option<TunnelVariant> {
        self.tunnel
    }
}
