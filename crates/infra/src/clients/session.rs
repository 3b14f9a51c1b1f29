//! Lazily established, refreshable service session

use ssogate_common::Refresh;
use ssogate_domain::{GateError, Result, ServiceSession};
use tracing::{info, warn};
use url::Url;

use crate::session::SessionBroker;

/// Holds the current [`ServiceSession`] for one redemption target
///
/// Nothing touches the network until the first call needs a session. A
/// refresh that fails leaves the previous session in place.
pub struct AuthenticatedSession {
    broker: SessionBroker,
    target: Url,
    current: Option<ServiceSession>,
}

impl AuthenticatedSession {
    pub fn new(broker: SessionBroker, target: Url) -> Self {
        Self { broker, target, current: None }
    }

    pub fn target(&self) -> &Url {
        &self.target
    }

    pub fn broker(&self) -> &SessionBroker {
        &self.broker
    }

    pub fn is_established(&self) -> bool {
        self.current.is_some()
    }

    /// Session in effect, if one was ever established.
    pub fn peek(&self) -> Option<&ServiceSession> {
        self.current.as_ref()
    }

    /// Session in effect, redeeming one on first use.
    pub fn session(&mut self) -> Result<&ServiceSession> {
        if self.current.is_none() {
            return self.renew();
        }
        self.current
            .as_ref()
            .ok_or_else(|| GateError::Internal("session vanished after presence check".into()))
    }

    /// Redeem a new session and swap it in once redemption succeeds.
    pub fn renew(&mut self) -> Result<&ServiceSession> {
        match self.broker.redeem(&self.target) {
            Ok(fresh) => {
                info!(service = %self.target, "session renewed");
                Ok(self.current.insert(fresh))
            }
            Err(err) => {
                if self.current.is_some() {
                    warn!(service = %self.target, error = %err, "renewal failed, keeping previous session");
                }
                Err(err)
            }
        }
    }
}

impl Refresh for AuthenticatedSession {
    type Error = GateError;

    fn refresh(&mut self) -> Result<()> {
        self.renew().map(|_| ())
    }
}
