//! Endpoint resolution
//!
//! Every URL the gateway talks to is derived from the tunnel variant the way
//! the WebVPN gateway rewrites hostnames, unless the configuration overrides
//! the base explicitly.

use url::Url;

use crate::config::GateConfig;
use crate::constants::{DEFAULT_BYKC_BASE, DEFAULT_JWXT_BASE, DEFAULT_SSO_BASE, JWXT_PATH_ID};
use crate::errors::{GateError, Result};
use crate::types::TunnelVariant;

/// Resolved base URLs for one deployment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub sso: Url,
    /// Present only for tunneled deployments
    pub tunnel_gateway: Option<Url>,
    pub bykc: Url,
    pub jwxt: Url,
}

fn parse(field: &str, raw: &str) -> Result<Url> {
    Url::parse(raw).map_err(|e| GateError::config(format!("invalid {field} URL '{raw}': {e}")))
}

/// Direct host, or its tunnel-rewritten form when a variant is selected.
fn derive(
    tunnel: Option<TunnelVariant>,
    direct: &str,
    tunneled: impl Fn(TunnelVariant) -> String,
) -> String {
    tunnel.map(tunneled).unwrap_or_else(|| direct.to_string())
}

/// Append a path to a base without discarding the base's own path.
fn join(base: &Url, path: &str) -> Result<Url> {
    let raw = format!("{}/{}", base.as_str().trim_end_matches('/'), path.trim_start_matches('/'));
    parse("endpoint", &raw)
}

impl Endpoints {
    /// Resolve against `tunnel`, falling back to the configured variant.
    pub fn resolve(config: &GateConfig, tunnel: Option<TunnelVariant>) -> Result<Self> {
        let tunnel = tunnel.or(config.tunnel);
        let overrides = &config.endpoints;

        let sso = match &overrides.sso {
            Some(raw) => parse("sso", raw)?,
            None => parse(
                "sso",
                &derive(tunnel, DEFAULT_SSO_BASE, |n| format!("https://sso-443.e{n}.buaa.edu.cn")),
            )?,
        };

        let tunnel_gateway = match (&overrides.tunnel_gateway, tunnel) {
            (Some(raw), _) => Some(parse("tunnel_gateway", raw)?),
            (None, Some(n)) => Some(parse("tunnel_gateway", &format!("https://e{n}.buaa.edu.cn"))?),
            (None, None) => None,
        };

        let bykc = match &overrides.bykc {
            Some(raw) => parse("bykc", raw)?,
            None => parse(
                "bykc",
                &derive(tunnel, DEFAULT_BYKC_BASE, |n| format!("https://bykc.e{n}.buaa.edu.cn")),
            )?,
        };

        let jwxt = match &overrides.jwxt {
            Some(raw) => parse("jwxt", raw)?,
            None => parse(
                "jwxt",
                &derive(tunnel, DEFAULT_JWXT_BASE, |n| format!("https://jwxt-8080.e{n}.buaa.edu.cn")),
            )?,
        };

        Ok(Self { sso, tunnel_gateway, bykc, jwxt })
    }

    pub fn is_tunneled(&self) -> bool {
        self.tunnel_gateway.is_some()
    }

    /// SSO login form, also the redemption endpoint.
    pub fn sso_login(&self) -> Result<Url> {
        join(&self.sso, "login")
    }

    pub fn captcha(&self, captcha_id: &str) -> Result<Url> {
        let mut url = join(&self.sso, "captcha")?;
        url.query_pairs_mut().append_pair("captchaId", captcha_id);
        Ok(url)
    }

    /// Tunnel gateway sign-in form, for tunneled deployments.
    pub fn tunnel_sign_in(&self) -> Result<Option<Url>> {
        self.tunnel_gateway.as_ref().map(|base| join(base, "users/sign_in")).transpose()
    }

    /// Destination redeemed to open a BYKC session.
    pub fn bykc_login_target(&self) -> Result<Url> {
        join(&self.bykc, "sscv/casLogin")
    }

    pub fn bykc_api(&self, name: &str) -> Result<Url> {
        join(&self.bykc, &format!("sscv/{name}"))
    }

    /// Destination redeemed to open a JWXT session.
    pub fn jwxt_login_target(&self) -> Result<Url> {
        let mut url = self.jwxt_page("welcome")?;
        url.set_query(Some("falg=1"));
        Ok(url)
    }

    pub fn jwxt_page(&self, path: &str) -> Result<Url> {
        join(&self.jwxt, &format!("{JWXT_PATH_ID}/{}", path.trim_start_matches('/')))
    }
}
