//! WebVPN tunnel gateway login

use once_cell::sync::Lazy;
use regex::Regex;
use ssogate_domain::{CookieSet, Credential, GateError, LoginForm, Result};
use tracing::{debug, info, instrument};
use url::Url;

use crate::http::{Hop, HttpClient};

static CSRF_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<meta\s*name="csrf-token"\s*content="([A-Za-z0-9/=+-]+)""#)
        .expect("csrf regex should compile - this is a bug")
});

/// `authenticity_token` scraped from the sign-in page.
pub fn extract_csrf_token(page: &str) -> Option<String> {
    CSRF_TOKEN.captures(page).map(|c| c[1].to_string())
}

/// Signs in to a tunneled deployment's WebVPN gateway
#[derive(Clone)]
pub struct TunnelGateway {
    http: HttpClient,
    sign_in: Url,
}

impl TunnelGateway {
    pub fn new(http: HttpClient, sign_in: Url) -> Self {
        Self { http, sign_in }
    }

    pub fn sign_in_url(&self) -> &Url {
        &self.sign_in
    }

    /// Log in and return the tunnel-layer cookies.
    ///
    /// The result holds the sign-in page cookies overlaid with every cookie
    /// set along the post-login redirect chain.
    #[instrument(skip(self, credential), fields(gateway = %self.sign_in))]
    pub fn login(&self, credential: &Credential) -> Result<CookieSet> {
        let (status, cookies, page) = self.http.fetch(Hop::get(self.sign_in.clone()))?;
        if !status.is_success() {
            return Err(GateError::transport(format!("tunnel sign-in page answered {status}")));
        }

        let csrf = extract_csrf_token(&page).ok_or_else(|| {
            GateError::protocol(None, "tunnel sign-in page carries no csrf token")
        })?;

        let form = LoginForm::new()
            .field("utf8", "✓")
            .field("user[login]", credential.username())
            .field("user[password]", credential.password())
            .field("user[dymatice_code]", "unknown")
            .field("user[otp_with_capcha]", "false")
            .field("authenticity_token", csrf);

        let landing = self
            .http
            .follow(Hop::post_form(self.sign_in.clone(), form).with_cookies(cookies.clone()))?;
        debug!(hops = landing.hops, status = %landing.status, cookies = ?landing.cookies, "tunnel login landed");

        if landing.status.is_server_error() {
            return Err(GateError::transport(format!(
                "tunnel login answered {}",
                landing.status
            )));
        }
        if landing.hops == 0 && landing.final_url.path() == self.sign_in.path() {
            return Err(GateError::AuthenticationFailed(
                "tunnel gateway re-rendered the sign-in form".into(),
            ));
        }

        info!("tunnel gateway session established");
        Ok(cookies.merged(&landing.cookies))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csrf_token_is_read_from_the_meta_tag() {
        let page = r#"<head><meta name="csrf-param" content="authenticity_token" />
<meta name="csrf-token" content="aB3+/x9=-Q" /></head>"#;
        assert_eq!(extract_csrf_token(page).as_deref(), Some("aB3+/x9=-Q"));
    }

    #[test]
    fn missing_meta_tag_yields_none() {
        assert_eq!(extract_csrf_token("<head></head>"), None);
    }
}
