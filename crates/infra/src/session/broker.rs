//! Service redemption: trade a fresh SSO ticket for a backend session

use std::fmt::Write as _;
use std::sync::Arc;

use ssogate_domain::constants::CASTGC_COOKIE;
use ssogate_domain::{CookieSet, Credential, Endpoints, GateError, Result, ServiceSession};
use tracing::{debug, info, instrument};
use url::Url;

use crate::http::{Hop, HttpClient};
use crate::sso::{CaptchaSolver, TicketIssuer, TunnelGateway};

/// Characters the SSO expects escaped inside a `TARGET` value.
static ESCAPE_TABLE: &[(char, &str)] = &[
    (' ', "%20"),
    ('"', "%22"),
    ('#', "%23"),
    ('%', "%25"),
    ('&', "%26"),
    ('(', "%28"),
    (')', "%29"),
    ('+', "%2B"),
    (',', "%2C"),
    ('/', "%2F"),
    (':', "%3A"),
    (';', "%3B"),
    ('<', "%3C"),
    ('=', "%3D"),
    ('>', "%3E"),
    ('?', "%3F"),
    ('@', "%40"),
    ('\\', "%5C"),
    ('|', "%7C"),
];

/// Escape `raw` one character at a time.
///
/// Table characters map to their fixed escape; control and non-ASCII
/// characters become percent-encoded UTF-8. Output is never re-scanned, so
/// `%` in the input yields exactly `%25`.
pub fn url_escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() * 3 / 2);
    for ch in raw.chars() {
        if let Some((_, escaped)) = ESCAPE_TABLE.iter().find(|(c, _)| *c == ch) {
            out.push_str(escaped);
        } else if ch.is_ascii_graphic() {
            out.push(ch);
        } else {
            let mut buf = [0u8; 4];
            for byte in ch.encode_utf8(&mut buf).bytes() {
                let _ = write!(out, "%{byte:02X}");
            }
        }
    }
    out
}

/// `application/x-www-form-urlencoded` body using [`url_escape`].
pub fn encode_form(fields: &[(String, String)]) -> String {
    fields
        .iter()
        .map(|(name, value)| format!("{}={}", url_escape(name), url_escape(value)))
        .collect::<Vec<_>>()
        .join("&")
}

/// SSO login endpoint carrying the escaped destination.
pub fn redemption_url(sso_login: &Url, target: &Url) -> Url {
    let mut url = sso_login.clone();
    url.set_query(Some(&format!("TARGET={}", url_escape(target.as_str()))));
    url
}

/// Redeems SSO tickets against backend services
pub struct SessionBroker {
    http: HttpClient,
    issuer: TicketIssuer,
    tunnel: Option<TunnelGateway>,
}

impl SessionBroker {
    pub fn new(
        http: HttpClient,
        endpoints: Endpoints,
        credential: Credential,
        solver: Arc<dyn CaptchaSolver>,
    ) -> Result<Self> {
        let tunnel = endpoints
            .tunnel_sign_in()?
            .map(|sign_in| TunnelGateway::new(http.clone(), sign_in));
        let issuer = TicketIssuer::new(http.clone(), endpoints, credential, solver);
        Ok(Self { http, issuer, tunnel })
    }

    pub fn endpoints(&self) -> &Endpoints {
        self.issuer.endpoints()
    }

    pub fn is_tunneled(&self) -> bool {
        self.tunnel.is_some()
    }

    /// Log in from scratch and follow the SSO hand-off to `target`.
    ///
    /// Every call runs a fresh ceremony; a ticket is never redeemed twice.
    #[instrument(skip(self, target), fields(service = %target))]
    pub fn redeem(&self, target: &Url) -> Result<ServiceSession> {
        let ticket = self.issuer.refresh()?;

        let tunnel_cookies = match &self.tunnel {
            Some(gateway) => gateway.login(self.issuer.credential())?,
            None => CookieSet::new(),
        };

        let mut cookies = tunnel_cookies.clone();
        cookies.insert(CASTGC_COOKIE, ticket.token());

        let url = redemption_url(&self.issuer.endpoints().sso_login()?, target);
        let landing = self
            .http
            .follow(Hop::post_form(url, ticket.form().clone()).with_cookies(cookies))?;
        debug!(
            hops = landing.hops,
            status = %landing.status,
            final_url = %landing.final_url,
            cookies = ?landing.cookies,
            "redemption landed"
        );

        if !landing.status.is_success() {
            return Err(GateError::transport(format!(
                "redemption of {target} landed on {} with {}",
                landing.final_url, landing.status
            )));
        }

        info!(final_url = %landing.final_url, "service session established");
        Ok(ServiceSession::new(&ticket, landing.cookies, tunnel_cookies, landing.final_url))
    }
}
