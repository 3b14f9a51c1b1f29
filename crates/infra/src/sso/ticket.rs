//! SSO login ceremony

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use ssogate_domain::constants::{CASTGC_COOKIE, LOGIN_EVENT, LOGIN_TYPE};
use ssogate_domain::{CookieSet, Credential, Endpoints, GateError, LoginForm, Result, Ticket};
use tracing::{debug, info, instrument, warn};

use crate::errors::gate;
use crate::http::{Hop, HttpClient};
use crate::sso::captcha::CaptchaSolver;

static EXECUTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"name="execution" value="([^"]*)""#)
        .expect("execution regex should compile - this is a bug")
});

static CAPTCHA_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"config.captcha\s*=\s*\{\s*type:\s*'image',\s*id:\s*'(-?[0-9]+)'")
        .expect("captcha regex should compile - this is a bug")
});

/// Execution nonce embedded in the SSO login page.
pub fn extract_execution(page: &str) -> Option<String> {
    EXECUTION.captures(page).map(|c| c[1].to_string())
}

/// Pending image challenge id, if the page asks for one.
pub fn extract_captcha_id(page: &str) -> Option<String> {
    CAPTCHA_ID.captures(page).map(|c| c[1].to_string())
}

/// Runs the SSO login ceremony and hands out fresh [`Ticket`]s
pub struct TicketIssuer {
    http: HttpClient,
    endpoints: Endpoints,
    credential: Credential,
    solver: Arc<dyn CaptchaSolver>,
}

impl TicketIssuer {
    pub fn new(
        http: HttpClient,
        endpoints: Endpoints,
        credential: Credential,
        solver: Arc<dyn CaptchaSolver>,
    ) -> Self {
        Self { http, endpoints, credential, solver }
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// Perform one full login and return the resulting ticket.
    ///
    /// A rejected submission is returned as `AuthenticationFailed` and is
    /// never resubmitted here.
    #[instrument(skip(self), fields(username = %self.credential.username()))]
    pub fn refresh(&self) -> Result<Ticket> {
        let login = self.endpoints.sso_login()?;
        let (status, cookies, page) = self.http.fetch(Hop::get(login.clone()))?;
        if !status.is_success() {
            return Err(GateError::transport(format!("SSO login page answered {status}")));
        }

        let execution = extract_execution(&page).ok_or_else(|| {
            GateError::protocol(None, "SSO login page carries no execution nonce")
        })?;
        let captcha_id = extract_captcha_id(&page);

        let mut form = LoginForm::new()
            .field("username", self.credential.username())
            .field("password", self.credential.password())
            .field("type", LOGIN_TYPE)
            .field("execution", execution.clone())
            .field("_eventId", LOGIN_EVENT);

        if let Some(id) = &captcha_id {
            info!(captcha_id = %id, "SSO requested a captcha");
            let answer = self.solve_captcha(id, &cookies)?;
            form = form.field("captcha", answer);
        }

        let submit = Hop::post_form(login, form.clone()).with_cookies(cookies.clone());
        let (status, issued, _) = self.http.fetch(submit)?;
        debug!(%status, cookies = ?issued, "login form submitted");

        if status.is_server_error() {
            return Err(GateError::transport(format!("SSO login submission answered {status}")));
        }

        match issued.get(CASTGC_COOKIE) {
            Some(token) => {
                info!("SSO ticket acquired");
                Ok(Ticket::new(token, execution, captcha_id, form, cookies))
            }
            None => {
                warn!(%status, "SSO answered without a ticket cookie");
                Err(GateError::AuthenticationFailed(format!(
                    "SSO answered {status} without a {CASTGC_COOKIE} cookie; check the \
                     credentials, the captcha answer, or retry after a few seconds"
                )))
            }
        }
    }

    fn solve_captcha(&self, captcha_id: &str, cookies: &CookieSet) -> Result<String> {
        let url = self.endpoints.captcha(captcha_id)?;
        let response = self.http.send(
            self.http.request_for(&Hop::get(url).with_cookies(cookies.clone())),
        )?;
        if !response.status().is_success() {
            return Err(GateError::transport(format!(
                "captcha image answered {}",
                response.status()
            )));
        }
        let image = response.bytes().map_err(gate)?;
        self.solver.solve(captcha_id, &image)
    }
}
