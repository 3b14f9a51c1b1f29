//! Authentication artifacts: tickets, cookie sets, and service sessions

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

/// Name-keyed cookie jar for one scope
///
/// Later inserts replace earlier values of the same name. `Debug` lists the
/// names only, since values are bearer secrets.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CookieSet(BTreeMap<String, String>);

impl fmt::Debug for CookieSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.0.keys()).finish()
    }
}

impl CookieSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Copy every cookie of `other` in, overwriting same-named entries.
    pub fn absorb(&mut self, other: &CookieSet) {
        for (name, value) in &other.0 {
            self.0.insert(name.clone(), value.clone());
        }
    }

    /// New set with `self` as the base and `overlay` winning on conflicts.
    pub fn merged(&self, overlay: &CookieSet) -> CookieSet {
        let mut merged = self.clone();
        merged.absorb(overlay);
        merged
    }

    /// `name=value; name=value` for a `Cookie` header, `None` when empty.
    pub fn header_value(&self) -> Option<String> {
        if self.0.is_empty() {
            return None;
        }
        let pairs: Vec<String> = self.0.iter().map(|(k, v)| format!("{k}={v}")).collect();
        Some(pairs.join("; "))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for CookieSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Ordered form fields of a submitted SSO login
///
/// Replayed verbatim during service redemption.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct LoginForm(Vec<(String, String)>);

const SECRET_FIELDS: &[&str] = &["password", "user[password]"];

impl fmt::Debug for LoginForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (name, value) in &self.0 {
            if SECRET_FIELDS.contains(&name.as_str()) {
                map.entry(name, &"[REDACTED]");
            } else {
                map.entry(name, value);
            }
        }
        map.finish()
    }
}

impl LoginForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.push((name.into(), value.into()));
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }

    pub fn fields(&self) -> &[(String, String)] {
        &self.0
    }
}

/// SSO authentication artifact produced by one login ceremony
///
/// Never mutated: a refresh yields a brand new `Ticket`.
#[derive(Clone)]
pub struct Ticket {
    token: String,
    execution: String,
    captcha_id: Option<String>,
    acquired_at: DateTime<Utc>,
    form: LoginForm,
    cookies: CookieSet,
}

impl fmt::Debug for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ticket")
            .field("token", &"[REDACTED]")
            .field("execution_len", &self.execution.len())
            .field("captcha_id", &self.captcha_id)
            .field("acquired_at", &self.acquired_at)
            .field("form", &self.form)
            .field("cookies", &self.cookies)
            .finish()
    }
}

impl Ticket {
    pub fn new(
        token: impl Into<String>,
        execution: impl Into<String>,
        captcha_id: Option<String>,
        form: LoginForm,
        cookies: CookieSet,
    ) -> Self {
        Self {
            token: token.into(),
            execution: execution.into(),
            captcha_id,
            acquired_at: Utc::now(),
            form,
            cookies,
        }
    }

    /// `CASTGC` cookie value.
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn execution(&self) -> &str {
        &self.execution
    }

    /// Captcha challenge answered during this ceremony, if one was issued.
    pub fn captcha_id(&self) -> Option<&str> {
        self.captcha_id.as_deref()
    }

    pub fn acquired_at(&self) -> DateTime<Utc> {
        self.acquired_at
    }

    pub fn form(&self) -> &LoginForm {
        &self.form
    }

    /// Cookies the SSO handed out with the login page.
    pub fn cookies(&self) -> &CookieSet {
        &self.cookies
    }
}

/// Cookie-scoped session on one backend, derived from a [`Ticket`]
#[derive(Debug, Clone)]
pub struct ServiceSession {
    cookies: CookieSet,
    tunnel_cookies: CookieSet,
    final_url: Url,
    ticket_acquired_at: DateTime<Utc>,
}

impl ServiceSession {
    /// Only constructible from the ticket it was redeemed with.
    pub fn new(
        ticket: &Ticket,
        cookies: CookieSet,
        tunnel_cookies: CookieSet,
        final_url: Url,
    ) -> Self {
        Self { cookies, tunnel_cookies, final_url, ticket_acquired_at: ticket.acquired_at() }
    }

    /// Cookies the redirect chain set for the service.
    pub fn cookies(&self) -> &CookieSet {
        &self.cookies
    }

    /// Cookies from the tunnel gateway login, kept apart from service cookies.
    pub fn tunnel_cookies(&self) -> &CookieSet {
        &self.tunnel_cookies
    }

    /// Cookies to send: tunnel first, service cookies override on conflict.
    pub fn request_cookies(&self) -> CookieSet {
        self.tunnel_cookies.merged(&self.cookies)
    }

    pub fn final_url(&self) -> &Url {
        &self.final_url
    }

    /// First value of a query parameter on the landing URL.
    pub fn query_param(&self, name: &str) -> Option<String> {
        self.final_url.query_pairs().find(|(k, _)| k == name).map(|(_, v)| v.into_owned())
    }

    pub fn ticket_acquired_at(&self) -> DateTime<Utc> {
        self.ticket_acquired_at
    }
}
