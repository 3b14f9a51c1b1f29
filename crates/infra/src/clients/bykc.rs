//! BYKC course-selection client

use std::sync::Arc;

use serde_json::{json, Value};
use ssogate_common::{Refresh, RetryOrchestrator};
use ssogate_domain::constants::{BYKC_AUTH_HEADER, BYKC_TOKEN_PARAM};
use ssogate_domain::{
    ApiPayload, CookieSet, Course, Credential, Endpoints, GateConfig, GateError, Result,
};
use tracing::{info, instrument};
use url::Url;

use super::{retry_config, AuthenticatedSession, GatePolicy, RequestBody, ServiceClient};
use crate::envelope::{decode_reply, EnvelopeCodec};
use crate::errors::gate;
use crate::http::{Hop, HttpClient};
use crate::session::SessionBroker;
use crate::sso::CaptchaSolver;

/// Enveloped client for the BYKC backend
///
/// Every call is sealed under a new envelope, so a retried call never reuses
/// key material from the failed one.
pub struct BykcClient {
    session: AuthenticatedSession,
    codec: EnvelopeCodec,
    http: HttpClient,
    endpoints: Endpoints,
    retry: RetryOrchestrator<GatePolicy>,
}

impl BykcClient {
    /// Build a client; no request is made until the first call.
    ///
    /// # Errors
    ///
    /// Returns `Config` when the configuration, endpoints, or public key
    /// are invalid.
    pub fn new(
        config: &GateConfig,
        credential: Credential,
        solver: Arc<dyn CaptchaSolver>,
    ) -> Result<Self> {
        config.validate()?;
        let endpoints = Endpoints::resolve(config, credential.tunnel())?;
        let http = HttpClient::from_config(&config.http)?;
        let target = endpoints.bykc_login_target()?;
        let broker = SessionBroker::new(http.clone(), endpoints.clone(), credential, solver)?;

        Ok(Self {
            session: AuthenticatedSession::new(broker, target),
            codec: EnvelopeCodec::from_config(http.clone(), config)?,
            http,
            endpoints,
            retry: RetryOrchestrator::new(retry_config(&config.retry)?, GatePolicy),
        })
    }

    pub fn session(&self) -> &AuthenticatedSession {
        &self.session
    }

    /// Cookies and `auth_token` of the current session.
    fn credentials(&mut self) -> Result<(CookieSet, String)> {
        let session = self.session.session()?;
        let token = session.query_param(BYKC_TOKEN_PARAM).ok_or_else(|| {
            GateError::session_expired(format!(
                "redemption landed on {} without a {BYKC_TOKEN_PARAM} parameter",
                session.final_url()
            ))
        })?;
        Ok((session.request_cookies(), token))
    }

    fn call(&mut self, name: &str, payload: &Value) -> Result<ApiPayload> {
        let url = self.endpoints.bykc_api(name)?;
        self.post(&url, RequestBody::Json(payload.clone()))
    }

    /// Idempotent API read; `Ok(None)` once the retry budget is spent.
    #[instrument(skip(self, payload))]
    pub fn query(&mut self, name: &str, payload: Value) -> Result<Option<ApiPayload>> {
        let retry = self.retry.clone();
        retry.query(name, self, |client| client.call(name, &payload))
    }

    /// State-changing API call: at most two submissions.
    #[instrument(skip(self, payload))]
    pub fn api(&mut self, name: &str, payload: Value) -> Result<ApiPayload> {
        let retry = self.retry.clone();
        retry.command(name, self, |client| client.call(name, &payload))
    }

    pub fn selectable(&mut self) -> Result<Option<Vec<Course>>> {
        self.course_list("querySelectableCourse")
    }

    /// Courses announced but not yet open for selection.
    pub fn forecast(&mut self) -> Result<Option<Vec<Course>>> {
        self.course_list("queryForeCourse")
    }

    pub fn chosen(&mut self) -> Result<Option<Vec<Course>>> {
        self.chosen_section("courseList")
    }

    /// Courses taken in earlier terms.
    pub fn history(&mut self) -> Result<Option<Vec<Course>>> {
        self.chosen_section("historyCourseList")
    }

    /// Full record of one course; status `"1"` (no such course) is terminal.
    #[instrument(skip(self))]
    pub fn detail(&mut self, id: i64) -> Result<Option<Course>> {
        let retry = self.retry.clone();
        retry.query("queryCourseById", self, |client| {
            match client.call("queryCourseById", &json!({ "id": id }))? {
                ApiPayload::Map(map) => Course::from_value(Value::Object(map)),
                other => Err(GateError::protocol(
                    None,
                    format!("queryCourseById answered {other:?} instead of a course"),
                )),
            }
        })
    }

    /// Enroll and report whether the course now shows up as chosen.
    ///
    /// # Errors
    ///
    /// Fails when the submission fails or the chosen list cannot be read
    /// back within the retry budget.
    #[instrument(skip(self))]
    pub fn enroll(&mut self, id: i64) -> Result<bool> {
        self.api("choseCourse", json!({ "courseId": id }))?;
        let confirmed = self.is_chosen(id)?;
        info!(id, confirmed, "enrollment submitted");
        Ok(confirmed)
    }

    /// Drop and report whether the course is gone from the chosen list.
    #[instrument(skip(self))]
    pub fn drop(&mut self, id: i64) -> Result<bool> {
        self.api("delChosenCourse", json!({ "id": id }))?;
        let confirmed = !self.is_chosen(id)?;
        info!(id, confirmed, "drop submitted");
        Ok(confirmed)
    }

    /// Membership in the chosen list; an unreadable list is an error, never
    /// an answer.
    fn is_chosen(&mut self, id: i64) -> Result<bool> {
        match self.chosen()? {
            Some(courses) => Ok(courses.iter().any(|c| c.id == id)),
            None => Err(GateError::transport(format!(
                "could not confirm course {id}: the chosen list stayed unreadable"
            ))),
        }
    }

    fn course_list(&mut self, name: &str) -> Result<Option<Vec<Course>>> {
        let retry = self.retry.clone();
        retry.query(name, self, |client| courses_from(client.call(name, &json!({}))?))
    }

    fn chosen_section(&mut self, section: &str) -> Result<Option<Vec<Course>>> {
        let retry = self.retry.clone();
        retry.query("queryChosenCourse", self, |client| {
            match client.call("queryChosenCourse", &json!({}))? {
                ApiPayload::Map(mut map) => {
                    let entries = match map.remove(section) {
                        Some(Value::Array(entries)) => entries,
                        _ => Vec::new(),
                    };
                    entries
                        .into_iter()
                        .filter_map(|mut entry| entry.get_mut("courseInfo").map(Value::take))
                        .filter(|info| !info.is_null())
                        .map(Course::from_value)
                        .collect()
                }
                other => Err(GateError::protocol(
                    None,
                    format!("queryChosenCourse answered {other:?} instead of a map"),
                )),
            }
        })
    }
}

/// Course records of a list payload; an empty payload is an empty list.
fn courses_from(payload: ApiPayload) -> Result<Vec<Course>> {
    match payload {
        ApiPayload::Empty => Ok(Vec::new()),
        ApiPayload::List(items) => items.into_iter().map(Course::from_value).collect(),
        other => Err(GateError::protocol(None, format!("expected a course list, got {other:?}"))),
    }
}

impl Refresh for BykcClient {
    type Error = GateError;

    fn refresh(&mut self) -> Result<()> {
        self.session.refresh()
    }
}

impl ServiceClient for BykcClient {
    type Output = ApiPayload;

    /// Plain GET answered with an unencrypted `{status, data}` reply.
    fn get(&mut self, url: &Url) -> Result<ApiPayload> {
        let (cookies, token) = self.credentials()?;
        let builder = self
            .http
            .request_for(&Hop::get(url.clone()).with_cookies(cookies))
            .header(BYKC_AUTH_HEADER, token);
        let response = self.http.send(builder)?;
        let status = response.status();
        if !status.is_success() {
            return Err(GateError::transport(format!("{url} answered {status}")));
        }
        decode_reply(response.json::<Value>().map_err(gate)?)
    }

    fn post(&mut self, url: &Url, body: RequestBody) -> Result<ApiPayload> {
        let (cookies, token) = self.credentials()?;
        self.codec.call(url, &body.into_json(), &cookies, Some(&token))
    }
}

impl std::fmt::Debug for BykcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BykcClient")
            .field("target", self.session.target())
            .field("established", &self.session.is_established())
            .finish()
    }
}
