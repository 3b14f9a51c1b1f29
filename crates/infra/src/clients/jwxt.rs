//! JWXT academic-affairs client
//!
//! JWXT answers with HTML. A live session always renders a `<form>`; an
//! expired one bounces to the SSO, so a redirect or a page without
//! `</form>` is reported as [`GateError::SessionExpired`].

use std::sync::Arc;

use reqwest::blocking::Response;
use reqwest::header::{
    HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL, CONTENT_TYPE, ORIGIN, REFERER,
    UPGRADE_INSECURE_REQUESTS,
};
use reqwest::Method;
use ssogate_common::{Refresh, RetryOrchestrator};
use ssogate_domain::{
    normalize_course_id, Credential, Endpoints, GateConfig, GateError, JwxtTerm, LoginForm, Result,
};
use tracing::{debug, info, instrument};
use url::Url;

use super::{retry_config, AuthenticatedSession, GatePolicy, RequestBody, ServiceClient};
use crate::errors::gate;
use crate::http::{Hop, HttpClient};
use crate::session::{encode_form, SessionBroker};
use crate::sso::CaptchaSolver;

const HTML_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
const ENROLLED_LISTING: &str = "xslbxk/queryYxkc";
const DROP_FORM: &str = "xslbxk/saveXstk";

/// Whether a JWXT page belongs to a live session.
pub fn is_session_page(page: &str) -> bool {
    page.contains("</form>")
}

pub struct JwxtClient {
    session: AuthenticatedSession,
    http: HttpClient,
    endpoints: Endpoints,
    retry: RetryOrchestrator<GatePolicy>,
}

impl JwxtClient {
    /// Build a client; no request is made until the first call.
    pub fn new(
        config: &GateConfig,
        credential: Credential,
        solver: Arc<dyn CaptchaSolver>,
    ) -> Result<Self> {
        config.validate()?;
        let endpoints = Endpoints::resolve(config, credential.tunnel())?;
        let http = HttpClient::from_config(&config.http)?;
        let target = endpoints.jwxt_login_target()?;
        let broker = SessionBroker::new(http.clone(), endpoints.clone(), credential, solver)?;

        Ok(Self {
            session: AuthenticatedSession::new(broker, target),
            http,
            endpoints,
            retry: RetryOrchestrator::new(retry_config(&config.retry)?, GatePolicy),
        })
    }

    pub fn session(&self) -> &AuthenticatedSession {
        &self.session
    }

    /// `<jwxt>/ieas2.1/<path>`.
    pub fn page_url(&self, path: &str) -> Result<Url> {
        self.endpoints.jwxt_page(path)
    }

    /// GET a page under the retry loop; `Ok(None)` once the budget is spent.
    #[instrument(skip(self))]
    pub fn fetch(&mut self, path: &str) -> Result<Option<String>> {
        let url = self.page_url(path)?;
        let retry = self.retry.clone();
        retry.query(path, self, |client| client.get(&url))
    }

    /// POST a read-only form (a listing query) under the retry loop.
    #[instrument(skip(self, form))]
    pub fn query(&mut self, path: &str, form: LoginForm) -> Result<Option<String>> {
        let url = self.page_url(path)?;
        let retry = self.retry.clone();
        retry.query(path, self, |client| client.post(&url, RequestBody::Form(form.clone())))
    }

    /// POST a state-changing form: at most two submissions.
    #[instrument(skip(self, form))]
    pub fn submit(&mut self, path: &str, form: LoginForm) -> Result<String> {
        let url = self.page_url(path)?;
        let retry = self.retry.clone();
        retry.command(path, self, |client| client.post(&url, RequestBody::Form(form.clone())))
    }

    /// Enrolled-course listing page of `term`, unparsed.
    pub fn enrolled_page(&mut self, term: &JwxtTerm) -> Result<Option<String>> {
        let form = LoginForm::new()
            .field("rwh", "")
            .field("pageXklb", "xslbxk")
            .field("pageXnxq", term.code());
        self.query(ENROLLED_LISTING, form)
    }

    /// Whether the section `course_id`/`tail` is on the enrolled listing of
    /// `term`; `Ok(None)` once the retry budget is spent.
    ///
    /// # Errors
    ///
    /// Returns `Config` for a malformed course id.
    #[instrument(skip(self))]
    pub fn enrolled(
        &mut self,
        term: &JwxtTerm,
        course_id: &str,
        tail: &str,
    ) -> Result<Option<bool>> {
        let task = term.task_id(course_id, tail)?;
        let form = LoginForm::new()
            .field("rwh", "")
            .field("pageXklb", "xslbxk")
            .field("pageXnxq", term.code())
            .field("pageKcmc", normalize_course_id(course_id)?);
        let url = self.page_url(ENROLLED_LISTING)?;
        let referer = self.listing_url(term)?;
        let marker = format!("id=\"{task}\"");

        let retry = self.retry.clone();
        let page = retry.query(ENROLLED_LISTING, self, |client| {
            client.post_form(&url, &form, Some(&referer))
        })?;
        Ok(page.map(|page| page.contains(&marker)))
    }

    /// Withdraw from a section and report whether it left the enrolled
    /// listing.
    ///
    /// # Errors
    ///
    /// Fails when the withdrawal fails twice or the listing cannot be read
    /// back within the retry budget.
    #[instrument(skip(self))]
    pub fn drop(&mut self, term: &JwxtTerm, course_id: &str, tail: &str) -> Result<bool> {
        let task = term.task_id(course_id, tail)?;
        let form = LoginForm::new()
            .field("rwh", task.as_str())
            .field("pageXklb", "xslbxk")
            .field("pageXnxq", term.code())
            .field("pageKcmc", normalize_course_id(course_id)?)
            .field("pageNj", "")
            .field("pageYxdm", "")
            .field("pageZydm", "")
            .field("pageBs", "");
        let url = self.page_url(DROP_FORM)?;
        let referer = self.listing_url(term)?;

        let retry = self.retry.clone();
        retry.command(DROP_FORM, self, |client| client.post_form(&url, &form, Some(&referer)))?;

        match self.enrolled(term, course_id, tail)? {
            Some(still_enrolled) => {
                info!(%task, confirmed = !still_enrolled, "drop submitted");
                Ok(!still_enrolled)
            }
            None => Err(GateError::transport(format!(
                "could not confirm drop of {task}: the enrolled listing stayed unreadable"
            ))),
        }
    }

    /// Enrolled listing page of `term` as the browser addresses it.
    fn listing_url(&self, term: &JwxtTerm) -> Result<Url> {
        let mut url = self.page_url(ENROLLED_LISTING)?;
        url.query_pairs_mut()
            .append_pair("pageXklb", "xslbxk")
            .append_pair("pageXnxq", &term.code());
        Ok(url)
    }

    fn post_form(&mut self, url: &Url, form: &LoginForm, referer: Option<&Url>) -> Result<String> {
        let body = (FORM_CONTENT_TYPE, encode_form(form.fields()).into_bytes());
        self.exchange(Method::POST, url, Some(body), referer)
    }

    /// Browser headers; form posts also carry the page they were sent from.
    fn base_headers(&self, form_referer: Option<&Url>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(HTML_ACCEPT));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("zh-CN,zh;q=0.9"));
        let origin = self.endpoints.jwxt.origin().ascii_serialization();
        if let Ok(origin) = HeaderValue::from_str(&origin) {
            headers.insert(ORIGIN, origin);
        }
        if let Some(referer) = form_referer {
            if let Ok(referer) = HeaderValue::from_str(referer.as_str()) {
                headers.insert(REFERER, referer);
            }
            headers.insert(CACHE_CONTROL, HeaderValue::from_static("max-age=0"));
            headers.insert(UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));
        }
        headers
    }

    /// Send one request; a body without an explicit referer names its own
    /// target as the referring page.
    fn exchange(
        &mut self,
        method: Method,
        url: &Url,
        body: Option<(&'static str, Vec<u8>)>,
        referer: Option<&Url>,
    ) -> Result<String> {
        let cookies = self.session.session()?.request_cookies();
        let form_referer = body.as_ref().map(|_| referer.unwrap_or(url));
        let hop = Hop {
            method,
            url: url.clone(),
            form: None,
            cookies,
            headers: self.base_headers(form_referer),
        };
        let mut builder = self.http.request_for(&hop);
        if let Some((content_type, bytes)) = body {
            builder = builder.header(CONTENT_TYPE, content_type).body(bytes);
        }
        read_page(url, self.http.send(builder)?)
    }
}

fn read_page(url: &Url, response: Response) -> Result<String> {
    let status = response.status();
    if status.is_redirection() {
        return Err(GateError::session_expired(format!("{url} redirected with {status}")));
    }
    if !status.is_success() {
        return Err(GateError::transport(format!("{url} answered {status}")));
    }
    let page = response.text().map_err(gate)?;
    if !is_session_page(&page) {
        debug!(%url, bytes = page.len(), "page carries no form");
        return Err(GateError::session_expired(format!("{url} rendered without a form")));
    }
    Ok(page)
}

impl Refresh for JwxtClient {
    type Error = GateError;

    fn refresh(&mut self) -> Result<()> {
        self.session.refresh()
    }
}

impl ServiceClient for JwxtClient {
    type Output = String;

    fn get(&mut self, url: &Url) -> Result<String> {
        self.exchange(Method::GET, url, None, None)
    }

    fn post(&mut self, url: &Url, body: RequestBody) -> Result<String> {
        match body {
            RequestBody::Empty => self.exchange(Method::POST, url, None, None),
            RequestBody::Form(form) => self.post_form(url, &form, None),
            RequestBody::Json(value) => {
                let bytes = serde_json::to_vec(&value).map_err(gate)?;
                self.exchange(Method::POST, url, Some(("application/json", bytes)), None)
            }
        }
    }
}

impl std::fmt::Debug for JwxtClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwxtClient")
            .field("target", self.session.target())
            .field("established", &self.session.is_established())
            .finish()
    }
}
