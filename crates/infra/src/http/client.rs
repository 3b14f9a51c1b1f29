use std::thread;
use std::time::Duration;

use reqwest::blocking::{Client as ReqwestClient, RequestBuilder, Response};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONNECTION, COOKIE, LOCATION};
use reqwest::redirect::Policy;
use reqwest::{Method, StatusCode};
use ssogate_domain::constants::{DEFAULT_ACCEPT, DEFAULT_MAX_REDIRECTS, DEFAULT_USER_AGENT};
use ssogate_domain::{CookieSet, GateError, HttpConfig, LoginForm, Result};
use tracing::debug;
use url::Url;

use crate::errors::gate;

/// Blocking HTTP client with browser headers, idempotent retries, and a
/// cookie-collecting redirect follower.
///
/// Redirects are never followed by reqwest itself; [`HttpClient::follow`]
/// walks the chain so every hop's `Set-Cookie` values can be collected.
#[derive(Clone)]
pub struct HttpClient {
    client: ReqwestClient,
    max_attempts: usize,
    base_backoff: Duration,
    max_redirects: u32,
}

/// One request in a redirect chain.
#[derive(Debug, Clone)]
pub struct Hop {
    pub method: Method,
    pub url: Url,
    pub form: Option<LoginForm>,
    /// Cookies sent on the first hop and every hop after it
    pub cookies: CookieSet,
    pub headers: HeaderMap,
}

impl Hop {
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            form: None,
            cookies: CookieSet::new(),
            headers: HeaderMap::new(),
        }
    }

    pub fn post_form(url: Url, form: LoginForm) -> Self {
        Self { method: Method::POST, form: Some(form), ..Self::get(url) }
    }

    pub fn with_cookies(mut self, cookies: CookieSet) -> Self {
        self.cookies = cookies;
        self
    }
}

/// Where a redirect chain ended up.
#[derive(Debug)]
pub struct Landing {
    pub final_url: Url,
    pub status: StatusCode,
    /// `Set-Cookie` values from every hop, later hops winning
    pub cookies: CookieSet,
    pub body: String,
    pub hops: u32,
}

impl HttpClient {
    /// Start building a new HTTP client.
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::default()
    }

    /// Convenience constructor with default configuration.
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    pub fn from_config(config: &HttpConfig) -> Result<Self> {
        Self::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .max_redirects(config.max_redirects)
            .build()
    }

    /// Create a request builder using the underlying reqwest client.
    pub fn request<U>(&self, method: Method, url: U) -> RequestBuilder
    where
        U: reqwest::IntoUrl,
    {
        self.client.request(method, url)
    }

    /// Execute a request, retrying transport failures only for idempotent
    /// methods.
    ///
    /// A non-idempotent request is sent exactly once: the remote side effects
    /// of a half-delivered POST are unknown.
    pub fn send(&self, builder: RequestBuilder) -> Result<Response> {
        let request = builder.build().map_err(gate)?;
        let method = request.method().clone();
        let url = request.url().clone();
        let idempotent = matches!(method, Method::GET | Method::HEAD | Method::OPTIONS);
        let attempts = if idempotent { self.max_attempts.max(1) } else { 1 };

        let mut pending = Some(request);
        for attempt in 0..attempts {
            let request = match pending.take() {
                Some(request) => request,
                None => break,
            };
            let retry = if attempt + 1 < attempts { request.try_clone() } else { None };

            debug!(attempt = attempt + 1, %method, %url, "sending HTTP request");

            match self.client.execute(request) {
                Ok(response) => {
                    let status = response.status();
                    debug!(attempt = attempt + 1, %method, %url, %status, "received HTTP response");

                    if status.is_server_error() && retry.is_some() {
                        pending = retry;
                        self.sleep_with_backoff(attempt + 1);
                        continue;
                    }

                    return Ok(response);
                }
                Err(err) => {
                    debug!(attempt = attempt + 1, %method, %url, error = %err, "HTTP request failed");

                    if retry.is_some() && should_retry_error(&err) {
                        pending = retry;
                        self.sleep_with_backoff(attempt + 1);
                        continue;
                    }

                    return Err(gate(err));
                }
            }
        }

        Err(GateError::Internal("http client exhausted retries without producing a result".into()))
    }

    /// Send one request without following redirects and read its text body.
    pub fn fetch(&self, hop: Hop) -> Result<(StatusCode, CookieSet, String)> {
        let response = self.send(self.request_for(&hop))?;
        let status = response.status();
        let mut cookies = CookieSet::new();
        absorb_cookies(&mut cookies, &response);
        let body = response.text().map_err(gate)?;
        Ok((status, cookies, body))
    }

    /// Walk a redirect chain by hand, collecting cookies on every hop.
    ///
    /// 301/302/303 turn into a body-less GET; 307/308 replay method and body.
    pub fn follow(&self, first: Hop) -> Result<Landing> {
        let initial = first.cookies.clone();
        let mut hop = first;
        let mut collected = CookieSet::new();
        let mut hops = 0u32;

        loop {
            hop.cookies = initial.merged(&collected);
            let response = self.send(self.request_for(&hop))?;
            let status = response.status();
            absorb_cookies(&mut collected, &response);

            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|value| value.to_str().ok())
                .map(str::to_owned);

            match location {
                Some(location) if status.is_redirection() => {
                    hops += 1;
                    if hops > self.max_redirects {
                        return Err(GateError::transport(format!(
                            "redirect chain exceeded {} hops",
                            self.max_redirects
                        )));
                    }

                    let next = hop.url.join(&location).map_err(|e| {
                        GateError::protocol(None, format!("bad redirect location '{location}': {e}"))
                    })?;
                    debug!(hop = hops, %status, from = %hop.url, to = %next, "following redirect");

                    if !matches!(
                        status,
                        StatusCode::TEMPORARY_REDIRECT | StatusCode::PERMANENT_REDIRECT
                    ) {
                        hop.method = Method::GET;
                        hop.form = None;
                    }
                    hop.url = next;
                }
                _ => {
                    let final_url = response.url().clone();
                    let body = response.text().map_err(gate)?;
                    return Ok(Landing { final_url, status, cookies: collected, body, hops });
                }
            }
        }
    }

    /// Request builder carrying the hop's headers, cookies, and form.
    pub fn request_for(&self, hop: &Hop) -> RequestBuilder {
        let mut builder = self.client.request(hop.method.clone(), hop.url.clone());
        builder = builder.headers(hop.headers.clone());
        if let Some(cookie) = hop.cookies.header_value() {
            builder = builder.header(COOKIE, cookie);
        }
        if let Some(form) = &hop.form {
            builder = builder.form(form.fields());
        }
        builder
    }

    fn backoff_delay(&self, retry_number: usize) -> Duration {
        let shift = retry_number.saturating_sub(1).min(8) as u32;
        let multiplier = 1u32 << shift;
        self.base_backoff.saturating_mul(multiplier)
    }

    fn sleep_with_backoff(&self, retry_number: usize) {
        let delay = self.backoff_delay(retry_number);
        if !delay.is_zero() {
            thread::sleep(delay);
        }
    }
}

/// Copy a response's `Set-Cookie` values into `jar`.
pub fn absorb_cookies(jar: &mut CookieSet, response: &Response) {
    for cookie in response.cookies() {
        jar.insert(cookie.name(), cookie.value());
    }
}

/// Builder for [`HttpClient`].
#[derive(Debug)]
pub struct HttpClientBuilder {
    timeout: Duration,
    max_attempts: usize,
    base_backoff: Duration,
    max_redirects: u32,
    user_agent: Option<String>,
    default_headers: Option<HeaderMap>,
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_attempts: 3,
            base_backoff: Duration::from_millis(200),
            max_redirects: DEFAULT_MAX_REDIRECTS,
            user_agent: None,
            default_headers: None,
        }
    }
}

impl HttpClientBuilder {
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Configure the total number of attempts for idempotent requests.
    pub fn max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn base_backoff(mut self, backoff: Duration) -> Self {
        self.base_backoff = backoff;
        self
    }

    pub fn max_redirects(mut self, hops: u32) -> Self {
        self.max_redirects = hops.max(1);
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// Extra headers merged over the browser defaults.
    pub fn default_headers(mut self, headers: HeaderMap) -> Self {
        self.default_headers = Some(headers);
        self
    }

    pub fn build(self) -> Result<HttpClient> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(DEFAULT_ACCEPT));
        headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
        if let Some(extra) = self.default_headers {
            headers.extend(extra);
        }

        let client = ReqwestClient::builder()
            .timeout(self.timeout)
            .redirect(Policy::none())
            .no_proxy()
            .user_agent(self.user_agent.unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()))
            .default_headers(headers)
            .build()
            .map_err(gate)?;

        Ok(HttpClient {
            client,
            max_attempts: self.max_attempts.max(1),
            base_backoff: self.base_backoff,
            max_redirects: self.max_redirects,
        })
    }
}

fn should_retry_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn client_with_defaults() -> HttpClient {
        HttpClient::builder()
            .base_backoff(Duration::from_millis(10))
            .max_attempts(3)
            .build()
            .expect("http client")
    }

    fn url(server: &MockServer, p: &str) -> Url {
        Url::parse(&format!("{}{}", server.uri(), p)).unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn retries_server_errors_for_get() {
        let server = MockServer::start().await;
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_clone = attempts.clone();
        Mock::given(method("GET"))
            .respond_with(move |_req: &wiremock::Request| -> ResponseTemplate {
                let current = attempts_clone.fetch_add(1, Ordering::SeqCst);
                if current < 2 {
                    ResponseTemplate::new(500)
                } else {
                    ResponseTemplate::new(200)
                }
            })
            .expect(3)
            .mount(&server)
            .await;

        let target = url(&server, "/");
        let status = tokio::task::spawn_blocking(move || {
            let client = client_with_defaults();
            client.send(client.request(Method::GET, target)).map(|r| r.status())
        })
        .await
        .unwrap()
        .expect("response");

        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn never_resends_a_post() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502))
            .expect(1)
            .mount(&server)
            .await;

        let target = url(&server, "/sscv/choseCourse");
        let status = tokio::task::spawn_blocking(move || {
            let client = client_with_defaults();
            client.send(client.request(Method::POST, target).body("x")).map(|r| r.status())
        })
        .await
        .unwrap()
        .expect("response");

        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn sends_browser_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("accept", DEFAULT_ACCEPT))
            .and(header("user-agent", "ssogate-test/1.0"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let target = url(&server, "/");
        let status = tokio::task::spawn_blocking(move || {
            let client = HttpClient::builder().user_agent("ssogate-test/1.0").build().unwrap();
            client.fetch(Hop::get(target)).map(|(status, _, _)| status)
        })
        .await
        .unwrap()
        .unwrap();

        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn follow_collects_cookies_across_hops() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/start"))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("location", "/middle")
                    .append_header("set-cookie", "route=r1; Path=/")
                    .append_header("set-cookie", "JSESSIONID=first; Path=/"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/middle"))
            .and(header("cookie", "JSESSIONID=first; route=r1; seed=s"))
            .respond_with(
                ResponseTemplate::new(303)
                    .insert_header("location", "/landing?token=abc")
                    .insert_header("set-cookie", "JSESSIONID=second; Path=/"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/landing"))
            .respond_with(ResponseTemplate::new(200).set_body_string("welcome"))
            .mount(&server)
            .await;

        let start = url(&server, "/start");
        let landing = tokio::task::spawn_blocking(move || {
            let seed: CookieSet = [("seed", "s")].into_iter().collect();
            let form = LoginForm::new().field("username", "u");
            client_with_defaults().follow(Hop::post_form(start, form).with_cookies(seed))
        })
        .await
        .unwrap()
        .expect("landing");

        assert_eq!(landing.hops, 2);
        assert_eq!(landing.status, StatusCode::OK);
        assert_eq!(landing.body, "welcome");
        assert_eq!(landing.final_url.path(), "/landing");
        assert_eq!(landing.cookies.get("JSESSIONID"), Some("second"));
        assert_eq!(landing.cookies.get("route"), Some("r1"));
        assert!(!landing.cookies.contains("seed"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn follow_enforces_the_hop_limit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(302).insert_header("location", "/loop"))
            .mount(&server)
            .await;

        let start = url(&server, "/loop");
        let result = tokio::task::spawn_blocking(move || {
            let client = HttpClient::builder().max_redirects(3).build().unwrap();
            client.follow(Hop::get(start)).map(|l| l.hops)
        })
        .await
        .unwrap();

        assert!(matches!(result, Err(GateError::Transport(_))));
    }
}
