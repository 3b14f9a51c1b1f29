//! Shared fixtures for gateway integration tests
//!
//! [`Gateway`] plays every remote party on one wiremock server: the SSO under
//! `/cas`, the tunnel gateway under `/vpn`, BYKC under `/bykc`, and JWXT
//! under `/jwxt`.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use once_cell::sync::Lazy;
use rsa::pkcs8::EncodePublicKey;
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey};
use serde_json::Value;
use ssogate_common::crypto::{sign, SessionKey};
use ssogate_domain::{GateConfig, GateError, Result};
use ssogate_infra::CaptchaSolver;
use wiremock::matchers::{header_regex, method, path, query_param};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

pub const EXECUTION: &str = "e1s1-Zm9vYmFy";
pub const BYKC_TOKEN: &str = "tok-1";

/// Backend key pair; the public half goes into [`GateConfig::rsa_public_key`].
pub static TEST_KEY: Lazy<RsaPrivateKey> = Lazy::new(|| {
    RsaPrivateKey::new(&mut rand::thread_rng(), 1024).expect("generate test RSA key")
});

pub fn test_public_key_b64() -> String {
    let der = TEST_KEY.to_public_key().to_public_key_der().expect("encode public key");
    BASE64.encode(der.as_bytes())
}

pub fn login_page(captcha_id: Option<&str>) -> String {
    let captcha = captcha_id
        .map(|id| format!("<script>config.captcha = {{ type: 'image', id: '{id}' }};</script>"))
        .unwrap_or_default();
    format!(
        r#"<html><body><form id="fm1" method="post">
<input type="hidden" name="execution" value="{EXECUTION}"/>
</form>{captcha}</body></html>"#
    )
}

/// Fake SSO deployment and its backends
pub struct Gateway {
    pub server: MockServer,
    tickets: Arc<AtomicUsize>,
}

impl Gateway {
    pub async fn start() -> Self {
        Self { server: MockServer::start().await, tickets: Arc::new(AtomicUsize::new(0)) }
    }

    pub fn uri(&self) -> String {
        self.server.uri()
    }

    /// Configuration pointing every endpoint at this server.
    pub fn config(&self) -> GateConfig {
        let mut config = GateConfig::default();
        config.http.timeout = Duration::from_secs(5);
        config.retry.query_ceiling = 3;
        config.endpoints.sso = Some(format!("{}/cas", self.uri()));
        config.endpoints.bykc = Some(format!("{}/bykc", self.uri()));
        config.endpoints.jwxt = Some(format!("{}/jwxt", self.uri()));
        config.rsa_public_key = Some(test_public_key_b64());
        config
    }

    /// Same as [`Gateway::config`] with the tunnel gateway enabled.
    pub fn tunneled_config(&self) -> GateConfig {
        let mut config = self.config();
        config.endpoints.tunnel_gateway = Some(format!("{}/vpn", self.uri()));
        config
    }

    /// Tickets the SSO has handed out so far.
    pub fn tickets_issued(&self) -> usize {
        self.tickets.load(Ordering::SeqCst)
    }

    pub async fn mount_login_page(&self, captcha_id: Option<&str>) {
        Mock::given(method("GET"))
            .and(path("/cas/login"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("set-cookie", "SESSION=pre-login; Path=/cas")
                    .set_body_string(login_page(captcha_id)),
            )
            .mount(&self.server)
            .await;
    }

    /// Every login submission succeeds with `CASTGC=TGT-<n>`.
    pub async fn mount_ticket_issue(&self) {
        let tickets = self.tickets.clone();
        Mock::given(method("POST"))
            .and(path("/cas/login"))
            .respond_with(move |_: &Request| {
                let n = tickets.fetch_add(1, Ordering::SeqCst) + 1;
                ResponseTemplate::new(302)
                    .insert_header("location", "/cas/home")
                    .insert_header("set-cookie", format!("CASTGC=TGT-{n}; Path=/cas"))
            })
            .mount(&self.server)
            .await;
    }

    /// Login submissions are answered with the form again and no ticket.
    pub async fn mount_ticket_rejection(&self, expected_submissions: u64) {
        Mock::given(method("POST"))
            .and(path("/cas/login"))
            .respond_with(ResponseTemplate::new(200).set_body_string(login_page(None)))
            .expect(expected_submissions)
            .mount(&self.server)
            .await;
    }

    /// Redemption of the BYKC target: two hops ending on a URL with a token.
    pub async fn mount_bykc_redemption(&self) {
        let target = format!("{}/bykc/sscv/casLogin", self.uri());
        let landing = format!("{}/bykc/sscv/casLogin?ticket=ST-1", self.uri());
        Mock::given(method("POST"))
            .and(path("/cas/login"))
            .and(query_param("TARGET", target.as_str()))
            .and(header_regex("cookie", r"CASTGC=TGT-\d+"))
            .respond_with(ResponseTemplate::new(302).insert_header("location", landing.as_str()))
            .with_priority(1)
            .mount(&self.server)
            .await;

        Mock::given(method("GET"))
            .and(path("/bykc/sscv/casLogin"))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("location", format!("/bykc/system/home?token={BYKC_TOKEN}"))
                    .insert_header("set-cookie", "JSESSIONID=bykc-1; Path=/"),
            )
            .mount(&self.server)
            .await;

        Mock::given(method("GET"))
            .and(path("/bykc/system/home"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>home</html>"))
            .mount(&self.server)
            .await;
    }

    /// Redemption of the JWXT target, accumulating cookies over three hops.
    pub async fn mount_jwxt_redemption(&self) {
        let target = format!("{}/jwxt/ieas2.1/welcome?falg=1", self.uri());
        Mock::given(method("POST"))
            .and(path("/cas/login"))
            .and(query_param("TARGET", target.as_str()))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("location", format!("{}/jwxt/ieas2.1/welcome?falg=1&ticket=ST-9", self.uri()))
                    .insert_header("set-cookie", "route=r1; Path=/"),
            )
            .with_priority(1)
            .mount(&self.server)
            .await;

        Mock::given(method("GET"))
            .and(path("/jwxt/ieas2.1/welcome"))
            .and(query_param("ticket", "ST-9"))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("location", "/jwxt/ieas2.1/welcome")
                    .append_header("set-cookie", "JSESSIONID=jw-1; Path=/")
                    .append_header("set-cookie", "route=r2; Path=/"),
            )
            .with_priority(2)
            .mount(&self.server)
            .await;

        Mock::given(method("GET"))
            .and(path("/jwxt/ieas2.1/welcome"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string("<html><form></form></html>"),
            )
            .mount(&self.server)
            .await;
    }

    /// Tunnel sign-in page plus a login that redirects once.
    pub async fn mount_tunnel_login(&self) {
        Mock::given(method("GET"))
            .and(path("/vpn/users/sign_in"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("set-cookie", "_webvpn_key=pre; Path=/")
                    .set_body_string(
                        r#"<html><head><meta name="csrf-token" content="Q3NyZi10b2tlbg==" /></head></html>"#,
                    ),
            )
            .mount(&self.server)
            .await;

        Mock::given(method("POST"))
            .and(path("/vpn/users/sign_in"))
            .and(wiremock::matchers::body_string_contains("authenticity_token=Q3NyZi10b2tlbg%3D%3D"))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("location", "/vpn/")
                    .insert_header("set-cookie", "wengine_vpn_ticket=vt-1; Path=/"),
            )
            .mount(&self.server)
            .await;

        Mock::given(method("GET"))
            .and(path("/vpn/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>portal</html>"))
            .mount(&self.server)
            .await;
    }

    /// Serve `responder` for one BYKC API name.
    pub async fn mount_bykc_api(&self, name: &str, responder: EnvelopeResponder) {
        Mock::given(method("POST"))
            .and(path(format!("/bykc/sscv/{name}")))
            .respond_with(responder)
            .mount(&self.server)
            .await;
    }
}

/// Captcha double answering from a script
#[derive(Default)]
pub struct ScriptedSolver {
    answers: Mutex<VecDeque<String>>,
    seen: Mutex<Vec<(String, Vec<u8>)>>,
}

impl ScriptedSolver {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: Mutex::new(answers.into_iter().map(Into::into).collect()),
            seen: Mutex::default(),
        }
    }

    /// `(captcha_id, image)` of every challenge shown so far.
    pub fn seen(&self) -> Vec<(String, Vec<u8>)> {
        self.seen.lock().unwrap().clone()
    }
}

impl CaptchaSolver for ScriptedSolver {
    fn solve(&self, captcha_id: &str, image: &[u8]) -> Result<String> {
        self.seen.lock().unwrap().push((captcha_id.to_string(), image.to_vec()));
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| GateError::AuthenticationFailed("no scripted answer left".into()))
    }
}

/// One scripted BYKC reply
#[derive(Debug, Clone)]
pub enum Reply {
    /// `{status, data}` encrypted under the request's session key
    Enveloped(Value),
    /// Body sent as-is, unencrypted
    Plain(u16, String),
}

/// What the backend recovered from one enveloped request
#[derive(Debug, Clone)]
pub struct Received {
    pub payload: Value,
    pub wrapped_key: String,
    pub session_key: Vec<u8>,
    pub signature_valid: bool,
    pub auth_token: Option<String>,
    pub cookie: Option<String>,
    pub timestamp: Option<String>,
}

/// Wiremock responder that opens envelopes with [`TEST_KEY`]
///
/// Replies are taken in order; the last one repeats once the script runs
/// out.
#[derive(Clone)]
pub struct EnvelopeResponder {
    replies: Arc<Mutex<VecDeque<Reply>>>,
    received: Arc<Mutex<Vec<Received>>>,
}

impl EnvelopeResponder {
    pub fn new(replies: impl IntoIterator<Item = Reply>) -> Self {
        Self {
            replies: Arc::new(Mutex::new(replies.into_iter().collect())),
            received: Arc::default(),
        }
    }

    pub fn received(&self) -> Vec<Received> {
        self.received.lock().unwrap().clone()
    }

    fn next_reply(&self) -> Reply {
        let mut replies = self.replies.lock().unwrap();
        if replies.len() > 1 {
            replies.pop_front().unwrap()
        } else {
            replies.front().cloned().unwrap_or(Reply::Plain(500, "no reply scripted".into()))
        }
    }
}

fn header(request: &Request, name: &str) -> Option<String> {
    request.headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_owned)
}

impl Respond for EnvelopeResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let ak = header(request, "ak").unwrap_or_default();
        let sk = header(request, "sk").unwrap_or_default();

        let session_key = TEST_KEY
            .decrypt(Pkcs1v15Encrypt, &BASE64.decode(&ak).expect("ak is base64"))
            .expect("ak unwraps");
        let key = SessionKey::from_slice(&session_key).expect("16-byte session key");
        let ciphertext = BASE64.decode(request.body.trim_ascii()).expect("body is base64");
        let plaintext = key.decrypt(&ciphertext).expect("body decrypts");
        let signature = TEST_KEY
            .decrypt(Pkcs1v15Encrypt, &BASE64.decode(&sk).expect("sk is base64"))
            .expect("sk unwraps");

        self.received.lock().unwrap().push(Received {
            payload: serde_json::from_slice(&plaintext).expect("payload is JSON"),
            wrapped_key: ak,
            session_key: session_key.clone(),
            signature_valid: signature == sign(&plaintext).into_bytes(),
            auth_token: header(request, "auth_token"),
            cookie: header(request, "cookie"),
            timestamp: header(request, "ts"),
        });

        match self.next_reply() {
            Reply::Enveloped(reply) => {
                let bytes = serde_json::to_vec(&reply).expect("reply serializes");
                ResponseTemplate::new(200).set_body_string(BASE64.encode(key.encrypt(&bytes)))
            }
            Reply::Plain(status, body) => ResponseTemplate::new(status).set_body_string(body),
        }
    }
}

/// Run blocking gateway code off the async test runtime.
pub async fn blocking<T, F>(f: F) -> T
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.expect("blocking task panicked")
}
