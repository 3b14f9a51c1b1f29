//! Enveloped RPC transport for the BYKC backend

use reqwest::header::{HeaderValue, CONTENT_TYPE};
use reqwest::Method;
use serde_json::Value;
use ssogate_common::crypto::{Envelope, KeyWrapper, OpenError};
use ssogate_domain::constants::{
    BYKC_AUTH_HEADER, BYKC_RSA_PUBLIC_KEY, ENVELOPE_CONTENT_TYPE, SUCCESS_STATUS,
};
use ssogate_domain::{ApiPayload, CookieSet, GateConfig, GateError, Result};
use tracing::{debug, instrument, warn};
use url::Url;

use crate::errors::gate;
use crate::http::{Hop, HttpClient};

/// Seals every request in a fresh [`Envelope`] and opens the reply with it
#[derive(Clone)]
pub struct EnvelopeCodec {
    http: HttpClient,
    wrapper: KeyWrapper,
}

impl EnvelopeCodec {
    pub fn new(http: HttpClient, wrapper: KeyWrapper) -> Self {
        Self { http, wrapper }
    }

    /// Use the configured public key, falling back to the built-in one.
    pub fn from_config(http: HttpClient, config: &GateConfig) -> Result<Self> {
        let der = config.rsa_public_key.as_deref().unwrap_or(BYKC_RSA_PUBLIC_KEY);
        Ok(Self::new(http, KeyWrapper::from_base64_der(der)?))
    }

    /// POST `payload` to `url` inside an envelope and decode the answer.
    ///
    /// Decode failures are returned, never retried here; a caller's retry
    /// goes through this method again and so seals under a new key.
    #[instrument(skip(self, payload, cookies, auth_token), fields(url = %url))]
    pub fn call(
        &self,
        url: &Url,
        payload: &Value,
        cookies: &CookieSet,
        auth_token: Option<&str>,
    ) -> Result<ApiPayload> {
        let plaintext = serde_json::to_vec(payload).map_err(gate)?;
        let envelope = Envelope::seal(&plaintext, &self.wrapper)?;
        debug!(bytes = plaintext.len(), ts = envelope.timestamp_ms(), "sealed request");

        let hop = Hop {
            method: Method::POST,
            url: url.clone(),
            form: None,
            cookies: cookies.clone(),
            headers: Default::default(),
        };
        let mut builder = self
            .http
            .request_for(&hop)
            .header("ak", envelope.wrapped_key())
            .header("sk", envelope.wrapped_signature())
            .header("ts", envelope.timestamp_ms().to_string())
            .header(CONTENT_TYPE, HeaderValue::from_static(ENVELOPE_CONTENT_TYPE))
            .body(envelope.body().to_owned());
        if let Some(token) = auth_token {
            builder = builder.header(BYKC_AUTH_HEADER, token);
        }

        let response = self.http.send(builder)?;
        let status = response.status();
        if !status.is_success() {
            return Err(GateError::transport(format!("{url} answered {status}")));
        }
        let body = response.bytes().map_err(gate)?;

        match envelope.open(&body) {
            Ok(decrypted) => {
                let reply: Value = serde_json::from_slice(&decrypted).map_err(gate)?;
                decode_reply(reply)
            }
            Err(OpenError::NotEnveloped(reason)) => {
                debug!(%reason, "response is plaintext");
                Err(plaintext_error(&body))
            }
            Err(OpenError::Malformed(err)) => Err(err.into()),
        }
    }
}

/// Status carried by a reply, as a string whether sent as text or number.
pub fn status_of(reply: &Value) -> Option<String> {
    match reply.get("status")? {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

/// Branch a decrypted `{status, data}` reply on its status.
pub fn decode_reply(mut reply: Value) -> Result<ApiPayload> {
    let status = status_of(&reply)
        .ok_or_else(|| GateError::protocol(None, "reply carries no status field"))?;
    let data = reply.get_mut("data").map(Value::take);

    if status == SUCCESS_STATUS {
        Ok(ApiPayload::from_data(data))
    } else {
        warn!(%status, "backend answered with a failure status");
        Err(GateError::domain(status, data.unwrap_or(Value::Null)))
    }
}

/// Interpret a non-enveloped body as the backend's plaintext error report.
fn plaintext_error(body: &[u8]) -> GateError {
    match serde_json::from_slice::<Value>(body) {
        Ok(reply) => {
            let message = reply
                .get("message")
                .or_else(|| reply.get("data"))
                .map(|m| match m {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .unwrap_or_else(|| "plaintext reply without message".to_string());
            GateError::protocol(status_of(&reply), message)
        }
        Err(err) => GateError::protocol(None, format!("reply is neither an envelope nor JSON: {err}")),
    }
}
