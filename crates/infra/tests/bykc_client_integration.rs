//! BYKC client behavior over sealed envelopes and session refreshes

#[path = "support.rs"]
mod support;

use std::sync::Arc;

use serde_json::json;
use ssogate_domain::{Credential, GateError};
use ssogate_infra::{BykcClient, RefuseCaptcha};
use support::{blocking, Gateway, Reply, BYKC_TOKEN};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

const EXPIRED: &str = r#"{"status":"98005399","message":"登录已过期，请重新登录"}"#;

fn credential() -> Credential {
    Credential::new("20373000", "hunter2")
}

fn course(id: i64, name: &str) -> serde_json::Value {
    json!({
        "id": id,
        "courseName": name,
        "coursePosition": "主M402",
        "courseCurrentCount": 30,
        "courseMaxCount": 120,
        "courseSelectStartDate": "2026-09-01 12:00:00"
    })
}

async fn signed_in_gateway() -> Gateway {
    let gateway = Gateway::start().await;
    gateway.mount_login_page(None).await;
    gateway.mount_ticket_issue().await;
    gateway.mount_bykc_redemption().await;
    gateway
}

#[tokio::test(flavor = "multi_thread")]
async fn selectable_courses_over_a_fresh_session() {
    let gateway = signed_in_gateway().await;
    let responder = support::EnvelopeResponder::new([Reply::Enveloped(json!({
        "status": "0",
        "data": [course(101, "音乐鉴赏"), course(102, "书法")]
    }))]);
    gateway.mount_bykc_api("querySelectableCourse", responder.clone()).await;
    let config = gateway.config();

    let courses = blocking(move || {
        let mut client = BykcClient::new(&config, credential(), Arc::new(RefuseCaptcha)).unwrap();
        client.selectable()
    })
    .await
    .unwrap()
    .expect("courses within the retry budget");

    assert_eq!(courses.iter().map(|c| c.id).collect::<Vec<_>>(), vec![101, 102]);
    assert_eq!(courses[0].remaining(), Some(90));
    assert_eq!(gateway.tickets_issued(), 1);

    let received = responder.received();
    assert_eq!(received.len(), 1);
    let call = &received[0];
    assert_eq!(call.payload, json!({}));
    assert!(call.signature_valid, "sk must wrap the payload signature");
    assert_eq!(call.session_key.len(), 16);
    assert_eq!(call.auth_token.as_deref(), Some(BYKC_TOKEN));
    assert!(call.cookie.as_deref().is_some_and(|c| c.contains("JSESSIONID=bykc-1")));
    assert!(call.timestamp.as_deref().is_some_and(|ts| ts.parse::<u128>().is_ok()));
}

#[tokio::test(flavor = "multi_thread")]
async fn expired_session_is_refreshed_and_resealed() {
    let gateway = signed_in_gateway().await;
    let responder = support::EnvelopeResponder::new([
        Reply::Plain(200, EXPIRED.to_string()),
        Reply::Enveloped(json!({"status": "0", "data": [course(7, "博雅")]})),
    ]);
    gateway.mount_bykc_api("querySelectableCourse", responder.clone()).await;
    let config = gateway.config();

    let courses = blocking(move || {
        let mut client = BykcClient::new(&config, credential(), Arc::new(RefuseCaptcha)).unwrap();
        client.selectable()
    })
    .await
    .unwrap()
    .unwrap();

    assert_eq!(courses.len(), 1);
    assert_eq!(gateway.tickets_issued(), 2, "one login per session");

    let received = responder.received();
    assert_eq!(received.len(), 2);
    assert_ne!(received[0].wrapped_key, received[1].wrapped_key);
    assert_ne!(received[0].session_key, received[1].session_key);
}

#[tokio::test(flavor = "multi_thread")]
async fn query_gives_up_quietly_after_the_ceiling() {
    let gateway = signed_in_gateway().await;
    let responder = support::EnvelopeResponder::new([Reply::Plain(200, EXPIRED.to_string())]);
    gateway.mount_bykc_api("queryForeCourse", responder.clone()).await;
    let config = gateway.config();

    let result = blocking(move || {
        let mut client = BykcClient::new(&config, credential(), Arc::new(RefuseCaptcha)).unwrap();
        client.forecast()
    })
    .await;

    assert_eq!(result, Ok(None));
    assert_eq!(responder.received().len(), 3);
    assert_eq!(gateway.tickets_issued(), 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn terminal_status_stops_after_one_call() {
    let gateway = signed_in_gateway().await;
    let responder = support::EnvelopeResponder::new([Reply::Enveloped(json!({
        "status": "1",
        "data": "课程不存在"
    }))]);
    gateway.mount_bykc_api("queryCourseById", responder.clone()).await;
    let config = gateway.config();

    let result = blocking(move || {
        let mut client = BykcClient::new(&config, credential(), Arc::new(RefuseCaptcha)).unwrap();
        client.detail(999)
    })
    .await;

    match result {
        Err(GateError::Domain { status, data }) => {
            assert_eq!(status, "1");
            assert_eq!(data, json!("课程不存在"));
        }
        other => panic!("expected a terminal domain error, got {other:?}"),
    }
    let received = responder.received();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].payload, json!({"id": 999}));
    assert_eq!(gateway.tickets_issued(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_status_is_retried_once() {
    let gateway = signed_in_gateway().await;
    let responder = support::EnvelopeResponder::new([Reply::Enveloped(json!({
        "status": "42",
        "data": null
    }))]);
    gateway.mount_bykc_api("queryCourseById", responder.clone()).await;
    let config = gateway.config();

    let result = blocking(move || {
        let mut client = BykcClient::new(&config, credential(), Arc::new(RefuseCaptcha)).unwrap();
        client.detail(5)
    })
    .await;

    assert!(matches!(result, Err(GateError::Domain { ref status, .. }) if status == "42"));
    assert_eq!(responder.received().len(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn enrollment_survives_one_expiry_and_is_confirmed() {
    let gateway = signed_in_gateway().await;
    let chose = support::EnvelopeResponder::new([
        Reply::Plain(200, EXPIRED.to_string()),
        Reply::Enveloped(json!({"status": "0", "data": {"courseCurrentCount": 31}})),
    ]);
    let chosen = support::EnvelopeResponder::new([Reply::Enveloped(json!({
        "status": "0",
        "data": {
            "courseList": [{"id": 1, "courseInfo": course(42, "茶艺")}],
            "historyCourseList": []
        }
    }))]);
    gateway.mount_bykc_api("choseCourse", chose.clone()).await;
    gateway.mount_bykc_api("queryChosenCourse", chosen.clone()).await;
    let config = gateway.config();

    let confirmed = blocking(move || {
        let mut client = BykcClient::new(&config, credential(), Arc::new(RefuseCaptcha)).unwrap();
        client.enroll(42)
    })
    .await
    .unwrap();

    assert!(confirmed);
    let submissions = chose.received();
    assert_eq!(submissions.len(), 2);
    assert!(submissions.iter().all(|s| s.payload == json!({"courseId": 42})));
    assert_eq!(chosen.received().len(), 1);
    assert_eq!(gateway.tickets_issued(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn command_is_submitted_at_most_twice() {
    let gateway = signed_in_gateway().await;
    let responder = support::EnvelopeResponder::new([Reply::Plain(200, EXPIRED.to_string())]);
    Mock::given(method("POST"))
        .and(path("/bykc/sscv/delChosenCourse"))
        .respond_with(responder.clone())
        .expect(2)
        .mount(&gateway.server)
        .await;
    let config = gateway.config();

    let result = blocking(move || {
        let mut client = BykcClient::new(&config, credential(), Arc::new(RefuseCaptcha)).unwrap();
        client.api("delChosenCourse", json!({"id": 42}))
    })
    .await;

    match result {
        Err(GateError::Protocol { status, .. }) => assert_eq!(status.as_deref(), Some("98005399")),
        other => panic!("expected the second failure to surface, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn rejected_credentials_stop_without_retrying() {
    let gateway = Gateway::start().await;
    gateway.mount_login_page(None).await;
    gateway.mount_ticket_rejection(1).await;
    let responder = support::EnvelopeResponder::new([Reply::Plain(500, String::new())]);
    gateway.mount_bykc_api("querySelectableCourse", responder.clone()).await;
    let config = gateway.config();

    let result = blocking(move || {
        let mut client = BykcClient::new(&config, credential(), Arc::new(RefuseCaptcha)).unwrap();
        client.selectable()
    })
    .await;

    assert!(matches!(result, Err(GateError::AuthenticationFailed(_))), "got {result:?}");
    assert!(responder.received().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn landing_without_token_counts_as_expired() {
    let gateway = Gateway::start().await;
    gateway.mount_login_page(None).await;
    gateway.mount_ticket_issue().await;
    let target = format!("{}/bykc/sscv/casLogin", gateway.uri());
    Mock::given(method("POST"))
        .and(path("/cas/login"))
        .and(query_param("TARGET", target.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>no token</html>"))
        .with_priority(1)
        .mount(&gateway.server)
        .await;
    let mut config = gateway.config();
    config.retry.query_ceiling = 2;

    let result = blocking(move || {
        let mut client = BykcClient::new(&config, credential(), Arc::new(RefuseCaptcha)).unwrap();
        client.chosen()
    })
    .await;

    assert_eq!(result, Ok(None));
    assert_eq!(gateway.tickets_issued(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn drop_is_not_confirmed_when_the_chosen_list_stays_unreadable() {
    let gateway = signed_in_gateway().await;
    let dropped =
        support::EnvelopeResponder::new([Reply::Enveloped(json!({"status": "0", "data": null}))]);
    let chosen = support::EnvelopeResponder::new([Reply::Plain(200, EXPIRED.to_string())]);
    gateway.mount_bykc_api("delChosenCourse", dropped.clone()).await;
    gateway.mount_bykc_api("queryChosenCourse", chosen.clone()).await;
    let config = gateway.config();

    let result = blocking(move || {
        let mut client = BykcClient::new(&config, credential(), Arc::new(RefuseCaptcha)).unwrap();
        client.drop(42)
    })
    .await;

    assert!(matches!(result, Err(GateError::Transport(_))), "got {result:?}");
    assert_eq!(dropped.received().len(), 1);
    assert_eq!(chosen.received().len(), 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn drop_is_confirmed_once_the_course_leaves_the_chosen_list() {
    let gateway = signed_in_gateway().await;
    let dropped =
        support::EnvelopeResponder::new([Reply::Enveloped(json!({"status": "0", "data": null}))]);
    let chosen = support::EnvelopeResponder::new([Reply::Enveloped(json!({
        "status": "0",
        "data": {"courseList": [{"id": 3, "courseInfo": course(8, "围棋")}]}
    }))]);
    gateway.mount_bykc_api("delChosenCourse", dropped.clone()).await;
    gateway.mount_bykc_api("queryChosenCourse", chosen.clone()).await;
    let config = gateway.config();

    let confirmed = blocking(move || {
        let mut client = BykcClient::new(&config, credential(), Arc::new(RefuseCaptcha)).unwrap();
        client.drop(42)
    })
    .await
    .unwrap();

    assert!(confirmed);
    assert_eq!(dropped.received()[0].payload, json!({"id": 42}));
}
