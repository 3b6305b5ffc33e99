use crate::helpers;

use helpers::assertions::assert_usage_response;
use helpers::{sample_article, TestContext};
use hyper::StatusCode;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use test_context::test_context;

// Decimals serialize as strings
fn decimal(value: &Value) -> f64 {
    value
        .as_str()
        .and_then(|s| s.parse().ok())
        .or_else(|| value.as_f64())
        .expect("not a decimal")
}

async fn narrate(ctx: &TestContext, title: &str, source: &str, sentences: usize) -> Value {
    let body = json!({
        "title": title,
        "text": sample_article(sentences),
        "source": source
    });
    let response = ctx.client.post("/api/tts/narrate", &body).await.unwrap();
    response.assert_status(StatusCode::OK);
    response.body.unwrap()
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_report_empty_usage(ctx: &TestContext) {
    let response = ctx.client.get("/api/tts/usage").await.unwrap();

    response.assert_status(StatusCode::OK);
    let body = response.body.as_ref().unwrap();
    assert_usage_response(body);

    assert_eq!(body["usage"]["characters"].as_i64(), Some(0));
    assert_eq!(body["usage"]["articles"].as_i64(), Some(0));
    assert_eq!(decimal(&body["usage"]["cost_estimate"]), 0.0);
    assert_eq!(
        body["usage"]["free_characters_remaining"].as_i64(),
        Some(1_000_000)
    );
    assert_eq!(body["lifetime"]["months"].as_u64(), Some(0));
    assert_eq!(body["limits"]["free_characters"].as_i64(), Some(1_000_000));
    assert_eq!(decimal(&body["limits"]["price_per_million"]), 30.0);
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_accumulate_usage_across_items(ctx: &TestContext) {
    let first = narrate(ctx, "Usage One", "https://blog.test/usage-1", 3).await;
    let second = narrate(ctx, "Usage Two", "https://blog.test/usage-2", 5).await;

    let billed = first["billed_characters"].as_i64().unwrap()
        + second["billed_characters"].as_i64().unwrap();
    assert!(billed > 0);

    // The outcome carries the ledger state right after billing
    assert_eq!(second["usage"]["current"]["charsUsed"].as_i64(), Some(billed));
    assert_eq!(second["usage"]["current"]["articleCount"].as_i64(), Some(2));

    let response = ctx.client.get("/api/tts/usage").await.unwrap();
    response.assert_status(StatusCode::OK);
    let body = response.body.as_ref().unwrap();
    assert_usage_response(body);

    assert_eq!(body["usage"]["characters"].as_i64(), Some(billed));
    assert_eq!(body["usage"]["articles"].as_i64(), Some(2));
    assert_eq!(
        body["usage"]["free_characters_remaining"].as_i64(),
        Some(1_000_000 - billed)
    );
    assert_eq!(body["lifetime"]["characters"].as_i64(), Some(billed));
    assert_eq!(body["lifetime"]["months"].as_u64(), Some(1));
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_not_charge_for_cached_items(ctx: &TestContext) {
    let first = narrate(ctx, "Charged Once", "https://blog.test/once", 3).await;
    let cached = narrate(ctx, "Charged Once", "https://blog.test/once", 3).await;

    assert_eq!(cached["cached"].as_bool(), Some(true));
    assert_eq!(cached["billed_characters"].as_u64(), Some(0));

    let response = ctx.client.get("/api/tts/usage").await.unwrap();
    let body = response.body.as_ref().unwrap();
    assert_eq!(
        body["usage"]["characters"].as_i64(),
        first["billed_characters"].as_i64()
    );
    assert_eq!(body["usage"]["articles"].as_i64(), Some(1));
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_not_charge_failed_items(ctx: &TestContext) {
    ctx.tts.reject_on_call(1);
    let body = json!({
        "title": "Never Finished",
        "text": sample_article(3),
        "source": "https://blog.test/never"
    });
    ctx.client
        .post("/api/tts/narrate", &body)
        .await
        .unwrap()
        .assert_status(StatusCode::BAD_GATEWAY);

    let response = ctx.client.get("/api/tts/usage").await.unwrap();
    let body = response.body.as_ref().unwrap();
    assert_eq!(body["usage"]["characters"].as_i64(), Some(0));
    assert_eq!(body["usage"]["articles"].as_i64(), Some(0));
}
