use crate::helpers;

use helpers::assertions::assert_outcome_response;
use helpers::fake_tts::ScriptedTts;
use helpers::{sample_article, TestContext, PUBLIC_BASE_URL};
use hyper::StatusCode;
use pretty_assertions::assert_eq;
use serde_json::json;
use test_context::test_context;

fn narrate_body(title: &str, text: &str, source: &str) -> serde_json::Value {
    json!({
        "title": title,
        "text": text,
        "source": source,
        "description": "Test article"
    })
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_narrate_article_and_store_audio(ctx: &TestContext) {
    let text = sample_article(6);
    let body = narrate_body("Rust in Production", &text, "https://blog.test/rust");

    let response = ctx.client.post("/api/tts/narrate", &body).await.unwrap();

    response.assert_status(StatusCode::OK);
    let outcome = response.body.as_ref().unwrap();
    assert_outcome_response(outcome, false);

    assert_eq!(
        outcome.get("key").and_then(|v| v.as_str()),
        Some("https://blog.test/rust")
    );
    let chunk_count = outcome["chunk_count"].as_u64().unwrap() as usize;
    assert!(chunk_count > 1, "expected several chunks, got {}", chunk_count);
    assert_eq!(ctx.tts.calls(), chunk_count);
    assert_eq!(outcome["resumed_chunks"].as_u64(), Some(0));

    let audio_ref = outcome["audio_ref"].as_str().unwrap();
    assert!(audio_ref.starts_with(&format!("{}/audio/rust-in-production", PUBLIC_BASE_URL)));

    // Stored audio is the in-order concatenation of every chunk's audio
    let key = audio_ref.trim_start_matches(&format!("{}/", PUBLIC_BASE_URL));
    let stored = std::fs::read(ctx.artifacts_dir.join(key)).unwrap();
    let expected: Vec<u8> = ctx
        .tts
        .submitted()
        .iter()
        .flat_map(|text| ScriptedTts::audio_for(text))
        .collect();
    assert_eq!(stored, expected);
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_return_cached_audio_without_synthesis(ctx: &TestContext) {
    let body = narrate_body("Cached Story", &sample_article(4), "https://blog.test/cached");

    let first = ctx.client.post("/api/tts/narrate", &body).await.unwrap();
    first.assert_status(StatusCode::OK);
    let calls_after_first = ctx.tts.calls();

    let second = ctx.client.post("/api/tts/narrate", &body).await.unwrap();
    second.assert_status(StatusCode::OK);

    let outcome = second.body.as_ref().unwrap();
    assert_outcome_response(outcome, true);
    assert_eq!(outcome["billed_characters"].as_u64(), Some(0));
    assert_eq!(outcome["audio_ref"], first.body.as_ref().unwrap()["audio_ref"]);
    assert_eq!(ctx.tts.calls(), calls_after_first);
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_reject_empty_text(ctx: &TestContext) {
    let body = narrate_body("Empty", "   \n\t ", "https://blog.test/empty");

    let response = ctx.client.post("/api/tts/narrate", &body).await.unwrap();

    response
        .assert_status(StatusCode::BAD_REQUEST)
        .assert_error_message("Text cannot be empty");
    assert_eq!(ctx.tts.calls(), 0);
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_reject_missing_title(ctx: &TestContext) {
    let body = narrate_body("  ", &sample_article(2), "https://blog.test/untitled");

    let response = ctx.client.post("/api/tts/narrate", &body).await.unwrap();

    response
        .assert_status(StatusCode::BAD_REQUEST)
        .assert_error_message("Title cannot be empty");
    assert_eq!(ctx.tts.calls(), 0);
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_reject_malformed_body(ctx: &TestContext) {
    let response = ctx
        .client
        .post("/api/tts/narrate", &json!({ "title": "No text" }))
        .await
        .unwrap();

    assert!(response.status.is_client_error());
    assert_eq!(ctx.tts.calls(), 0);
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_map_provider_rejection_to_bad_gateway(ctx: &TestContext) {
    ctx.tts.reject_on_call(1);
    let body = narrate_body("Rejected", &sample_article(3), "https://blog.test/rejected");

    let response = ctx.client.post("/api/tts/narrate", &body).await.unwrap();

    response
        .assert_status(StatusCode::BAD_GATEWAY)
        .assert_error_message("voice not available");

    // Nothing was committed
    let items = ctx.client.get("/api/tts/items").await.unwrap();
    assert_eq!(items.body.as_ref().unwrap()["total"].as_u64(), Some(0));
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_resume_after_provider_failure_without_paying_twice(ctx: &TestContext) {
    ctx.tts.reject_on_call(2);
    let body = narrate_body("Resumable", &sample_article(5), "https://blog.test/resume");

    let failed = ctx.client.post("/api/tts/narrate", &body).await.unwrap();
    failed.assert_status(StatusCode::BAD_GATEWAY);
    assert_eq!(ctx.tts.calls(), 2);

    ctx.tts.recover();
    let response = ctx.client.post("/api/tts/narrate", &body).await.unwrap();
    response.assert_status(StatusCode::OK);

    let outcome = response.body.as_ref().unwrap();
    assert_outcome_response(outcome, false);
    let chunk_count = outcome["chunk_count"].as_u64().unwrap() as usize;
    assert_eq!(outcome["resumed_chunks"].as_u64(), Some(1));

    // One good call and one rejected call before, every other chunk now
    assert_eq!(ctx.tts.calls(), 2 + (chunk_count - 1));

    // The checkpointed chunk is billed once, with the rest of the item
    let submitted = ctx.tts.submitted();
    assert_eq!(submitted.len(), chunk_count);
    let billed: u64 = submitted.iter().map(|text| text.chars().count() as u64).sum();
    assert_eq!(outcome["billed_characters"].as_u64(), Some(billed));
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_keep_every_submission_under_service_limit(ctx: &TestContext) {
    // One unpunctuated run of words forces whitespace and hard splits
    let text = "word ".repeat(2500);
    let body = narrate_body("Wall of Text", &text, "https://blog.test/wall");

    let response = ctx.client.post("/api/tts/narrate", &body).await.unwrap();
    response.assert_status(StatusCode::OK);

    let submitted = ctx.tts.submitted();
    assert!(submitted.len() > 1);
    assert!(submitted.iter().all(|text| text.len() <= 5000));
    assert!(submitted.iter().all(|text| !text.trim().is_empty()));
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_key_items_by_slug_without_source(ctx: &TestContext) {
    let body = json!({
        "title": "Slug Only Article",
        "text": sample_article(2)
    });

    let response = ctx.client.post("/api/tts/narrate", &body).await.unwrap();
    response.assert_status(StatusCode::OK);

    let key = response.body.as_ref().unwrap()["key"].as_str().unwrap().to_string();
    assert!(key.starts_with("slug-only-article"), "unexpected key {}", key);
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_list_narrated_items_newest_first(ctx: &TestContext) {
    for (title, source) in [
        ("First Article", "https://blog.test/first"),
        ("Second Article", "https://blog.test/second"),
    ] {
        let body = narrate_body(title, &sample_article(2), source);
        ctx.client
            .post("/api/tts/narrate", &body)
            .await
            .unwrap()
            .assert_status(StatusCode::OK);
    }

    let response = ctx.client.get("/api/tts/items").await.unwrap();
    response.assert_status(StatusCode::OK);

    let body = response.body.as_ref().unwrap();
    assert_eq!(body["total"].as_u64(), Some(2));

    let items = body["items"].as_array().unwrap();
    assert_eq!(items[0]["key"].as_str(), Some("https://blog.test/second"));
    assert_eq!(items[0]["title"].as_str(), Some("Second Article"));
    assert_eq!(items[0]["description"].as_str(), Some("Test article"));
    assert!(items[0]["processedDate"].is_string());
    assert!(items[0]["audioRef"].as_str().unwrap().ends_with(".mp3"));
    assert_eq!(items[1]["key"].as_str(), Some("https://blog.test/first"));
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_serve_each_title_its_own_audio_for_shared_source(ctx: &TestContext) {
    let source = "https://blog.test/shared";
    let title_a = narrate_body("Title A", &sample_article(2), source);
    let title_b = narrate_body("Title B", &sample_article(3), source);

    let first = ctx.client.post("/api/tts/narrate", &title_a).await.unwrap();
    first.assert_status(StatusCode::OK);
    ctx.client
        .post("/api/tts/narrate", &title_b)
        .await
        .unwrap()
        .assert_status(StatusCode::OK);

    let again = ctx.client.post("/api/tts/narrate", &title_a).await.unwrap();
    again.assert_status(StatusCode::OK);

    let first = first.body.as_ref().unwrap();
    let again = again.body.as_ref().unwrap();
    assert_eq!(again["cached"].as_bool(), Some(false));
    assert_eq!(again["audio_ref"], first["audio_ref"]);

    let items = ctx.client.get("/api/tts/items").await.unwrap();
    let items = items.body.as_ref().unwrap();
    assert_eq!(items["total"].as_u64(), Some(1));
    assert_eq!(items["items"][0]["title"].as_str(), Some("Title A"));

    // Only the indexed title's audio is kept
    let stored = std::fs::read_dir(ctx.artifacts_dir.join("audio")).unwrap().count();
    assert_eq!(stored, 1);
}
