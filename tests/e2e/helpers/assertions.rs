use serde_json::Value;

pub fn assert_outcome_response(outcome: &Value, expected_cached: bool) {
    assert!(outcome.get("key").and_then(|v| v.as_str()).is_some());
    assert_eq!(
        outcome.get("cached").and_then(|v| v.as_bool()),
        Some(expected_cached)
    );

    let audio_ref = outcome
        .get("audio_ref")
        .and_then(|v| v.as_str())
        .expect("Missing audio_ref");
    assert!(audio_ref.ends_with(".mp3"), "unexpected audio_ref {}", audio_ref);

    assert!(outcome.get("chunk_count").and_then(|v| v.as_u64()).is_some());
    assert!(outcome.get("billed_characters").and_then(|v| v.as_u64()).is_some());

    // Fresh syntheses report the voice and the ledger state after billing
    if !expected_cached {
        let voice = outcome.get("voice").expect("Missing voice");
        assert!(voice.get("name").and_then(|v| v.as_str()).is_some());
        assert!(voice.get("pool").and_then(|v| v.as_str()).is_some());
        assert!(outcome.get("usage").is_some());
    }
}

pub fn assert_usage_response(usage: &Value) {
    assert!(usage.get("period").and_then(|v| v.as_str()).is_some());
    assert!(usage.get("resets_at").is_some());

    let current = usage.get("usage").expect("Missing usage");
    assert!(current.get("characters").is_some());
    assert!(current.get("articles").is_some());
    assert!(current.get("cost_estimate").is_some());
    assert!(current.get("free_characters_remaining").is_some());

    let lifetime = usage.get("lifetime").expect("Missing lifetime");
    assert!(lifetime.get("characters").is_some());
    assert!(lifetime.get("months").is_some());

    let limits = usage.get("limits").expect("Missing limits");
    assert!(limits.get("free_characters").is_some());
    assert!(limits.get("price_per_million").is_some());
}
