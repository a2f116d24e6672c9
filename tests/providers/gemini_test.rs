//! Gemini provider wire format tests.

use serde_json::Value;
use tokio_stream::StreamExt;

use fortune_booth::providers::gemini::{build_request, parse_response, parse_stream_chunk, GeminiProvider};
use fortune_booth::providers::{
    CompletionRequest, ContentPart, LlmProvider, Message, MessageContent, ProviderError, Role,
    StopReason,
};

use crate::support::http::{body_of, serve_once, Reply};

fn fortune_request() -> CompletionRequest {
    CompletionRequest {
        messages: vec![Message {
            role: Role::User,
            content: MessageContent::Parts(vec![
                ContentPart::Text {
                    text: "Bối cảnh công ty".to_owned(),
                },
                ContentPart::Text {
                    text: "Hãy tạo một câu bói!".to_owned(),
                },
            ]),
        }],
        system: Some("Bạn là thầy bói.".to_owned()),
        max_tokens: Some(2000),
        temperature: Some(1.0),
        thinking_budget: Some(0),
    }
}

fn provider(base: &str) -> GeminiProvider {
    GeminiProvider::new(
        "gemini/gemini-2.5-flash".to_owned(),
        "gemini-2.5-flash".to_owned(),
        "test-key".to_owned(),
    )
    .with_base_url(format!("{base}/"))
}

#[test]
fn build_request_keeps_segments_as_ordered_parts() {
    let req = serde_json::to_value(build_request(&fortune_request())).expect("serialise");
    assert_eq!(req["systemInstruction"]["parts"][0]["text"], "Bạn là thầy bói.");
    assert!(req["systemInstruction"].get("role").is_none());
    assert_eq!(req["contents"][0]["role"], "user");
    assert_eq!(req["contents"][0]["parts"][0]["text"], "Bối cảnh công ty");
    assert_eq!(req["contents"][0]["parts"][1]["text"], "Hãy tạo một câu bói!");
    assert_eq!(req["generationConfig"]["maxOutputTokens"], 2000);
    assert_eq!(req["generationConfig"]["temperature"], 1.0);
    assert_eq!(req["generationConfig"]["thinkingConfig"]["thinkingBudget"], 0);
}

#[test]
fn build_request_omits_empty_generation_config() {
    let request = CompletionRequest {
        messages: vec![Message {
            role: Role::Assistant,
            content: MessageContent::Text("earlier".to_owned()),
        }],
        ..CompletionRequest::default()
    };
    let req = serde_json::to_value(build_request(&request)).expect("serialise");
    assert!(req.get("generationConfig").is_none());
    assert!(req.get("systemInstruction").is_none());
    assert_eq!(req["contents"][0]["role"], "model");
}

#[test]
fn parse_response_separates_thoughts_and_reads_usage() {
    let body = r#"{
        "candidates": [{
            "content": {"role": "model", "parts": [
                {"text": "thinking...", "thought": true},
                {"text": "Năm mới phát tài!"}
            ]},
            "finishReason": "STOP"
        }],
        "usageMetadata": {"promptTokenCount": 321, "candidatesTokenCount": 45},
        "modelVersion": "gemini-2.5-flash-001"
    }"#;
    let resp = parse_response(body, "gemini-2.5-flash").expect("parse");
    assert_eq!(resp.first_text(), Some("Năm mới phát tài!"));
    assert!(matches!(resp.content[0], ContentPart::Reasoning { .. }));
    assert_eq!(resp.stop_reason, StopReason::EndTurn);
    assert_eq!(resp.usage.input_tokens, 321);
    assert_eq!(resp.usage.output_tokens, 45);
    assert_eq!(resp.model, "gemini-2.5-flash-001");
}

#[test]
fn blocked_prompt_has_no_text_and_safety_stop() {
    let body = r#"{"promptFeedback": {"blockReason": "SAFETY"}}"#;
    let resp = parse_response(body, "gemini-2.5-flash").expect("parse");
    assert_eq!(resp.first_text(), None);
    assert_eq!(resp.stop_reason, StopReason::Safety);
    assert_eq!(resp.model, "gemini-2.5-flash");
}

#[test]
fn max_tokens_finish_reason_is_mapped() {
    let body = r#"{"candidates": [{"content": {"parts": [{"text": "cut"}]}, "finishReason": "MAX_TOKENS"}]}"#;
    let resp = parse_response(body, "m").expect("parse");
    assert_eq!(resp.stop_reason, StopReason::MaxTokens);
}

#[test]
fn malformed_body_is_a_parse_error() {
    assert!(matches!(
        parse_response("<html>", "m"),
        Err(ProviderError::Parse(_))
    ));
}

#[test]
fn stream_chunks_skip_thoughts() {
    let chunk = r#"{"candidates": [{"content": {"parts": [{"text": "hmm", "thought": true}, {"text": "Chúc"}]}}]}"#;
    assert_eq!(parse_stream_chunk(chunk).expect("parse").as_deref(), Some("Chúc"));
    let empty = r#"{"candidates": [{"content": {"parts": []}}]}"#;
    assert_eq!(parse_stream_chunk(empty).expect("parse"), None);
}

#[tokio::test]
async fn complete_posts_to_generate_content_with_api_key_header() {
    let (base, requests) = serve_once(Reply::json(
        "200 OK",
        r#"{"candidates": [{"content": {"parts": [{"text": "Vạn sự như ý!"}]}, "finishReason": "STOP"}]}"#,
    ))
    .await;

    let resp = provider(&base)
        .complete(fortune_request())
        .await
        .expect("complete");
    assert_eq!(resp.first_text(), Some("Vạn sự như ý!"));

    let requests = requests.await.expect("join");
    let raw = &requests[0];
    assert!(raw.starts_with("POST /v1beta/models/gemini-2.5-flash:generateContent "));
    assert!(raw.to_lowercase().contains("x-goog-api-key: test-key"));
    let body: Value = serde_json::from_str(body_of(raw)).expect("json body");
    assert_eq!(body["contents"][0]["parts"].as_array().map(Vec::len), Some(2));
}

#[tokio::test]
async fn stream_yields_fragments_in_order() {
    let sse = concat!(
        "data: {\"candidates\": [{\"content\": {\"parts\": [{\"text\": \"Năm \"}]}}]}\r\n\r\n",
        ": keep-alive\r\n\r\n",
        "data: {\"candidates\": [{\"content\": {\"parts\": [{\"text\": \"mới \"}]}}]}\r\n\r\n",
        "data: {\"candidates\": [{\"content\": {\"parts\": [{\"text\": \"vui!\"}]}, \"finishReason\": \"STOP\"}]}\r\n\r\n",
    );
    let (base, requests) = serve_once(Reply::bytes("200 OK", "text/event-stream", sse.as_bytes().to_vec())).await;

    let provider = provider(&base);
    assert!(provider.supports_streaming());
    let stream = provider.stream(fortune_request()).await.expect("stream");
    let fragments: Vec<String> = stream
        .collect::<Vec<_>>()
        .await
        .into_iter()
        .collect::<Result<_, _>>()
        .expect("fragments");
    assert_eq!(fragments, vec!["Năm ", "mới ", "vui!"]);

    let requests = requests.await.expect("join");
    assert!(requests[0].starts_with("POST /v1beta/models/gemini-2.5-flash:streamGenerateContent?alt=sse "));
}

#[tokio::test]
async fn error_status_is_sanitised_and_classified() {
    let (base, _requests) = serve_once(Reply::json(
        "429 Too Many Requests",
        r#"{"error": {"message": "quota exceeded for key AIzaSyA1234567890abcdefghijklmnop"}}"#,
    ))
    .await;
    let err = provider(&base)
        .complete(fortune_request())
        .await
        .expect_err("must fail");
    match &err {
        ProviderError::HttpStatus { status, body } => {
            assert_eq!(*status, 429);
            assert!(body.contains("[REDACTED]"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.is_transient());
}

#[test]
fn debug_output_hides_the_api_key() {
    let rendered = format!("{:?}", provider("http://127.0.0.1:1"));
    assert!(!rendered.contains("test-key"));
    assert!(rendered.contains("[REDACTED]"));
}
