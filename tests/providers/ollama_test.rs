//! Ollama provider wire format tests.

use serde_json::Value;
use tokio_stream::StreamExt;

use fortune_booth::providers::ollama::{build_request, parse_response, parse_stream_chunk, OllamaProvider, DEFAULT_OLLAMA_URL};
use fortune_booth::providers::{
    CompletionRequest, ContentPart, LlmProvider, Message, MessageContent, Role, StopReason,
};

use crate::support::http::{body_of, serve_once, Reply};

fn request() -> CompletionRequest {
    CompletionRequest {
        messages: vec![Message {
            role: Role::User,
            content: MessageContent::Parts(vec![
                ContentPart::Text {
                    text: "context".to_owned(),
                },
                ContentPart::Text {
                    text: "participant".to_owned(),
                },
            ]),
        }],
        system: Some("system".to_owned()),
        max_tokens: Some(300),
        temperature: Some(0.9),
        thinking_budget: None,
    }
}

#[test]
fn new_provider_targets_local_daemon() {
    let provider = OllamaProvider::new("ollama/qwen3:8b".to_owned(), "qwen3:8b".to_owned());
    assert_eq!(provider.base_url, DEFAULT_OLLAMA_URL);
    assert_eq!(provider.model, "qwen3:8b");
    assert_eq!(provider.model_id(), "ollama/qwen3:8b");
}

#[test]
fn build_request_joins_parts_and_maps_options() {
    let req = build_request("qwen3:8b", &request(), false);
    assert_eq!(req.messages.len(), 2);
    assert_eq!(req.messages[0].role, "system");
    assert_eq!(req.messages[1].content, "context\nparticipant");
    assert!(!req.stream);
    let options = req.options.expect("options");
    assert_eq!(options.num_predict, Some(300));
    assert_eq!(options.temperature, Some(0.9));
}

#[test]
fn build_request_without_settings_has_no_options() {
    let bare = CompletionRequest {
        messages: request().messages,
        ..CompletionRequest::default()
    };
    let json = serde_json::to_value(build_request("m", &bare, true)).expect("serialise");
    assert!(json.get("options").is_none());
    assert_eq!(json["stream"], true);
}

#[test]
fn parse_response_keeps_thinking_as_reasoning() {
    let body = r#"{
        "model": "qwen3:8b",
        "message": {"role": "assistant", "content": "Phát tài!", "thinking": "let me think"},
        "done": true,
        "done_reason": "stop",
        "prompt_eval_count": 50,
        "eval_count": 7
    }"#;
    let resp = parse_response(body).expect("parse");
    assert!(matches!(resp.content[0], ContentPart::Reasoning { .. }));
    assert_eq!(resp.first_text(), Some("Phát tài!"));
    assert_eq!(resp.stop_reason, StopReason::EndTurn);
    assert_eq!(resp.usage.input_tokens, 50);
    assert_eq!(resp.usage.output_tokens, 7);
}

#[test]
fn stream_chunk_yields_content_only() {
    let line = r#"{"model": "m", "message": {"role": "assistant", "content": "Xin"}, "done": false}"#;
    assert_eq!(parse_stream_chunk(line).expect("parse").as_deref(), Some("Xin"));
    let last = r#"{"model": "m", "message": {"role": "assistant", "content": ""}, "done": true}"#;
    assert_eq!(parse_stream_chunk(last).expect("parse"), None);
}

#[tokio::test]
async fn complete_posts_to_api_chat_without_auth() {
    let (base, requests) = serve_once(Reply::json(
        "200 OK",
        r#"{"model": "qwen3:8b", "message": {"role": "assistant", "content": "Vui!"}, "done": true}"#,
    ))
    .await;
    let provider = OllamaProvider::new("ollama/qwen3:8b".to_owned(), "qwen3:8b".to_owned())
        .with_base_url(base);
    let resp = provider.complete(request()).await.expect("complete");
    assert_eq!(resp.first_text(), Some("Vui!"));

    let requests = requests.await.expect("join");
    assert!(requests[0].starts_with("POST /api/chat "));
    assert!(!requests[0].to_lowercase().contains("authorization:"));
    let body: Value = serde_json::from_str(body_of(&requests[0])).expect("json body");
    assert_eq!(body["stream"], false);
}

#[tokio::test]
async fn stream_reads_newline_delimited_json() {
    let ndjson = concat!(
        "{\"model\":\"m\",\"message\":{\"role\":\"assistant\",\"content\":\"Chúc \"},\"done\":false}\n",
        "{\"model\":\"m\",\"message\":{\"role\":\"assistant\",\"content\":\"mừng\"},\"done\":false}\n",
        "{\"model\":\"m\",\"message\":{\"role\":\"assistant\",\"content\":\"\"},\"done\":true}",
    );
    let (base, _requests) = serve_once(Reply::bytes("200 OK", "application/x-ndjson", ndjson.as_bytes().to_vec())).await;
    let provider = OllamaProvider::new("ollama/m".to_owned(), "m".to_owned()).with_base_url(base);
    let text: String = provider
        .stream(request())
        .await
        .expect("stream")
        .collect::<Vec<_>>()
        .await
        .into_iter()
        .collect::<Result<_, _>>()
        .expect("fragments");
    assert_eq!(text, "Chúc mừng");
}
