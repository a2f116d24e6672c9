//! End-to-end pipeline tests with a fake data source and provider.

use std::sync::Arc;
use std::time::Duration;

use fortune_booth::config::PromptConfig;
use fortune_booth::oracle::invoker::{InvokeSettings, Invoker};
use fortune_booth::oracle::{parse_fortune_number, FortuneError, FortuneOrigin, FortuneService, RequestContext};
use fortune_booth::providers::{ContentPart, MessageContent, ProviderError};
use fortune_booth::retry::RetryPolicy;
use fortune_booth::roster::resolver::{Identifier, InputError, LookupError};
use fortune_booth::roster::{CellValue, ParticipantTable, Workbook};
use fortune_booth::source::cache::WorkbookCache;
use fortune_booth::source::{DataSource, SourceError};

use crate::support::fakes::{CountingSource, ScriptedProvider};
use crate::support::xlsx;

fn settings(stream: bool) -> InvokeSettings {
    InvokeSettings {
        temperature: 1.0,
        max_output_tokens: 2000,
        thinking_budget: Some(0),
        stream,
        timeout: Duration::from_secs(5),
        retry: RetryPolicy {
            max_attempts: 2,
            base_delay_ms: 1,
            max_delay_ms: 5,
        },
    }
}

fn service_with(
    provider: Arc<ScriptedProvider>,
    stream: bool,
) -> (FortuneService, Arc<CountingSource>) {
    let source = CountingSource::new(xlsx::standard_workbook());
    let cache = Arc::new(WorkbookCache::new(
        Arc::clone(&source) as Arc<dyn DataSource>,
        None,
        Duration::from_secs(5),
        RetryPolicy::none(),
    ));
    let invoker = Invoker::new(provider, settings(stream));
    (
        FortuneService::new(cache, invoker, PromptConfig::default()),
        source,
    )
}

fn sent_segments(provider: &ScriptedProvider) -> Vec<String> {
    let requests = provider.requests();
    let request = requests.last().expect("one request");
    let MessageContent::Parts(parts) = &request.messages[0].content else {
        panic!("expected parts");
    };
    parts
        .iter()
        .filter_map(|p| match p {
            ContentPart::Text { text } => Some(text.clone()),
            ContentPart::Reasoning { .. } => None,
        })
        .collect()
}

#[tokio::test]
async fn fixed_response_skips_the_model() {
    let provider = ScriptedProvider::answering("unused");
    let (service, _source) = service_with(provider.clone(), false);

    let fortune = service.tell("1003", None).await.expect("fortune");
    assert_eq!(fortune.text, "Năm nay bạn sẽ thăng chức! 🎉");
    assert_eq!(fortune.origin, FortuneOrigin::Fixed);
    assert_eq!(fortune.name.as_deref(), Some("Trần Thị Bình"));
    assert_eq!(fortune.team.as_deref(), Some("HR"));
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn blank_fixed_response_still_generates_with_injection() {
    let provider = ScriptedProvider::answering("Bạn sẽ trúng giải nhất, chắc chắn!");
    let (service, _source) = service_with(provider.clone(), false);

    let fortune = service.tell(" 1004 ", Some("8")).await.expect("fortune");
    assert_eq!(fortune.text, "Bạn sẽ trúng giải nhất, chắc chắn!");
    assert_eq!(fortune.team, None);
    match &fortune.origin {
        FortuneOrigin::Generated { model, usage } => {
            assert_eq!(model, "scripted-model");
            assert!(usage.is_some());
        }
        FortuneOrigin::Fixed => panic!("expected generation"),
    }

    let segments = sent_segments(&provider);
    assert!(segments.iter().any(|s| s == "Bạn sẽ trúng giải nhất"));
    assert!(segments.iter().any(|s| s.contains("là 8.")));
    assert!(!segments.iter().any(|s| s.contains("fixed_response")));
}

#[tokio::test]
async fn name_lookup_returns_the_first_match() {
    let provider = ScriptedProvider::answering("ok");
    let (service, _source) = service_with(provider.clone(), false);

    service.tell("  lê minh ", None).await.expect("fortune");
    let segments = sent_segments(&provider);
    assert!(segments[5].contains("\"id\":1004"));
}

#[tokio::test]
async fn unknown_id_is_not_found_without_a_model_call() {
    let provider = ScriptedProvider::answering("unused");
    let (service, _source) = service_with(provider.clone(), false);

    let err = service.tell("99999999", None).await.expect_err("not found");
    assert!(matches!(
        err,
        FortuneError::NotFound(LookupError::NotFound(Identifier::Id(99_999_999)))
    ));
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn punctuation_is_looked_up_as_a_name() {
    let provider = ScriptedProvider::answering("unused");
    let (service, _source) = service_with(provider.clone(), false);

    let err = service.tell("abc!!", None).await.expect_err("not found");
    assert!(matches!(
        err,
        FortuneError::NotFound(LookupError::NotFound(Identifier::Name(ref n))) if n == "abc!!"
    ));
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn blank_input_is_rejected_before_fetching() {
    let provider = ScriptedProvider::answering("unused");
    let (service, source) = service_with(provider, false);

    let err = service.tell(" \t ", None).await.expect_err("empty");
    assert!(matches!(err, FortuneError::Input(InputError::Empty)));
    assert_eq!(source.fetches(), 0);
}

#[tokio::test]
async fn bad_fortune_number_is_rejected() {
    let provider = ScriptedProvider::answering("unused");
    let (service, _source) = service_with(provider, false);

    let err = service.tell("1001", Some("bảy")).await.expect_err("bad number");
    assert!(matches!(err, FortuneError::Input(InputError::FortuneNumber(_))));
    assert_eq!(parse_fortune_number(Some("  ")), Ok(None));
    assert_eq!(parse_fortune_number(Some(" 42 ")), Ok(Some(42)));
    assert!(parse_fortune_number(Some("-3")).is_err());
}

#[tokio::test]
async fn streamed_reply_is_returned_whole() {
    let provider = ScriptedProvider::streaming(&["Tôi thấy ", "bạn ", "sẽ giàu!"]);
    let (service, _source) = service_with(provider, true);

    let fortune = service.tell("1002", None).await.expect("fortune");
    assert_eq!(fortune.text, "Tôi thấy bạn sẽ giàu!");
    assert_eq!(
        fortune.origin,
        FortuneOrigin::Generated {
            model: "scripted/model".to_owned(),
            usage: None,
        }
    );
}

#[tokio::test]
async fn generation_failure_is_reported() {
    let provider = Arc::new(ScriptedProvider::with_replies(vec![Err(
        ProviderError::HttpStatus {
            status: 503,
            body: "busy".to_owned(),
        },
    )]));
    let (service, _source) = service_with(provider.clone(), false);

    let err = service.tell("1001", None).await.expect_err("generation fails");
    assert!(matches!(err, FortuneError::Generation(_)));
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn source_failure_is_reported() {
    let provider = ScriptedProvider::answering("unused");
    let (service, source) = service_with(provider, false);
    source.fail_next(vec![SourceError::Config("broken".to_owned())]);

    let err = service.tell("1001", None).await.expect_err("fetch fails");
    assert!(matches!(err, FortuneError::Source(SourceError::Config(_))));
}

#[tokio::test]
async fn refresh_serves_updated_data() {
    let provider = ScriptedProvider::answering("ok");
    let (service, source) = service_with(provider, false);
    service.tell("1001", None).await.expect("first fortune");

    source.set_workbook(Workbook {
        participants: ParticipantTable::new(
            vec!["id".to_owned(), "name".to_owned(), "fixed_response".to_owned()],
            vec![vec![
                CellValue::Integer(2001),
                CellValue::Text("Người Mới".to_owned()),
                CellValue::Text("Chào mừng!".to_owned()),
            ]],
        ),
        company_context: String::new(),
        role_definitions: String::new(),
    });
    assert!(service.tell("2001", None).await.is_err());

    assert_eq!(service.refresh().await, 1);
    let fortune = service.tell("2001", None).await.expect("fortune after refresh");
    assert_eq!(fortune.text, "Chào mừng!");
    assert_eq!(source.fetches(), 2);
}

#[test]
fn request_context_gets_a_fresh_id() {
    let a = RequestContext::new("1001", None).expect("ctx");
    let b = RequestContext::new("1001", None).expect("ctx");
    assert_ne!(a.request_id, b.request_id);
    assert_eq!(a.identifier, Identifier::Id(1001));
}
