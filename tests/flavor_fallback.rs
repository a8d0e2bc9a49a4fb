//! Flavor sources against a mock HTTP server: success paths and every
//! failure that must fall back to the bot's configured line.

use aiwalls::flavor::{Extract, FlavorResolver, FlavorSource, HttpSource};
use aiwalls::flavor::http::build_client;
use aiwalls::scheduler::BotId;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const FALLBACK: &str = "Why don't skeletons fight each other? They don't have the guts.";

fn source(server: &MockServer, route: &str, extract: Extract, prefix: Option<&str>) -> Arc<dyn FlavorSource> {
    Arc::new(HttpSource::new(
        build_client(Duration::from_secs(5)),
        format!("{}{route}", server.uri()),
        extract,
        prefix.map(str::to_string),
        StdRng::seed_from_u64(11),
    ))
}

fn resolver_for(source: Arc<dyn FlavorSource>, timeout: Duration) -> FlavorResolver {
    let mut resolver = FlavorResolver::new(timeout);
    resolver.register(BotId::from("Pi"), source, FALLBACK);
    resolver
}

#[tokio::test]
async fn json_field_success_is_passed_through() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/joke"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"joke": "I told a UDP joke."})))
        .mount(&server)
        .await;

    let resolver = resolver_for(
        source(&server, "/joke", Extract::Field { pointer: "/joke".into() }, None),
        Duration::from_secs(5),
    );
    assert_eq!(
        resolver.resolve(&"Pi".into(), &[]).await,
        "I told a UDP joke."
    );
}

#[tokio::test]
async fn json_list_picks_an_element_and_applies_prefix() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/facts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "facts": ["Octopuses have three hearts.", "Honey never spoils."]
        })))
        .mount(&server)
        .await;

    let resolver = resolver_for(
        source(
            &server,
            "/facts",
            Extract::List { pointer: "/facts".into() },
            Some("Fun Fact: "),
        ),
        Duration::from_secs(5),
    );
    let text = resolver.resolve(&"Pi".into(), &[]).await;
    assert!(
        text == "Fun Fact: Octopuses have three hearts."
            || text == "Fun Fact: Honey never spoils.",
        "unexpected text {text:?}"
    );
}

#[tokio::test]
async fn http_500_falls_back() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/joke"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let src = source(&server, "/joke", Extract::Field { pointer: "/joke".into() }, None);
    assert!(src.fetch(&"Pi".into(), &[]).await.is_err());

    let resolver = resolver_for(src, Duration::from_secs(5));
    assert_eq!(resolver.resolve(&"Pi".into(), &[]).await, FALLBACK);
}

#[tokio::test]
async fn empty_list_falls_back() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/quotes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let resolver = resolver_for(
        source(&server, "/quotes", Extract::List { pointer: String::new() }, None),
        Duration::from_secs(5),
    );
    assert_eq!(resolver.resolve(&"Pi".into(), &[]).await, FALLBACK);
}

#[tokio::test]
async fn missing_field_falls_back() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/joke"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"setup": "..."})))
        .mount(&server)
        .await;

    let resolver = resolver_for(
        source(&server, "/joke", Extract::Field { pointer: "/joke".into() }, None),
        Duration::from_secs(5),
    );
    assert_eq!(resolver.resolve(&"Pi".into(), &[]).await, FALLBACK);
}

#[tokio::test]
async fn slow_upstream_times_out_to_fallback() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/joke"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"joke": "too late"}))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let resolver = resolver_for(
        source(&server, "/joke", Extract::Field { pointer: "/joke".into() }, None),
        Duration::from_millis(200),
    );
    assert_eq!(resolver.resolve(&"Pi".into(), &[]).await, FALLBACK);
}

#[tokio::test]
async fn plain_text_body_is_trimmed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/quote"))
        .respond_with(ResponseTemplate::new(200).set_body_string("  Keep going.\n"))
        .mount(&server)
        .await;

    let resolver = resolver_for(
        source(&server, "/quote", Extract::Text, None),
        Duration::from_secs(5),
    );
    assert_eq!(resolver.resolve(&"Pi".into(), &[]).await, "Keep going.");
}
