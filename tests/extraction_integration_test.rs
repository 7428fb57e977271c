//! Integration tests for paginated extraction against a mock FHIR server

use futures::TryStreamExt;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use strata::adapters::fhir::{Anonymous, FhirClient, StaticBearer};
use strata::config::{secret_string, FhirConfig};
use strata::core::extract::{Extractor, RetryPolicy};
use strata::core::state::{Cursor, CursorBuilder};
use strata::domain::{ExtractError, ResourceType};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn observation(id: &str, last_updated: &str) -> Value {
    json!({
        "resourceType": "Observation",
        "id": id,
        "meta": {"lastUpdated": last_updated},
        "status": "final",
        "code": {"coding": [{"code": "8480-6"}]}
    })
}

fn bundle(resources: Vec<Value>, next: Option<String>) -> Value {
    let mut links = vec![json!({"relation": "self", "url": "ignored"})];
    if let Some(next) = next {
        links.push(json!({"relation": "next", "url": next}));
    }
    json!({
        "resourceType": "Bundle",
        "type": "searchset",
        "link": links,
        "entry": resources
            .into_iter()
            .map(|r| json!({"resource": r, "search": {"mode": "match"}}))
            .collect::<Vec<_>>()
    })
}

fn fast_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(50),
        multiplier: 2.0,
        jitter: false,
    }
}

fn extractor(server: &MockServer, timeout_seconds: u64, max_attempts: u32) -> Extractor {
    let config = FhirConfig {
        base_url: format!("{}/fhir", server.uri()),
        timeout_seconds,
        ..FhirConfig::default()
    };
    let client = FhirClient::new(&config, Arc::new(Anonymous)).unwrap();
    Extractor::new(client, fast_policy(max_attempts), 2, None)
}

fn rt() -> ResourceType {
    ResourceType::new("Observation").unwrap()
}

/// Page 1 is matched by `_sort`, later pages by `page`
async fn mount_three_pages(server: &MockServer) {
    let base = format!("{}/fhir/Observation", server.uri());
    Mock::given(method("GET"))
        .and(path("/fhir/Observation"))
        .and(query_param("_sort", "_lastUpdated"))
        .respond_with(ResponseTemplate::new(200).set_body_json(bundle(
            vec![observation("o1", "2024-01-01T00:00:00Z")],
            Some(format!("{base}?page=2")),
        )))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/fhir/Observation"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(bundle(
            vec![observation("o2", "2024-01-02T00:00:00Z")],
            Some(format!("{base}?page=3")),
        )))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/fhir/Observation"))
        .and(query_param("page", "3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(bundle(
            vec![observation("o3", "2024-01-03T00:00:00Z")],
            None,
        )))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_watermark_survives_retried_timeout() -> anyhow::Result<()> {
    let server = MockServer::start().await;

    // first request for page 2 stalls past the client timeout
    Mock::given(method("GET"))
        .and(path("/fhir/Observation"))
        .and(query_param("page", "2"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(bundle(vec![], None))
                .set_delay(Duration::from_secs(3)),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_three_pages(&server).await;

    let batch = extractor(&server, 1, 3)
        .extract(&rt(), &Cursor::new(rt()))
        .collect()
        .await?;

    let ids: Vec<&str> = batch.records.iter().filter_map(|r| r.id()).collect();
    assert_eq!(ids, vec!["o1", "o2", "o3"]);
    assert_eq!(batch.pages, 3);
    assert_eq!(
        batch.new_watermark.map(|w| w.to_rfc3339()),
        Some("2024-01-03T00:00:00+00:00".to_string())
    );
    assert!(!batch.truncated);
    Ok(())
}

#[tokio::test]
async fn test_rate_limit_then_success() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/fhir/Observation"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/fhir/Observation"))
        .respond_with(ResponseTemplate::new(200).set_body_json(bundle(
            vec![observation("o1", "2024-01-01T00:00:00Z")],
            None,
        )))
        .mount(&server)
        .await;

    let batch = extractor(&server, 5, 3)
        .extract(&rt(), &Cursor::new(rt()))
        .collect()
        .await?;
    assert_eq!(batch.records.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_fatal_status_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/fhir/Observation"))
        .respond_with(ResponseTemplate::new(404).set_body_string("unknown resource"))
        .expect(1)
        .mount(&server)
        .await;

    let err = extractor(&server, 5, 4)
        .extract(&rt(), &Cursor::new(rt()))
        .collect()
        .await
        .unwrap_err();
    assert!(matches!(err, ExtractError::ClientError { status: 404, .. }));
}

#[tokio::test]
async fn test_retries_exhausted_aborts_extraction() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/fhir/Observation"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let err = extractor(&server, 5, 3)
        .extract(&rt(), &Cursor::new(rt()))
        .collect()
        .await
        .unwrap_err();
    assert!(matches!(err, ExtractError::RetriesExhausted { attempts: 3, .. }));
}

#[tokio::test]
async fn test_incremental_search_sends_watermark_and_token() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/fhir/Observation"))
        .and(query_param("_lastUpdated", "ge2024-01-02T00:00:00Z"))
        .and(header("Authorization", "Bearer s3cret"))
        .and(header("Accept", "application/fhir+json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(bundle(vec![], None)))
        .expect(1)
        .mount(&server)
        .await;

    let config = FhirConfig {
        base_url: format!("{}/fhir", server.uri()),
        ..FhirConfig::default()
    };
    let client = FhirClient::new(
        &config,
        Arc::new(StaticBearer::new(secret_string("s3cret".to_string()))),
    )?;
    let cursor = CursorBuilder::new(rt())
        .last_successful_watermark("2024-01-02T00:00:00Z".parse()?)
        .build();

    let batch = Extractor::new(client, fast_policy(2), 10, None)
        .extract(&rt(), &cursor)
        .collect()
        .await?;
    assert!(batch.records.is_empty());
    assert_eq!(batch.new_watermark, cursor.last_successful_watermark);
    Ok(())
}

#[tokio::test]
async fn test_record_stream_is_restartable_and_capped() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    mount_three_pages(&server).await;

    let extraction = extractor(&server, 5, 2).extract(&rt(), &Cursor::new(rt()));
    let first: Vec<_> = extraction.records().try_collect().await?;
    let second: Vec<_> = extraction.records().try_collect().await?;
    assert_eq!(first.len(), 3);
    assert_eq!(first, second);

    let config = FhirConfig {
        base_url: format!("{}/fhir", server.uri()),
        ..FhirConfig::default()
    };
    let capped = Extractor::new(FhirClient::from_config(&config)?, fast_policy(2), 2, Some(2))
        .extract(&rt(), &Cursor::new(rt()))
        .collect()
        .await?;
    assert_eq!(capped.records.len(), 2);
    assert!(capped.truncated);
    assert_eq!(
        capped.new_watermark.map(|w| w.to_rfc3339()),
        Some("2024-01-02T00:00:00+00:00".to_string())
    );
    Ok(())
}

#[tokio::test]
async fn test_capped_run_advances_past_a_crowded_boundary() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let mut resources: Vec<Value> = (1..=4)
        .map(|i| observation(&format!("b{i}"), "2024-01-01T00:00:00Z"))
        .collect();
    resources.push(observation("n1", "2024-01-02T00:00:00Z"));
    resources.push(observation("n2", "2024-01-02T00:00:00Z"));
    resources.push(observation("n3", "2024-01-03T00:00:00Z"));
    Mock::given(method("GET"))
        .and(path("/fhir/Observation"))
        .and(query_param("_lastUpdated", "ge2024-01-01T00:00:00Z"))
        .respond_with(ResponseTemplate::new(200).set_body_json(bundle(resources, None)))
        .mount(&server)
        .await;

    let config = FhirConfig {
        base_url: format!("{}/fhir", server.uri()),
        ..FhirConfig::default()
    };
    let cursor = CursorBuilder::new(rt())
        .last_successful_watermark("2024-01-01T00:00:00Z".parse()?)
        .build();
    let batch = Extractor::new(FhirClient::from_config(&config)?, fast_policy(2), 10, Some(1))
        .extract(&rt(), &cursor)
        .collect()
        .await?;

    let ids: Vec<_> = batch.records.iter().filter_map(|r| r.id()).collect();
    assert_eq!(ids, vec!["b1", "b2", "b3", "b4", "n1", "n2"]);
    assert!(batch.truncated);
    assert_eq!(
        batch.new_watermark.map(|w| w.to_rfc3339()),
        Some("2024-01-02T00:00:00+00:00".to_string())
    );
    Ok(())
}
