//! Integration tests for the live collaborator clients
//!
//! Tests HTTP behavior using wiremock for request/response mocking.

use serde_json::json;
use std::time::Duration;
use wiremock::{
    matchers::{body_partial_json, header, method, path},
    Mock, MockServer, ResponseTemplate,
};

use interview_coach::collaborators::{
    AuthScheme, BrowsingCompanyResearcher, ClaimVerifier, CompanyResearcher, EntityExtractor,
    HttpEntityExtractor, HttpRoleScout, HttpVoiceAnalyzer, MetricsSource, ResearchClaimVerifier,
    RoleScout, ServiceClient, VoiceAnalyzer,
};
use interview_coach::config::RequestConfig;
use interview_coach::error::CollaboratorError;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Create a test client pointing to the mock server
fn create_test_client(base_url: &str, auth: AuthScheme, max_retries: u32) -> ServiceClient {
    let request_config = RequestConfig {
        timeout_ms: 5000,
        max_retries,
        retry_delay_ms: 10,
    };

    ServiceClient::new("test", base_url, "test-api-key", auth, request_config)
        .expect("Failed to create client")
}

fn schema(labels: &[&str]) -> Vec<String> {
    labels.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod extractor_tests {
    use super::*;

    #[tokio::test]
    async fn test_extract_filters_by_schema_and_validity() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/extract"))
            .and(header("Authorization", "Bearer test-api-key"))
            .and(body_partial_json(json!({"text": "I used Rust to cut costs 20%"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "entities": [
                    {"text": "Rust", "label": "TECHNICAL_SKILL"},
                    {"text": "20%", "label": "METRIC"},
                    {"text": "costs", "label": "UNLISTED"},
                    {"text": "  ", "label": "IMPACT"}
                ]
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let extractor =
            HttpEntityExtractor::new(create_test_client(&mock_server.uri(), AuthScheme::Bearer, 0));
        let entities = extractor
            .extract(
                "I used Rust to cut costs 20%",
                &schema(&["TECHNICAL_SKILL", "METRIC", "IMPACT"]),
            )
            .await
            .unwrap();

        let pairs: Vec<(&str, &str)> = entities
            .iter()
            .map(|e| (e.label.as_str(), e.text.as_str()))
            .collect();
        assert_eq!(pairs, vec![("TECHNICAL_SKILL", "Rust"), ("METRIC", "20%")]);
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/extract"))
            .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .and(path("/extract"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "entities": [{"text": "leadership", "label": "SOFT_SKILL"}]
            })))
            .mount(&mock_server)
            .await;

        let extractor =
            HttpEntityExtractor::new(create_test_client(&mock_server.uri(), AuthScheme::Bearer, 2));
        let entities = extractor
            .extract("Showed leadership", &schema(&["SOFT_SKILL"]))
            .await
            .unwrap();
        assert_eq!(entities.len(), 1);
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/extract"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad schema"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let extractor =
            HttpEntityExtractor::new(create_test_client(&mock_server.uri(), AuthScheme::Bearer, 3));
        let err = extractor
            .extract("Some text", &schema(&["SOFT_SKILL"]))
            .await
            .unwrap_err();

        match err {
            CollaboratorError::Unavailable { message, retries, .. } => {
                assert!(message.contains("400"));
                assert_eq!(retries, 0);
            }
            other => panic!("Expected Unavailable, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_text_skips_the_call() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/extract"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"entities": []})))
            .expect(0)
            .mount(&mock_server)
            .await;

        let extractor =
            HttpEntityExtractor::new(create_test_client(&mock_server.uri(), AuthScheme::Bearer, 0));
        let entities = extractor.extract("   ", &schema(&["SOFT_SKILL"])).await.unwrap();
        assert!(entities.is_empty());
    }
}

#[cfg(test)]
mod verifier_tests {
    use super::*;

    async fn mount_task(mock_server: &MockServer, task_id: &str) {
        Mock::given(method("POST"))
            .and(path("/research/tasks"))
            .and(header("X-API-Key", "test-api-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"task_id": task_id})))
            .expect(1)
            .mount(mock_server)
            .await;
    }

    #[tokio::test]
    async fn test_verify_polls_until_succeeded() {
        let mock_server = MockServer::start().await;
        mount_task(&mock_server, "t-1").await;

        Mock::given(method("GET"))
            .and(path("/research/tasks/t-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "running"})))
            .up_to_n_times(2)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/research/tasks/t-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "succeeded",
                "result": "CORRECT: false\nACTUAL_VALUE: 3 engineers\nSUMMARY: The team had 3 engineers.",
                "updates": [{"citations": [{"url": "https://acme.example/team"}]}]
            })))
            .mount(&mock_server)
            .await;

        let verifier = ResearchClaimVerifier::new(
            create_test_client(&mock_server.uri(), AuthScheme::ApiKeyHeader, 0),
            POLL_INTERVAL,
            5,
        );
        let verification = verifier.verify("I led a team of 5 engineers.").await.unwrap();

        assert!(!verification.correct);
        assert_eq!(verification.actual_value.as_deref(), Some("3 engineers"));
        assert_eq!(
            verification.summary.as_deref(),
            Some("The team had 3 engineers.")
        );
        assert_eq!(
            verification.source_url.as_deref(),
            Some("https://acme.example/team")
        );
    }

    #[tokio::test]
    async fn test_failed_task_is_an_error() {
        let mock_server = MockServer::start().await;
        mount_task(&mock_server, "t-2").await;

        Mock::given(method("GET"))
            .and(path("/research/tasks/t-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "failed"})))
            .mount(&mock_server)
            .await;

        let verifier = ResearchClaimVerifier::new(
            create_test_client(&mock_server.uri(), AuthScheme::ApiKeyHeader, 0),
            POLL_INTERVAL,
            5,
        );
        let err = verifier.verify("We shipped in Q2 of 2023.").await.unwrap_err();
        assert!(matches!(err, CollaboratorError::TaskIncomplete { .. }));
    }

    #[tokio::test]
    async fn test_poll_budget_is_bounded() {
        let mock_server = MockServer::start().await;
        mount_task(&mock_server, "t-3").await;

        Mock::given(method("GET"))
            .and(path("/research/tasks/t-3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "running"})))
            .expect(3)
            .mount(&mock_server)
            .await;

        let verifier = ResearchClaimVerifier::new(
            create_test_client(&mock_server.uri(), AuthScheme::ApiKeyHeader, 0),
            POLL_INTERVAL,
            3,
        );
        match verifier.verify("We shipped in Q2 of 2023.").await {
            Err(CollaboratorError::TaskIncomplete { status, .. }) => {
                assert_eq!(status, "still running after 3 polls");
            }
            other => panic!("Expected TaskIncomplete, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_short_claim_is_not_researched() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/research/tasks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"task_id": "x"})))
            .expect(0)
            .mount(&mock_server)
            .await;

        let verifier = ResearchClaimVerifier::new(
            create_test_client(&mock_server.uri(), AuthScheme::ApiKeyHeader, 0),
            POLL_INTERVAL,
            3,
        );
        let verification = verifier.verify("Yes.").await.unwrap();
        assert!(verification.correct);
    }
}

#[cfg(test)]
mod researcher_tests {
    use super::*;

    #[tokio::test]
    async fn test_brief_from_browsing_task() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/browsing/tasks"))
            .and(body_partial_json(json!({
                "start_url": "https://www.google.com/search?q=Acme+Corp+careers",
                "max_steps": 40
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"task_id": "b-1"})))
            .expect(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/browsing/tasks/b-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "succeeded",
                "result": "## Summary\n- Expectation: own the roadmap\n- Requires SQL fluency\n- Prepare STAR stories\nSources: example.com"
            })))
            .mount(&mock_server)
            .await;

        let researcher = BrowsingCompanyResearcher::new(
            create_test_client(&mock_server.uri(), AuthScheme::ApiKeyHeader, 0),
            POLL_INTERVAL,
            3,
        );
        let brief = researcher.brief("PM", "Acme Corp").await.unwrap();

        assert_eq!(
            brief.expectations,
            vec![
                "Expectation: own the roadmap".to_string(),
                "Requires SQL fluency".to_string()
            ]
        );
        assert_eq!(brief.hints, vec!["Prepare STAR stories".to_string()]);
        assert_eq!(
            brief.source_urls,
            vec!["https://www.google.com/search?q=Acme+Corp+careers".to_string()]
        );
    }

    #[tokio::test]
    async fn test_missing_task_id_is_invalid_response() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/browsing/tasks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&mock_server)
            .await;

        let researcher = BrowsingCompanyResearcher::new(
            create_test_client(&mock_server.uri(), AuthScheme::ApiKeyHeader, 0),
            POLL_INTERVAL,
            3,
        );
        let err = researcher.brief("PM", "Acme").await.unwrap_err();
        assert!(matches!(err, CollaboratorError::InvalidResponse { .. }));
    }
}

#[cfg(test)]
mod scout_tests {
    use super::*;

    #[tokio::test]
    async fn test_create_scout_accepts_id_field() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/scouts"))
            .and(header("X-API-Key", "test-api-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "sc-9"})))
            .expect(1)
            .mount(&mock_server)
            .await;

        let scout = HttpRoleScout::new(create_test_client(
            &mock_server.uri(),
            AuthScheme::ApiKeyHeader,
            0,
        ));
        let scout_id = scout.create("PM", "Acme").await.unwrap();
        assert_eq!(scout_id.as_deref(), Some("sc-9"));

        let requests = mock_server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert!(body["query"].as_str().unwrap().contains("for PM at Acme."));
    }

    #[tokio::test]
    async fn test_create_scout_without_id_is_invalid_response() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/scouts"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
            .mount(&mock_server)
            .await;

        let scout = HttpRoleScout::new(create_test_client(
            &mock_server.uri(),
            AuthScheme::ApiKeyHeader,
            0,
        ));
        let err = scout.create("PM", "Acme").await.unwrap_err();
        assert!(matches!(err, CollaboratorError::InvalidResponse { .. }));
    }

    #[tokio::test]
    async fn test_scout_updates_are_parsed_and_limited() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/scouts/sc-1/updates"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "updates": [
                    {"title": "Acme opens PM roles", "url": "https://acme.example/jobs", "summary": "Five new roles."},
                    {"summary": "Leadership principles refreshed", "source_url": "https://acme.example/lp"},
                    {"title": "Third"},
                    {"title": "Fourth"}
                ]
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let scout = HttpRoleScout::new(create_test_client(
            &mock_server.uri(),
            AuthScheme::ApiKeyHeader,
            0,
        ));
        let updates = scout.updates("sc-1", 3).await.unwrap();

        assert_eq!(updates.len(), 3);
        assert_eq!(updates[0].title, "Acme opens PM roles");
        assert_eq!(updates[1].title, "Leadership principles refreshed");
        assert_eq!(updates[1].url, "https://acme.example/lp");
    }

    #[tokio::test]
    async fn test_scout_updates_api_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/scouts/sc-1/updates"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let scout = HttpRoleScout::new(create_test_client(
            &mock_server.uri(),
            AuthScheme::ApiKeyHeader,
            0,
        ));
        assert!(scout.updates("sc-1", 3).await.is_err());
    }
}

#[cfg(test)]
mod voice_tests {
    use super::*;

    #[tokio::test]
    async fn test_analyze_posts_raw_audio() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/analyze"))
            .and(header("Content-Type", "application/octet-stream"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "transcript": "  I led the migration.  ",
                "stress": 1.4,
                "confidence": 0.8,
                "hesitation_count": 1
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let analyzer =
            HttpVoiceAnalyzer::new(create_test_client(&mock_server.uri(), AuthScheme::Bearer, 0));
        let analysis = analyzer.analyze(&[0, 1, 2, 3]).await.unwrap();

        assert_eq!(analysis.transcript, "I led the migration.");
        assert_eq!(analysis.stress, 1.0);
        assert_eq!(analysis.confidence, 0.8);
        assert_eq!(analysis.hesitation_count, 1);
        assert_eq!(analysis.source, MetricsSource::Live);
    }

    #[tokio::test]
    async fn test_analyze_derives_scores_from_emotions() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/analyze"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "transcript": "Well, I think so.",
                "emotions": {"Anxious": 0.3, "Calm": 0.2}
            })))
            .mount(&mock_server)
            .await;

        let analyzer =
            HttpVoiceAnalyzer::new(create_test_client(&mock_server.uri(), AuthScheme::Bearer, 0));
        let analysis = analyzer.analyze(&[9, 9]).await.unwrap();

        assert!((analysis.stress - 0.47).abs() < 1e-9);
        assert!((analysis.confidence - 0.48).abs() < 1e-9);
        assert_eq!(analysis.hesitation_count, 0);
    }
}
