//! End-to-end orchestration tests running the full service: submission,
//! worker pool, engine, fan-out, merge, and progress tracking, all against
//! the mock extractor.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;

use extraction::{MockExtractor, NodeType, ScriptedFailure};
use orchestrator::{
    phases, JobEvent, JobStatus, Onboarding, OrchestratorConfig, SubmitRequest,
};

/// Poll until `predicate` holds or the deadline passes.
async fn wait_until<F: Fn() -> bool>(deadline: Duration, predicate: F) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if predicate() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}

fn service(mock: MockExtractor) -> Onboarding<MockExtractor> {
    Onboarding::start(Arc::new(mock), OrchestratorConfig::for_tests())
}

#[tokio::test]
async fn happy_path_produces_a_merged_record() {
    let mock = MockExtractor::new()
        .with_response(
            NodeType::BasicInfo,
            json!({
                "basic_info": {"name": "Riverside House", "source": "example"},
                "location": {"city": "Manchester"},
                "features": ["WiFi", "Gym"],
            }),
        )
        .with_response(
            NodeType::RoomConfigs,
            json!({
                "configurations": [
                    {"name": "Studio A", "Pricing": {}},
                ]
            }),
        )
        .with_fanout_response(
            "Studio A",
            json!({
                "tenancy_options": [
                    {"duration": "44 weeks", "price": "£150"},
                    {"duration": "51 weeks", "price": 150},
                ]
            }),
        );
    let service = service(mock);

    let job_id = service
        .submit(SubmitRequest::new("https://example.com/property/1"))
        .unwrap();

    assert!(
        wait_until(Duration::from_secs(5), || {
            service
                .job(job_id)
                .map(|j| j.status == JobStatus::Completed)
                .unwrap_or(false)
        })
        .await,
        "job did not complete in time"
    );

    let job = service.job(job_id).unwrap();
    assert_eq!(job.progress_percentage, 100.0);
    assert_eq!(job.current_phase, phases::COMPLETED);
    assert!(job.quality_score.unwrap() > 0.0);
    assert!(job.execution_time.is_some());

    let merged = job.merged_data.unwrap();
    assert_eq!(merged["basic_info"]["name"], "Riverside House");
    assert_eq!(merged["location"]["city"], "Manchester");

    let configs = merged["configurations"].as_array().unwrap();
    assert_eq!(configs.len(), 1);
    let pricing = &configs[0]["Pricing"];
    assert_eq!(pricing["Min Price"], 150);
    assert_eq!(pricing["Max Price"], 150);

    let progress = service.progress(job_id).unwrap();
    assert_eq!(progress.status, JobStatus::Completed);
    assert_eq!(progress.overall_progress, 100.0);
    // 4 main nodes + 1 fanned-out tenancy task
    assert_eq!(progress.nodes_total, 5);
    assert_eq!(progress.nodes_failed, 0);

    service.shutdown().await.unwrap();
}

#[tokio::test]
async fn single_worker_drains_jobs_in_priority_order() {
    let mut config = OrchestratorConfig::for_tests();
    config.max_concurrent_jobs = 1;

    let mock = MockExtractor::new().with_latency(Duration::from_millis(5));
    let service = Onboarding::start(Arc::new(mock), config);
    let mut events = service.subscribe();

    // schedule slightly ahead so all three are queued before any is claimed
    let run_at = chrono::Utc::now() + chrono::Duration::milliseconds(100);
    let mut submitted = Vec::new();
    for priority in ["low", "normal", "urgent"] {
        let mut request = SubmitRequest::new(format!("https://example.com/{priority}"));
        request.priority = Some(priority.to_string());
        request.scheduled_at = Some(run_at);
        submitted.push((priority, service.submit(request).unwrap()));
    }

    let mut started = Vec::new();
    while started.len() < 3 {
        match tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("timed out waiting for events")
            .unwrap()
        {
            JobEvent::Started { job_id, .. } => started.push(job_id),
            _ => {}
        }
    }

    let expected: Vec<_> = ["urgent", "normal", "low"]
        .iter()
        .map(|p| {
            submitted
                .iter()
                .find(|(priority, _)| priority == p)
                .unwrap()
                .1
        })
        .collect();
    assert_eq!(started, expected);

    service.shutdown().await.unwrap();
}

#[tokio::test]
async fn failing_jobs_retry_then_fail_permanently() {
    let mut mock = MockExtractor::new();
    for node in NodeType::ALL {
        mock = mock.with_failure(node, ScriptedFailure::Provider("model offline".to_string()));
    }
    let service = service(mock);
    let mut events = service.subscribe();

    let mut request = SubmitRequest::new("https://example.com/p");
    request.max_retries = Some(1);
    let job_id = service.submit(request).unwrap();

    assert!(
        wait_until(Duration::from_secs(5), || {
            service
                .job(job_id)
                .map(|j| j.status == JobStatus::Failed)
                .unwrap_or(false)
        })
        .await,
        "job did not fail in time"
    );

    let job = service.job(job_id).unwrap();
    assert_eq!(job.retry_count, 1);
    assert_eq!(job.current_phase, phases::FAILED);
    assert!(job.merged_data.is_none());
    assert_eq!(job.quality_score, Some(0.0));
    assert_eq!(
        job.error_message.as_deref(),
        Some("all extraction nodes failed")
    );

    let mut failures = Vec::new();
    while failures.len() < 2 {
        match tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("timed out waiting for events")
            .unwrap()
        {
            JobEvent::Failed {
                attempt,
                will_retry,
                ..
            } => failures.push((attempt, will_retry)),
            _ => {}
        }
    }
    assert_eq!(failures, vec![(1, true), (2, false)]);

    service.shutdown().await.unwrap();
}

#[tokio::test]
async fn transient_node_failures_do_not_fail_the_job() {
    let mock = MockExtractor::new()
        .with_failures_then_success(NodeType::BasicInfo, ScriptedFailure::RateLimited, 1)
        .with_failures_then_success(NodeType::TenancyInfo, ScriptedFailure::Timeout, 1);
    let service = service(mock);

    let job_id = service
        .submit(SubmitRequest::new("https://example.com/p"))
        .unwrap();

    assert!(
        wait_until(Duration::from_secs(5), || {
            service
                .job(job_id)
                .map(|j| j.status == JobStatus::Completed)
                .unwrap_or(false)
        })
        .await
    );

    let job = service.job(job_id).unwrap();
    assert_eq!(job.retry_count, 0);
    assert_eq!(job.extracted_data.len(), 4);

    let progress = service.progress(job_id).unwrap();
    let retried: Vec<_> = progress
        .nodes
        .iter()
        .filter(|n| n.retry_count > 0)
        .collect();
    assert_eq!(retried.len(), 2);

    service.shutdown().await.unwrap();
}

#[tokio::test]
async fn progress_log_is_monotonic_and_ends_at_completion() {
    let service = service(MockExtractor::new());

    let job_id = service
        .submit(SubmitRequest::new("https://example.com/p"))
        .unwrap();

    assert!(
        wait_until(Duration::from_secs(5), || {
            service
                .job(job_id)
                .map(|j| j.is_terminal())
                .unwrap_or(false)
        })
        .await
    );

    let events = service.store().events_for_job(job_id, 100);
    assert!(events.len() >= 4);

    let mut last = 0.0f64;
    for event in &events {
        assert!(
            event.progress_percentage >= last,
            "progress went backwards at {:?}: {} < {}",
            event.event_type,
            event.progress_percentage,
            last
        );
        last = event.progress_percentage;
    }
    assert_eq!(last, 100.0);

    service.shutdown().await.unwrap();
}

#[tokio::test]
async fn cancelling_a_pending_job_removes_it_from_the_queue() {
    let service = service(MockExtractor::new());

    let mut request = SubmitRequest::new("https://example.com/p");
    request.scheduled_at = Some(chrono::Utc::now() + chrono::Duration::hours(1));
    let job_id = service.submit(request).unwrap();

    assert!(service.cancel(job_id));
    let job = service.job(job_id).unwrap();
    assert_eq!(job.status, JobStatus::Cancelled);

    // second cancel is a no-op
    assert!(!service.cancel(job_id));

    service.shutdown().await.unwrap();
}

#[tokio::test]
async fn cancelling_a_running_job_stops_it() {
    let mock = MockExtractor::new().with_latency(Duration::from_millis(500));
    let service = service(mock);

    let job_id = service
        .submit(SubmitRequest::new("https://example.com/p"))
        .unwrap();

    assert!(
        wait_until(Duration::from_secs(5), || {
            service
                .job(job_id)
                .map(|j| j.status == JobStatus::Running)
                .unwrap_or(false)
        })
        .await
    );

    assert!(service.cancel(job_id));
    assert!(
        wait_until(Duration::from_secs(5), || {
            service
                .job(job_id)
                .map(|j| j.status == JobStatus::Cancelled)
                .unwrap_or(false)
        })
        .await,
        "job was not cancelled in time"
    );

    let job = service.job(job_id).unwrap();
    assert!(job.merged_data.is_none());

    service.shutdown().await.unwrap();
}

#[tokio::test]
async fn stats_reflect_job_lifecycle() {
    let service = service(MockExtractor::new());

    let stats = service.stats();
    assert_eq!(stats.total_jobs, 0);

    let job_id = service
        .submit(SubmitRequest::new("https://example.com/p"))
        .unwrap();

    assert!(
        wait_until(Duration::from_secs(5), || {
            service
                .job(job_id)
                .map(|j| j.status == JobStatus::Completed)
                .unwrap_or(false)
        })
        .await
    );

    let stats = service.stats();
    assert_eq!(stats.total_jobs, 1);
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.queued, 0);
    assert_eq!(stats.running, 0);

    service.shutdown().await.unwrap();
}

#[tokio::test]
async fn fanout_results_are_keyed_per_configuration() {
    let mock = MockExtractor::new()
        .with_response(
            NodeType::RoomConfigs,
            json!({
                "configurations": [
                    {"name": "Studio A"},
                    {"name": "Deluxe En-suite"},
                    {"name": "studio a"},
                ]
            }),
        )
        .with_fanout_response(
            "Studio A",
            json!({"tenancy_options": [{"duration": 44, "price": 150}]}),
        )
        .with_fanout_response(
            "Deluxe En-suite",
            json!({"tenancy_options": [{"duration": 51, "price": 210}]}),
        );
    let service = service(mock);

    let job_id = service
        .submit(SubmitRequest::new("https://example.com/p"))
        .unwrap();

    assert!(
        wait_until(Duration::from_secs(5), || {
            service
                .job(job_id)
                .map(|j| j.status == JobStatus::Completed)
                .unwrap_or(false)
        })
        .await
    );

    let progress = service.progress(job_id).unwrap();
    let fanout_keys: Vec<_> = progress
        .nodes
        .iter()
        .filter_map(|n| n.config_key.clone())
        .collect();
    // duplicate "studio a" deduped by normalized key
    assert_eq!(fanout_keys.len(), 2);
    assert!(fanout_keys.contains(&"studio-a".to_string()));
    assert!(fanout_keys.contains(&"deluxe-en-suite".to_string()));

    service.shutdown().await.unwrap();
}
