//! Processor tests against real HTTP collaborators bound to ephemeral ports

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::sync::mpsc;

use relay_queue::transform::{NO_POSTS, PARSE_ERROR};
use relay_queue::{
    BackoffStrategy, DeliveryOutcome, FetchJob, JobOutcome, MemoryQueue, Processor,
    ProcessorConfig, QueueBackend,
};

const ONE_POST: &str =
    r#"{"data": [{"created_at":"2024-01-01","text":"hi","activity":{"num_likes":5}}]}"#;
const ONE_POST_BLOCK: &str = "{\n[created_at=2024-01-01][reactions=5][text=hi]\n}";

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn(app: Router) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Source endpoint that replays a scripted sequence of responses
#[derive(Clone, Default)]
struct Upstream {
    script: Arc<Mutex<VecDeque<(StatusCode, String)>>>,
    hits: Arc<AtomicUsize>,
    seen_headers: Arc<Mutex<Vec<HeaderMap>>>,
}

impl Upstream {
    fn scripted(responses: &[(StatusCode, &str)]) -> Self {
        let upstream = Self::default();
        upstream.script.lock().unwrap().extend(
            responses
                .iter()
                .map(|(status, body)| (*status, body.to_string())),
        );
        upstream
    }

    async fn serve(&self) -> TestServer {
        let app = Router::new()
            .route("/posts", get(source_handler))
            .with_state(self.clone());
        TestServer::spawn(app).await
    }
}

async fn source_handler(State(upstream): State<Upstream>, headers: HeaderMap) -> (StatusCode, String) {
    upstream.hits.fetch_add(1, Ordering::SeqCst);
    upstream.seen_headers.lock().unwrap().push(headers);
    upstream
        .script
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or((StatusCode::OK, r#"{"data": []}"#.to_string()))
}

/// Callback endpoint forwarding every received payload to a channel.
/// `/slow` answers only after `delay`.
async fn callback_server(delay: Duration) -> (TestServer, mpsc::UnboundedReceiver<Value>) {
    let (tx, rx) = mpsc::unbounded_channel();

    async fn hook(State(tx): State<mpsc::UnboundedSender<Value>>, Json(body): Json<Value>) -> StatusCode {
        let _ = tx.send(body);
        StatusCode::OK
    }

    let app = Router::new()
        .route("/hook", post(hook))
        .route(
            "/slow",
            post(move || async move {
                tokio::time::sleep(delay).await;
                StatusCode::OK
            }),
        )
        .with_state(tx);

    (TestServer::spawn(app).await, rx)
}

fn fast_config() -> ProcessorConfig {
    ProcessorConfig {
        idle_wait: Duration::from_millis(20),
        fetch_timeout: Duration::from_secs(2),
        delivery_timeout: Duration::from_millis(200),
        rate_limit_backoff: BackoffStrategy::Constant(Duration::from_millis(10)),
        inter_job_delay: Duration::from_millis(10),
        ..Default::default()
    }
}

fn processor() -> Processor<MemoryQueue> {
    Processor::new(MemoryQueue::new(), fast_config())
}

#[tokio::test]
async fn test_rate_limited_job_goes_behind_waiting_jobs() {
    let upstream = Upstream::scripted(&[(StatusCode::TOO_MANY_REQUESTS, "")]);
    let server = upstream.serve().await;
    let processor = processor();
    let queue = processor.backend();

    let first = FetchJob::new(Some(server.url("/posts")));
    let second = FetchJob::new(Some(server.url("/posts")));
    let (first_id, second_id) = (first.id, second.id);
    queue.enqueue(first).await.unwrap();
    queue.enqueue(second).await.unwrap();

    let outcome = processor.tick().await;
    assert_eq!(outcome, Some(JobOutcome::Requeued { retry_count: 1 }));

    let wait = Duration::from_millis(10);
    let next = queue.dequeue(wait).await.unwrap().unwrap();
    let requeued = queue.dequeue(wait).await.unwrap().unwrap();
    assert_eq!(next.id, second_id);
    assert_eq!(requeued.id, first_id);
    assert_eq!(requeued.retry_count, 1);
}

#[tokio::test]
async fn test_retry_ceiling_drops_job() {
    let upstream = Upstream::scripted(&[(StatusCode::TOO_MANY_REQUESTS, "")]);
    let server = upstream.serve().await;
    let processor = processor();

    let mut job = FetchJob::new(Some(server.url("/posts")));
    job.retry_count = 2;

    let outcome = processor.process(job).await;

    assert_eq!(outcome, JobOutcome::RateLimitExhausted { retry_count: 3 });
    assert!(processor.backend().is_empty().await);
    assert_eq!(processor.stats().snapshot().rate_limit_exhausted, 1);
}

#[tokio::test]
async fn test_exhausted_job_skips_inter_job_delay() {
    let upstream = Upstream::scripted(&[(StatusCode::TOO_MANY_REQUESTS, "")]);
    let server = upstream.serve().await;
    let processor = Processor::new(
        MemoryQueue::new(),
        ProcessorConfig {
            inter_job_delay: Duration::from_secs(30),
            ..fast_config()
        },
    );

    let mut job = FetchJob::new(Some(server.url("/posts")));
    job.retry_count = 2;
    processor.backend().enqueue(job).await.unwrap();

    let outcome = tokio::time::timeout(Duration::from_secs(5), processor.tick())
        .await
        .expect("exhausted job should not wait out the inter-job delay");
    assert_eq!(outcome, Some(JobOutcome::RateLimitExhausted { retry_count: 3 }));
}

#[tokio::test]
async fn test_retry_count_progression_then_delivery() {
    let upstream = Upstream::scripted(&[
        (StatusCode::TOO_MANY_REQUESTS, ""),
        (StatusCode::TOO_MANY_REQUESTS, ""),
        (StatusCode::OK, ONE_POST),
    ]);
    let source = upstream.serve().await;
    let (callback, mut received) = callback_server(Duration::ZERO).await;
    let processor = processor();

    let job = FetchJob::new(Some(source.url("/posts")))
        .with_callback(Some(callback.url("/hook")))
        .with_company_name(Some(json!("Acme")))
        .with_org_id(Some(json!(1234)))
        .with_urn(Some(json!("urn:li:organization:1234")));
    processor.backend().enqueue(job).await.unwrap();

    assert_eq!(
        processor.tick().await,
        Some(JobOutcome::Requeued { retry_count: 1 })
    );
    assert_eq!(
        processor.tick().await,
        Some(JobOutcome::Requeued { retry_count: 2 })
    );
    assert_eq!(
        processor.tick().await,
        Some(JobOutcome::Completed {
            status: 200,
            posts: ONE_POST_BLOCK.to_string(),
            delivery: DeliveryOutcome::Delivered(200),
        })
    );

    let payload = received.recv().await.expect("callback payload");
    assert_eq!(payload["status"], 200);
    assert_eq!(payload["company_name"], "Acme");
    assert_eq!(payload["org_id"], 1234);
    assert_eq!(payload["urn"], "urn:li:organization:1234");
    assert_eq!(payload["posts"], ONE_POST_BLOCK);
    assert_eq!(upstream.hits.load(Ordering::SeqCst), 3);

    let stats = processor.stats().snapshot();
    assert_eq!(stats.requeued, 2);
    assert_eq!(stats.completed, 1);
}

#[tokio::test]
async fn test_idle_tick_returns_none() {
    let processor = processor();
    assert_eq!(processor.tick().await, None);
}

#[tokio::test]
async fn test_fetch_failure_drops_job_without_retry() {
    // Bind then release a port so nothing is listening on it
    let closed = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = closed.local_addr().unwrap();
    drop(closed);

    let processor = processor();
    let job = FetchJob::new(Some(format!("http://{}/posts", addr)));

    let outcome = processor.process(job).await;

    assert!(matches!(outcome, JobOutcome::FetchFailed(_)));
    assert!(processor.backend().is_empty().await);
    assert_eq!(processor.stats().snapshot().fetch_failures, 1);
}

#[tokio::test]
async fn test_missing_source_url_is_a_fetch_failure() {
    let processor = processor();
    let outcome = processor.process(FetchJob::new(None)).await;
    assert_eq!(
        outcome,
        JobOutcome::FetchFailed("Job has no source URL".to_string())
    );
}

#[tokio::test]
async fn test_request_headers_are_forwarded() {
    let upstream = Upstream::scripted(&[(StatusCode::OK, ONE_POST)]);
    let server = upstream.serve().await;
    let processor = processor();

    let headers = std::collections::HashMap::from([
        ("Authorization".to_string(), "Bearer token-1".to_string()),
        ("X-Restli-Protocol-Version".to_string(), "2.0.0".to_string()),
    ]);
    let job = FetchJob::new(Some(server.url("/posts"))).with_headers(headers);

    processor.process(job).await;

    let seen = upstream.seen_headers.lock().unwrap();
    assert_eq!(seen[0]["authorization"], "Bearer token-1");
    assert_eq!(seen[0]["x-restli-protocol-version"], "2.0.0");
}

#[tokio::test]
async fn test_non_success_status_is_transformed_and_delivered() {
    let upstream = Upstream::scripted(&[(StatusCode::INTERNAL_SERVER_ERROR, "upstream broke")]);
    let source = upstream.serve().await;
    let (callback, mut received) = callback_server(Duration::ZERO).await;
    let processor = processor();

    let job =
        FetchJob::new(Some(source.url("/posts"))).with_callback(Some(callback.url("/hook")));
    let outcome = processor.process(job).await;

    assert!(matches!(
        outcome,
        JobOutcome::Completed { status: 500, .. }
    ));
    let payload = received.recv().await.unwrap();
    assert_eq!(payload["status"], 500);
    assert_eq!(payload["posts"], PARSE_ERROR);
    assert!(payload["urn"].is_null());
}

#[tokio::test]
async fn test_without_callback_delivery_is_skipped() {
    let upstream = Upstream::scripted(&[(StatusCode::OK, r#"{"data": []}"#)]);
    let server = upstream.serve().await;
    let processor = processor();

    let outcome = processor
        .process(FetchJob::new(Some(server.url("/posts"))))
        .await;

    assert_eq!(
        outcome,
        JobOutcome::Completed {
            status: 200,
            posts: NO_POSTS.to_string(),
            delivery: DeliveryOutcome::Skipped,
        }
    );
}

#[tokio::test]
async fn test_delivery_timeout_does_not_stall_the_processor() {
    let upstream = Upstream::scripted(&[(StatusCode::OK, ONE_POST), (StatusCode::OK, ONE_POST)]);
    let source = upstream.serve().await;
    let (callback, mut received) = callback_server(Duration::from_secs(2)).await;
    let processor = Arc::new(processor());

    let slow = FetchJob::new(Some(source.url("/posts"))).with_callback(Some(callback.url("/slow")));
    let fast = FetchJob::new(Some(source.url("/posts")))
        .with_callback(Some(callback.url("/hook")))
        .with_company_name(Some(json!("second")));
    processor.backend().enqueue(slow).await.unwrap();
    processor.backend().enqueue(fast).await.unwrap();

    let worker = {
        let processor = processor.clone();
        tokio::spawn(async move { processor.run().await })
    };

    let payload = tokio::time::timeout(Duration::from_secs(2), received.recv())
        .await
        .expect("second job should be delivered despite the slow callback")
        .unwrap();
    assert_eq!(payload["company_name"], "second");

    let stats = processor.stats().snapshot();
    assert_eq!(stats.delivery_failures, 1);
    assert!(stats.completed >= 1);

    worker.abort();
}

#[tokio::test]
async fn test_processor_drains_in_submission_order() {
    let upstream = Upstream::default();
    let source = upstream.serve().await;
    let (callback, mut received) = callback_server(Duration::ZERO).await;
    let processor = Arc::new(processor());

    for name in ["a", "b", "c"] {
        let job = FetchJob::new(Some(source.url("/posts")))
            .with_callback(Some(callback.url("/hook")))
            .with_company_name(Some(json!(name)));
        processor.backend().enqueue(job).await.unwrap();
    }

    let worker = {
        let processor = processor.clone();
        tokio::spawn(async move { processor.run().await })
    };

    let mut order = Vec::new();
    for _ in 0..3 {
        let payload = tokio::time::timeout(Duration::from_secs(2), received.recv())
            .await
            .unwrap()
            .unwrap();
        order.push(payload["company_name"].as_str().unwrap().to_string());
    }
    assert_eq!(order, ["a", "b", "c"]);

    worker.abort();
}
