//! Cross-layer properties exercised through the public crate surface.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashboard_backend::domain::repository::{Repository, RepositoryConfig};
use dashboard_backend::domain::service::{WorkflowConfig, WorkflowState, WorkflowStep};
use dashboard_backend::domain::{
    Entity, Error, ErrorCode, Filters, Service, ServiceRunner, operation,
};
use dashboard_backend::logging::{LogLevel, RecordingSink};
use dashboard_backend::outbound::cache::InMemoryTtlCache;
use dashboard_backend::outbound::persistence::InMemoryPersistence;
use dashboard_backend::test_support::{
    CallCounts, CountingPersistence, MutableClock, recording_registry,
};
use rstest::{fixture, rstest};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Widget {
    label: String,
    colour: String,
}

impl Entity for Widget {}

fn widget(label: &str, colour: &str) -> Widget {
    Widget {
        label: label.to_owned(),
        colour: colour.to_owned(),
    }
}

type Store = CountingPersistence<InMemoryPersistence>;

struct Stack {
    repo: Arc<Repository<Widget, Store>>,
    counts: Arc<CallCounts>,
    clock: Arc<MutableClock>,
    sink: Arc<RecordingSink>,
}

impl Stack {
    async fn seed(&self, count: usize, colour: &str) {
        for index in 0..count {
            self.clock.advance_seconds(1);
            self.repo
                .create(widget(&format!("widget {index}"), colour))
                .await
                .expect("create widget");
        }
    }
}

#[fixture]
fn stack() -> Stack {
    let clock = Arc::new(MutableClock::new(Utc::now()));
    let (registry, sink) = recording_registry(clock.clone());
    let store = CountingPersistence::new(InMemoryPersistence::new());
    let counts = store.counts();
    let repo = Arc::new(Repository::new(
        RepositoryConfig::new("widgets", "label").with_cache_ttl(Duration::from_secs(30)),
        Arc::new(store),
        Arc::new(InMemoryTtlCache::new(clock.clone())),
        registry.get("widget-repository"),
        clock.clone(),
    ));
    Stack {
        repo,
        counts,
        clock,
        sink,
    }
}

#[rstest]
#[tokio::test]
async fn cached_reads_expire_after_the_ttl(stack: Stack) {
    let created = stack
        .repo
        .create(widget("gauge", "red"))
        .await
        .expect("create");
    let id = created.id.as_str();

    stack.repo.read(id).await.expect("first read");
    stack.repo.read(id).await.expect("cached read");
    assert_eq!(stack.counts.selects_by_id.load(Ordering::SeqCst), 1);

    stack.clock.advance_seconds(31);
    let refreshed = stack.repo.read(id).await.expect("expired read");
    assert_eq!(refreshed, Some(created));
    assert_eq!(stack.counts.selects_by_id.load(Ordering::SeqCst), 2);
}

#[rstest]
#[tokio::test]
async fn walking_every_page_visits_each_entity_once(stack: Stack) {
    stack.seed(23, "blue").await;
    let filters = Filters::new();

    let mut seen = Vec::new();
    let mut page = 1;
    loop {
        let result = stack
            .repo
            .find_with_pagination(&filters, page, 10)
            .await
            .expect("page");
        assert_eq!(result.pagination.total, 23);
        assert_eq!(result.pagination.total_pages, 3);
        assert_eq!(result.pagination.has_prev, page > 1);
        seen.extend(result.data.into_iter().map(|item| item.id));
        if !result.pagination.has_next {
            break;
        }
        page += 1;
    }

    assert_eq!(page, 3);
    assert_eq!(seen.len(), 23);
    let mut unique = seen.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), 23);
}

#[rstest]
#[tokio::test]
async fn writes_are_visible_to_the_next_filtered_query(stack: Stack) {
    stack.seed(2, "green").await;
    let green = Filters::new().with("colour", "green");
    assert_eq!(stack.repo.count(&green).await.expect("count"), 2);
    assert_eq!(stack.repo.find(&green).await.expect("find").len(), 2);

    let extra = stack
        .repo
        .create(widget("dial", "green"))
        .await
        .expect("create");
    assert_eq!(stack.repo.count(&green).await.expect("count"), 3);

    stack.repo.delete(extra.id.as_str()).await.expect("delete");
    assert_eq!(stack.repo.find(&green).await.expect("find").len(), 2);
    assert_eq!(stack.repo.read(extra.id.as_str()).await.expect("read"), None);
}

#[rstest]
#[tokio::test]
async fn aborted_transactions_report_the_failing_operation(stack: Stack) {
    let repo = &stack.repo;
    let err = repo
        .execute_transaction(vec![
            operation(move || async move { repo.create(widget("first", "red")).await }),
            operation(|| async { Err(Error::conflict("simulated clash")) }),
            operation(move || async move { repo.create(widget("never", "red")).await }),
        ])
        .await
        .expect_err("second operation aborts");

    assert_eq!(err.code(), ErrorCode::TransactionAborted);
    assert_eq!(err.failed_index(), Some(1));
    assert_eq!(stack.counts.inserts.load(Ordering::SeqCst), 1);
    assert!(!stack.sink.matching("transaction aborted").is_empty());
}

#[rstest]
#[tokio::test]
async fn batches_settle_every_operation(stack: Stack) {
    let repo = &stack.repo;
    let outcome = repo
        .execute_batch(vec![
            operation(move || async move {
                repo.create(widget("a", "red")).await.map(|w| w.data.label)
            }),
            operation(|| async { Err(Error::validation("rejected")) }),
            operation(move || async move {
                repo.create(widget("c", "red")).await.map(|w| w.data.label)
            }),
        ])
        .await;

    assert!(!outcome.success());
    assert_eq!(outcome.successful_results.len(), 2);
    assert_eq!(outcome.errors.len(), 1);
    assert_eq!(outcome.errors[0].index, 1);
    assert_eq!(
        repo.count(&Filters::new().with("colour", "red"))
            .await
            .expect("count"),
        2
    );
}

#[rstest]
#[tokio::test]
async fn repository_operations_emit_performance_entries(stack: Stack) {
    stack.seed(1, "amber").await;
    let entries = stack.sink.matching("performance: create");
    let entry = entries.first().expect("performance entry recorded");
    assert_eq!(entry.level, LogLevel::Info);
    assert_eq!(entry.logger, "widget-repository");
    assert!(entry.field("durationMs").is_some());
}

struct Counter {
    repo: Arc<Repository<Widget, Store>>,
}

#[async_trait]
impl Service for Counter {
    type Input = String;
    type Output = u64;

    fn name(&self) -> &str {
        "widget-counter"
    }

    async fn validate(&self, colour: &String) -> Result<(), Error> {
        if colour.trim().is_empty() {
            return Err(Error::validation("colour must not be blank"));
        }
        Ok(())
    }

    async fn process(&self, colour: String) -> Result<u64, Error> {
        self.repo.count(&Filters::new().with("colour", colour)).await
    }

    async fn run_step(&self, step: &WorkflowStep, _colour: &String) -> Result<(), Error> {
        match step.id.as_str() {
            "flaky" => Err(Error::internal("step unavailable")),
            _ => Ok(()),
        }
    }
}

#[rstest]
#[tokio::test]
async fn workflow_steps_report_without_gating_the_service(stack: Stack) {
    stack.seed(3, "teal").await;
    let (registry, sink) = recording_registry(stack.clock.clone());
    let runner = ServiceRunner::new(
        Arc::new(Counter {
            repo: stack.repo.clone(),
        }),
        registry.get("widget-runner"),
        stack.clock.clone(),
    );
    let config = WorkflowConfig::new(
        "count-teal",
        vec![
            WorkflowStep::new("prepare", "prepare"),
            WorkflowStep::new("flaky", "flaky step").with_retries(2),
        ],
    );

    let outcome = runner
        .execute_with_workflow("teal".to_owned(), config)
        .await
        .expect("valid workflow");

    assert!(outcome.success());
    assert_eq!(outcome.result.as_ref().ok(), Some(&3));
    let failed: Vec<_> = outcome.failed_steps().collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].retry_count, 2);

    let status = runner.get_workflow_status("count-teal").expect("tracked");
    assert_eq!(status.state, WorkflowState::Completed);
    assert_eq!(status.steps.len(), 2);
    assert!(!sink.matching("workflow count-teal").is_empty());

    let err = runner
        .execute("  ".to_owned())
        .await
        .expect_err("blank colour rejected");
    assert_eq!(err.code(), ErrorCode::InvalidRequest);
}
