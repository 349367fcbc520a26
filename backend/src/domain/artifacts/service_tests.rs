//! Artifact service behaviour over the in-memory adapters.

use std::sync::atomic::Ordering;
use std::time::Duration;

use chrono::Utc;
use mockable::Clock;
use rstest::{fixture, rstest};

use super::*;
use crate::domain::ErrorCode;
use crate::domain::repository::RepositoryConfig;
use crate::domain::service::{ServiceRunner, WorkflowConfig};
use crate::logging::{LoggerConfig, LoggerRegistry};
use crate::outbound::cache::InMemoryTtlCache;
use crate::outbound::persistence::InMemoryPersistence;
use crate::test_support::{CallCounts, CountingPersistence, MutableClock};

type Store = CountingPersistence<InMemoryPersistence>;

struct Harness {
    runner: ServiceRunner<ArtifactService<Store>>,
    counts: Arc<CallCounts>,
    clock: Arc<MutableClock>,
}

#[fixture]
fn harness() -> Harness {
    let clock = Arc::new(MutableClock::new(Utc::now()));
    let dyn_clock: Arc<dyn Clock> = clock.clone();
    let registry = LoggerRegistry::with_clock(LoggerConfig::default(), dyn_clock.clone());
    let store = CountingPersistence::new(InMemoryPersistence::new());
    let counts = store.counts();
    let repository = Arc::new(Repository::new(
        RepositoryConfig::new(super::super::ARTIFACT_COLLECTION, "name"),
        Arc::new(store),
        Arc::new(InMemoryTtlCache::new(dyn_clock.clone())),
        registry.get("artifact-repository"),
        dyn_clock.clone(),
    ));
    let cache = ServiceCache::new(
        "artifacts",
        Arc::new(InMemoryTtlCache::new(dyn_clock.clone())),
        Duration::from_secs(60),
        registry.get("artifact-cache"),
    );
    let service = ArtifactService::new(repository, cache, registry.get("artifact-service"));
    Harness {
        runner: ServiceRunner::new(Arc::new(service), registry.get("artifact-runner"), dyn_clock),
        counts,
        clock,
    }
}

fn draft(name: &str) -> NewArtifact {
    NewArtifact {
        name: name.into(),
        kind: "report".into(),
        owner: "u1".into(),
        description: None,
        tags: vec![" Finance ".into(), "finance".into(), "Q3".into()],
    }
}

async fn create(h: &Harness, name: &str) -> Stored<Artifact> {
    h.clock.advance_seconds(1);
    match h
        .runner
        .execute(ArtifactCommand::Create(draft(name)))
        .await
        .expect("create")
    {
        ArtifactOutput::Artifact(artifact) => artifact,
        other => panic!("unexpected output {other:?}"),
    }
}

async fn change_status(h: &Harness, id: &str, status: ArtifactStatus) -> Result<ArtifactOutput, Error> {
    h.runner
        .execute(ArtifactCommand::ChangeStatus {
            id: id.to_owned(),
            status,
        })
        .await
}

#[rstest]
#[tokio::test]
async fn create_normalises_and_starts_as_draft(harness: Harness) {
    let created = create(&harness, "  Quarterly report ").await;
    assert_eq!(created.data.name, "Quarterly report");
    assert_eq!(created.data.status, ArtifactStatus::Draft);
    assert_eq!(created.data.tags, vec!["finance", "q3"]);
}

#[rstest]
#[tokio::test]
async fn get_is_served_from_the_service_cache(harness: Harness) {
    let created = create(&harness, "cached").await;
    let get = || ArtifactCommand::Get {
        id: created.id.to_string(),
    };
    harness.runner.execute(get()).await.expect("first get");
    harness.runner.execute(get()).await.expect("second get");
    assert_eq!(harness.counts.selects_by_id.load(Ordering::SeqCst), 1);
}

#[rstest]
#[tokio::test]
async fn get_of_unknown_id_is_not_found(harness: Harness) {
    let err = harness
        .runner
        .execute(ArtifactCommand::Get { id: "nope".into() })
        .await
        .expect_err("missing");
    assert_eq!(err.code(), ErrorCode::NotFound);
}

#[rstest]
#[tokio::test]
async fn listing_reflects_writes(harness: Harness) {
    for n in 0..3 {
        create(&harness, &format!("a{n}")).await;
    }
    let list = || ArtifactCommand::List {
        filters: Filters::new().with("status", "draft"),
        page: 1,
        limit: 2,
    };
    let ArtifactOutput::Page(page) = harness.runner.execute(list()).await.expect("list") else {
        panic!("expected a page");
    };
    assert_eq!(page.pagination.total, 3);
    assert_eq!(page.data.len(), 2);
    assert!(page.pagination.has_next);

    create(&harness, "a3").await;
    let ArtifactOutput::Page(page) = harness.runner.execute(list()).await.expect("list") else {
        panic!("expected a page");
    };
    assert_eq!(page.pagination.total, 4);
}

#[rstest]
#[tokio::test]
async fn status_changes_follow_the_transition_table(harness: Harness) {
    let created = create(&harness, "lifecycle").await;
    let id = created.id.as_str();

    let err = change_status(&harness, id, ArtifactStatus::Approved)
        .await
        .expect_err("draft cannot be approved");
    assert_eq!(err.code(), ErrorCode::InvalidRequest);

    let ArtifactOutput::Artifact(active) = change_status(&harness, id, ArtifactStatus::Active)
        .await
        .expect("draft to active")
    else {
        panic!("expected an artifact");
    };
    assert_eq!(active.data.status, ArtifactStatus::Active);
    assert_eq!(active.version, 2);
}

#[rstest]
#[case("status", serde_json::json!("active"))]
#[case("owner", serde_json::json!("u2"))]
#[case("colour", serde_json::json!("red"))]
#[tokio::test]
async fn updates_reject_guarded_and_unknown_fields(
    harness: Harness,
    #[case] field: &str,
    #[case] value: serde_json::Value,
) {
    let created = create(&harness, "guarded").await;
    let mut patch = Patch::new();
    patch.insert(field.to_owned(), value);
    let err = harness
        .runner
        .execute(ArtifactCommand::Update {
            id: created.id.to_string(),
            patch,
        })
        .await
        .expect_err("guarded field");
    assert_eq!(err.code(), ErrorCode::InvalidRequest);
    assert_eq!(harness.counts.updates.load(Ordering::SeqCst), 0);
}

#[rstest]
#[tokio::test]
async fn search_and_delete(harness: Harness) {
    let keep = create(&harness, "Revenue report").await;
    let doomed = create(&harness, "Roadmap").await;

    let ArtifactOutput::Matches(hits) = harness
        .runner
        .execute(ArtifactCommand::Search {
            query: "report".into(),
            filters: Filters::new(),
        })
        .await
        .expect("search")
    else {
        panic!("expected matches");
    };
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, keep.id);

    let deleted = harness
        .runner
        .execute(ArtifactCommand::Delete {
            id: doomed.id.to_string(),
        })
        .await
        .expect("delete");
    assert_eq!(
        deleted,
        ArtifactOutput::Deleted {
            id: doomed.id.to_string()
        }
    );
    let err = harness
        .runner
        .execute(ArtifactCommand::Delete {
            id: doomed.id.to_string(),
        })
        .await
        .expect_err("already deleted");
    assert_eq!(err.code(), ErrorCode::NotFound);
}

#[rstest]
#[tokio::test]
async fn workflow_steps_audit_without_gating(harness: Harness) {
    let created = create(&harness, "audited").await;
    let config = WorkflowConfig::new(
        "publish-1",
        vec![
            WorkflowStep::new("audit", "audit"),
            WorkflowStep::new("mystery", "unknown step"),
            WorkflowStep::new("ensure-exists", "ensure exists"),
        ],
    );
    let outcome = harness
        .runner
        .execute_with_workflow(
            ArtifactCommand::ChangeStatus {
                id: created.id.to_string(),
                status: ArtifactStatus::InReview,
            },
            config,
        )
        .await
        .expect("valid config");

    let flags: Vec<bool> = outcome.steps.iter().map(|step| step.success).collect();
    assert_eq!(flags, vec![true, false, true]);
    assert!(outcome.success());
}
