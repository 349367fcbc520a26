//! Drive a scripted artifact session through the in-memory stack.
//!
//! Every request runs through the full controller pipeline; envelopes and
//! workflow reports are emitted as structured `tracing` events.
#![cfg_attr(not(any(test, doctest)), deny(clippy::unwrap_used))]
#![cfg_attr(not(any(test, doctest)), deny(clippy::expect_used))]

use std::ffi::OsString;
use std::sync::Arc;

use clap::Parser;
use color_eyre::eyre::{Result, WrapErr, eyre};
use dashboard_backend::FrameworkSettings;
use dashboard_backend::domain::artifacts::{
    ARTIFACT_COLLECTION, ArtifactCommand, ArtifactService,
};
use dashboard_backend::domain::repository::{Repository, RepositoryConfig};
use dashboard_backend::domain::service::{ServiceCache, WorkflowConfig, WorkflowStep};
use dashboard_backend::domain::{Filters, ServiceRunner};
use dashboard_backend::inbound::artifacts::ArtifactController;
use dashboard_backend::inbound::controller::{
    CORRELATION_ID_HEADER, Method, Request, RequestPipeline, RequestUser, Response,
};
use dashboard_backend::logging::LoggerRegistry;
use dashboard_backend::outbound::cache::InMemoryTtlCache;
use dashboard_backend::outbound::persistence::InMemoryPersistence;
use mockable::{Clock, DefaultClock};
use ortho_config::OrthoConfig;
use serde_json::json;
use tokio::runtime::Builder;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

type Runner = ServiceRunner<ArtifactService<InMemoryPersistence>>;
type Pipeline = RequestPipeline<ArtifactController<InMemoryPersistence>>;

/// `dashboard-demo` command arguments.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "dashboard-demo",
    about = "Run a scripted artifact session through the in-memory framework stack",
    version
)]
struct CliArgs {
    /// Number of artifacts to create before listing.
    #[arg(long, default_value_t = 5)]
    artifacts: u32,
    /// Page size used by the listing request.
    #[arg(long, default_value_t = 2)]
    page_size: u64,
}

fn main() -> Result<()> {
    color_eyre::install()?;
    if let Err(e) = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .try_init()
    {
        warn!(error = %e, "tracing init failed");
    }

    let args = CliArgs::parse();
    let settings = FrameworkSettings::load_from_iter([OsString::from("dashboard-demo")])
        .map_err(|err| eyre!("load framework settings: {err}"))?;
    LoggerRegistry::global().configure_all(
        settings
            .logger_config()
            .wrap_err("build logger configuration")?,
    );

    let runtime = Builder::new_current_thread()
        .enable_all()
        .build()
        .wrap_err("create Tokio runtime")?;
    runtime.block_on(run(&args, &settings))
}

fn build(settings: &FrameworkSettings) -> (Arc<Runner>, Pipeline) {
    let clock: Arc<dyn Clock> = Arc::new(DefaultClock);
    let registry = LoggerRegistry::global();
    let repository = Arc::new(Repository::new(
        RepositoryConfig::new(ARTIFACT_COLLECTION, "name")
            .with_cache_ttl(settings.cache_ttl())
            .with_max_page_size(settings.max_page_size()),
        Arc::new(InMemoryPersistence::new()),
        Arc::new(InMemoryTtlCache::new(clock.clone())),
        registry.get("artifact-repository"),
        clock.clone(),
    ));
    let cache = ServiceCache::new(
        ARTIFACT_COLLECTION,
        Arc::new(InMemoryTtlCache::new(clock.clone())),
        settings.cache_ttl(),
        registry.get("artifact-cache"),
    );
    let service = ArtifactService::new(repository, cache, registry.get("artifact-service"));
    let runner = Arc::new(ServiceRunner::new(
        Arc::new(service),
        registry.get("artifact-runner"),
        clock.clone(),
    ));
    let pipeline = RequestPipeline::new(
        Arc::new(ArtifactController::new(runner.clone())),
        registry.get("artifact-controller"),
        clock,
    );
    (runner, pipeline)
}

fn editor(request: Request) -> Request {
    request
        .with_user(RequestUser::new("demo-editor").with_role("editor"))
        .with_header(CORRELATION_ID_HEADER, "dashboard-demo-session")
}

fn report(step: &str, response: &Response) {
    let envelope = serde_json::to_value(response).unwrap_or_default();
    info!(step, status = response.status_code, envelope = %envelope, "response");
}

async fn run(args: &CliArgs, settings: &FrameworkSettings) -> Result<()> {
    let (runner, pipeline) = build(settings);

    let mut ids = Vec::new();
    for index in 0..args.artifacts {
        let response = pipeline
            .handle(editor(Request::new(Method::Post, "/artifacts").with_body(
                json!({
                    "name": format!("Report {index}"),
                    "kind": "report",
                    "owner": "demo-editor",
                    "tags": ["Demo", "demo"],
                }),
            )))
            .await;
        report("create", &response);
        if let Some(id) = response.data.as_ref().and_then(|data| data["id"].as_str()) {
            ids.push(id.to_owned());
        }
    }

    let listing = pipeline
        .handle(editor(
            Request::new(Method::Get, "/artifacts")
                .with_query("page", "1")
                .with_query("limit", args.page_size.to_string()),
        ))
        .await;
    report("list", &listing);

    let Some(first) = ids.first().cloned() else {
        info!("no artifacts created; nothing more to do");
        return Ok(());
    };

    for status in ["in-review", "approved", "draft"] {
        let response = pipeline
            .handle(editor(
                Request::new(Method::Patch, format!("/artifacts/{first}"))
                    .with_param("id", first.clone())
                    .with_body(json!({ "status": status })),
            ))
            .await;
        report("change-status", &response);
    }

    let anonymous = pipeline
        .handle(
            Request::new(Method::Delete, format!("/artifacts/{first}"))
                .with_param("id", first.clone()),
        )
        .await;
    report("anonymous-delete", &anonymous);

    let workflow = WorkflowConfig::new(
        "demo-audit",
        vec![
            WorkflowStep::new("audit", "audit"),
            WorkflowStep::new("unknown", "unknown step").with_retries(1),
            WorkflowStep::new("validate", "validate"),
        ],
    );
    let outcome = runner
        .execute_with_workflow(
            ArtifactCommand::List {
                filters: Filters::new().with("kind", "report"),
                page: 1,
                limit: args.page_size,
            },
            workflow,
        )
        .await
        .wrap_err("run demo workflow")?;
    let failed: Vec<&str> = outcome
        .failed_steps()
        .map(|step| step.step_id.as_str())
        .collect();
    info!(
        workflow = %outcome.workflow_id,
        success = outcome.success(),
        failed_steps = ?failed,
        "workflow finished"
    );
    let status = runner
        .get_workflow_status("demo-audit")
        .wrap_err("read workflow status")?;
    info!(state = ?status.state, steps = status.steps.len(), "workflow status");
    Ok(())
}
