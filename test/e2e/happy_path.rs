//! End-to-end happy path over the demo workspace.
//!
//! Boots the engine the way `workspace-engine` does in dev mode and checks
//! that the seeded target is released, dispatched to the test runner,
//! resolved and verified without any manual step.
//!
//! ## Running
//!
//! ```bash
//! cargo test -p ctrlplane-e2e --test happy_path
//! ```

use std::time::Duration;

use serde_json::json;
use tokio::sync::watch;

use ctrlplane_events::JobStatus;
use ctrlplane_id::WorkspaceId;
use ctrlplane_trace::Phase;
use ctrlplane_workspace_engine::demo;
use ctrlplane_workspace_engine::model::{ReleaseTarget, VerificationStatus};
use ctrlplane_workspace_engine::reconcile::TRACE_TOKEN_METADATA_KEY;
use ctrlplane_workspace_engine::{Config, WorkspaceEngine};

#[tokio::test(start_paused = true)]
async fn e2e_demo_workspace_deploys_and_verifies() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,ctrlplane_workspace_engine=debug".into()),
        )
        .with_test_writer()
        .try_init();

    let engine = WorkspaceEngine::new(Config {
        workspace_id: WorkspaceId::from("demo"),
        dev_mode: true,
        ..Config::default()
    })
    .unwrap();
    demo::seed(engine.store()).unwrap();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handles = engine.spawn(shutdown_rx).unwrap();
    assert_eq!(engine.boot().await, 1);

    // Test runner resolves after 5s; three readings 10s apart follow dispatch.
    tokio::time::sleep(Duration::from_secs(60)).await;

    let target = ReleaseTarget::new("api", "production", "cluster-1");
    let store = engine.store();

    let release = store.current_release(&target).expect("target was never released");
    assert_eq!(release.version.tag, "1.0.0");
    // Resource variables override deployment defaults.
    assert_eq!(release.variables["replicas"], json!(3));

    let jobs = store.jobs_for_release(&release.id());
    assert_eq!(jobs.len(), 1);
    let job = &jobs[0];
    assert_eq!(job.status, JobStatus::Successful);
    assert_eq!(job.message.as_deref(), Some("Deployed 1.0.0 to cluster-1"));
    let token = engine
        .token_signer()
        .validate(&job.metadata[TRACE_TOKEN_METADATA_KEY])
        .unwrap();
    assert_eq!(token.job_id, job.id);

    let verification = store.verification_by_release(&release.id()).unwrap();
    assert_eq!(verification.status(), VerificationStatus::Passed);
    assert_eq!(verification.metrics[0].measurements.len(), 3);

    let spans = engine.traces().trace(token.trace_id.as_str());
    for phase in [Phase::Planning, Phase::Eligibility, Phase::Execution] {
        assert!(
            spans.iter().any(|s| s.phase == phase),
            "dispatch trace has no {} span",
            phase.as_str()
        );
    }

    shutdown_tx.send(true).unwrap();
    for handle in handles {
        tokio::time::timeout(Duration::from_secs(10), handle)
            .await
            .expect("task did not stop")
            .unwrap();
    }
    engine.shutdown().await;
}
