//! End-to-end tests against a live cluster
//!
//! These tests need a Kubernetes cluster (kind works), a reachable docker
//! daemon, and `KUBECONFIG` pointing at the cluster. They are ignored by
//! default:
//!
//! ```bash
//! export KUBECONFIG=~/.kube/config
//! export KEEL_E2E_IPV4_SERVICE_RANGE=192.168.10.0/24
//! export KEEL_E2E_IPV6_SERVICE_RANGE=fc00:f853:ccd:e799::/64
//! export KEEL_E2E_NODE_NICS=eth0
//! export KEEL_E2E_LOCAL_NICS=eth0
//! cargo test --test e2e -- --ignored
//! ```
//!
//! The smoke test drives the full lifecycle: peers come up on the docker
//! networks, the context is published, a trivial spec runs against it, and
//! teardown removes everything it created.

use std::sync::Arc;

use anyhow::ensure;
use async_trait::async_trait;
use tracing_subscriber::EnvFilter;

use keel_e2e::config::SuiteConfig;
use keel_e2e::context::SuiteContext;
use keel_e2e::peers::DockerRuntime;
use keel_e2e::suite::{KubeCluster, RunStatus, SpecRunner, Suite};
use keel_e2e::Result;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_test_writer()
        .try_init();
}

/// Minimal spec runner: checks the published environment is usable, then
/// exercises the apply/clean path with a plain ConfigMap.
struct SmokeRunner;

#[async_trait]
impl SpecRunner for SmokeRunner {
    async fn run(&self, ctx: Arc<SuiteContext>) -> Result<RunStatus> {
        assert!(!ctx.peers.is_empty(), "no peers were published");
        for peer in ctx.peers.iter() {
            assert!(
                peer.address.is_some() || ctx.skip_docker,
                "peer {} has no address",
                peer.name
            );
        }

        let manifest = r#"
apiVersion: v1
kind: ConfigMap
metadata:
  name: keel-e2e-smoke
data:
  marker: "smoke"
"#;
        {
            let mut updater = ctx.updater.lock().await;
            updater.apply(manifest).await?;
            updater.clean().await?;
        }

        // The aux updater must be an independent handle in its own
        // namespace.
        let aux_ns = ctx.updater_other_ns.lock().await.namespace().to_string();
        let primary_ns = ctx.updater.lock().await.namespace().to_string();
        assert_ne!(aux_ns, primary_ns);

        Ok(RunStatus::Passed)
    }
}

/// Story: the default topology stands up, runs a spec, and tears down
/// without leaving peers behind.
#[tokio::test]
#[ignore = "requires a cluster and docker - run with: cargo test --test e2e -- --ignored"]
async fn smoke_full_lifecycle() -> anyhow::Result<()> {
    init_tracing();

    let config = SuiteConfig::from_env();
    let cluster = KubeCluster::connect().await?;
    let runtime = DockerRuntime::new();

    let mut suite = Suite::new(config, cluster, runtime);
    let status = suite.run(&SmokeRunner).await?;

    ensure!(status == RunStatus::Passed);
    ensure!(suite.peers().is_empty(), "teardown left peers registered");
    Ok(())
}

/// Story: a second teardown pass after a completed run is a no-op that
/// still succeeds.
#[tokio::test]
#[ignore = "requires a cluster and docker - run with: cargo test --test e2e -- --ignored"]
async fn teardown_is_idempotent_against_the_real_backends() -> anyhow::Result<()> {
    init_tracing();

    let config = SuiteConfig::from_env();
    let cluster = KubeCluster::connect().await?;
    let runtime = DockerRuntime::new();

    let mut suite = Suite::new(config, cluster, runtime);
    suite.run(&SmokeRunner).await?;

    let report = suite.run_teardown_steps().await;
    report.result()?;
    Ok(())
}
