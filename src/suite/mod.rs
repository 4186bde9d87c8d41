//! Suite lifecycle state machine
//!
//! One setup, one run, one teardown. The [`Suite`] controller sequences
//! validation, peer provisioning, updater construction, publication, and
//! spec execution, then tears everything down in strict reverse order.
//!
//! Error-tolerance rules:
//! - setup errors abort the suite immediately; the suite never runs
//!   against a partially provisioned environment, and partial resources
//!   are intentionally left in place for inspection
//! - teardown is best-effort and exhaustive: each step runs regardless of
//!   earlier failures, "already gone" counts as success, and hard failures
//!   are aggregated at the end
//!
//! # Phases
//!
//! `Idle → Validating → Provisioning → Publishing → Running → TearingDown
//! → Done`, with `Failed` reachable from any non-terminal phase. Teardown
//! runs after `Running`, and after a `Failed` that was reached once
//! provisioning had completed; a failure *during* provisioning skips it so
//! a human can inspect the partial state.

use std::sync::Arc;

use async_trait::async_trait;
use kube::Client;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::config::SuiteConfig;
use crate::context::{SharedUpdater, SuiteContext};
use crate::peers::{self, PeerRuntime, PeerSet};
use crate::report::Reporter;
use crate::retry::RetryConfig;
use crate::topology::Topology;
use crate::updater::{self, CrUpdater, Updater};
use crate::{aux_namespace, Error, Result};

/// Lifecycle phase of the suite
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Nothing has happened yet
    Idle,
    /// Checking configuration inputs; no resources exist
    Validating,
    /// Creating peers, namespaces, and updaters
    Provisioning,
    /// Assembling the published context
    Publishing,
    /// Spec execution is in the collaborator's hands
    Running,
    /// Reversing provisioning, best-effort
    TearingDown,
    /// Lifecycle completed
    Done,
    /// Terminal failure
    Failed,
}

/// Outcome of the external spec run
///
/// The controller does not inspect individual spec outcomes; it only needs
/// enough to determine the suite's exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Every spec passed
    Passed,
    /// Some specs failed
    Failed {
        /// Number of failed specs, as reported by the runner
        failures: usize,
    },
}

/// The external spec-execution collaborator
///
/// Receives the published context by shared reference; must not construct
/// or destroy peers, updaters, or namespaces itself.
#[async_trait]
pub trait SpecRunner: Send + Sync {
    /// Run the test specs against the published environment
    async fn run(&self, ctx: Arc<SuiteContext>) -> Result<RunStatus>;
}

/// Cluster operations the lifecycle needs
///
/// Thin seam over the Kubernetes client so the lifecycle is testable
/// without a cluster; [`KubeCluster`] is the real implementation.
#[async_trait]
pub trait ClusterAccess: Send + Sync {
    /// Build a config updater bound to the given namespace
    async fn updater(&self, namespace: &str) -> Result<Box<dyn Updater + Send>>;

    /// Create the namespace; "already exists" is success
    async fn ensure_namespace(&self, name: &str) -> Result<()>;

    /// Delete the namespace; "not found" is success
    async fn delete_namespace(&self, name: &str) -> Result<()>;
}

/// [`ClusterAccess`] backed by a live Kubernetes client
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    /// Connect using the ambient client configuration (KUBECONFIG)
    pub async fn connect() -> Result<Self> {
        let client = Client::try_default().await?;
        Ok(Self { client })
    }

    /// Wrap an existing client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ClusterAccess for KubeCluster {
    async fn updater(&self, namespace: &str) -> Result<Box<dyn Updater + Send>> {
        Ok(Box::new(CrUpdater::new(self.client.clone(), namespace)))
    }

    async fn ensure_namespace(&self, name: &str) -> Result<()> {
        updater::ensure_namespace(&self.client, name).await
    }

    async fn delete_namespace(&self, name: &str) -> Result<()> {
        updater::delete_namespace(&self.client, name).await
    }
}

/// Result of one teardown step
#[derive(Debug)]
pub enum StepOutcome {
    /// The step did its work
    Completed,
    /// The step had nothing to do (target already absent)
    Tolerated(String),
    /// The step hit a non-tolerable error
    Failed(Error),
}

/// What happened in one teardown pass
///
/// All steps run in their fixed order no matter what; hard failures are
/// collected here and aggregated by [`TeardownReport::result`].
#[derive(Debug, Default)]
pub struct TeardownReport {
    /// (step name, outcome) in execution order
    pub steps: Vec<(&'static str, StepOutcome)>,
}

impl TeardownReport {
    fn record(&mut self, name: &'static str, outcome: StepOutcome) {
        match &outcome {
            StepOutcome::Completed => info!(step = name, "teardown step completed"),
            StepOutcome::Tolerated(why) => info!(step = name, why = %why, "teardown step tolerated"),
            StepOutcome::Failed(e) => error!(step = name, error = %e, "teardown step failed"),
        }
        self.steps.push((name, outcome));
    }

    /// Fold the pass into a single result; `Err` lists the failed steps
    pub fn result(&self) -> Result<()> {
        let failed: Vec<String> = self
            .steps
            .iter()
            .filter_map(|(name, outcome)| match outcome {
                StepOutcome::Failed(e) => Some(format!("{} ({})", name, e)),
                _ => None,
            })
            .collect();

        if failed.is_empty() {
            Ok(())
        } else {
            Err(Error::teardown(format!(
                "{} of {} teardown steps failed: {}",
                failed.len(),
                self.steps.len(),
                failed.join(", ")
            )))
        }
    }
}

/// The suite lifecycle controller
///
/// Sole owner of the peer set and both updaters; everything the spec
/// packages see goes through the published [`SuiteContext`].
pub struct Suite<C, R> {
    config: SuiteConfig,
    cluster: C,
    runtime: R,
    phase: Phase,
    peers: PeerSet,
    probe_retry: RetryConfig,
    updater: Option<SharedUpdater>,
    updater_other_ns: Option<SharedUpdater>,
    provisioned: bool,
}

impl<C, R> Suite<C, R>
where
    C: ClusterAccess,
    R: PeerRuntime,
{
    /// Create a controller in the `Idle` phase
    pub fn new(config: SuiteConfig, cluster: C, runtime: R) -> Self {
        Self {
            config,
            cluster,
            runtime,
            phase: Phase::Idle,
            peers: PeerSet::new(),
            probe_retry: RetryConfig::default(),
            updater: None,
            updater_other_ns: None,
            provisioned: false,
        }
    }

    /// Override the retry schedule used for peer liveness probes
    pub fn with_probe_retry(mut self, config: RetryConfig) -> Self {
        self.probe_retry = config;
        self
    }

    /// Current lifecycle phase
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The peers currently registered with the controller
    pub fn peers(&self) -> &PeerSet {
        &self.peers
    }

    fn enter(&mut self, phase: Phase) {
        info!(from = ?self.phase, to = ?phase, "suite phase transition");
        self.phase = phase;
    }

    /// Drive the whole lifecycle: setup, spec run, teardown
    ///
    /// The returned status/error is the run phase's; a teardown failure is
    /// reported through logging but does not change an exit status the run
    /// phase already determined.
    pub async fn run<S>(&mut self, runner: &S) -> Result<RunStatus>
    where
        S: SpecRunner + ?Sized,
    {
        let outcome = self.setup_and_run(runner).await;

        if self.provisioned {
            self.enter(Phase::TearingDown);
            let report = self.run_teardown_steps().await;
            if let Err(e) = report.result() {
                // Surfaced, but the run's status stands.
                error!(error = %e, "teardown finished with failures");
            }
        } else {
            warn!("skipping teardown: provisioning did not complete");
        }

        match &outcome {
            Ok(_) => self.enter(Phase::Done),
            Err(_) => self.enter(Phase::Failed),
        }
        outcome
    }

    async fn setup_and_run<S>(&mut self, runner: &S) -> Result<RunStatus>
    where
        S: SpecRunner + ?Sized,
    {
        self.enter(Phase::Validating);
        self.config.validate()?;
        let topology = Topology::resolve(&self.config)?;
        info!(topology = ?topology, "topology resolved");

        self.enter(Phase::Provisioning);
        let (updater, updater_other_ns) = self.provision(&topology).await?;
        self.provisioned = true;

        self.enter(Phase::Publishing);
        let ctx = self.publish(updater, updater_other_ns);

        self.enter(Phase::Running);
        runner.run(ctx).await
    }

    /// Provision peers, then the primary updater, then the auxiliary
    /// namespace and its updater
    ///
    /// Returns the two updater handles for publication; the controller
    /// keeps its own clones for teardown.
    async fn provision(&mut self, topology: &Topology) -> Result<(SharedUpdater, SharedUpdater)> {
        peers::provision(&self.runtime, topology, &mut self.peers, &self.probe_retry).await?;

        let primary: SharedUpdater =
            Arc::new(Mutex::new(self.cluster.updater(&self.config.namespace).await?));
        self.updater = Some(primary.clone());

        let aux = aux_namespace(&self.config.namespace);
        self.cluster.ensure_namespace(&aux).await?;
        let other: SharedUpdater = Arc::new(Mutex::new(self.cluster.updater(&aux).await?));
        self.updater_other_ns = Some(other.clone());

        Ok((primary, other))
    }

    /// Assemble the published context; pure assignment, no validation
    fn publish(&self, updater: SharedUpdater, updater_other_ns: SharedUpdater) -> Arc<SuiteContext> {
        let reporter = Reporter::new(
            self.config.kubeconfig.clone(),
            self.config.report_path.clone(),
            self.config.namespace.clone(),
        );

        SuiteContext::publish(
            self.peers.clone(),
            updater,
            updater_other_ns,
            reporter,
            self.config.metrics_namespace.clone(),
            &self.config.node_nics,
            &self.config.local_nics,
            self.config.service_pod_port,
            self.config.skip_docker,
        )
    }

    /// One best-effort teardown pass over the fixed step list
    ///
    /// Safe to call again after a completed pass: every step tolerates its
    /// target already being gone.
    pub async fn run_teardown_steps(&mut self) -> TeardownReport {
        let mut report = TeardownReport::default();

        let outcome = match peers::teardown(&self.runtime, &mut self.peers, false).await {
            Ok(()) => StepOutcome::Completed,
            Err(e) => StepOutcome::Failed(e),
        };
        report.record("peers-default", outcome);

        if !self.config.native_mode {
            let outcome = match peers::teardown(&self.runtime, &mut self.peers, true).await {
                Ok(()) => StepOutcome::Completed,
                Err(e) => StepOutcome::Failed(e),
            };
            report.record("peers-vrf", outcome);
        }

        let outcome = match &self.updater {
            Some(updater) => match updater.lock().await.clean().await {
                Ok(()) => StepOutcome::Completed,
                Err(e) => StepOutcome::Failed(e),
            },
            None => StepOutcome::Tolerated("updater never constructed".to_string()),
        };
        report.record("clean-primary", outcome);

        let aux = aux_namespace(&self.config.namespace);
        let outcome = match self.cluster.delete_namespace(&aux).await {
            Ok(()) => StepOutcome::Completed,
            Err(e) => StepOutcome::Failed(e),
        };
        report.record("delete-aux-namespace", outcome);

        let outcome = match &self.updater_other_ns {
            Some(updater) => match updater.lock().await.clean().await {
                Ok(()) => StepOutcome::Completed,
                Err(e) => StepOutcome::Failed(e),
            },
            None => StepOutcome::Tolerated("updater never constructed".to_string()),
        };
        report.record("clean-aux", outcome);

        report
    }
}
