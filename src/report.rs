//! Diagnostics reporter
//!
//! A process-wide handle, constructed once at setup and injected into every
//! spec package. When a spec fails it calls [`Reporter::dump`] to capture
//! the state of the Keel namespace (pod inventory + logs) under the report
//! path. The reporter lives for the whole suite and has no teardown.

use std::path::{Path, PathBuf};

use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, ListParams, LogParams};
use kube::Client;
use tracing::{debug, warn};

use crate::Result;

/// Suite-wide diagnostics reporter
#[derive(Debug, Clone)]
pub struct Reporter {
    kubeconfig: Option<PathBuf>,
    report_path: PathBuf,
    namespace: String,
}

impl Reporter {
    /// Create a reporter bound to (kubeconfig, report path, namespace)
    pub fn new(
        kubeconfig: Option<PathBuf>,
        report_path: impl Into<PathBuf>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            kubeconfig,
            report_path: report_path.into(),
            namespace: namespace.into(),
        }
    }

    /// The directory failure artifacts are written into
    pub fn report_path(&self) -> &Path {
        &self.report_path
    }

    /// The namespace this reporter captures
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The kubeconfig the reporter was built from, if any
    pub fn kubeconfig(&self) -> Option<&Path> {
        self.kubeconfig.as_deref()
    }

    /// Path of one artifact file for the given failure
    fn artifact_path(&self, failure: &str, suffix: &str) -> PathBuf {
        self.report_path
            .join(format!("{}-{}", sanitize(failure), suffix))
    }

    /// Capture pod inventory and logs for a failed spec
    ///
    /// Best-effort: a pod whose logs cannot be fetched is noted and
    /// skipped, the dump itself only fails on I/O or list errors.
    pub async fn dump(&self, client: &Client, failure: &str) -> Result<()> {
        tokio::fs::create_dir_all(&self.report_path).await?;

        let pods: Api<Pod> = Api::namespaced(client.clone(), &self.namespace);
        let list = pods.list(&ListParams::default()).await?;

        let mut inventory = String::new();
        for pod in &list.items {
            let name = pod.metadata.name.as_deref().unwrap_or("<unnamed>");
            let phase = pod
                .status
                .as_ref()
                .and_then(|s| s.phase.as_deref())
                .unwrap_or("Unknown");
            inventory.push_str(&format!("{}\t{}\n", name, phase));

            match pods.logs(name, &LogParams::default()).await {
                Ok(logs) => {
                    let path = self.artifact_path(failure, &format!("{}.log", sanitize(name)));
                    tokio::fs::write(&path, logs).await?;
                }
                Err(e) => {
                    warn!(pod = %name, error = %e, "could not fetch pod logs");
                }
            }
        }

        let path = self.artifact_path(failure, "pods.txt");
        tokio::fs::write(&path, inventory).await?;
        debug!(failure = %failure, path = %self.report_path.display(), "diagnostics dumped");
        Ok(())
    }
}

/// Replace anything that would be awkward in a file name
fn sanitize(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
        .collect()
}
