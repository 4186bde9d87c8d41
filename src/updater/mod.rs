//! Namespace-scoped configuration updaters
//!
//! An [`Updater`] applies Keel configuration custom resources into exactly
//! one namespace and can clean every resource it created, tracked by
//! identity so unrelated resources are untouched. The suite builds two
//! independent instances: one for the Keel namespace and one for the
//! auxiliary namespace used by cross-namespace validation specs. The two
//! never share mutable state.
//!
//! Resources are applied untyped ([`DynamicObject`] + server-side apply),
//! so the updater works for any of Keel's CRD kinds without compiling
//! against their schemas.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Namespace;
use kube::api::{Api, DeleteParams, DynamicObject, GroupVersionKind, Patch, PatchParams, PostParams};
use kube::core::ApiResource;
use kube::Client;
use tracing::debug;

use crate::error::{is_already_exists, is_not_found};
use crate::{Error, Result};

/// Field manager used for server-side apply
const FIELD_MANAGER: &str = "keel-e2e";

/// Identity of an applied resource, enough to find and delete it later
#[derive(Debug, Clone)]
pub struct AppliedResource {
    /// Group/version/kind of the resource
    pub gvk: GroupVersionKind,
    /// Resource name
    pub name: String,
}

impl PartialEq for AppliedResource {
    fn eq(&self, other: &Self) -> bool {
        self.gvk.group == other.gvk.group
            && self.gvk.version == other.gvk.version
            && self.gvk.kind == other.gvk.kind
            && self.name == other.name
    }
}

/// Per-updater record of everything it created
///
/// Insertion dedupes on identity (re-applying a resource is an update, not
/// a second creation); draining returns reverse creation order.
#[derive(Debug, Default)]
struct TrackedSet {
    items: Vec<AppliedResource>,
}

impl TrackedSet {
    fn insert(&mut self, item: AppliedResource) {
        if !self.items.contains(&item) {
            self.items.push(item);
        }
    }

    fn drain_reverse(&mut self) -> Vec<AppliedResource> {
        let mut items = std::mem::take(&mut self.items);
        items.reverse();
        items
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

/// A handle that applies/cleans configuration custom resources within one
/// namespace
#[async_trait]
pub trait Updater: Send {
    /// The namespace this updater is bound to
    fn namespace(&self) -> &str;

    /// Apply one custom-resource manifest (YAML) into the namespace
    async fn apply(&mut self, manifest: &str) -> Result<()>;

    /// Delete every resource this updater created, in reverse order
    ///
    /// Resources already gone are tolerated; any other deletion failure is
    /// collected and surfaced after all deletions were attempted.
    async fn clean(&mut self) -> Result<()>;
}

/// Kube-backed [`Updater`] for Keel configuration custom resources
pub struct CrUpdater {
    client: Client,
    namespace: String,
    applied: TrackedSet,
}

impl CrUpdater {
    /// Create an updater bound to the given namespace
    pub fn new(client: Client, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
            applied: TrackedSet::default(),
        }
    }

    /// Number of resources currently tracked
    pub fn tracked(&self) -> usize {
        self.applied.len()
    }

    fn api_for(&self, gvk: &GroupVersionKind) -> Api<DynamicObject> {
        let resource = ApiResource::from_gvk(gvk);
        Api::namespaced_with(self.client.clone(), &self.namespace, &resource)
    }
}

#[async_trait]
impl Updater for CrUpdater {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn apply(&mut self, manifest: &str) -> Result<()> {
        let mut obj: serde_json::Value = serde_yaml::from_str(manifest)
            .map_err(|e| Error::configuration(format!("invalid manifest YAML: {}", e)))?;

        let identity = manifest_identity(&obj)?;

        // The updater owns the namespace binding; whatever the manifest
        // says, the resource lands in this updater's namespace.
        obj["metadata"]["namespace"] = serde_json::Value::String(self.namespace.clone());

        let api = self.api_for(&identity.gvk);
        let params = PatchParams::apply(FIELD_MANAGER).force();
        api.patch(&identity.name, &params, &Patch::Apply(&obj))
            .await?;

        debug!(
            kind = %identity.gvk.kind,
            name = %identity.name,
            namespace = %self.namespace,
            "applied resource"
        );
        self.applied.insert(identity);
        Ok(())
    }

    async fn clean(&mut self) -> Result<()> {
        let mut failures = Vec::new();

        for item in self.applied.drain_reverse() {
            let api = self.api_for(&item.gvk);
            match api.delete(&item.name, &DeleteParams::default()).await {
                Ok(_) => debug!(kind = %item.gvk.kind, name = %item.name, "deleted resource"),
                Err(e) if is_not_found(&e) => {
                    debug!(kind = %item.gvk.kind, name = %item.name, "resource already gone")
                }
                Err(e) => failures.push(format!("{}/{}: {}", item.gvk.kind, item.name, e)),
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::teardown(format!(
                "failed to clean resources in {}: {}",
                self.namespace,
                failures.join(", ")
            )))
        }
    }
}

/// Extract the identity (GVK + name) from an untyped manifest
fn manifest_identity(obj: &serde_json::Value) -> Result<AppliedResource> {
    let api_version = obj
        .get("apiVersion")
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::configuration("manifest is missing apiVersion"))?;
    let kind = obj
        .get("kind")
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::configuration("manifest is missing kind"))?;
    let name = obj
        .pointer("/metadata/name")
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::configuration("manifest is missing metadata.name"))?;

    let (group, version) = match api_version.split_once('/') {
        Some((group, version)) => (group.to_string(), version.to_string()),
        None => (String::new(), api_version.to_string()),
    };

    Ok(AppliedResource {
        gvk: GroupVersionKind {
            group,
            version,
            kind: kind.to_string(),
        },
        name: name.to_string(),
    })
}

/// Create the namespace, treating "already exists" as success
///
/// The auxiliary namespace routinely survives a previous run; setup must
/// be idempotent against that. Any other creation error is fatal.
pub async fn ensure_namespace(client: &Client, name: &str) -> Result<()> {
    let namespaces: Api<Namespace> = Api::all(client.clone());
    let ns = Namespace {
        metadata: kube::api::ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        ..Default::default()
    };

    match namespaces.create(&PostParams::default(), &ns).await {
        Ok(_) => {
            debug!(namespace = %name, "namespace created");
            Ok(())
        }
        Err(e) => tolerate_existing(name, e),
    }
}

/// Delete the namespace, treating "not found" as success
pub async fn delete_namespace(client: &Client, name: &str) -> Result<()> {
    let namespaces: Api<Namespace> = Api::all(client.clone());
    match namespaces.delete(name, &DeleteParams::default()).await {
        Ok(_) => {
            debug!(namespace = %name, "namespace deleted");
            Ok(())
        }
        Err(e) => tolerate_missing(name, e),
    }
}

/// Creation tolerance: a namespace that survived a previous run is success
fn tolerate_existing(name: &str, err: kube::Error) -> Result<()> {
    if is_already_exists(&err) {
        debug!(namespace = %name, "namespace already exists");
        Ok(())
    } else {
        Err(err.into())
    }
}

/// Deletion tolerance: a namespace that is already gone is success
fn tolerate_missing(name: &str, err: kube::Error) -> Result<()> {
    if is_not_found(&err) {
        debug!(namespace = %name, "namespace already gone");
        Ok(())
    } else {
        Err(Error::teardown(format!(
            "failed to delete namespace {}: {}",
            name, err
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ErrorResponse;

    fn api_error(code: u16, reason: &str) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: format!("{} ({})", reason, code),
            reason: reason.to_string(),
            code,
        })
    }

    fn identity(kind: &str, name: &str) -> AppliedResource {
        AppliedResource {
            gvk: GroupVersionKind {
                group: "keel.io".to_string(),
                version: "v1beta1".to_string(),
                kind: kind.to_string(),
            },
            name: name.to_string(),
        }
    }

    #[test]
    fn tracked_set_dedupes_on_identity() {
        let mut set = TrackedSet::default();
        set.insert(identity("IPAddressPool", "pool-a"));
        set.insert(identity("IPAddressPool", "pool-a"));
        set.insert(identity("BGPAdvertisement", "adv-a"));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn tracked_set_drains_in_reverse_creation_order() {
        let mut set = TrackedSet::default();
        set.insert(identity("IPAddressPool", "pool-a"));
        set.insert(identity("BGPAdvertisement", "adv-a"));

        let drained = set.drain_reverse();
        assert_eq!(drained[0].name, "adv-a");
        assert_eq!(drained[1].name, "pool-a");
        assert_eq!(set.len(), 0);
    }

    #[test]
    fn manifest_identity_parses_grouped_and_core_api_versions() {
        let obj = serde_json::json!({
            "apiVersion": "keel.io/v1beta1",
            "kind": "IPAddressPool",
            "metadata": { "name": "pool-a" },
        });
        let id = manifest_identity(&obj).unwrap();
        assert_eq!(id.gvk.group, "keel.io");
        assert_eq!(id.gvk.version, "v1beta1");
        assert_eq!(id.gvk.kind, "IPAddressPool");
        assert_eq!(id.name, "pool-a");

        let core = serde_json::json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": { "name": "cm" },
        });
        let id = manifest_identity(&core).unwrap();
        assert_eq!(id.gvk.group, "");
        assert_eq!(id.gvk.version, "v1");
    }

    #[test]
    fn manifest_identity_rejects_incomplete_manifests() {
        let missing_name = serde_json::json!({
            "apiVersion": "keel.io/v1beta1",
            "kind": "IPAddressPool",
            "metadata": {},
        });
        assert!(matches!(
            manifest_identity(&missing_name),
            Err(Error::Configuration(_))
        ));

        let missing_kind = serde_json::json!({
            "apiVersion": "keel.io/v1beta1",
            "metadata": { "name": "pool-a" },
        });
        assert!(manifest_identity(&missing_kind).is_err());
    }

    /// Story: setup runs against a namespace that survived a previous run
    ///
    /// Creating it again answers 409; that must read as success so running
    /// setup twice never fails. Any other creation error stays fatal.
    #[test]
    fn story_namespace_creation_tolerates_a_survivor() {
        tolerate_existing("keel-system-other", api_error(409, "AlreadyExists")).unwrap();

        let denied = tolerate_existing("keel-system-other", api_error(403, "Forbidden"));
        assert!(matches!(denied, Err(Error::Kube(_))));
    }

    /// Story: teardown deletes a namespace that is already gone
    ///
    /// The 404 reads as success, which is what keeps a second teardown
    /// pass green; a real API failure surfaces as a teardown error naming
    /// the namespace.
    #[test]
    fn story_namespace_deletion_tolerates_an_absentee() {
        tolerate_missing("keel-system-other", api_error(404, "NotFound")).unwrap();

        match tolerate_missing("keel-system-other", api_error(500, "InternalError")) {
            Err(Error::Teardown(msg)) => assert!(msg.contains("keel-system-other")),
            other => panic!("expected teardown error, got {:?}", other),
        }
    }
}
