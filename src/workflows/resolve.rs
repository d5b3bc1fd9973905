use k8s_openapi::api::core::v1::ResourceRequirements;
use log::debug;
use std::ops::Deref;

use crate::models::cluster_installation::ClusterInstallationSpec;
use crate::models::size::{ClusterInstallationSize, ComponentSize, SizeTier, DEFAULT_SIZE};

/// Non-fatal problem found while resolving a spec. The resolution it comes
/// with is still complete and usable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Diagnostic {
    #[error("unknown size {0:?}, using the default size")]
    UnknownSizeTier(String),
}

/// A ClusterInstallationSpec whose app, object store and database all carry
/// replicas and resource requests. Only `resolve` creates one.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSpec {
    spec: ClusterInstallationSpec,
}

impl ResolvedSpec {
    /// The effective sizing of all three components.
    pub fn sizing(&self) -> ClusterInstallationSize {
        ClusterInstallationSize {
            app: ComponentSize {
                replicas: self.spec.replicas,
                resources: self.spec.resources.clone(),
            },
            minio: ComponentSize {
                replicas: self.spec.minio.replicas,
                resources: self.spec.minio.resources.clone(),
            },
            database: ComponentSize {
                replicas: self.spec.database.replicas,
                resources: self.spec.database.resources.clone(),
            },
        }
    }

    pub fn into_inner(self) -> ClusterInstallationSpec {
        self.spec
    }
}

impl Deref for ResolvedSpec {
    type Target = ClusterInstallationSpec;

    fn deref(&self) -> &Self::Target {
        &self.spec
    }
}

/// Outcome of `resolve`: always a resolved spec, sometimes with a diagnostic.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub spec: ResolvedSpec,
    pub diagnostic: Option<Diagnostic>,
}

fn has_requests(resources: &ResourceRequirements) -> bool {
    resources
        .requests
        .as_ref()
        .map_or(false, |requests| !requests.is_empty())
}

fn resolve_component(replicas: &mut i32, resources: &mut ResourceRequirements, default: &ComponentSize) {
    if *replicas <= 0 || !has_requests(resources) {
        *replicas = default.replicas;
        *resources = default.resources.clone();
    }
}

/// Sizes every component that the spec does not fully override.
///
/// A component keeps its own replicas and resources only when it sets both a
/// positive replica count and non-empty requests; otherwise both come from the
/// tier named by `spec.size`. An empty size silently means the default tier; an
/// unknown one also falls back to the default tier but is reported as
/// `Diagnostic::UnknownSizeTier`.
pub fn resolve(spec: &ClusterInstallationSpec) -> Resolution {
    let (tier, diagnostic) = if spec.size.is_empty() {
        (DEFAULT_SIZE, None)
    } else {
        match spec.size.parse::<SizeTier>() {
            Ok(tier) => (tier, None),
            Err(_) => (
                DEFAULT_SIZE,
                Some(Diagnostic::UnknownSizeTier(spec.size.clone())),
            ),
        }
    };

    debug!("resolving installation with {} sizing", tier);
    let sizing = tier.sizing();

    let mut resolved = spec.clone();
    resolve_component(&mut resolved.replicas, &mut resolved.resources, &sizing.app);
    resolve_component(
        &mut resolved.minio.replicas,
        &mut resolved.minio.resources,
        &sizing.minio,
    );
    resolve_component(
        &mut resolved.database.replicas,
        &mut resolved.database.resources,
        &sizing.database,
    );

    Resolution {
        spec: ResolvedSpec { spec: resolved },
        diagnostic,
    }
}
