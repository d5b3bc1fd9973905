use k8s_openapi::api::apps::v1::Deployment;
use kube::ResourceExt;
use std::collections::BTreeMap;

use crate::models::cluster_installation::ClusterInstallation;
use crate::workflows::deployment::generate_deployment;
use crate::workflows::production::production_name;
use crate::workflows::resolve::{resolve, Diagnostic, ResolvedSpec};

/// Everything the operator derives from one ClusterInstallation.
#[derive(Debug, Clone, PartialEq)]
pub struct Materialized {
    pub spec: ResolvedSpec,
    pub diagnostic: Option<Diagnostic>,
    pub production_name: String,
    /// Requested `(cpu, memory)` in milli-units, counting only the components
    /// the installation runs itself.
    pub requirements: (i64, i64),
    pub deployment: Deployment,
}

/// Resolves an installation and builds its production deployment.
///
/// # Arguments
/// - `installation` - The ClusterInstallation resource as read from the cluster.
/// - `cert_map` - Certificate volume names to secret keys, see `certificate_volumes`.
pub fn materialize(
    installation: &ClusterInstallation,
    cert_map: &BTreeMap<String, String>,
) -> Materialized {
    let name = installation.name();
    let resolution = resolve(&installation.spec);
    let spec = resolution.spec;

    let requirements = spec.sizing().calculate_resource_milli_requirements(
        !spec.database.is_external(),
        !spec.minio.is_external(),
    );

    let production_name = production_name(&spec.blue_green, &name);
    let deployment = generate_deployment(&name, &spec, &production_name, cert_map);

    Materialized {
        spec,
        diagnostic: resolution.diagnostic,
        production_name,
        requirements,
        deployment,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::materialize;
    use crate::models::cluster_installation::{ClusterInstallation, ClusterInstallationSpec};
    use crate::models::size::DEFAULT_SIZE;
    use crate::workflows::resolve::Diagnostic;

    fn installation(spec: ClusterInstallationSpec) -> ClusterInstallation {
        ClusterInstallation::new("foo", spec)
    }

    #[test]
    fn materializes_default_sized_installation() {
        let materialized = materialize(
            &installation(ClusterInstallationSpec {
                size: "junk".to_string(),
                ..ClusterInstallationSpec::default()
            }),
            &BTreeMap::new(),
        );

        assert_eq!(
            materialized.diagnostic,
            Some(Diagnostic::UnknownSizeTier("junk".to_string()))
        );
        assert_eq!(materialized.production_name, "foo");
        assert_eq!(
            materialized.requirements,
            DEFAULT_SIZE
                .sizing()
                .calculate_resource_milli_requirements(true, true)
        );
        assert_eq!(
            materialized.deployment.metadata.name,
            Some("foo".to_string())
        );
    }

    #[test]
    fn external_services_are_not_counted() {
        let mut spec = ClusterInstallationSpec::default();
        spec.database.secret = "external-db".to_string();
        spec.minio.external_url = "s3.amazonaws.com".to_string();

        let materialized = materialize(&installation(spec), &BTreeMap::new());

        assert_eq!(
            materialized.requirements,
            DEFAULT_SIZE
                .sizing()
                .calculate_resource_milli_requirements(false, false)
        );
    }
}
