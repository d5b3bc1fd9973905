use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::{DeleteParams, ListParams, Patch, PatchParams};
use kube::{Api, Client, Resource, ResourceExt};
use log::{debug, info, warn};
use serde_json::{json, Value};
use std::collections::BTreeMap;

use crate::models::cluster_installation::{ClusterInstallation, ClusterInstallationStatus};
use crate::utils::config::OperatorConfig;
use crate::utils::error::Error;
use crate::workflows::deployment::{image_name, production_image, LABEL_INSTALLATION};
use crate::workflows::workflow::{materialize, Materialized};

/// Maximum length of a Kubernetes volume name.
const MAX_VOLUME_NAME: usize = 63;

/// Volume name under which a certificate file of the CA secret is mounted.
pub fn certificate_volume_name(file: &str) -> String {
    let sanitized: String = file
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();

    let mut name = format!("cert-{}", sanitized.trim_matches('-'));
    name.truncate(MAX_VOLUME_NAME);
    name.trim_end_matches('-').to_string()
}

/// Maps every key of the certificate secret to the volume that mounts it.
///
/// Keys that sanitize to the same volume name get a numeric suffix, so every
/// file keeps a volume of its own.
pub fn certificate_map(secret: &Secret) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    for file in secret.data.iter().flat_map(|data| data.keys()) {
        let base = certificate_volume_name(file);
        let mut name = base.clone();
        let mut index = 1;
        while map.contains_key(&name) {
            index += 1;
            let suffix = format!("-{}", index);
            let mut prefix = base.clone();
            prefix.truncate(MAX_VOLUME_NAME - suffix.len());
            name = format!("{}{}", prefix.trim_end_matches('-'), suffix);
        }
        map.insert(name, file.clone());
    }
    map
}

/// Controller owner reference pointing at the installation.
///
/// Returns `None` for an installation the API server has not assigned a uid yet.
pub fn owner_reference(installation: &ClusterInstallation) -> Option<OwnerReference> {
    let uid = installation.meta().uid.clone()?;
    Some(OwnerReference {
        api_version: ClusterInstallation::api_version(&()).to_string(),
        kind: ClusterInstallation::kind(&()).to_string(),
        name: installation.name(),
        uid,
        controller: Some(true),
        block_owner_deletion: Some(true),
    })
}

/// Names of the deployments that are not the production one.
pub fn stale_deployments(deployments: &[Deployment], production_name: &str) -> Vec<String> {
    deployments
        .iter()
        .filter_map(|deployment| deployment.metadata.name.clone())
        .filter(|name| name != production_name)
        .collect()
}

pub struct ClusterInstallationController {
    client: Client,
    config: OperatorConfig,
}

impl ClusterInstallationController {
    pub fn new(client: Client, config: OperatorConfig) -> Self {
        ClusterInstallationController { client, config }
    }

    pub fn config(&self) -> &OperatorConfig {
        &self.config
    }

    /// Reads the certificate files listed in the installation's CA secret.
    ///
    /// Returns an empty map when the installation has no CA secret configured.
    pub async fn read_certificates(
        &self,
        installation: &ClusterInstallation,
        namespace: &str,
    ) -> Result<BTreeMap<String, String>, Error> {
        let secret_name = &installation.spec.ca_certificates.secret_name;
        if secret_name.is_empty() {
            return Ok(BTreeMap::new());
        }

        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let secret = api.get(secret_name).await?;

        Ok(certificate_map(&secret))
    }

    /// Materializes the installation and server-side applies its production Deployment.
    ///
    /// # Arguments
    /// - `installation` - The ClusterInstallation being reconciled. Owns the Deployment.
    /// - `namespace` - Namespace of the installation, where the Deployment is created too.
    pub async fn apply_deployment(
        &self,
        installation: &ClusterInstallation,
        namespace: &str,
    ) -> Result<Materialized, Error> {
        let cert_map = self.read_certificates(installation, namespace).await?;
        let mut materialized = materialize(installation, &cert_map);

        if let Some(diagnostic) = &materialized.diagnostic {
            warn!("ClusterInstallation {}/{}: {}", namespace, installation.name(), diagnostic);
        }

        let (cpu, memory) = materialized.requirements;
        debug!(
            "ClusterInstallation {}/{} requests {}m cpu and {}m memory",
            namespace,
            installation.name(),
            cpu,
            memory
        );

        let metadata = &mut materialized.deployment.metadata;
        metadata.namespace = Some(namespace.to_string());
        metadata.owner_references = owner_reference(installation).map(|owner| vec![owner]);

        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        let params = PatchParams::apply(&self.config.field_manager).force();
        api.patch(
            &materialized.production_name,
            &params,
            &Patch::Apply(&materialized.deployment),
        )
        .await?;

        info!(
            "Applied Deployment {}/{} for ClusterInstallation {}",
            namespace,
            materialized.production_name,
            installation.name()
        );

        self.delete_stale_deployments(installation, namespace, &materialized.production_name)
            .await?;

        Ok(materialized)
    }

    /// Deletes the Deployments of the installation other than the production one,
    /// left behind when blue/green is toggled or the production pointer moves.
    pub async fn delete_stale_deployments(
        &self,
        installation: &ClusterInstallation,
        namespace: &str,
        production_name: &str,
    ) -> Result<(), Error> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        let selector = format!("{}={}", LABEL_INSTALLATION, installation.name());
        let deployments = api.list(&ListParams::default().labels(&selector)).await?;

        for name in stale_deployments(&deployments.items, production_name) {
            api.delete(&name, &DeleteParams::default()).await?;
            info!(
                "Deleted Deployment {}/{} no longer serving ClusterInstallation {}",
                namespace,
                name,
                installation.name()
            );
        }

        Ok(())
    }

    /// Records what was applied in the status of the `ClusterInstallation`.
    pub async fn update_status(
        &self,
        name: &str,
        namespace: &str,
        materialized: &Materialized,
    ) -> Result<ClusterInstallation, Error> {
        let (_, version) = production_image(&materialized.spec);
        let status = ClusterInstallationStatus {
            state: "stable".to_string(),
            image: image_name(&materialized.spec),
            version,
            replicas: materialized.spec.replicas,
            production_name: materialized.production_name.clone(),
            message: materialized
                .diagnostic
                .as_ref()
                .map(|diagnostic| diagnostic.to_string()),
        };

        let api: Api<ClusterInstallation> = Api::namespaced(self.client.clone(), namespace);
        let patch: Value = json!({ "status": serde_json::to_value(&status)? });

        Ok(api
            .patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use k8s_openapi::api::apps::v1::Deployment;
    use k8s_openapi::api::core::v1::Secret;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use k8s_openapi::ByteString;

    use super::{certificate_map, certificate_volume_name, owner_reference, stale_deployments};
    use crate::models::cluster_installation::{ClusterInstallation, ClusterInstallationSpec};

    fn secret_with_keys(keys: &[&str]) -> Secret {
        let data = keys
            .iter()
            .map(|key| (key.to_string(), ByteString(b"pem".to_vec())))
            .collect();
        Secret {
            data: Some(data),
            ..Secret::default()
        }
    }

    fn named_deployment(name: &str) -> Deployment {
        Deployment {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..ObjectMeta::default()
            },
            ..Deployment::default()
        }
    }

    #[test]
    fn can_name_certificate_volumes() {
        assert_eq!(certificate_volume_name("ca-certificate.pem"), "cert-ca-certificate-pem");
        assert_eq!(certificate_volume_name("My_Root.CRT"), "cert-my-root-crt");
        assert_eq!(certificate_volume_name(&"x".repeat(100)).len(), 63);
    }

    #[test]
    fn can_map_secret_keys_to_volumes() {
        let map = certificate_map(&secret_with_keys(&["ca.pem", "intermediate.pem"]));

        assert_eq!(map.len(), 2);
        assert_eq!(map["cert-ca-pem"], "ca.pem");
        assert_eq!(map["cert-intermediate-pem"], "intermediate.pem");
        assert!(certificate_map(&Secret::default()).is_empty());
    }

    #[test]
    fn colliding_certificate_keys_get_their_own_volumes() {
        let map = certificate_map(&secret_with_keys(&["ca.pem", "ca_pem", "ca-pem-2"]));

        assert_eq!(map.len(), 3);
        assert_eq!(map["cert-ca-pem-2"], "ca-pem-2");
        assert_eq!(map["cert-ca-pem"], "ca.pem");
        assert_eq!(map["cert-ca-pem-3"], "ca_pem");
    }

    #[test]
    fn long_colliding_certificate_keys_stay_within_limit() {
        let dotted = format!("{}.pem", "x".repeat(80));
        let underscored = format!("{}_pem", "x".repeat(80));
        let map = certificate_map(&secret_with_keys(&[&dotted, &underscored]));

        assert_eq!(map.len(), 2);
        assert!(map.keys().all(|name| name.len() <= 63));
    }

    #[test]
    fn owner_reference_points_at_installation() {
        let mut installation = ClusterInstallation::new("foo", ClusterInstallationSpec::default());
        assert_eq!(owner_reference(&installation), None);

        installation.metadata.uid = Some("1234-abcd".to_string());
        let owner = owner_reference(&installation).unwrap();

        assert_eq!(owner.api_version, "mattermost.com/v1alpha1");
        assert_eq!(owner.kind, "ClusterInstallation");
        assert_eq!(owner.name, "foo");
        assert_eq!(owner.uid, "1234-abcd");
        assert_eq!(owner.controller, Some(true));
        assert_eq!(owner.block_owner_deletion, Some(true));
    }

    #[test]
    fn only_non_production_deployments_are_stale() {
        let deployments = vec![
            named_deployment("foo"),
            named_deployment("foo-blue"),
            named_deployment("foo-green"),
        ];

        assert_eq!(
            stale_deployments(&deployments, "foo-green"),
            vec!["foo".to_string(), "foo-blue".to_string()]
        );
        assert!(stale_deployments(&deployments[..1], "foo").is_empty());
    }
}
