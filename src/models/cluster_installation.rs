use k8s_openapi::api::core::v1::{Affinity, EnvVar, Probe, ResourceRequirements};
use kube_derive::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// ClusterInstallation is the desired state of a Mattermost cluster: the
/// application servers plus the object store and database they depend on.
#[derive(CustomResource, Serialize, Deserialize, Debug, Default, PartialEq, Clone, JsonSchema)]
#[kube(
    group = "mattermost.com",
    version = "v1alpha1",
    kind = "ClusterInstallation",
    plural = "clusterinstallations",
    shortname = "mm",
    namespaced,
    status = "ClusterInstallationStatus"
)]
#[serde(rename_all = "camelCase", default)]
pub struct ClusterInstallationSpec {
    /// Mattermost docker image.
    pub image: String,

    /// Mattermost docker image version (tag).
    pub version: String,

    /// Size tier of the installation, in number of users: `100users`, `1000users`,
    /// `5000users`, `10000users` or `250000users`. Defaults to `5000users`.
    /// Explicit replicas or resources on a component take precedence over the tier.
    pub size: String,

    /// Number of Mattermost app servers. Zero means "taken from size".
    pub replicas: i32,

    /// Resource requests and limits of the app server pods. No requests means "taken from size".
    pub resources: ResourceRequirements,

    /// Host name used for the ingress rules and the site URL.
    pub ingress_name: String,

    #[serde(rename = "useIngressTLS")]
    pub use_ingress_tls: bool,

    /// Secret that contains the Mattermost license.
    pub mattermost_license_secret: String,

    /// Node labels the app server pods must be scheduled on. Absent is not the same as empty.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_selector: Option<BTreeMap<String, String>>,

    /// Scheduling constraints of the app server pods.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub affinity: Option<Affinity>,

    /// Labels added to every generated resource.
    pub resource_labels: BTreeMap<String, String>,

    pub minio: Minio,

    pub database: Database,

    pub elastic_search: ElasticSearch,

    pub blue_green: BlueGreen,

    /// Extra environment variables for the app server pods. Entries override
    /// the operator defaults of the same name.
    pub mattermost_env: Vec<EnvVar>,

    /// Custom liveness probe fields, merged over the operator default.
    pub liveness_probe: Probe,

    /// Custom readiness probe fields, merged over the operator default.
    pub readiness_probe: Probe,

    /// Secret holding PEM certificates; each key is mounted as its own file under `path`.
    #[serde(rename = "certificates")]
    pub ca_certificates: CaCertificates,
}

/// Object store (MinIO) backing the Mattermost file storage.
#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Clone, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct Minio {
    pub storage_size: String,
    /// Zero means "taken from size".
    pub replicas: i32,
    pub resources: ResourceRequirements,
    /// Secret with `accesskey` and `secretkey`. Required together with an external URL.
    pub secret: String,
    #[serde(rename = "externalURL")]
    pub external_url: String,
    pub external_bucket: String,
}

impl Minio {
    pub fn is_external(&self) -> bool {
        !self.external_url.is_empty()
    }
}

#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Clone, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct Database {
    #[serde(rename = "type")]
    pub kind: String,
    pub storage_size: String,
    /// Zero means "taken from size".
    pub replicas: i32,
    pub resources: ResourceRequirements,
    /// Secret with a `DB_CONNECTION_STRING` key. Set for an external database.
    pub secret: String,
}

impl Database {
    pub fn is_external(&self) -> bool {
        !self.secret.is_empty()
    }
}

#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Clone, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct ElasticSearch {
    pub host: String,
    pub user_name: String,
    pub password: String,
}

#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Clone, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct CaCertificates {
    pub secret_name: String,
    pub path: String,
}

/// Which of the two blue/green deployments serves production traffic.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Copy, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ProductionDeployment {
    Blue,
    Green,
}

impl Default for ProductionDeployment {
    fn default() -> Self {
        ProductionDeployment::Blue
    }
}

#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Clone, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct BlueGreen {
    pub production_deployment: ProductionDeployment,
    pub enable: bool,
    pub blue: AppDeployment,
    pub green: AppDeployment,
}

/// One blue/green variant of the application.
#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Clone, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct AppDeployment {
    pub name: String,
    pub image: String,
    pub version: String,
    pub ingress_name: String,
}

impl AppDeployment {
    pub fn get_deployment_image_name(&self) -> String {
        format!("{}:{}", self.image, self.version)
    }
}

/// Most recent state the operator observed for a ClusterInstallation.
#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Clone, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct ClusterInstallationStatus {
    pub state: String,
    pub image: String,
    pub version: String,
    pub replicas: i32,
    /// Name of the deployment currently serving production traffic.
    pub production_name: String,
    /// Last non-fatal problem found while resolving the spec.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ClusterInstallationSpec {
    pub fn get_image_name(&self) -> String {
        format!("{}:{}", self.image, self.version)
    }
}
