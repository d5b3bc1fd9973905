use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, EnvVarSource, KeyToPath, PodSpec, PodTemplateSpec,
    SecretKeySelector, SecretVolumeSource, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use log::warn;
use std::collections::BTreeMap;

use crate::models::cluster_installation::ClusterInstallationSpec;
use crate::utils::merge::{merge_env_vars, set_probes, APP_PORT};
use crate::workflows::production::production_deployment;
use crate::workflows::resolve::ResolvedSpec;

pub const CONTAINER_NAME: &str = "mattermost";
pub const METRICS_PORT: i32 = 8067;
pub const LICENSE_VOLUME: &str = "mattermost-license";
pub const LICENSE_MOUNT_PATH: &str = "/mattermost-license";

pub const LABEL_APP: &str = "app";
pub const LABEL_INSTALLATION: &str = "v1alpha1.mattermost.com/installation";
pub const LABEL_RESOURCE: &str = "v1alpha1.mattermost.com/resource";

/// Labels that identify the pods of one deployment of an installation.
pub fn selector_labels(installation: &str, deployment_name: &str) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(LABEL_APP.to_string(), "mattermost".to_string());
    labels.insert(LABEL_INSTALLATION.to_string(), installation.to_string());
    labels.insert(LABEL_RESOURCE.to_string(), deployment_name.to_string());
    labels
}

fn env_value(name: &str, value: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.to_string()),
        ..EnvVar::default()
    }
}

fn env_from_secret(name: &str, secret: &str, key: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value_from: Some(EnvVarSource {
            secret_key_ref: Some(SecretKeySelector {
                name: Some(secret.to_string()),
                key: key.to_string(),
                ..SecretKeySelector::default()
            }),
            ..EnvVarSource::default()
        }),
        ..EnvVar::default()
    }
}

/// Secret holding the database connection string of an installation.
pub fn database_secret_name(installation: &str, spec: &ClusterInstallationSpec) -> String {
    if spec.database.is_external() {
        spec.database.secret.clone()
    } else {
        format!("{}-mysql", installation)
    }
}

/// Secret holding the object store credentials of an installation.
pub fn minio_secret_name(installation: &str, spec: &ClusterInstallationSpec) -> String {
    if spec.minio.secret.is_empty() {
        format!("{}-minio", installation)
    } else {
        spec.minio.secret.clone()
    }
}

/// Environment the operator sets on every app server, before user overrides.
pub fn builtin_env(installation: &str, spec: &ClusterInstallationSpec) -> Vec<EnvVar> {
    let minio_secret = minio_secret_name(installation, spec);
    let (endpoint, bucket, ssl) = if spec.minio.is_external() {
        let bucket = if spec.minio.external_bucket.is_empty() {
            installation.to_string()
        } else {
            spec.minio.external_bucket.clone()
        };
        (spec.minio.external_url.clone(), bucket, "true")
    } else {
        (
            format!("{}-minio:9000", installation),
            installation.to_string(),
            "false",
        )
    };

    let mut env = vec![
        env_from_secret(
            "MM_CONFIG",
            &database_secret_name(installation, spec),
            "DB_CONNECTION_STRING",
        ),
        env_value("MM_FILESETTINGS_DRIVERNAME", "amazons3"),
        env_from_secret("MM_FILESETTINGS_AMAZONS3ACCESSKEYID", &minio_secret, "accesskey"),
        env_from_secret("MM_FILESETTINGS_AMAZONS3SECRETACCESSKEY", &minio_secret, "secretkey"),
        env_value("MM_FILESETTINGS_AMAZONS3BUCKET", &bucket),
        env_value("MM_FILESETTINGS_AMAZONS3ENDPOINT", &endpoint),
        env_value("MM_FILESETTINGS_AMAZONS3SSL", ssl),
    ];

    if !spec.ingress_name.is_empty() {
        let scheme = if spec.use_ingress_tls { "https" } else { "http" };
        env.push(env_value(
            "MM_SERVICESETTINGS_SITEURL",
            &format!("{}://{}", scheme, spec.ingress_name),
        ));
    }

    env.extend(vec![
        env_value("MM_PLUGINSETTINGS_ENABLEUPLOADS", "true"),
        env_value("MM_METRICSSETTINGS_ENABLE", "true"),
        env_value("MM_METRICSSETTINGS_LISTENADDRESS", &format!(":{}", METRICS_PORT)),
        env_value("MM_CLUSTERSETTINGS_ENABLE", "true"),
        env_value("MM_CLUSTERSETTINGS_CLUSTERNAME", "production"),
        env_value("MM_INSTALL_TYPE", "kubernetes-operator"),
    ]);

    if !spec.mattermost_license_secret.is_empty() {
        env.push(env_value(
            "MM_SERVICESETTINGS_LICENSEFILELOCATION",
            &format!("{}/license", LICENSE_MOUNT_PATH),
        ));
    }

    let elastic = &spec.elastic_search;
    if !elastic.host.is_empty() {
        env.extend(vec![
            env_value("MM_ELASTICSEARCHSETTINGS_ENABLEINDEXING", "true"),
            env_value("MM_ELASTICSEARCHSETTINGS_ENABLESEARCHING", "true"),
            env_value("MM_ELASTICSEARCHSETTINGS_CONNECTIONURL", &elastic.host),
            env_value("MM_ELASTICSEARCHSETTINGS_USERNAME", &elastic.user_name),
            env_value("MM_ELASTICSEARCHSETTINGS_PASSWORD", &elastic.password),
        ]);
    }

    env
}

/// Image and version the app servers run; blue/green picks the production variant.
///
/// Fields the variant leaves empty fall back to the installation's own image and version.
pub fn production_image(spec: &ClusterInstallationSpec) -> (String, String) {
    match production_deployment(&spec.blue_green) {
        Some(variant) => {
            if variant.image.is_empty() || variant.version.is_empty() {
                warn!(
                    "blue/green deployment {:?} leaves its image or version empty, using {}",
                    variant.name,
                    spec.get_image_name()
                );
            }
            let image = if variant.image.is_empty() { &spec.image } else { &variant.image };
            let version = if variant.version.is_empty() { &spec.version } else { &variant.version };
            (image.clone(), version.clone())
        }
        None => (spec.image.clone(), spec.version.clone()),
    }
}

/// Image reference of the app servers, see `production_image`.
pub fn image_name(spec: &ClusterInstallationSpec) -> String {
    let (image, version) = production_image(spec);
    format!("{}:{}", image, version)
}

fn secret_file_volume(name: &str, secret: &str, file: &str) -> Volume {
    Volume {
        name: name.to_string(),
        secret: Some(SecretVolumeSource {
            secret_name: Some(secret.to_string()),
            items: Some(vec![KeyToPath {
                key: file.to_string(),
                path: file.to_string(),
                ..KeyToPath::default()
            }]),
            ..SecretVolumeSource::default()
        }),
        ..Volume::default()
    }
}

/// One volume and one read-only mount per certificate file.
///
/// # Arguments
/// - `secret` - Secret holding the certificates.
/// - `path` - Directory the files show up in inside the container.
/// - `cert_map` - Volume name to file name (the secret key).
pub fn certificate_volumes(
    secret: &str,
    path: &str,
    cert_map: &BTreeMap<String, String>,
) -> (Vec<Volume>, Vec<VolumeMount>) {
    let directory = path.trim_end_matches('/');

    cert_map
        .iter()
        .map(|(volume_name, file)| {
            let volume = secret_file_volume(volume_name, secret, file);
            let mount = VolumeMount {
                name: volume_name.clone(),
                mount_path: format!("{}/{}", directory, file),
                sub_path: Some(file.clone()),
                read_only: Some(true),
                ..VolumeMount::default()
            };
            (volume, mount)
        })
        .unzip()
}

fn non_empty<T>(items: Vec<T>) -> Option<Vec<T>> {
    if items.is_empty() {
        None
    } else {
        Some(items)
    }
}

/// Generates the Deployment running the production app servers of an installation.
///
/// # Arguments
/// - `installation` - Name of the ClusterInstallation resource.
/// - `resolved` - The installation spec with sizing resolved.
/// - `production_name` - Name of the deployment, see `production_name`.
/// - `cert_map` - Certificate volume names to the secret keys they expose.
pub fn generate_deployment(
    installation: &str,
    resolved: &ResolvedSpec,
    production_name: &str,
    cert_map: &BTreeMap<String, String>,
) -> Deployment {
    let selector = selector_labels(installation, production_name);

    let mut pod_labels = resolved.resource_labels.clone();
    pod_labels.extend(selector.clone());

    let env = merge_env_vars(&builtin_env(installation, resolved), &resolved.mattermost_env);
    let (liveness, readiness) = set_probes(&resolved.liveness_probe, &resolved.readiness_probe);

    let (mut volumes, mut volume_mounts) = certificate_volumes(
        &resolved.ca_certificates.secret_name,
        &resolved.ca_certificates.path,
        cert_map,
    );

    if !resolved.mattermost_license_secret.is_empty() {
        volumes.push(secret_file_volume(
            LICENSE_VOLUME,
            &resolved.mattermost_license_secret,
            "license",
        ));
        volume_mounts.push(VolumeMount {
            name: LICENSE_VOLUME.to_string(),
            mount_path: LICENSE_MOUNT_PATH.to_string(),
            read_only: Some(true),
            ..VolumeMount::default()
        });
    }

    let container = Container {
        name: CONTAINER_NAME.to_string(),
        image: Some(image_name(resolved)),
        image_pull_policy: Some("IfNotPresent".to_string()),
        ports: Some(vec![
            ContainerPort {
                name: Some("app".to_string()),
                container_port: APP_PORT,
                ..ContainerPort::default()
            },
            ContainerPort {
                name: Some("metrics".to_string()),
                container_port: METRICS_PORT,
                ..ContainerPort::default()
            },
        ]),
        env: Some(env),
        liveness_probe: Some(liveness),
        readiness_probe: Some(readiness),
        resources: Some(resolved.resources.clone()),
        volume_mounts: non_empty(volume_mounts),
        ..Container::default()
    };

    let mut labels = resolved.resource_labels.clone();
    labels.extend(selector.clone());

    Deployment {
        metadata: ObjectMeta {
            name: Some(production_name.to_string()),
            labels: Some(labels),
            ..ObjectMeta::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(resolved.replicas),
            selector: LabelSelector {
                match_labels: Some(selector),
                ..LabelSelector::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(pod_labels),
                    ..ObjectMeta::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container],
                    volumes: non_empty(volumes),
                    node_selector: resolved.node_selector.clone(),
                    affinity: resolved.affinity.clone(),
                    ..PodSpec::default()
                }),
            },
            ..DeploymentSpec::default()
        }),
        ..Deployment::default()
    }
}
