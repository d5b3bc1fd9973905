use k8s_openapi::api::core::v1::{EnvVar, HTTPGetAction, Probe};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

pub const HEALTH_CHECK_PATH: &str = "/api/v4/system/ping";
pub const APP_PORT: i32 = 8065;

/// Merges `overrides` into `original`.
///
/// Entries of `original` keep their position; when an override carries the same
/// name its value replaces the original one in place. Overrides with new names
/// are appended in the order they were given. Names are expected to be unique
/// within each list.
pub fn merge_env_vars(original: &[EnvVar], overrides: &[EnvVar]) -> Vec<EnvVar> {
    let mut consumed = vec![false; overrides.len()];

    let mut merged: Vec<EnvVar> = original
        .iter()
        .map(|env| {
            match overrides.iter().position(|candidate| candidate.name == env.name) {
                Some(index) => {
                    consumed[index] = true;
                    overrides[index].clone()
                }
                None => env.clone(),
            }
        })
        .collect();

    merged.extend(
        overrides
            .iter()
            .zip(consumed)
            .filter(|(_, consumed)| !consumed)
            .map(|(env, _)| env.clone()),
    );

    merged
}

fn health_check() -> HTTPGetAction {
    HTTPGetAction {
        path: Some(HEALTH_CHECK_PATH.to_string()),
        port: IntOrString::Int(APP_PORT),
        ..HTTPGetAction::default()
    }
}

/// Liveness probe applied when the installation does not customise it.
pub fn default_liveness_probe() -> Probe {
    Probe {
        http_get: Some(health_check()),
        initial_delay_seconds: Some(10),
        period_seconds: Some(10),
        failure_threshold: Some(3),
        ..Probe::default()
    }
}

/// Readiness probe applied when the installation does not customise it.
pub fn default_readiness_probe() -> Probe {
    Probe {
        http_get: Some(health_check()),
        initial_delay_seconds: Some(10),
        period_seconds: Some(5),
        failure_threshold: Some(6),
        ..Probe::default()
    }
}

fn pick(custom: Option<i32>, default: Option<i32>) -> Option<i32> {
    match custom {
        Some(value) if value != 0 => Some(value),
        _ => default,
    }
}

/// Overlays the set fields of `custom` onto `default`.
///
/// Numeric fields win when they are non-zero. The check mechanism is taken
/// as a whole: if `custom` names any of exec, httpGet or tcpSocket, the default
/// mechanism is dropped entirely.
pub fn merge_probe(default: &Probe, custom: &Probe) -> Probe {
    let mut probe = default.clone();

    if custom.exec.is_some() || custom.http_get.is_some() || custom.tcp_socket.is_some() {
        probe.exec = custom.exec.clone();
        probe.http_get = custom.http_get.clone();
        probe.tcp_socket = custom.tcp_socket.clone();
    }

    probe.initial_delay_seconds = pick(custom.initial_delay_seconds, default.initial_delay_seconds);
    probe.period_seconds = pick(custom.period_seconds, default.period_seconds);
    probe.failure_threshold = pick(custom.failure_threshold, default.failure_threshold);
    probe.success_threshold = pick(custom.success_threshold, default.success_threshold);
    probe.timeout_seconds = pick(custom.timeout_seconds, default.timeout_seconds);

    probe
}

/// Returns the effective `(liveness, readiness)` probes for the application container.
pub fn set_probes(custom_liveness: &Probe, custom_readiness: &Probe) -> (Probe, Probe) {
    (
        merge_probe(&default_liveness_probe(), custom_liveness),
        merge_probe(&default_readiness_probe(), custom_readiness),
    )
}
