use k8s_openapi::api::core::v1::ResourceRequirements;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use log::warn;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::utils::error::Error;
use crate::utils::quantity::milli_value;

pub const RESOURCE_CPU: &str = "cpu";
pub const RESOURCE_MEMORY: &str = "memory";

/// Named capacity profile of an installation, in number of users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SizeTier {
    Users100,
    Users1000,
    Users5000,
    Users10000,
    Users250000,
}

/// Tier used when the installation does not name one, or names an unknown one.
pub const DEFAULT_SIZE: SizeTier = SizeTier::Users5000;

impl SizeTier {
    /// All tiers, smallest first.
    pub const ALL: [SizeTier; 5] = [
        SizeTier::Users100,
        SizeTier::Users1000,
        SizeTier::Users5000,
        SizeTier::Users10000,
        SizeTier::Users250000,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SizeTier::Users100 => "100users",
            SizeTier::Users1000 => "1000users",
            SizeTier::Users5000 => "5000users",
            SizeTier::Users10000 => "10000users",
            SizeTier::Users250000 => "250000users",
        }
    }

    /// Replica counts and resources of every component at this tier.
    pub fn sizing(&self) -> ClusterInstallationSize {
        match self {
            SizeTier::Users100 => ClusterInstallationSize {
                app: component(1, ("150m", "256Mi"), ("2", "4Gi")),
                minio: component(1, ("150m", "256Mi"), ("1", "2Gi")),
                database: component(1, ("250m", "512Mi"), ("1", "4Gi")),
            },
            SizeTier::Users1000 => ClusterInstallationSize {
                app: component(2, ("150m", "256Mi"), ("2", "4Gi")),
                minio: component(4, ("150m", "256Mi"), ("1", "2Gi")),
                database: component(2, ("250m", "512Mi"), ("1", "4Gi")),
            },
            SizeTier::Users5000 => ClusterInstallationSize {
                app: component(2, ("500m", "500Mi"), ("2", "4Gi")),
                minio: component(4, ("150m", "256Mi"), ("1", "2Gi")),
                database: component(2, ("500m", "1Gi"), ("2", "8Gi")),
            },
            SizeTier::Users10000 => ClusterInstallationSize {
                app: component(4, ("1", "1Gi"), ("4", "8Gi")),
                minio: component(4, ("250m", "512Mi"), ("1", "4Gi")),
                database: component(2, ("1", "2Gi"), ("4", "16Gi")),
            },
            SizeTier::Users250000 => ClusterInstallationSize {
                app: component(12, ("2", "4Gi"), ("4", "16Gi")),
                minio: component(4, ("500m", "1Gi"), ("2", "8Gi")),
                database: component(3, ("4", "16Gi"), ("8", "32Gi")),
            },
        }
    }
}

impl fmt::Display for SizeTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SizeTier {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        SizeTier::ALL
            .iter()
            .copied()
            .find(|tier| tier.as_str() == name)
            .ok_or_else(|| Error::UserInputError(format!("unknown size {:?}", name)))
    }
}

fn resource_list(cpu: &str, memory: &str) -> BTreeMap<String, Quantity> {
    let mut list = BTreeMap::new();
    list.insert(RESOURCE_CPU.to_string(), Quantity(cpu.to_string()));
    list.insert(RESOURCE_MEMORY.to_string(), Quantity(memory.to_string()));
    list
}

fn component(replicas: i32, requests: (&str, &str), limits: (&str, &str)) -> ComponentSize {
    ComponentSize {
        replicas,
        resources: ResourceRequirements {
            requests: Some(resource_list(requests.0, requests.1)),
            limits: Some(resource_list(limits.0, limits.1)),
        },
    }
}

/// Replicas and per-instance resources of one component.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComponentSize {
    pub replicas: i32,
    pub resources: ResourceRequirements,
}

impl ComponentSize {
    fn request_milli(&self, resource: &str) -> i64 {
        let request = self
            .resources
            .requests
            .as_ref()
            .and_then(|requests| requests.get(resource));

        let per_instance = match request.map(milli_value) {
            Some(Ok(value)) => value,
            Some(Err(err)) => {
                warn!("ignoring {} request: {}", resource, err);
                0
            }
            None => 0,
        };

        per_instance.saturating_mul(i64::from(self.replicas))
    }

    /// CPU request of all replicas, in millicores.
    pub fn cpu_milli(&self) -> i64 {
        self.request_milli(RESOURCE_CPU)
    }

    /// Memory request of all replicas, in milli-bytes.
    pub fn memory_milli(&self) -> i64 {
        self.request_milli(RESOURCE_MEMORY)
    }
}

/// Sizing of the three components of an installation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClusterInstallationSize {
    pub app: ComponentSize,
    pub minio: ComponentSize,
    pub database: ComponentSize,
}

impl ClusterInstallationSize {
    /// Looks up the sizing of a tier by its name.
    pub fn for_name(name: &str) -> Option<ClusterInstallationSize> {
        name.parse::<SizeTier>().ok().map(|tier| tier.sizing())
    }

    fn included(&self, include_database: bool, include_minio: bool) -> Vec<&ComponentSize> {
        let mut components = vec![&self.app];
        if include_database {
            components.push(&self.database);
        }
        if include_minio {
            components.push(&self.minio);
        }
        components
    }

    /// Total `(cpu, memory)` requested by the installation, in milli-units.
    ///
    /// The app servers are always counted; the database and object store only
    /// when the installation runs them itself.
    pub fn calculate_resource_milli_requirements(
        &self,
        include_database: bool,
        include_minio: bool,
    ) -> (i64, i64) {
        (
            self.calculate_cpu_milli_requirement(include_database, include_minio),
            self.calculate_memory_milli_requirement(include_database, include_minio),
        )
    }

    pub fn calculate_cpu_milli_requirement(&self, include_database: bool, include_minio: bool) -> i64 {
        self.included(include_database, include_minio)
            .iter()
            .fold(0i64, |total, component| total.saturating_add(component.cpu_milli()))
    }

    pub fn calculate_memory_milli_requirement(
        &self,
        include_database: bool,
        include_minio: bool,
    ) -> i64 {
        self.included(include_database, include_minio)
            .iter()
            .fold(0i64, |total, component| total.saturating_add(component.memory_milli()))
    }
}

#[cfg(test)]
mod tests {
    use k8s_openapi::api::core::v1::ResourceRequirements;

    use super::{resource_list, ClusterInstallationSize, ComponentSize, SizeTier, DEFAULT_SIZE};
    use crate::utils::quantity::milli_value;

    fn requests_only(replicas: i32, cpu: &str, memory: &str) -> ComponentSize {
        ComponentSize {
            replicas,
            resources: ResourceRequirements {
                requests: Some(resource_list(cpu, memory)),
                limits: None,
            },
        }
    }

    fn baseline() -> ClusterInstallationSize {
        ClusterInstallationSize {
            app: requests_only(3, "100m", "100k"),
            minio: requests_only(6, "100m", "100k"),
            database: requests_only(2, "100m", "100k"),
        }
    }

    #[test]
    fn can_calculate_baseline_requirements() {
        let size = baseline();

        assert_eq!(
            size.calculate_resource_milli_requirements(true, true),
            (1100, 1_100_000_000)
        );
        assert_eq!(
            size.calculate_resource_milli_requirements(false, true),
            (900, 900_000_000)
        );
        assert_eq!(
            size.calculate_resource_milli_requirements(true, false),
            (500, 500_000_000)
        );
        assert_eq!(
            size.calculate_resource_milli_requirements(false, false),
            (300, 300_000_000)
        );
    }

    #[test]
    fn can_calculate_updated_requirements() {
        let mut size = baseline();
        size.app = requests_only(10, "1", "100G");

        assert_eq!(
            size.calculate_resource_milli_requirements(false, false),
            (10_000, 1_000_000_000_000_000)
        );
    }

    #[test]
    fn malformed_requests_count_as_zero() {
        let mut size = baseline();
        size.minio = requests_only(6, "lots", "100k");

        assert_eq!(size.calculate_cpu_milli_requirement(true, true), 500);
        assert_eq!(size.calculate_memory_milli_requirement(true, true), 1_100_000_000);
    }

    #[test]
    fn all_valid_sizes_require_resources() {
        for tier in SizeTier::ALL.iter() {
            let size = tier.sizing();
            let (cpu, memory) = size.calculate_resource_milli_requirements(true, true);

            assert!(cpu > 0, "{} cpu", tier);
            assert!(memory > 0, "{} memory", tier);
            assert_eq!(cpu, size.calculate_cpu_milli_requirement(true, true));
            assert_eq!(memory, size.calculate_memory_milli_requirement(true, true));

            let expected_cpu: i64 = [&size.app, &size.minio, &size.database]
                .iter()
                .map(|c| c.cpu_milli())
                .sum();
            assert_eq!(cpu, expected_cpu, "{} cpu sum", tier);
        }
    }

    #[test]
    fn sizes_grow_with_user_count() {
        let request = |component: &ComponentSize, resource: &str| {
            milli_value(&component.resources.requests.as_ref().unwrap()[resource]).unwrap()
        };

        for pair in SizeTier::ALL.windows(2) {
            let (smaller, larger) = (pair[0].sizing(), pair[1].sizing());
            let components = [
                (&smaller.app, &larger.app),
                (&smaller.minio, &larger.minio),
                (&smaller.database, &larger.database),
            ];

            for &(small, large) in components.iter() {
                assert!(small.replicas <= large.replicas, "{} -> {}", pair[0], pair[1]);
                assert!(request(small, "cpu") <= request(large, "cpu"));
                assert!(request(small, "memory") <= request(large, "memory"));
            }
            assert!(
                smaller.calculate_resource_milli_requirements(true, true)
                    < larger.calculate_resource_milli_requirements(true, true)
            );
        }
    }

    #[test]
    fn can_look_up_sizes_by_name() {
        assert_eq!(
            ClusterInstallationSize::for_name("1000users"),
            Some(SizeTier::Users1000.sizing())
        );
        assert_eq!(ClusterInstallationSize::for_name("junk"), None);
        assert_eq!(ClusterInstallationSize::for_name(""), None);
        assert_eq!("250000users".parse::<SizeTier>().unwrap(), SizeTier::Users250000);
        assert_eq!(DEFAULT_SIZE.as_str(), "5000users");
    }
}
