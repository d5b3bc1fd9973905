use crate::models::cluster_installation::{AppDeployment, BlueGreen, ProductionDeployment};

/// The blue/green variant serving production, or `None` when blue/green is off.
pub fn production_deployment(blue_green: &BlueGreen) -> Option<&AppDeployment> {
    if !blue_green.enable {
        return None;
    }

    Some(match blue_green.production_deployment {
        ProductionDeployment::Blue => &blue_green.blue,
        ProductionDeployment::Green => &blue_green.green,
    })
}

/// Name of the deployment serving production traffic: the selected variant's
/// name with blue/green on, the installation's own name otherwise.
pub fn production_name(blue_green: &BlueGreen, owner_name: &str) -> String {
    production_deployment(blue_green)
        .map_or(owner_name, |deployment| deployment.name.as_str())
        .to_string()
}
