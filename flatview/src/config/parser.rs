use super::types::DashboardConfig;
use crate::error::Result;
use std::path::Path;

/// Parse a dashboard YAML file into a DashboardConfig
pub fn parse_config(path: &Path) -> Result<DashboardConfig> {
    let content = std::fs::read_to_string(path)?;
    parse_config_str(&content)
}

/// Parse a dashboard YAML string into a DashboardConfig.
/// Every configured profile is validated up front.
pub fn parse_config_str(content: &str) -> Result<DashboardConfig> {
    let config: DashboardConfig = serde_yaml::from_str(content)?;
    for profile in config.profiles.values() {
        profile.validate()?;
    }
    Ok(config)
}
