use anyhow::{Context, Result};
use testpilot_core::{TestPilotConfig, TestPilotError};

/// Loads the layered configuration, then applies command-line overrides.
pub fn load(server: Option<String>) -> Result<TestPilotConfig> {
    let mut config = TestPilotConfig::load()
        .map_err(TestPilotError::from)
        .context("Failed to load configuration")?;

    if let Some(url) = server {
        config.server.base_url = url;
        config
            .validate()
            .map_err(TestPilotError::from)
            .context("Invalid --server value")?;
    }

    Ok(config)
}
