//! Configuration file loader for the `.product-catalog/` directory.
//!
//! Only `config.toml` is read. Every key is optional; anything missing falls
//! back to the defaults of [`OrchestratorConfig`].

use crate::config::error::ConfigError;
use crate::config::error::ConfigResult;
use crate::config::layout::ProjectLayout;
use pc_protocol::config_models::OrchestratorConfig;
use pc_protocol::workflow_models::StepName;
use std::path::Path;

/// Loads the orchestrator configuration from `.product-catalog/config.toml`.
///
/// # Arguments
///
/// * `root` - Root directory containing the `.product-catalog/` folder
///
/// # Returns
///
/// The parsed configuration. If the directory or the file is missing, the
/// default configuration is returned rather than an error.
///
/// # Errors
///
/// Returns `ConfigError` if:
/// - The file exists but cannot be read
/// - The file is not valid TOML or has mistyped values
/// - A timeout is zero, `max_attempts` is zero, or `backoff_rate` is below 1.0
///
/// # Example
///
/// ```rust,no_run
/// use pc_core::config::loader::load_config;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = load_config(Path::new(".")).await?;
/// println!("Execution timeout: {}s", config.execution_timeout_secs);
/// # Ok(())
/// # }
/// ```
pub async fn load_config(root: &Path) -> ConfigResult<OrchestratorConfig> {
    let config_path = ProjectLayout::new(root).config_file();

    if !config_path.exists() {
        return Ok(OrchestratorConfig::default());
    }

    let content =
        std::fs::read_to_string(&config_path).map_err(|source| ConfigError::FileRead {
            path: config_path.clone(),
            source,
        })?;

    let config: OrchestratorConfig =
        toml::from_str(&content).map_err(|source| ConfigError::TomlParse {
            path: config_path.clone(),
            source,
        })?;

    validate(&config).map_err(|reason| ConfigError::InvalidConfig {
        path: config_path,
        reason,
    })?;

    Ok(config)
}

/// Checks the values that would make the orchestrator misbehave.
///
/// Returns a human-readable reason on the first problem found.
pub fn validate(config: &OrchestratorConfig) -> Result<(), String> {
    if config.execution_timeout_secs == 0 {
        return Err("execution_timeout_secs must be greater than 0".to_string());
    }

    for step in StepName::ALL {
        if config.step_timeouts.for_step(step).is_zero() {
            return Err(format!("step timeout for {step} must be greater than 0"));
        }
    }

    let retry = &config.retry;
    if retry.max_attempts == 0 {
        return Err("retry.max_attempts must be at least 1".to_string());
    }
    if retry.backoff_rate.is_nan() || retry.backoff_rate < 1.0 {
        return Err(format!(
            "retry.backoff_rate must be at least 1.0, got {}",
            retry.backoff_rate
        ));
    }
    if retry.initial_backoff_ms > retry.max_backoff_ms {
        return Err("retry.initial_backoff_ms must not exceed retry.max_backoff_ms".to_string());
    }

    Ok(())
}
