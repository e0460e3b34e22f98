use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - API key is not empty
/// - Gateway timeout is not 0
/// - Solve mode and pool parameters (see `SolveMode::validate`, `PoolConfig::validate`)
/// - Task kind fields
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.api_key.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "api_key cannot be empty".to_string(),
        ));
    }

    if config.gateway.timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "gateway.timeout_secs cannot be 0".to_string(),
        ));
    }

    config
        .mode
        .validate()
        .map_err(|e| ConfigError::ValidationError(e.to_string()))?;

    config
        .pool
        .validate()
        .map_err(|e| ConfigError::ValidationError(e.to_string()))?;

    config
        .task
        .validate()
        .map_err(|e| ConfigError::ValidationError(format!("task: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GatewayConfig, LoggingConfig, MetricsConfig};
    use crate::pool::{PoolConfig, SolveMode};
    use crate::task::TaskKind;

    fn valid_config() -> Config {
        Config {
            api_key: "key".to_string(),
            gateway: GatewayConfig::default(),
            mode: SolveMode::Fixed {
                total: 10,
                multiplier: 1.0,
            },
            pool: PoolConfig::default(),
            task: TaskKind::RecaptchaV2 {
                site_key: "6Le".to_string(),
                page_url: "https://example.com".to_string(),
            },
            logging: LoggingConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(validate_config(&valid_config()).is_ok());
    }

    #[test]
    fn test_validate_empty_api_key_fails() {
        let mut config = valid_config();
        config.api_key = "   ".to_string();
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_validate_multiplier_below_one_fails() {
        let mut config = valid_config();
        config.mode = SolveMode::Fixed {
            total: 10,
            multiplier: 0.5,
        };
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("multiplier"));
    }

    #[test]
    fn test_validate_zero_threads_fails() {
        let mut config = valid_config();
        config.pool.threads = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_bad_task_fails() {
        let mut config = valid_config();
        config.task = TaskKind::RecaptchaV2 {
            site_key: "6Le".to_string(),
            page_url: "ftp://example.com".to_string(),
        };
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("task"));
    }
}
