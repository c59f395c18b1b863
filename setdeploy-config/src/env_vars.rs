use std::env;

use tracing::debug;

use crate::ConfigError;

/// Variables every deployment run needs.
pub const REQUIRED_ENV_VARS: &[&str] = &[
    "DEPLOYMENT_NETWORK_ID",
    "DEPLOYMENT_CONSTANT",
    "DEPLOYMENT_PRIVATE_KEY",
];

/// Load a `.env` file from the working directory if there is one.
pub fn load_dotenv() {
    match dotenvy::dotenv() {
        Ok(path) => debug!(?path, "loaded environment file"),
        Err(err) => debug!(%err, "no environment file loaded"),
    }
}

/// Fails with the complete list of unset or empty variables.
pub fn validate_env_vars(vars: &[&str]) -> Result<(), ConfigError> {
    let missing: Vec<String> = vars
        .iter()
        .filter(|v| env::var(v).map(|s| s.is_empty()).unwrap_or(true))
        .map(|v| v.to_string())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::MissingEnvVars(missing))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_all_missing_variables() {
        let err = validate_env_vars(&[
            "SETDEPLOY_TEST_UNSET_A",
            "PATH",
            "SETDEPLOY_TEST_UNSET_B",
        ])
        .unwrap_err();
        match err {
            ConfigError::MissingEnvVars(v) => {
                assert_eq!(v, ["SETDEPLOY_TEST_UNSET_A", "SETDEPLOY_TEST_UNSET_B"])
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(validate_env_vars(&["PATH"]).is_ok());
    }
}
