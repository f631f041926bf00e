//! Environment variable and home directory expansion for config strings.

use crate::ConfigError;

/// Expand `${VAR}`, `${VAR:-default}`, `$VAR` and a leading `~`.
///
/// `field` names the config key for error messages.
pub(crate) fn expand_env(value: &str, field: &str) -> Result<String, ConfigError> {
    shellexpand::full(value)
        .map(std::borrow::Cow::into_owned)
        .map_err(|e| ConfigError::EnvVar {
            field: field.to_owned(),
            message: format!("${{{}}} not set", e.var_name),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_unchanged() {
        assert_eq!(
            expand_env("https://tabrisjs.com", "platforms.endpoint").unwrap(),
            "https://tabrisjs.com"
        );
    }

    #[test]
    fn test_default_value_used_when_unset() {
        let value = expand_env("${TABRIS_CONFIG_UNSET_VAR:-fallback}", "x").unwrap();
        assert_eq!(value, "fallback");
    }

    #[test]
    fn test_missing_var_names_field() {
        let err = expand_env("${TABRIS_CONFIG_MISSING_VAR}", "platforms.data_dir").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("TABRIS_CONFIG_MISSING_VAR"));
        assert!(message.contains("platforms.data_dir"));
    }
}
