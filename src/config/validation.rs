use crate::extract::PayloadExtractor;
use crate::protocol::profile::{BackendKind, EndpointProfile};

use super::{ClientConfig, ConfigError};

/// Validate the full client config, returning an error if any rule is violated.
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] when any configuration invariant is violated.
pub fn validate_config(config: &ClientConfig) -> Result<(), ConfigError> {
    validate_log_level(config)?;
    if config.profiles.is_empty() {
        return Err(validation_err("profiles cannot be empty"));
    }
    for (name, profile) in &config.profiles {
        validate_profile(name, profile)?;
    }
    Ok(())
}

fn validation_err(msg: impl Into<String>) -> ConfigError {
    ConfigError::Validation(msg.into())
}

/// Validate one profile in isolation.
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] naming the profile and the rule it
/// breaks.
pub fn validate_profile(name: &str, profile: &EndpointProfile) -> Result<(), ConfigError> {
    validate_base_url(name, &profile.base_url)?;

    if let Some(auth) = &profile.auth {
        if auth.token.trim().is_empty() {
            return Err(validation_err(format!(
                "Profile '{name}': auth.token cannot be empty when auth is set"
            )));
        }
    }

    if profile.policy.timeout_ms == Some(0) {
        return Err(validation_err(format!(
            "Profile '{name}': policy.timeout_ms must be greater than 0 when set"
        )));
    }
    if profile.policy.idle_timeout_ms == Some(0) {
        return Err(validation_err(format!(
            "Profile '{name}': policy.idle_timeout_ms must be greater than 0 when set"
        )));
    }

    match profile.backend {
        BackendKind::OpenAiChat => Ok(()),
        BackendKind::Generic => {
            let Some(generic) = &profile.generic else {
                return Err(validation_err(format!(
                    "Profile '{name}': backend 'generic' requires a generic block"
                )));
            };
            if let Some(method) = generic.request.method.as_deref() {
                if http::Method::from_bytes(method.trim().to_ascii_uppercase().as_bytes()).is_err() {
                    return Err(validation_err(format!(
                        "Profile '{name}': unsupported HTTP method '{method}'"
                    )));
                }
            }
            PayloadExtractor::for_schema(&generic.schema)
                .map(|_| ())
                .map_err(|err| validation_err(format!("Profile '{name}': {err}")))
        }
    }
}

fn validate_base_url(name: &str, base_url: &str) -> Result<(), ConfigError> {
    let parsed = url::Url::parse(base_url.trim()).map_err(|err| {
        validation_err(format!("Profile '{name}': base_url is not a valid URL: {err}"))
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(validation_err(format!(
            "Profile '{name}': base_url must start with http:// or https://"
        )));
    }
    Ok(())
}

fn validate_log_level(config: &ClientConfig) -> Result<(), ConfigError> {
    let valid_levels = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL", "DISABLED"];
    if !valid_levels.contains(&config.logging.log_level.to_uppercase().as_str()) {
        return Err(validation_err(format!(
            "log_level must be one of {valid_levels:?}"
        )));
    }
    Ok(())
}
