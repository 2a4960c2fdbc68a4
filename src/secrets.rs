//! Secret loading
//!
//! Loads signing keys, admin API keys and provider credentials into
//! `Zeroizing` buffers so they are wiped from memory on drop.
//!
//! A secret named `JWT_SECRET` is read from the 1Password CLI when
//! `JWT_SECRET_OP_REF` holds an `op://` reference, otherwise from the
//! `JWT_SECRET` environment variable.

use std::env;
use tracing::{error, info, warn};
use zeroize::Zeroizing;

/// Minimum length for signing secrets and API keys (256 bits of entropy)
pub const MIN_SECRET_LENGTH: usize = 32;

const WEAK_PATTERNS: [&str; 7] = [
    "test",
    "demo",
    "example",
    "placeholder",
    "changeme",
    "secret",
    "12345",
];

#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("Secret not found: {0}")]
    NotFound(String),

    #[error("1Password CLI error: {0}")]
    OnePasswordError(String),

    #[error("Environment variable not set: {0}")]
    EnvVarNotSet(String),

    #[error("Secret validation failed: {0}")]
    ValidationFailed(String),
}

#[derive(Debug, Clone)]
pub struct SecretConfig {
    /// Whether plain environment variables may hold secrets
    pub allow_env_vars: bool,

    /// Fail instead of falling back when an `op://` reference cannot be read
    pub require_op_cli: bool,
}

impl Default for SecretConfig {
    fn default() -> Self {
        Self {
            allow_env_vars: true,
            require_op_cli: false,
        }
    }
}

impl SecretConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(value) = env::var("SECRETS_REQUIRE_OP_CLI") {
            config.require_op_cli = value.eq_ignore_ascii_case("true") || value == "1";
        }
        if let Ok(value) = env::var("SECRETS_ALLOW_ENV") {
            config.allow_env_vars = value.eq_ignore_ascii_case("true") || value == "1";
        }
        config
    }
}

/// Loads the secret called `name`.
pub fn load_secret(name: &str, config: &SecretConfig) -> Result<Zeroizing<String>, SecretError> {
    let op_reference = env::var(format!("{}_OP_REF", name)).ok();

    if let Some(reference) = op_reference.as_deref() {
        match load_from_op_cli(reference) {
            Ok(secret) => {
                info!("✓ Loaded secret from 1Password CLI: {}", name);
                return Ok(secret);
            }
            Err(e) if config.require_op_cli => {
                error!("1Password CLI required but failed for {}: {}", name, e);
                return Err(e);
            }
            Err(e) => warn!("1Password CLI not available for {}: {}", name, e),
        }
    } else if config.require_op_cli {
        error!("No 1Password reference configured for {}", name);
        return Err(SecretError::NotFound(name.to_string()));
    }

    if config.allow_env_vars {
        load_from_env(name)
    } else {
        error!("Secret loading failed: env vars disabled for {}", name);
        Err(SecretError::NotFound(name.to_string()))
    }
}

/// Loads an optional provider credential; absence is not an error.
pub fn load_optional_secret(
    name: &str,
    config: &SecretConfig,
) -> Result<Option<Zeroizing<String>>, SecretError> {
    match load_secret(name, config) {
        Ok(secret) if secret.trim().is_empty() => Ok(None),
        Ok(secret) => Ok(Some(secret)),
        Err(SecretError::EnvVarNotSet(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

fn load_from_op_cli(reference: &str) -> Result<Zeroizing<String>, SecretError> {
    use std::process::Command;

    let output = Command::new("op")
        .arg("read")
        .arg(reference)
        .output()
        .map_err(|e| {
            SecretError::OnePasswordError(format!("Failed to execute 'op' command: {}", e))
        })?;

    if !output.status.success() {
        let error_msg = String::from_utf8_lossy(&output.stderr);
        return Err(SecretError::OnePasswordError(format!(
            "1Password CLI failed: {}",
            error_msg.trim()
        )));
    }

    let secret = Zeroizing::new(
        String::from_utf8(output.stdout)
            .map_err(|e| {
                SecretError::OnePasswordError(format!("Invalid UTF-8 from 1Password: {}", e))
            })?
            .trim()
            .to_string(),
    );

    if secret.is_empty() {
        return Err(SecretError::OnePasswordError(
            "1Password returned empty secret".to_string(),
        ));
    }

    Ok(secret)
}

fn load_from_env(name: &str) -> Result<Zeroizing<String>, SecretError> {
    env::var(name)
        .map(Zeroizing::new)
        .map_err(|_| SecretError::EnvVarNotSet(name.to_string()))
}

/// Rejects short secrets and ones containing well-known placeholder words.
pub fn validate_secret_strength(secret: &str, min_length: usize) -> Result<(), SecretError> {
    if secret.len() < min_length {
        return Err(SecretError::ValidationFailed(format!(
            "Secret too short: {} characters (minimum: {})",
            secret.len(),
            min_length
        )));
    }

    let secret_lower = secret.to_lowercase();
    for pattern in &WEAK_PATTERNS {
        if secret_lower.contains(pattern) {
            return Err(SecretError::ValidationFailed(format!(
                "Secret contains weak pattern: {}",
                pattern
            )));
        }
    }

    Ok(())
}

/// Loads the JWT signing secret and checks its strength.
pub fn load_signing_secret(name: &str, config: &SecretConfig) -> Result<Zeroizing<String>, SecretError> {
    let secret = load_secret(name, config)?;
    validate_secret_strength(&secret, MIN_SECRET_LENGTH)?;
    Ok(secret)
}

/// Parses a comma-separated list of admin API keys.
pub fn parse_api_keys(raw: &str) -> Result<Vec<Zeroizing<String>>, SecretError> {
    let mut keys: Vec<Zeroizing<String>> = Vec::new();
    for key in raw.split(',').map(str::trim).filter(|k| !k.is_empty()) {
        if key.len() < MIN_SECRET_LENGTH {
            return Err(SecretError::ValidationFailed(format!(
                "API key too short: {} characters (minimum: {})",
                key.len(),
                MIN_SECRET_LENGTH
            )));
        }
        if !keys.iter().any(|k| k.as_str() == key) {
            keys.push(Zeroizing::new(key.to_string()));
        }
    }

    if keys.is_empty() {
        return Err(SecretError::ValidationFailed(
            "no API keys configured".to_string(),
        ));
    }
    Ok(keys)
}

/// Loads admin API keys from the secret called `name`.
pub fn load_api_keys(
    name: &str,
    config: &SecretConfig,
) -> Result<Vec<Zeroizing<String>>, SecretError> {
    let raw = load_secret(name, config)?;
    let keys = parse_api_keys(&raw)?;
    info!("✓ Loaded {} admin API key(s)", keys.len());
    Ok(keys)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_secret_strength() {
        assert!(validate_secret_strength("short", 32).is_err());
        assert!(validate_secret_strength("changeme_changeme_changeme_changeme", 32).is_err());

        let strong_key = "k7Qm2xVd9Lr4Tz8Wc1Hn6Bp3Fy5Gs0Ja";
        assert!(validate_secret_strength(strong_key, 32).is_ok());
    }

    #[test]
    fn test_parse_api_keys() {
        let a = "a".repeat(32);
        let b = "b".repeat(40);
        let keys = parse_api_keys(&format!(" {}, {} ,", a, b)).unwrap();
        assert_eq!(keys.len(), 2);
        assert!(keys.iter().any(|k| k.as_str() == a));

        assert!(parse_api_keys("tooshort").is_err());
        assert!(parse_api_keys(" , ").is_err());
    }

    #[test]
    fn test_load_from_env() {
        env::set_var("TRADEPORT_UNIT_SECRET", "value_12345678901234567890123456");
        let result = load_secret("TRADEPORT_UNIT_SECRET", &SecretConfig::default());
        assert_eq!(*result.unwrap(), "value_12345678901234567890123456");
        env::remove_var("TRADEPORT_UNIT_SECRET");
    }

    #[test]
    fn test_missing_secret() {
        let result = load_secret("TRADEPORT_NONEXISTENT_VAR", &SecretConfig::default());
        assert!(matches!(result, Err(SecretError::EnvVarNotSet(_))));

        let optional =
            load_optional_secret("TRADEPORT_NONEXISTENT_VAR", &SecretConfig::default()).unwrap();
        assert!(optional.is_none());
    }

    #[test]
    fn test_env_vars_disabled() {
        env::set_var("TRADEPORT_DISABLED_SECRET", "x".repeat(40));
        let config = SecretConfig {
            allow_env_vars: false,
            require_op_cli: false,
        };
        assert!(matches!(
            load_secret("TRADEPORT_DISABLED_SECRET", &config),
            Err(SecretError::NotFound(_))
        ));
        env::remove_var("TRADEPORT_DISABLED_SECRET");
    }
}
