use serde::{Deserialize, Serialize};

use crate::domain::errors::ValidationError;

const MAX_EMAIL_LENGTH: usize = 254;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Email(String);

impl Email {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let normalized = raw.trim().to_lowercase();

        if normalized.is_empty() || normalized.len() > MAX_EMAIL_LENGTH {
            return Err(ValidationError::InvalidEmail(
                "length must be between 1 and 254".to_string(),
            ));
        }
        if normalized.chars().any(char::is_whitespace) {
            return Err(ValidationError::InvalidEmail(
                "must not contain whitespace".to_string(),
            ));
        }

        let (local, domain) = match normalized.split_once('@') {
            Some(parts) => parts,
            None => return Err(ValidationError::InvalidEmail("missing '@'".to_string())),
        };

        if local.is_empty() || domain.contains('@') {
            return Err(ValidationError::InvalidEmail(
                "malformed local part".to_string(),
            ));
        }
        if !domain.contains('.')
            || domain.starts_with('.')
            || domain.ends_with('.')
            || domain.contains("..")
        {
            return Err(ValidationError::InvalidEmail("malformed domain".to_string()));
        }

        Ok(Email(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn masked(&self) -> String {
        match self.0.split_once('@') {
            Some((local, domain)) => {
                let first = local.chars().next().unwrap_or('*');
                format!("{}***@{}", first, domain)
            }
            None => "***".to_string(),
        }
    }
}

impl std::fmt::Display for Email {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Email {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Email::parse(&value)
    }
}

impl From<Email> for String {
    fn from(value: Email) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalizes_case_and_whitespace() {
        let email = Email::parse("  Trader@Example.COM ").unwrap();
        assert_eq!(email.as_str(), "trader@example.com");
    }

    #[test]
    fn test_rejects_malformed() {
        for raw in ["", "no-at-sign", "@example.com", "a@b", "a@@b.com", "a@.com", "a b@c.com"] {
            assert!(Email::parse(raw).is_err(), "{} should be rejected", raw);
        }
    }

    #[test]
    fn test_masked() {
        let email = Email::parse("somchai@example.com").unwrap();
        assert_eq!(email.masked(), "s***@example.com");
    }
}
