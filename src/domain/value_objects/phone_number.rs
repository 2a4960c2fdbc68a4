use serde::{Deserialize, Serialize};

use crate::domain::errors::ValidationError;

/// Thai mobile number normalised to E.164 (`+66XXXXXXXXX`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PhoneNumber(String);

impl PhoneNumber {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::InvalidPhoneNumber(
                "phone number is empty".to_string(),
            ));
        }

        let has_plus = trimmed.starts_with('+');
        let body = if has_plus { &trimmed[1..] } else { trimmed };

        let mut digits = String::with_capacity(body.len());
        for c in body.chars() {
            match c {
                '0'..='9' => digits.push(c),
                ' ' | '-' | '(' | ')' => {}
                _ => {
                    return Err(ValidationError::InvalidPhoneNumber(format!(
                        "unexpected character '{}'",
                        c
                    )))
                }
            }
        }

        let national = if has_plus {
            digits.strip_prefix("66").ok_or_else(|| {
                ValidationError::InvalidPhoneNumber("only +66 numbers are supported".to_string())
            })?
        } else if let Some(rest) = digits.strip_prefix("66").filter(|r| r.len() == 9) {
            rest
        } else if let Some(rest) = digits.strip_prefix('0') {
            rest
        } else {
            return Err(ValidationError::InvalidPhoneNumber(
                "expected a leading 0 or country code 66".to_string(),
            ));
        };

        if national.len() != 9 {
            return Err(ValidationError::InvalidPhoneNumber(format!(
                "expected 9 digits after the prefix, got {}",
                national.len()
            )));
        }

        if !matches!(national.as_bytes()[0], b'6' | b'8' | b'9') {
            return Err(ValidationError::InvalidPhoneNumber(
                "not a mobile number".to_string(),
            ));
        }

        Ok(PhoneNumber(format!("+66{}", national)))
    }

    pub fn e164(&self) -> &str {
        &self.0
    }

    /// Domestic format, e.g. `0812345678`.
    pub fn local(&self) -> String {
        format!("0{}", &self.0[3..])
    }

    /// Nine-digit national significant number.
    pub fn national_number(&self) -> &str {
        &self.0[3..]
    }

    /// Destination safe to print in logs, e.g. `+66******678`.
    pub fn masked(&self) -> String {
        let tail = &self.0[self.0.len() - 3..];
        format!("+66******{}", tail)
    }
}

impl std::fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for PhoneNumber {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        PhoneNumber::parse(&value)
    }
}

impl From<PhoneNumber> for String {
    fn from(value: PhoneNumber) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_local_format() {
        let phone = PhoneNumber::parse("0812345678").unwrap();
        assert_eq!(phone.e164(), "+66812345678");
        assert_eq!(phone.local(), "0812345678");
    }

    #[test]
    fn test_accepts_international_formats() {
        assert_eq!(
            PhoneNumber::parse("+66 81-234-5678").unwrap().e164(),
            "+66812345678"
        );
        assert_eq!(
            PhoneNumber::parse("66912345678").unwrap().e164(),
            "+66912345678"
        );
        assert_eq!(
            PhoneNumber::parse("(061) 234 5678").unwrap().e164(),
            "+66612345678"
        );
    }

    #[test]
    fn test_rejects_malformed_numbers() {
        assert!(PhoneNumber::parse("").is_err());
        assert!(PhoneNumber::parse("081234567").is_err()); // too short
        assert!(PhoneNumber::parse("08123456789").is_err()); // too long
        assert!(PhoneNumber::parse("021234567").is_err()); // landline
        assert!(PhoneNumber::parse("+1 415 555 0100").is_err());
        assert!(PhoneNumber::parse("08l2345678").is_err());
        assert!(PhoneNumber::parse("812345678").is_err());
    }

    #[test]
    fn test_masked_hides_middle_digits() {
        let phone = PhoneNumber::parse("0812345678").unwrap();
        assert_eq!(phone.masked(), "+66******678");
    }

    #[test]
    fn test_deserialize_validates() {
        let ok: Result<PhoneNumber, _> = serde_json::from_str("\"0891234567\"");
        assert!(ok.is_ok());
        let bad: Result<PhoneNumber, _> = serde_json::from_str("\"12345\"");
        assert!(bad.is_err());
    }
}
