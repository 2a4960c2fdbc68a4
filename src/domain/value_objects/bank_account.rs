use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::errors::ValidationError;
use crate::domain::value_objects::phone_number::PhoneNumber;

const MAX_ACCOUNT_NAME_LENGTH: usize = 100;

/// Supported Thai banks and the length of their account numbers.
static BANK_ACCOUNT_LENGTHS: Lazy<HashMap<&'static str, usize>> = Lazy::new(|| {
    HashMap::from([
        ("BBL", 10),
        ("KBANK", 10),
        ("KTB", 10),
        ("SCB", 10),
        ("BAY", 10),
        ("TTB", 10),
        ("CIMBT", 10),
        ("UOBT", 10),
        ("KKP", 10),
        ("LHB", 10),
        ("TISCO", 10),
        ("GSB", 12),
        ("BAAC", 12),
        ("GHB", 12),
    ])
});

pub fn is_known_bank(code: &str) -> bool {
    BANK_ACCOUNT_LENGTHS.contains_key(code.trim().to_uppercase().as_str())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankAccount {
    bank_code: String,
    account_number: String,
    account_name: String,
}

impl BankAccount {
    pub fn new(
        bank_code: &str,
        account_number: &str,
        account_name: &str,
    ) -> Result<Self, ValidationError> {
        let bank_code = bank_code.trim().to_uppercase();
        let expected_len = *BANK_ACCOUNT_LENGTHS
            .get(bank_code.as_str())
            .ok_or_else(|| ValidationError::UnknownBank(bank_code.clone()))?;

        let mut digits = String::with_capacity(account_number.len());
        for c in account_number.trim().chars() {
            match c {
                '0'..='9' => digits.push(c),
                '-' | ' ' => {}
                _ => {
                    return Err(ValidationError::InvalidBankAccount(
                        "account number must contain digits only".to_string(),
                    ))
                }
            }
        }

        if digits.len() != expected_len {
            return Err(ValidationError::InvalidBankAccount(format!(
                "{} account numbers have {} digits, got {}",
                bank_code,
                expected_len,
                digits.len()
            )));
        }

        if digits.bytes().all(|b| b == b'0') {
            return Err(ValidationError::InvalidBankAccount(
                "account number cannot be all zeros".to_string(),
            ));
        }

        let account_name = account_name.trim().to_string();
        if account_name.is_empty() || account_name.chars().count() > MAX_ACCOUNT_NAME_LENGTH {
            return Err(ValidationError::InvalidBankAccount(
                "account name must be between 1 and 100 characters".to_string(),
            ));
        }

        Ok(Self {
            bank_code,
            account_number: digits,
            account_name,
        })
    }

    pub fn bank_code(&self) -> &str {
        &self.bank_code
    }

    pub fn account_number(&self) -> &str {
        &self.account_number
    }

    pub fn account_name(&self) -> &str {
        &self.account_name
    }

    pub fn masked_number(&self) -> String {
        let tail = &self.account_number[self.account_number.len() - 4..];
        format!("{}{}", "x".repeat(self.account_number.len() - 4), tail)
    }
}

/// Thai 13-digit citizen ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NationalId(String);

impl NationalId {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let digits: String = raw.chars().filter(|c| *c != '-' && *c != ' ').collect();

        if digits.len() != 13 || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ValidationError::InvalidNationalId(
                "expected 13 digits".to_string(),
            ));
        }

        let values: Vec<u32> = digits.bytes().map(|b| (b - b'0') as u32).collect();
        let sum: u32 = values[..12]
            .iter()
            .enumerate()
            .map(|(i, d)| d * (13 - i as u32))
            .sum();
        let check = (11 - sum % 11) % 10;

        if check != values[12] {
            return Err(ValidationError::InvalidNationalId(
                "checksum mismatch".to_string(),
            ));
        }

        Ok(NationalId(digits))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Where a PromptPay transfer is addressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptPayTarget {
    Phone(PhoneNumber),
    NationalId(NationalId),
}

impl PromptPayTarget {
    /// Accepts either a mobile number or a citizen ID.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let digit_count = raw.chars().filter(|c| c.is_ascii_digit()).count();
        if digit_count == 13 && !raw.trim().starts_with('+') {
            return NationalId::parse(raw).map(PromptPayTarget::NationalId);
        }
        PhoneNumber::parse(raw).map(PromptPayTarget::Phone)
    }

    pub fn as_stored(&self) -> String {
        match self {
            PromptPayTarget::Phone(phone) => phone.e164().to_string(),
            PromptPayTarget::NationalId(id) => id.as_str().to_string(),
        }
    }
}
