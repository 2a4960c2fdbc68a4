use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OtpChannel {
    Sms,
    Email,
}

impl OtpChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            OtpChannel::Sms => "sms",
            OtpChannel::Email => "email",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OtpPurpose {
    PhoneVerification,
    EmailVerification,
}

impl OtpPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            OtpPurpose::PhoneVerification => "phone_verification",
            OtpPurpose::EmailVerification => "email_verification",
        }
    }

    pub fn channel(&self) -> OtpChannel {
        match self {
            OtpPurpose::PhoneVerification => OtpChannel::Sms,
            OtpPurpose::EmailVerification => OtpChannel::Email,
        }
    }
}
