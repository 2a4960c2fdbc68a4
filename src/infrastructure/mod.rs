//! Adapters for the external providers behind the domain ports.

pub mod email_gateway;
pub mod firebase_client;
pub mod otp_dispatch;
pub mod signal_client;
pub mod sms_gateway;

/// Leading/trailing characters kept when a destination is written to logs.
pub(crate) fn mask_destination(destination: &str) -> String {
    let chars: Vec<char> = destination.chars().collect();
    if chars.len() <= 4 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..2].iter().collect();
    let tail: String = chars[chars.len() - 2..].iter().collect();
    format!("{}{}{}", head, "*".repeat(chars.len() - 4), tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_destination() {
        assert_eq!(mask_destination("+66812345678"), "+6********78");
        assert_eq!(mask_destination("abc"), "***");
    }
}
