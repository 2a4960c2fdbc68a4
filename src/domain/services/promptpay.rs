//! PromptPay QR payloads (EMVCo merchant-presented mode, Thai profile).
//!
//! The returned string is what gets encoded into the QR image; rendering is
//! left to the client.

use crate::domain::value_objects::bank_account::PromptPayTarget;
use crate::domain::value_objects::money::Money;

const ID_PAYLOAD_FORMAT: &str = "00";
const ID_POI_METHOD: &str = "01";
const ID_MERCHANT_INFO: &str = "29";
const ID_CURRENCY: &str = "53";
const ID_AMOUNT: &str = "54";
const ID_COUNTRY: &str = "58";
const ID_CRC: &str = "63";

const PAYLOAD_FORMAT_V1: &str = "01";
const POI_STATIC: &str = "11";
const POI_DYNAMIC: &str = "12";
const PROMPTPAY_AID: &str = "A000000677010111";
const SUB_AID: &str = "00";
const SUB_PHONE: &str = "01";
const SUB_NATIONAL_ID: &str = "02";
const CURRENCY_THB: &str = "764";
const COUNTRY_TH: &str = "TH";

fn field(id: &str, value: &str) -> String {
    format!("{}{:02}{}", id, value.len(), value)
}

/// CRC-16/CCITT-FALSE (poly 0x1021, init 0xFFFF).
pub fn crc16_ccitt(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for byte in data {
        crc ^= (*byte as u16) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
        }
    }
    crc
}

fn target_field(target: &PromptPayTarget) -> String {
    match target {
        PromptPayTarget::Phone(phone) => {
            field(SUB_PHONE, &format!("0066{}", phone.national_number()))
        }
        PromptPayTarget::NationalId(id) => field(SUB_NATIONAL_ID, id.as_str()),
    }
}

/// Builds the payload. A positive amount makes the code single-use
/// (dynamic); otherwise the payer enters the amount.
pub fn build_payload(target: &PromptPayTarget, amount: Option<Money>) -> String {
    let amount = amount.filter(|a| *a > Money::ZERO);

    let merchant_info = format!(
        "{}{}",
        field(SUB_AID, PROMPTPAY_AID),
        target_field(target)
    );

    let mut payload = String::new();
    payload.push_str(&field(ID_PAYLOAD_FORMAT, PAYLOAD_FORMAT_V1));
    payload.push_str(&field(
        ID_POI_METHOD,
        if amount.is_some() { POI_DYNAMIC } else { POI_STATIC },
    ));
    payload.push_str(&field(ID_MERCHANT_INFO, &merchant_info));
    payload.push_str(&field(ID_CURRENCY, CURRENCY_THB));
    if let Some(amount) = amount {
        payload.push_str(&field(ID_AMOUNT, &amount.format_decimal()));
    }
    payload.push_str(&field(ID_COUNTRY, COUNTRY_TH));

    payload.push_str(ID_CRC);
    payload.push_str("04");
    let crc = crc16_ccitt(payload.as_bytes());
    payload.push_str(&format!("{:04X}", crc));

    payload
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::bank_account::NationalId;
    use crate::domain::value_objects::phone_number::PhoneNumber;

    fn phone_target() -> PromptPayTarget {
        PromptPayTarget::Phone(PhoneNumber::parse("081-234-5678").unwrap())
    }

    #[test]
    fn test_crc_check_value() {
        assert_eq!(crc16_ccitt(b"123456789"), 0x29B1);
    }

    #[test]
    fn test_static_phone_payload() {
        assert_eq!(
            build_payload(&phone_target(), None),
            "00020101021129370016A0000006770101110113006681234567853037645802TH6304823E"
        );
    }

    #[test]
    fn test_dynamic_payload_with_amount() {
        let amount = Money::from_baht(150.5).unwrap();
        assert_eq!(
            build_payload(&phone_target(), Some(amount)),
            "00020101021229370016A0000006770101110113006681234567853037645406150.505802TH6304CAAD"
        );
    }

    #[test]
    fn test_national_id_payload() {
        let target = PromptPayTarget::NationalId(NationalId::parse("3100500123458").unwrap());
        assert_eq!(
            build_payload(&target, None),
            "00020101021129370016A0000006770101110213310050012345853037645802TH6304C3C0"
        );
    }

    #[test]
    fn test_zero_amount_is_static() {
        let payload = build_payload(&phone_target(), Some(Money::ZERO));
        assert!(payload.contains("010211"));
        assert!(!payload.contains("5400"));
    }
}
