pub mod bank_account;
pub mod email;
pub mod money;
pub mod phone_number;
