pub mod otp;
pub mod signal;
pub mod user;
pub mod withdrawal;
