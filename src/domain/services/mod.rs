pub mod affiliate;
pub mod device;
pub mod otp;
pub mod promptpay;
pub mod two_factor;
pub mod withdrawal_policy;
