pub mod forward_test_sync;
pub mod otp_cleanup;
