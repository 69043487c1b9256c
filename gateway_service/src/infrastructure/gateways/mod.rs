pub mod fake_payment_rail;
pub mod log_notifier;
