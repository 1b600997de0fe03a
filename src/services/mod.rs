pub mod account;
pub mod auth;
pub mod email;
pub mod otp;
pub mod rate_limit;

pub use account::AccountService;
pub use email::{AppNotifier, LogNotifier, Notifier};
pub use otp::OtpService;
pub use rate_limit::{BlockReason, RateLimitDecision, RateLimiter};

#[cfg(feature = "email")]
pub use email::SmtpNotifier;
