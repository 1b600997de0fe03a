pub mod otp;
pub mod user;

pub use otp::{NewOtp, Otp, OtpPurpose, OtpStatus};
pub use user::{NewUser, SessionState, User, VerificationState};
