pub mod health;
pub mod login;
pub mod logout;
pub mod password_reset;
pub mod signup;
pub mod validation;

pub use health::health_check;
pub use login::login;
pub use logout::logout;
pub use password_reset::{request_password_reset_otp, reset_password, verify_password_reset_otp};
pub use signup::{request_signup_otp, signup};
