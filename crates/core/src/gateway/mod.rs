//! Task submission gateway abstraction.
//!
//! The pool only talks to the remote service through the `Gateway` trait.
//! `TwoCaptchaGateway` is the HTTP implementation for the 2captcha API.

mod classify;
mod twocaptcha;
mod types;

pub use classify::{classify_code, classify_envelope, Classification};
pub use twocaptcha::TwoCaptchaGateway;
pub use types::*;
