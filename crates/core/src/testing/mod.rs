//! Testing utilities and a scriptable gateway.
//!
//! `MockGateway` stands in for the remote service so the pool can be
//! exercised end to end without network access.
//!
//! # Example
//!
//! ```rust,ignore
//! use captchapool_core::testing::{fixtures, MockGateway};
//!
//! let gateway = Arc::new(MockGateway::new());
//! gateway.set_not_ready_polls(2).await;
//!
//! let solver = Solver::new(gateway.clone(), fixtures::recaptcha_v2(), mode, fixtures::pool_config(4))?;
//! ```

mod mock_gateway;

pub use mock_gateway::{MockGateway, RecordedRequest};

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::pool::PoolConfig;
    use crate::task::{TaskKind, V3Score};

    /// A valid reCAPTCHA v2 task.
    pub fn recaptcha_v2() -> TaskKind {
        TaskKind::RecaptchaV2 {
            site_key: "6Le-wvkSAAAAAPBMRTvw0Q4Muexq9bi0DJwx_mJ-".to_string(),
            page_url: "https://www.google.com/recaptcha/api2/demo".to_string(),
        }
    }

    /// A valid reCAPTCHA v3 task.
    pub fn recaptcha_v3() -> TaskKind {
        TaskKind::RecaptchaV3 {
            site_key: "6LfB5_IbAAAAAMCtsjEHEHKqcB9iQocwwxTiihJu".to_string(),
            page_url: "https://example.com/login".to_string(),
            action: "login".to_string(),
            min_score: V3Score::Medium,
        }
    }

    /// A valid hCaptcha task.
    pub fn hcaptcha() -> TaskKind {
        TaskKind::HCaptcha {
            site_key: "10000000-ffff-ffff-ffff-000000000001".to_string(),
            page_url: "https://example.com/signup".to_string(),
        }
    }

    /// Pool settings with the default timings and `threads` workers.
    pub fn pool_config(threads: usize) -> PoolConfig {
        PoolConfig {
            threads,
            ..Default::default()
        }
    }
}
