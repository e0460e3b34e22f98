//! 2captcha HTTP gateway implementation.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::config::GatewayConfig;
use crate::metrics;
use crate::task::{TaskId, TaskKind};

use super::classify::{classify_envelope, Classification};
use super::{Gateway, GatewayError, PollOutcome, SubmitOutcome};

/// Response envelope shared by every endpoint when `json=1` is set.
#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    status: i64,
    #[serde(alias = "message")]
    request: serde_json::Value,
}

/// Gateway talking to the 2captcha `in.php` / `res.php` API.
pub struct TwoCaptchaGateway {
    client: Client,
    api_key: String,
    config: GatewayConfig,
}

impl TwoCaptchaGateway {
    /// Create a new gateway for the given account key.
    pub fn new(api_key: impl Into<String>, config: GatewayConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            api_key: api_key.into(),
            config,
        }
    }

    fn base_url(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    /// Build the `in.php` URL for a new task.
    fn build_submit_url(&self, task: &TaskKind) -> String {
        let mut url = format!(
            "{}/in.php?json=1&key={}",
            self.base_url(),
            urlencoding::encode(&self.api_key)
        );

        let params: Vec<(&str, &str)> = match task {
            TaskKind::RecaptchaV2 { site_key, page_url } => vec![
                ("method", "userrecaptcha"),
                ("googlekey", site_key.as_str()),
                ("pageurl", page_url.as_str()),
            ],
            TaskKind::RecaptchaV3 {
                site_key,
                page_url,
                action,
                min_score,
            } => vec![
                ("method", "userrecaptcha"),
                ("version", "v3"),
                ("googlekey", site_key.as_str()),
                ("pageurl", page_url.as_str()),
                ("action", action.as_str()),
                ("min_score", min_score.as_param()),
            ],
            TaskKind::FunCaptcha {
                public_key,
                service_url,
                page_url,
            } => vec![
                ("method", "funcaptcha"),
                ("publickey", public_key.as_str()),
                ("surl", service_url.as_str()),
                ("pageurl", page_url.as_str()),
            ],
            TaskKind::HCaptcha { site_key, page_url } => vec![
                ("method", "hcaptcha"),
                ("sitekey", site_key.as_str()),
                ("pageurl", page_url.as_str()),
            ],
        };

        for (name, value) in params {
            url.push_str(&format!("&{}={}", name, urlencoding::encode(value)));
        }

        url
    }

    /// Build the `res.php` URL for checking a task.
    fn build_poll_url(&self, id: &TaskId) -> String {
        format!(
            "{}/res.php?json=1&key={}&action=get&id={}",
            self.base_url(),
            urlencoding::encode(&self.api_key),
            urlencoding::encode(id.as_str())
        )
    }

    fn build_balance_url(&self) -> String {
        format!(
            "{}/res.php?json=1&key={}&action=getbalance",
            self.base_url(),
            urlencoding::encode(&self.api_key)
        )
    }

    /// Perform a GET and classify the response envelope.
    async fn fetch(
        &self,
        endpoint: &'static str,
        url: &str,
    ) -> Result<Classification, GatewayError> {
        let start = Instant::now();

        let response = self.client.get(url).send().await.map_err(|e| {
            metrics::TRANSPORT_ERRORS.with_label_values(&[endpoint]).inc();
            map_reqwest_error(e)
        })?;

        let status = response.status();
        if !status.is_success() {
            metrics::TRANSPORT_ERRORS.with_label_values(&[endpoint]).inc();
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Http {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        let body = response.text().await.map_err(map_reqwest_error)?;
        metrics::GATEWAY_REQUEST_DURATION
            .with_label_values(&[endpoint])
            .observe(start.elapsed().as_secs_f64());

        let classification = parse_envelope(&body);
        debug!(endpoint = endpoint, response = ?classification, "2captcha response");
        Ok(classification)
    }
}

fn map_reqwest_error(e: reqwest::Error) -> GatewayError {
    if e.is_timeout() {
        GatewayError::Timeout
    } else {
        GatewayError::ConnectionFailed(e.to_string())
    }
}

/// Decode a response body. Anything that is not the expected envelope is
/// unclassified rather than silently accepted.
fn parse_envelope(body: &str) -> Classification {
    match serde_json::from_str::<ApiEnvelope>(body) {
        Ok(envelope) => {
            let request = match envelope.request {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            classify_envelope(envelope.status, request)
        }
        Err(_) => Classification::Unclassified(format!(
            "unparseable response: {}",
            body.chars().take(100).collect::<String>()
        )),
    }
}

#[async_trait]
impl Gateway for TwoCaptchaGateway {
    fn name(&self) -> &str {
        "2captcha"
    }

    async fn submit(&self, task: &TaskKind) -> Result<SubmitOutcome, GatewayError> {
        let url = self.build_submit_url(task);
        debug!(kind = task.name(), "Submitting task to 2captcha");
        Ok(self.fetch("submit", &url).await?.into_submit())
    }

    async fn poll(&self, id: &TaskId) -> Result<PollOutcome, GatewayError> {
        let url = self.build_poll_url(id);
        Ok(self.fetch("poll", &url).await?.into_poll())
    }

    async fn balance(&self) -> Result<f64, GatewayError> {
        let url = self.build_balance_url();
        match self.fetch("balance", &url).await? {
            Classification::Ready(value) => value.trim().parse::<f64>().map_err(|_| {
                GatewayError::InvalidResponse(format!("balance is not a number: {}", value))
            }),
            Classification::Fatal(kind) => Err(GatewayError::Rejected(kind)),
            other => Err(GatewayError::InvalidResponse(format!("{:?}", other))),
        }
    }
}
