//! Anti-automation challenge verification (reCAPTCHA `siteverify`).

use crate::config::CaptchaConfig;
use async_trait::async_trait;
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use std::time::Duration;

/// Error type for challenge verification failures.
#[derive(Debug, thiserror::Error)]
pub enum ChallengeError {
    /// The underlying HTTP request failed (network, DNS, timeout, etc.).
    #[error("Challenge request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The verifier returned a non-2xx status code.
    #[error("Challenge verifier returned HTTP {0}")]
    HttpStatus(u16),
}

/// Verifies a client-supplied challenge token.
///
/// Returns `Ok(false)` for a token the verifier rejected and `Err` when the
/// verifier could not be consulted. Callers must treat both as a rejection.
#[async_trait]
pub trait ChallengeVerifier: Send + Sync + 'static {
    async fn verify(&self, token: &str) -> Result<bool, ChallengeError>;
}

#[derive(Debug, Deserialize)]
struct SiteVerifyResponse {
    success: bool,
    #[serde(default, rename = "error-codes")]
    error_codes: Vec<String>,
}

/// Verifier backed by the reCAPTCHA HTTP API
pub struct RecaptchaVerifier {
    client: reqwest::Client,
    verify_url: String,
    secret_key: Secret<String>,
}

impl RecaptchaVerifier {
    pub fn from_config(config: &CaptchaConfig) -> Result<Self, ChallengeError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            verify_url: config.verify_url.clone(),
            secret_key: config.secret_key.clone(),
        })
    }
}

#[async_trait]
impl ChallengeVerifier for RecaptchaVerifier {
    async fn verify(&self, token: &str) -> Result<bool, ChallengeError> {
        if token.is_empty() {
            return Ok(false);
        }

        let response = self
            .client
            .post(&self.verify_url)
            .form(&[
                ("secret", self.secret_key.expose_secret().as_str()),
                ("response", token),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ChallengeError::HttpStatus(response.status().as_u16()));
        }

        let result: SiteVerifyResponse = response.json().await?;
        if !result.success {
            tracing::debug!(error_codes = ?result.error_codes, "Challenge rejected");
        }

        Ok(result.success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(url: &str) -> CaptchaConfig {
        CaptchaConfig {
            verify_url: url.to_string(),
            secret_key: Secret::new("secret".to_string()),
            test_token: "test-token".to_string(),
            timeout_secs: 1,
        }
    }

    #[tokio::test]
    async fn test_empty_token_rejected_without_request() {
        // Unroutable URL: an actual request would error instead of returning false.
        let verifier = RecaptchaVerifier::from_config(&config("http://127.0.0.1:9/verify")).unwrap();
        assert!(!verifier.verify("").await.unwrap());
    }

    #[tokio::test]
    async fn test_unreachable_verifier_is_an_error() {
        let verifier = RecaptchaVerifier::from_config(&config("http://127.0.0.1:9/verify")).unwrap();
        assert!(verifier.verify("some-token").await.is_err());
    }

    #[test]
    fn test_site_verify_response_parsing() {
        let parsed: SiteVerifyResponse =
            serde_json::from_str(r#"{"success": false, "error-codes": ["invalid-input-response"]}"#)
                .unwrap();
        assert!(!parsed.success);
        assert_eq!(parsed.error_codes, vec!["invalid-input-response".to_string()]);

        let parsed: SiteVerifyResponse = serde_json::from_str(r#"{"success": true}"#).unwrap();
        assert!(parsed.success);
    }
}
