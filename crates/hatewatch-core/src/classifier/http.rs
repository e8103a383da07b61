use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{Classification, Classifier};
use crate::error::{HatewatchError, Result};
use crate::state::Verdict;

#[derive(Serialize)]
struct DetectRequest<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct DetectResponse {
    #[serde(rename = "isHate", default)]
    is_hate: Option<bool>,
    #[serde(default)]
    suggestion: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    error: Option<String>,
}

impl DetectResponse {
    fn into_verdict(self) -> Result<Verdict> {
        if let Some(error) = self.error {
            return Err(HatewatchError::service(error));
        }
        let is_flagged = self
            .is_hate
            .ok_or_else(|| HatewatchError::service("response is missing isHate"))?;
        Ok(Verdict {
            is_flagged,
            suggestion: self.suggestion.filter(|s| !s.trim().is_empty()),
            confidence: self.confidence,
        })
    }
}

/// Classifier backed by the hate-detection HTTP endpoint.
#[derive(Clone)]
pub struct HttpClassifier {
    client: Client,
    api_url: String,
}

impl HttpClassifier {
    pub fn new(api_url: &str) -> Self {
        Self {
            client: Client::new(),
            api_url: api_url.to_string(),
        }
    }

    /// One POST to the endpoint, with every failure surfaced as an error.
    pub async fn detect(&self, text: &str) -> Result<Verdict> {
        let response = self
            .client
            .post(&self.api_url)
            .json(&DetectRequest { text })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(HatewatchError::service(format!(
                "request failed with status {}: {}",
                status, body
            )));
        }

        let detect: DetectResponse = response.json().await?;
        detect.into_verdict()
    }
}

#[async_trait]
impl Classifier for HttpClassifier {
    async fn classify(&self, text: &str) -> Classification {
        match self.detect(text).await {
            Ok(verdict) => {
                debug!(target: "classifier", flagged = verdict.is_flagged, "classified message");
                Classification::Verdict(verdict)
            }
            Err(e) => {
                warn!(target: "classifier", "Classification unavailable: {}", e);
                Classification::Unavailable
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Answers a single request with `response` and returns the endpoint URL.
    async fn serve_once(response: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            // headers, then as many body bytes as content-length announces
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
                let raw = String::from_utf8_lossy(&request).to_string();
                if let Some(end) = raw.find("\r\n\r\n") {
                    let length = raw[..end]
                        .lines()
                        .find_map(|line| {
                            let (name, value) = line.split_once(':')?;
                            name.eq_ignore_ascii_case("content-length")
                                .then(|| value.trim().parse::<usize>().ok())
                                .flatten()
                        })
                        .unwrap_or(0);
                    if request.len() >= end + 4 + length {
                        break;
                    }
                }
            }
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
        });
        format!("http://{}/detect-hate", addr)
    }

    fn parse(raw: &str) -> Result<Verdict> {
        serde_json::from_str::<DetectResponse>(raw)?.into_verdict()
    }

    #[test]
    fn test_flagged_response() {
        let verdict = parse(r#"{"isHate": true, "confidence": 0.9}"#).unwrap();
        assert_eq!(verdict, Verdict::flagged(None, Some(0.9)));
    }

    #[test]
    fn test_suggestion_is_kept() {
        let verdict = parse(r#"{"isHate": true, "suggestion": "Be kind"}"#).unwrap();
        assert_eq!(verdict.suggestion.as_deref(), Some("Be kind"));
    }

    #[test]
    fn test_error_payload_is_service_error() {
        let err = parse(r#"{"isHate": false, "error": "model loading"}"#).unwrap_err();
        assert!(matches!(err, HatewatchError::Service(_)));
    }

    #[test]
    fn test_missing_verdict_is_service_error() {
        assert!(parse(r#"{}"#).is_err());
    }

    #[tokio::test]
    async fn test_unreachable_service_is_unavailable() {
        // Port 9 (discard) on localhost is closed in test environments.
        let classifier = HttpClassifier::new("http://127.0.0.1:9/detect-hate");
        assert_eq!(classifier.classify("you are stupid").await, Classification::Unavailable);
    }

    #[tokio::test]
    async fn test_server_error_status_is_unavailable() {
        const ERROR: &str = "HTTP/1.1 500 Internal Server Error\r\ncontent-length: 4\r\nconnection: close\r\n\r\nboom";
        let classifier = HttpClassifier::new(&serve_once(ERROR).await);
        let err = classifier.detect("you are stupid").await.unwrap_err();
        assert!(matches!(err, HatewatchError::Service(ref msg) if msg.contains("500")));

        let classifier = HttpClassifier::new(&serve_once(ERROR).await);
        assert_eq!(classifier.classify("you are stupid").await, Classification::Unavailable);
    }

    #[tokio::test]
    async fn test_success_status_yields_verdict() {
        const FLAGGED: &str = "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: 38\r\nconnection: close\r\n\r\n{\"isHate\":true,\"suggestion\":\"Be kind\"}";
        let classifier = HttpClassifier::new(&serve_once(FLAGGED).await);
        assert_eq!(
            classifier.classify("you are stupid").await,
            Classification::Verdict(Verdict::flagged(Some("Be kind".to_string()), None))
        );
    }
}
