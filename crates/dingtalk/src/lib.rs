//! DingTalk robot notification sender.
//!
//! Implements the [`events::NotificationSender`] trait by posting a markdown
//! message to a DingTalk group robot webhook. Recipients are phone numbers;
//! they are listed in `at.atMobiles` and also appended to the text as
//! `@mobile` mentions, since the robot only notifies users mentioned in the
//! text.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** HTTP transport, payload shape, and reply decoding live
//! here. The engine sees only [`events::NotificationSender`].
//!
//! Robots protected by a signing secret get `timestamp` and `sign` query
//! parameters on every request, where `sign` is the base64 HMAC-SHA256 of
//! `"{timestamp}\n{secret}"` keyed by the secret.

pub mod message;

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use events::{DeliveryError, NotificationSender, Recipient};
use hmac::{Hmac, Mac};
use reqwest::{Client, Url};
use sha2::Sha256;
use thiserror::Error;
use tracing::debug;

pub use message::{RobotMessage, RobotReply};

/// Default DingTalk robot endpoint.
pub const DEFAULT_WEBHOOK_URL: &str = "https://oapi.dingtalk.com/robot/send";

type HmacSha256 = Hmac<Sha256>;

/// Settings for [`DingTalkSender`].
#[derive(Debug, Clone)]
pub struct DingTalkConfig {
    /// Robot webhook URL without the access token.
    pub webhook_url: String,
    /// Robot access token, sent as the `access_token` query parameter.
    pub access_token: String,
    /// Signing secret for robots with signature verification enabled.
    pub secret: Option<String>,
    /// Title shown in the chat's conversation list.
    pub title: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

/// The sender could not be constructed.
#[derive(Debug, Error)]
pub enum DingTalkError {
    /// The webhook URL is not a valid absolute URL.
    #[error("invalid DingTalk webhook URL '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    /// The signing secret cannot key an HMAC.
    #[error("invalid DingTalk signing secret: {0}")]
    InvalidSecret(String),

    /// The HTTP client could not be built (e.g. TLS backend failure).
    #[error("could not build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Posts digests to a DingTalk group robot.
#[derive(Clone)]
pub struct DingTalkSender {
    client: Client,
    endpoint: Url,
    title: String,
    signer: Option<Signer>,
}

impl std::fmt::Debug for DingTalkSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DingTalkSender")
            .field("title", &self.title)
            .field("signed", &self.signer.is_some())
            .finish_non_exhaustive()
    }
}

/// Signs requests for a robot with signature verification enabled.
#[derive(Clone)]
struct Signer {
    secret: String,
    mac: HmacSha256,
}

impl Signer {
    fn new(secret: String) -> Result<Self, DingTalkError> {
        let mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| DingTalkError::InvalidSecret(e.to_string()))?;
        Ok(Self { secret, mac })
    }

    /// Base64 HMAC-SHA256 of `"{timestamp_ms}\n{secret}"`.
    fn sign(&self, timestamp_ms: i64) -> String {
        let mut mac = self.mac.clone();
        mac.update(format!("{timestamp_ms}\n{}", self.secret).as_bytes());
        base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes())
    }
}

impl DingTalkSender {
    pub fn new(config: DingTalkConfig) -> Result<Self, DingTalkError> {
        let endpoint = Url::parse_with_params(
            &config.webhook_url,
            &[("access_token", config.access_token.as_str())],
        )
        .map_err(|e| DingTalkError::InvalidUrl {
            url: config.webhook_url.clone(),
            message: e.to_string(),
        })?;
        let signer = config.secret.map(Signer::new).transpose()?;
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            endpoint,
            title: config.title,
            signer,
        })
    }

    /// Endpoint for one request. Signed robots need a fresh timestamp each time.
    fn request_url(&self) -> Url {
        let mut url = self.endpoint.clone();
        if let Some(signer) = &self.signer {
            let timestamp_ms = chrono::Utc::now().timestamp_millis();
            url.query_pairs_mut()
                .append_pair("timestamp", &timestamp_ms.to_string())
                .append_pair("sign", &signer.sign(timestamp_ms));
        }
        url
    }
}

#[async_trait]
impl NotificationSender for DingTalkSender {
    async fn send(&self, body: &str, recipients: &[Recipient]) -> Result<(), DeliveryError> {
        let message = RobotMessage::markdown(&self.title, body, recipients);

        let response = self
            .client
            .post(self.request_url())
            .json(&message)
            .send()
            .await
            .map_err(|e| DeliveryError::Transport {
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Rejected {
                code: i64::from(status.as_u16()),
                message: text,
            });
        }

        let reply: RobotReply = response.json().await.map_err(|e| DeliveryError::Transport {
            message: format!("unreadable robot reply: {e}"),
        })?;
        reply.into_result()?;

        debug!(recipients = recipients.len(), "robot accepted message");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use axum::extract::{Query, State};
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};

    use super::*;

    #[derive(Default)]
    struct MockRobot {
        requests: Mutex<Vec<(HashMap<String, String>, Value)>>,
    }

    async fn start_robot(status: StatusCode, reply: Value) -> (String, Arc<MockRobot>) {
        let robot = Arc::new(MockRobot::default());
        let app = Router::new()
            .route(
                "/robot/send",
                post(
                    move |State(robot): State<Arc<MockRobot>>,
                          Query(query): Query<HashMap<String, String>>,
                          Json(body): Json<Value>| {
                        let reply = reply.clone();
                        async move {
                            robot.requests.lock().unwrap().push((query, body));
                            (status, Json(reply))
                        }
                    },
                ),
            )
            .with_state(Arc::clone(&robot));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}/robot/send"), robot)
    }

    fn config(url: &str) -> DingTalkConfig {
        DingTalkConfig {
            webhook_url: url.to_string(),
            access_token: "secret-token".into(),
            secret: None,
            title: "Issue events".into(),
            timeout: Duration::from_secs(5),
        }
    }

    fn sender(url: &str) -> DingTalkSender {
        DingTalkSender::new(config(url)).unwrap()
    }

    fn phones(values: &[&str]) -> Vec<Recipient> {
        values.iter().map(|v| Recipient::new(*v).unwrap()).collect()
    }

    #[tokio::test]
    async fn posts_markdown_with_mentions_and_token() {
        let (url, robot) = start_robot(StatusCode::OK, json!({"errcode": 0, "errmsg": "ok"})).await;

        sender(&url)
            .send("### Status changed\n", &phones(&["+1555", "+1666"]))
            .await
            .unwrap();

        let requests = robot.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        let (query, body) = &requests[0];
        assert_eq!(query.get("access_token").map(String::as_str), Some("secret-token"));
        assert_eq!(body["msgtype"], "markdown");
        assert_eq!(body["markdown"]["title"], "Issue events");
        assert_eq!(
            body["markdown"]["text"],
            "### Status changed\n\n---\n@+1555 @+1666"
        );
        assert_eq!(body["at"]["atMobiles"], json!(["+1555", "+1666"]));
        assert_eq!(body["at"]["isAtAll"], false);
        assert!(!query.contains_key("timestamp"));
        assert!(!query.contains_key("sign"));
    }

    #[tokio::test]
    async fn signed_robot_gets_timestamp_and_signature() {
        let (url, robot) = start_robot(StatusCode::OK, json!({"errcode": 0})).await;
        let secret = "SEC0123456789abcdef";
        let sender = DingTalkSender::new(DingTalkConfig {
            secret: Some(secret.into()),
            ..config(&url)
        })
        .unwrap();

        let before = chrono::Utc::now().timestamp_millis();
        sender.send("body", &phones(&["+1555"])).await.unwrap();
        let after = chrono::Utc::now().timestamp_millis();

        let requests = robot.requests.lock().unwrap();
        let (query, _) = &requests[0];
        assert_eq!(query.get("access_token").map(String::as_str), Some("secret-token"));

        let timestamp: i64 = query["timestamp"].parse().unwrap();
        assert!((before..=after).contains(&timestamp));

        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(format!("{timestamp}\n{secret}").as_bytes());
        let expected =
            base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes());
        // The query extractor has already percent-decoded the value.
        assert_eq!(query["sign"], expected);
    }

    #[tokio::test]
    async fn non_zero_errcode_is_a_rejection() {
        let (url, _robot) = start_robot(
            StatusCode::OK,
            json!({"errcode": 310000, "errmsg": "keywords not in content"}),
        )
        .await;

        let err = sender(&url).send("body", &phones(&["+1555"])).await.unwrap_err();
        assert_eq!(
            err,
            DeliveryError::Rejected {
                code: 310000,
                message: "keywords not in content".into()
            }
        );
    }

    #[tokio::test]
    async fn http_error_status_is_a_rejection() {
        let (url, _robot) =
            start_robot(StatusCode::INTERNAL_SERVER_ERROR, json!({"error": "boom"})).await;

        let err = sender(&url).send("body", &phones(&["+1555"])).await.unwrap_err();
        assert!(matches!(err, DeliveryError::Rejected { code: 500, .. }));
    }

    #[tokio::test]
    async fn unreachable_robot_is_a_transport_failure() {
        // Bind then drop to obtain a port with nothing listening.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = sender(&format!("http://{addr}/robot/send"))
            .send("body", &phones(&["+1555"]))
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::Transport { .. }));
    }

    #[test]
    fn invalid_webhook_url_is_rejected_at_construction() {
        let err = DingTalkSender::new(DingTalkConfig {
            webhook_url: "not a url".into(),
            access_token: "t".into(),
            secret: None,
            title: "t".into(),
            timeout: Duration::from_secs(1),
        })
        .unwrap_err();
        assert!(matches!(err, DingTalkError::InvalidUrl { .. }));
    }
}
