//! Robot webhook wire types.

use events::{DeliveryError, Recipient};
use serde::{Deserialize, Serialize};

/// Request body for a markdown robot message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RobotMessage {
    msgtype: &'static str,
    markdown: Markdown,
    at: At,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct Markdown {
    title: String,
    text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
struct At {
    at_mobiles: Vec<String>,
    is_at_all: bool,
}

impl RobotMessage {
    /// Builds a markdown message mentioning every recipient.
    pub fn markdown(title: &str, body: &str, recipients: &[Recipient]) -> Self {
        let mobiles: Vec<String> = recipients.iter().map(|r| r.as_str().to_string()).collect();
        let mentions = mobiles
            .iter()
            .map(|m| format!("@{m}"))
            .collect::<Vec<_>>()
            .join(" ");
        Self {
            msgtype: "markdown",
            markdown: Markdown {
                title: title.to_string(),
                text: format!("{body}\n---\n{mentions}"),
            },
            at: At {
                at_mobiles: mobiles,
                is_at_all: false,
            },
        }
    }
}

/// Robot reply; `errcode` 0 means accepted.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RobotReply {
    pub errcode: i64,
    #[serde(default)]
    pub errmsg: String,
}

impl RobotReply {
    /// Converts a non-zero `errcode` into [`DeliveryError::Rejected`].
    pub fn into_result(self) -> Result<(), DeliveryError> {
        if self.errcode == 0 {
            Ok(())
        } else {
            Err(DeliveryError::Rejected {
                code: self.errcode,
                message: self.errmsg,
            })
        }
    }
}
