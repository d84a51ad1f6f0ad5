//! Messages exchanged between pages (popup, content scripts) and the background process.

use serde::{Deserialize, Serialize};

use super::storage::entities::TimeData;

/// Requests a page can make. Tagged by `action`, payload fields inline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Request {
    GetTimeData,
    #[serde(rename_all = "camelCase")]
    AddDomain {
        domain: String,
        #[serde(default)]
        name: Option<String>,
        /// Milliseconds.
        time_limit: u64,
    },
    RemoveDomain {
        domain: String,
    },
    #[serde(rename_all = "camelCase")]
    UpdateDomainTimeLimit {
        domain: String,
        /// Milliseconds.
        time_limit: u64,
    },
    IgnoreDomain {
        domain: String,
    },
    ResetCounters,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    // Listed first: untagged decoding would otherwise read any outcome as empty time data.
    Outcome {
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        error: Option<String>,
    },
    TimeData(TimeData),
}

impl Response {
    pub fn success() -> Self {
        Self::Outcome {
            success: true,
            error: None,
        }
    }

    pub fn failure(error: impl ToString) -> Self {
        Self::Outcome {
            success: false,
            error: Some(error.to_string()),
        }
    }
}

impl<E: ToString> From<Result<(), E>> for Response {
    fn from(value: Result<(), E>) -> Self {
        match value {
            Ok(()) => Self::success(),
            Err(e) => Self::failure(e),
        }
    }
}

/// Messages the background pushes to a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PageMessage {
    #[serde(rename_all = "camelCase")]
    BlockSite {
        /// Display name of the blocked site.
        site: String,
        /// Daily budget in minutes.
        time_limit: f64,
    },
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn requests_decode_from_page_payloads() {
        let add: Request = serde_json::from_value(json!({
            "action": "ADD_DOMAIN",
            "domain": "new.example.com",
            "name": "Example",
            "timeLimit": 600000,
        }))
        .unwrap();
        assert_eq!(
            add,
            Request::AddDomain {
                domain: "new.example.com".into(),
                name: Some("Example".into()),
                time_limit: 600_000,
            }
        );

        let reset: Request = serde_json::from_value(json!({"action": "RESET_COUNTERS"})).unwrap();
        assert_eq!(reset, Request::ResetCounters);

        let update: Request = serde_json::from_value(json!({
            "action": "UPDATE_DOMAIN_TIME_LIMIT",
            "domain": "x.com",
            "timeLimit": 1,
        }))
        .unwrap();
        assert!(matches!(update, Request::UpdateDomainTimeLimit { time_limit: 1, .. }));

        assert!(serde_json::from_value::<Request>(json!({"action": "UPDATE_TIME_LIMIT"})).is_err());
    }

    #[test]
    fn responses_encode_like_the_extension_expects() {
        assert_eq!(
            serde_json::to_value(Response::success()).unwrap(),
            json!({"success": true})
        );
        assert_eq!(
            serde_json::to_value(Response::failure("Domain not found")).unwrap(),
            json!({"success": false, "error": "Domain not found"})
        );
        assert_eq!(
            serde_json::to_value(Response::TimeData(TimeData::default())).unwrap(),
            json!({"sites": {}, "ignoredUntil": {}})
        );
    }

    #[test]
    fn block_message_payload() {
        let message = PageMessage::BlockSite {
            site: "YouTube".into(),
            time_limit: 1.0,
        };
        assert_eq!(
            serde_json::to_value(message).unwrap(),
            json!({"action": "BLOCK_SITE", "site": "YouTube", "timeLimit": 1.0})
        );
    }
}
