use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct ShareRequest {
    #[serde(rename = "shareUrl", default)]
    pub share_url: Option<String>,
}

/// Author of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Other,
}

impl Role {
    /// Map a `data-message-author-role` attribute value to a role.
    /// Anything other than the two known markers becomes `Other`.
    pub fn from_marker(marker: &str) -> Self {
        match marker {
            "user" => Role::User,
            "assistant" => Role::Assistant,
            _ => Role::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

/// Element counts gathered during extraction, exposed for diagnostics only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionStats {
    pub total_elements: usize,
    pub user_elements: usize,
    pub assistant_elements: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationResponse {
    pub success: bool,
    pub messages: Vec<Message>,
    pub title: String,
    pub debug: ExtractionStats,
    pub share_url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HtmlResponse {
    pub success: bool,
    pub html: String,
    pub share_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn role_markers() {
        assert_eq!(Role::from_marker("user"), Role::User);
        assert_eq!(Role::from_marker("assistant"), Role::Assistant);
        assert_eq!(Role::from_marker("system"), Role::Other);
        assert_eq!(Role::from_marker(""), Role::Other);
    }

    #[test]
    fn role_serializes_lowercase() {
        assert_eq!(serde_json::to_value(Role::User).unwrap(), json!("user"));
        assert_eq!(
            serde_json::to_value(Role::Assistant).unwrap(),
            json!("assistant")
        );
        assert_eq!(serde_json::to_value(Role::Other).unwrap(), json!("other"));
    }

    #[test]
    fn share_request_field_is_optional() {
        let req: ShareRequest = serde_json::from_str("{}").unwrap();
        assert!(req.share_url.is_none());

        let req: ShareRequest =
            serde_json::from_str(r#"{"shareUrl": "https://chatgpt.com/share/abc"}"#).unwrap();
        assert_eq!(req.share_url.as_deref(), Some("https://chatgpt.com/share/abc"));
    }

    #[test]
    fn stats_use_camel_case_keys() {
        let stats = ExtractionStats {
            total_elements: 3,
            user_elements: 1,
            assistant_elements: 2,
        };
        let value = serde_json::to_value(stats).unwrap();
        assert_eq!(value["totalElements"], 3);
        assert_eq!(value["userElements"], 1);
        assert_eq!(value["assistantElements"], 2);
    }

    #[test]
    fn conversation_response_shape() {
        let response = ConversationResponse {
            success: true,
            messages: vec![Message {
                role: Role::User,
                content: "hello world".to_string(),
            }],
            title: "Greetings".to_string(),
            debug: ExtractionStats::default(),
            share_url: "https://chatgpt.com/share/abc".to_string(),
        };
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["success"], true);
        assert_eq!(value["shareUrl"], "https://chatgpt.com/share/abc");
        assert_eq!(value["messages"][0]["role"], "user");
        assert_eq!(value["debug"]["totalElements"], 0);
    }
}
