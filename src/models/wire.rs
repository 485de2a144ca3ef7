use serde::{ Serialize, Deserialize };
use serde_json::Value as JsonValue;

use crate::models::chat::{ ChatMessage, SenderType };

/// Events emitted by the client over the realtime channel.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "join:conversation")] JoinConversation {
        #[serde(rename = "conversationId")]
        conversation_id: i64,
    },
    #[serde(rename = "send:message")] SendMessage {
        message: String,
        #[serde(rename = "tempId")]
        temp_id: String,
        metadata: JsonValue,
        #[serde(rename = "conversationId", skip_serializing_if = "Option::is_none")]
        conversation_id: Option<i64>,
        #[serde(rename = "senderType")]
        sender_type: SenderType,
        #[serde(rename = "senderId")]
        sender_id: Option<i64>,
        #[serde(rename = "tenantId")]
        tenant_id: String,
        #[serde(rename = "userId")]
        user_id: Option<i64>,
    },
    #[serde(rename = "typing")] Typing {
        #[serde(rename = "isTyping")]
        is_typing: bool,
        #[serde(rename = "conversationId", skip_serializing_if = "Option::is_none")]
        conversation_id: Option<i64>,
    },
}

/// Events pushed by the server. Transport lifecycle (connect/disconnect) is
/// surfaced separately by the connection manager, not through this enum.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "session-initialized")] SessionInitialized {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
    #[serde(rename = "conversation:created")] ConversationCreated {
        #[serde(rename = "conversationId")]
        conversation_id: i64,
    },
    #[serde(rename = "conversation-updated")] ConversationUpdated {
        #[serde(rename = "conversationId")]
        conversation_id: i64,
    },
    #[serde(rename = "message")] Message {
        #[serde(flatten)]
        message: ChatMessage,
    },
    #[serde(rename = "message:confirmed")] MessageConfirmed {
        #[serde(rename = "tempId")]
        temp_id: String,
        #[serde(rename = "messageId")]
        message_id: i64,
    },
    #[serde(rename = "message:failed")] MessageFailed {
        #[serde(rename = "tempId")]
        temp_id: String,
        #[serde(default)]
        error: Option<String>,
    },
    #[serde(rename = "typing")] Typing {
        #[serde(rename = "userId", default)]
        user_id: Option<i64>,
        #[serde(rename = "isTyping")]
        is_typing: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chat::{ MessageId, MessageStatus };

    #[test]
    fn send_message_wire_shape() {
        let event = ClientEvent::SendMessage {
            message: "hello".to_string(),
            temp_id: "tmp-1".to_string(),
            metadata: serde_json::json!({ "guest": true }),
            conversation_id: None,
            sender_type: SenderType::Guest,
            sender_id: None,
            tenant_id: "shop-1".to_string(),
            user_id: None,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "send:message");
        assert_eq!(json["tempId"], "tmp-1");
        assert!(json.get("conversationId").is_none());
    }

    #[test]
    fn parses_confirmation_event() {
        let raw = r#"{"type":"message:confirmed","tempId":"tmp-9","messageId":120}"#;
        match serde_json::from_str::<ServerEvent>(raw).unwrap() {
            ServerEvent::MessageConfirmed { temp_id, message_id } => {
                assert_eq!(temp_id, "tmp-9");
                assert_eq!(message_id, 120);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn parses_pushed_message_without_status() {
        let raw = r#"{
            "type": "message",
            "id": 55,
            "conversationId": 7,
            "senderType": "USER",
            "message": "need help",
            "createdAt": "2024-05-01T10:00:00Z"
        }"#;
        match serde_json::from_str::<ServerEvent>(raw).unwrap() {
            ServerEvent::Message { message } => {
                assert_eq!(message.id, MessageId::Confirmed(55));
                assert_eq!(message.status, MessageStatus::Sent);
                assert_eq!(message.conversation_id, Some(7));
                assert!(message.temp_id.is_none());
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn parses_failed_event_without_error_detail() {
        let raw = r#"{"type":"message:failed","tempId":"tmp-2"}"#;
        match serde_json::from_str::<ServerEvent>(raw).unwrap() {
            ServerEvent::MessageFailed { temp_id, error } => {
                assert_eq!(temp_id, "tmp-2");
                assert!(error.is_none());
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
