use serde::{Deserialize, Serialize};

// ===== REQUEST MODELS =====

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub session_id: String,
    pub query: String,
}

// ===== SESSION METADATA =====

/// Session metadata as returned by `/sessions` routes. Never carries
/// memory contents.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionMeta {
    pub id: String,
    pub title: String,
    pub turns: u64,
}

// ===== STRATEGY LABEL =====

/// Retrieval path selected by the complexity classifier for one turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStrategy {
    SimpleConversation,
    Complex,
    MultiHop,
}

impl QueryStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryStrategy::SimpleConversation => "simple_conversation",
            QueryStrategy::Complex => "complex",
            QueryStrategy::MultiHop => "multi_hop",
        }
    }
}

// ===== CHAT COMPLETION MESSAGE =====

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

// ===== STREAM EVENT MODELS =====

/// Page locator shown to the caller. Numeric when the chunk carries a
/// page, otherwise the "—" placeholder.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum PageRef {
    Number(u32),
    Label(String),
}

impl PageRef {
    pub fn placeholder() -> Self {
        PageRef::Label("—".to_string())
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SourceInfo {
    pub title: String,
    pub page: PageRef,
    pub snippet: String,
}

/// One NDJSON line of the chat stream. `Done` or `Error` is always the
/// terminal event of a turn.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Strategy { strategy: QueryStrategy },
    Reasoning { subqueries: Vec<String> },
    Token { content: String },
    Sources { sources: Vec<SourceInfo> },
    Done,
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_event_wire_shape() {
        let line = serde_json::to_string(&StreamEvent::Strategy {
            strategy: QueryStrategy::Complex,
        })
        .unwrap();
        assert_eq!(line, r#"{"type":"strategy","strategy":"complex"}"#);
    }

    #[test]
    fn token_event_keeps_trailing_space() {
        let line = serde_json::to_string(&StreamEvent::Token {
            content: "word ".to_string(),
        })
        .unwrap();
        assert_eq!(line, r#"{"type":"token","content":"word "}"#);
    }

    #[test]
    fn terminal_events_wire_shape() {
        assert_eq!(
            serde_json::to_string(&StreamEvent::Done).unwrap(),
            r#"{"type":"done"}"#
        );
        assert_eq!(
            serde_json::to_string(&StreamEvent::Error {
                message: "boom".to_string()
            })
            .unwrap(),
            r#"{"type":"error","message":"boom"}"#
        );
    }

    #[test]
    fn source_page_is_number_or_label() {
        let numbered = SourceInfo {
            title: "act.md".to_string(),
            page: PageRef::Number(12),
            snippet: "…".to_string(),
        };
        let json = serde_json::to_string(&numbered).unwrap();
        assert!(json.contains(r#""page":12"#));

        let placeholder = SourceInfo {
            title: "act.md".to_string(),
            page: PageRef::placeholder(),
            snippet: "…".to_string(),
        };
        let json = serde_json::to_string(&placeholder).unwrap();
        assert!(json.contains(r#""page":"—""#));
    }

    #[test]
    fn strategy_label_round_trip() {
        for (label, strategy) in [
            ("simple_conversation", QueryStrategy::SimpleConversation),
            ("complex", QueryStrategy::Complex),
            ("multi_hop", QueryStrategy::MultiHop),
        ] {
            assert_eq!(strategy.as_str(), label);
            let parsed: QueryStrategy =
                serde_json::from_str(&format!("\"{label}\"")).unwrap();
            assert_eq!(parsed, strategy);
        }
    }
}
