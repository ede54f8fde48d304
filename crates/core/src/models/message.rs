use serde::{Deserialize, Serialize};

use super::analysis::{AnalysisResult, MarketData};
use super::snapshot::Snapshot;

/// An execution context. Each one runs its own event loop and only talks to
/// the others through [`Message`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Context {
    /// The page observer that produces snapshots.
    Page,
    /// The long-lived background coordinator.
    Coordinator,
    /// The UI panel.
    Panel,
}

impl Context {
    pub const ALL: [Context; 3] = [Context::Page, Context::Coordinator, Context::Panel];

    /// Message kinds this context is allowed to publish.
    pub fn publishes(&self) -> &'static [MessageKind] {
        match self {
            Context::Page => &[MessageKind::PageSnapshot],
            Context::Coordinator => &[
                MessageKind::Loading,
                MessageKind::Result,
                MessageKind::Error,
                MessageKind::RefreshRequest,
            ],
            Context::Panel => &[MessageKind::ManualRefresh],
        }
    }

    /// Message kinds delivered to this context.
    pub fn consumes(&self) -> &'static [MessageKind] {
        match self {
            Context::Page => &[MessageKind::RefreshRequest],
            Context::Coordinator => &[MessageKind::PageSnapshot, MessageKind::ManualRefresh],
            Context::Panel => &[MessageKind::Loading, MessageKind::Result, MessageKind::Error],
        }
    }
}

impl std::fmt::Display for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Context::Page => write!(f, "page"),
            Context::Coordinator => write!(f, "coordinator"),
            Context::Panel => write!(f, "panel"),
        }
    }
}

/// Discriminant of [`Message`], used for routing tables and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    PageSnapshot,
    ManualRefresh,
    Loading,
    Result,
    Error,
    RefreshRequest,
}

/// Payload of a successful analysis delivered to the panel.
///
/// The source fields travel with the result so the panel never has to re-read
/// shared state that may have moved on since the request was issued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultPayload {
    pub analysis: AnalysisResult,
    pub market: Option<MarketData>,
    pub source_title: String,
    pub source_url: String,
}

/// The closed set of cross-context messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    /// page → coordinator
    PageSnapshot(Snapshot),
    /// panel → coordinator
    ManualRefresh {
        #[serde(default)]
        troll_level: Option<u8>,
    },
    /// coordinator → panel
    Loading { title: String, url: String },
    /// coordinator → panel
    Result(Box<ResultPayload>),
    /// coordinator → panel
    Error { message: String },
    /// coordinator → page
    RefreshRequest,
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::PageSnapshot(_) => MessageKind::PageSnapshot,
            Message::ManualRefresh { .. } => MessageKind::ManualRefresh,
            Message::Loading { .. } => MessageKind::Loading,
            Message::Result(_) => MessageKind::Result,
            Message::Error { .. } => MessageKind::Error,
            Message::RefreshRequest => MessageKind::RefreshRequest,
        }
    }

    /// The context that may publish this message.
    pub fn origin(&self) -> Context {
        match self.kind() {
            MessageKind::PageSnapshot => Context::Page,
            MessageKind::ManualRefresh => Context::Panel,
            _ => Context::Coordinator,
        }
    }

    /// The context this message is delivered to.
    pub fn destination(&self) -> Context {
        match self.kind() {
            MessageKind::PageSnapshot | MessageKind::ManualRefresh => Context::Coordinator,
            MessageKind::RefreshRequest => Context::Page,
            MessageKind::Loading | MessageKind::Result | MessageKind::Error => Context::Panel,
        }
    }
}
