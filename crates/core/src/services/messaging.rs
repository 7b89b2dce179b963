//! Messaging substrate seam.
//!
//! [`MessageSender`] is the boundary to whatever actually talks to the chat
//! platform. [`ObservedSender`] wraps one so every send and every user action
//! is announced on the [`HookRegistry`] first.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rover_common::AppResult;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::hooks::{ActivityObserved, DispatchReport, HookRegistry, Origin, SendObserved};

/// Kind of channel a message is delivered on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    /// One-to-one conversation with a user.
    Direct,
    /// Group conversation.
    Group,
}

impl ChannelKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Group => "group",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A prepared message payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub payload: Value,
}

impl OutboundMessage {
    #[must_use]
    pub const fn new(payload: Value) -> Self {
        Self { payload }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            payload: Value::String(text.into()),
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        self.payload.as_str()
    }
}

/// Where one message goes and which bot account sends it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastTarget {
    pub channel_kind: ChannelKind,
    pub recipient_id: String,
    /// Platform adapter the recipient was seen on.
    pub origin_bot_id: String,
    /// Bot account chosen by routing; empty until resolved.
    pub bot_self_id: String,
}

impl BroadcastTarget {
    pub fn new(
        channel_kind: ChannelKind,
        recipient_id: impl Into<String>,
        origin_bot_id: impl Into<String>,
    ) -> Self {
        Self {
            channel_kind,
            recipient_id: recipient_id.into(),
            origin_bot_id: origin_bot_id.into(),
            bot_self_id: String::new(),
        }
    }

    #[must_use]
    pub fn with_bot_self_id(mut self, bot_self_id: impl Into<String>) -> Self {
        self.bot_self_id = bot_self_id.into();
        self
    }

    #[must_use]
    pub fn is_resolved(&self) -> bool {
        !self.bot_self_id.is_empty()
    }
}

/// Sends one message through the chat platform.
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send(
        &self,
        message: &OutboundMessage,
        target: &BroadcastTarget,
        extra: Option<&Value>,
    ) -> AppResult<()>;
}

/// [`MessageSender`] decorator that announces events on the hook registry.
pub struct ObservedSender<S> {
    inner: S,
    registry: Arc<HookRegistry>,
}

impl<S: MessageSender> ObservedSender<S> {
    pub const fn new(inner: S, registry: Arc<HookRegistry>) -> Self {
        Self { inner, registry }
    }

    #[must_use]
    pub const fn registry(&self) -> &Arc<HookRegistry> {
        &self.registry
    }

    /// Announce the send, then deliver it. Hook outcomes never change the result.
    pub async fn send_as(
        &self,
        origin: &Origin,
        message: &OutboundMessage,
        target: &BroadcastTarget,
        extra: Option<&Value>,
    ) -> AppResult<()> {
        let event = SendObserved {
            message: message.clone(),
            target: target.clone(),
            origin: origin.clone(),
        };
        let report = self.registry.dispatch_send(&event).await;
        tracing::debug!(
            origin = %origin,
            channel = %target.channel_kind,
            recipient = %target.recipient_id,
            hooks = report.invoked,
            failed = report.failed,
            "Dispatched send hooks"
        );

        self.inner.send(message, target, extra).await
    }

    /// Entry point for the substrate when a user acts.
    pub async fn user_acted(
        &self,
        origin: Origin,
        user_id: &str,
        bot_id: &str,
        bot_self_id: &str,
    ) -> DispatchReport {
        let event = ActivityObserved {
            user_id: user_id.to_string(),
            bot_id: bot_id.to_string(),
            bot_self_id: bot_self_id.to_string(),
            observed_at: Utc::now(),
            origin,
        };
        self.registry.dispatch_activity(&event).await
    }

    /// A sender that attributes every send to `origin`.
    #[must_use]
    pub fn attributed(self: &Arc<Self>, origin: Origin) -> AttributedSender<S> {
        AttributedSender {
            sender: self.clone(),
            origin,
        }
    }
}

/// An [`ObservedSender`] bound to one origin.
pub struct AttributedSender<S> {
    sender: Arc<ObservedSender<S>>,
    origin: Origin,
}

impl<S> AttributedSender<S> {
    #[must_use]
    pub const fn origin(&self) -> &Origin {
        &self.origin
    }
}

#[async_trait]
impl<S: MessageSender> MessageSender for AttributedSender<S> {
    async fn send(
        &self,
        message: &OutboundMessage,
        target: &BroadcastTarget,
        extra: Option<&Value>,
    ) -> AppResult<()> {
        self.sender.send_as(&self.origin, message, target, extra).await
    }
}
