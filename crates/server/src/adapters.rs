//! Stand-ins for the chat platform and the sign-in backend.
//!
//! The binary runs the orchestration machinery on its own; a deployment
//! plugs real implementations in behind the same traits.

use async_trait::async_trait;
use rover_common::AppResult;
use rover_core::{BroadcastTarget, MessageSender, OutboundMessage};
use rover_queue::{JobKind, ProgressReporter, SignOutcome, SignRunner};
use serde_json::Value;

/// Writes every outbound message to the log instead of a chat platform.
#[derive(Debug, Default)]
pub struct LogSender;

#[async_trait]
impl MessageSender for LogSender {
    async fn send(
        &self,
        message: &OutboundMessage,
        target: &BroadcastTarget,
        _extra: Option<&Value>,
    ) -> AppResult<()> {
        tracing::info!(
            channel = %target.channel_kind,
            recipient = %target.recipient_id,
            bot_id = %target.origin_bot_id,
            bot_self_id = %target.bot_self_id,
            payload = %message.payload,
            "Outbound message"
        );
        Ok(())
    }
}

/// Sign-in backend with no accounts.
#[derive(Debug, Default)]
pub struct IdleSignRunner;

#[async_trait]
impl SignRunner for IdleSignRunner {
    async fn run(
        &self,
        kind: JobKind,
        resume_from: u64,
        progress: &ProgressReporter,
    ) -> AppResult<SignOutcome> {
        tracing::warn!(kind = %kind, resume_from, "No sign-in backend attached");
        progress.set_total(0).await;
        Ok(SignOutcome {
            summary: format!("[RoverSign] {} finished: no accounts to sign in.", kind.label()),
            broadcast: None,
        })
    }
}
