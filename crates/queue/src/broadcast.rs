//! Paced fan-out of a prepared message batch.

use std::sync::Arc;

use rover_common::Metrics;
use rover_core::{BindingResolver, BroadcastTarget, ChannelKind, MessageSender, OutboundMessage};

use crate::pacing::{Pacer, PacingConfig};

/// Messages for one recipient.
#[derive(Debug, Clone, PartialEq)]
pub struct BroadcastEntry {
    pub recipient_id: String,
    /// Bot tag carried by the payload; last-resort routing.
    pub origin_bot_id: String,
    pub messages: Vec<OutboundMessage>,
}

impl BroadcastEntry {
    pub fn new(
        recipient_id: impl Into<String>,
        origin_bot_id: impl Into<String>,
        messages: Vec<OutboundMessage>,
    ) -> Self {
        Self {
            recipient_id: recipient_id.into(),
            origin_bot_id: origin_bot_id.into(),
            messages,
        }
    }
}

/// A batch split by channel kind. Delivery follows insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BroadcastBatch {
    pub direct: Vec<BroadcastEntry>,
    pub group: Vec<BroadcastEntry>,
}

impl BroadcastBatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, channel_kind: ChannelKind, entry: BroadcastEntry) {
        match channel_kind {
            ChannelKind::Direct => self.direct.push(entry),
            ChannelKind::Group => self.group.push(entry),
        }
    }

    #[must_use]
    pub fn recipient_count(&self) -> usize {
        self.direct.len() + self.group.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.recipient_count() == 0
    }
}

/// Outcome of one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Recipients that had at least one send attempted.
    pub attempted: usize,
    /// Messages accepted by the sender.
    pub delivered: usize,
    /// Messages the sender rejected.
    pub failed: usize,
    /// Recipients dropped for lack of a bot account.
    pub skipped: usize,
}

/// Delivers batches recipient by recipient.
pub struct BroadcastDispatcher {
    sender: Arc<dyn MessageSender>,
    resolver: Arc<dyn BindingResolver>,
    pacing: PacingConfig,
    metrics: Arc<Metrics>,
}

impl BroadcastDispatcher {
    #[must_use]
    pub fn new(
        sender: Arc<dyn MessageSender>,
        resolver: Arc<dyn BindingResolver>,
        pacing: PacingConfig,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            sender,
            resolver,
            pacing,
            metrics,
        }
    }

    /// Deliver every entry once. Per-recipient failures never stop the batch.
    pub async fn dispatch(&self, batch: &BroadcastBatch, task: &str) -> BroadcastReport {
        tracing::info!(
            task,
            direct = batch.direct.len(),
            group = batch.group.len(),
            "Broadcast started"
        );

        let mut pacer = Pacer::new(self.pacing.clone());
        let mut report = BroadcastReport::default();

        for (kind, entries) in [
            (ChannelKind::Direct, &batch.direct),
            (ChannelKind::Group, &batch.group),
        ] {
            for entry in entries {
                self.deliver(kind, entry, &mut pacer, &mut report).await;
            }
            tracing::info!(task, channel = %kind, "Broadcast pass finished");
        }

        tracing::info!(
            task,
            attempted = report.attempted,
            delivered = report.delivered,
            failed = report.failed,
            skipped = report.skipped,
            "Broadcast finished"
        );
        report
    }

    async fn deliver(
        &self,
        kind: ChannelKind,
        entry: &BroadcastEntry,
        pacer: &mut Pacer,
        report: &mut BroadcastReport,
    ) {
        let Some(bot_self_id) = self.route(kind, entry).await else {
            report.skipped += 1;
            self.metrics.record_delivery_skipped();
            tracing::warn!(
                channel = %kind,
                recipient = %entry.recipient_id,
                "No bot account for recipient, skipping"
            );
            return;
        };

        let target = BroadcastTarget::new(kind, &entry.recipient_id, &entry.origin_bot_id)
            .with_bot_self_id(bot_self_id);
        report.attempted += 1;

        for message in &entry.messages {
            pacer.before_send().await;
            match self.sender.send(message, &target, None).await {
                Ok(()) => {
                    report.delivered += 1;
                    self.metrics.record_delivery(true);
                }
                Err(e) => {
                    report.failed += 1;
                    self.metrics.record_delivery(false);
                    tracing::error!(
                        channel = %kind,
                        recipient = %entry.recipient_id,
                        error = %e,
                        "Broadcast delivery failed"
                    );
                }
            }
        }
    }

    /// Stored binding first, then the payload's bot tag.
    async fn route(&self, kind: ChannelKind, entry: &BroadcastEntry) -> Option<String> {
        let stored = match self
            .resolver
            .resolve(kind, &entry.recipient_id, &entry.origin_bot_id)
            .await
        {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(
                    recipient = %entry.recipient_id,
                    error = %e,
                    "Binding lookup failed, falling back to payload tag"
                );
                None
            }
        };

        stored
            .filter(|id| !id.is_empty())
            .or_else(|| Some(entry.origin_bot_id.clone()).filter(|id| !id.is_empty()))
    }
}
