//! Namespaced observer registry for send and activity events.
//!
//! Each consumer module owns one [`HookNamespace`] obtained from the shared
//! [`HookRegistry`]. Dispatch walks namespaces in creation order and hooks in
//! registration order. A hook that errors or panics is logged and counted;
//! the remaining hooks still run and the triggering operation is unaffected.

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use rover_common::{AppResult, Metrics};

use super::messaging::{BroadcastTarget, OutboundMessage};

/// Module that initiated an observed action.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Origin {
    /// A registered consumer module, by namespace name.
    Namespace(Arc<str>),
    /// Anything not attributed to a consumer module.
    External,
}

impl Origin {
    pub fn namespace(name: impl Into<Arc<str>>) -> Self {
        Self::Namespace(name.into())
    }

    /// Whether this origin is the given namespace.
    #[must_use]
    pub fn is(&self, namespace: &str) -> bool {
        matches!(self, Self::Namespace(name) if name.as_ref() == namespace)
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Namespace(name) => f.write_str(name),
            Self::External => f.write_str("external"),
        }
    }
}

/// A message is about to be delivered.
#[derive(Debug, Clone)]
pub struct SendObserved {
    pub message: OutboundMessage,
    pub target: BroadcastTarget,
    pub origin: Origin,
}

/// A user acted on some bot account.
#[derive(Debug, Clone)]
pub struct ActivityObserved {
    pub user_id: String,
    pub bot_id: String,
    pub bot_self_id: String,
    pub observed_at: DateTime<Utc>,
    pub origin: Origin,
}

impl ActivityObserved {
    /// Whether the action came from the given namespace.
    #[must_use]
    pub fn initiated_by(&self, namespace: &str) -> bool {
        self.origin.is(namespace)
    }
}

#[async_trait]
pub trait SendHook: Send + Sync {
    async fn on_send(&self, event: &SendObserved) -> AppResult<()>;
}

#[async_trait]
pub trait ActivityHook: Send + Sync {
    async fn on_activity(&self, event: &ActivityObserved) -> AppResult<()>;
}

/// Outcome of one dispatch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub invoked: usize,
    pub failed: usize,
}

/// Hooks registered by one consumer module.
pub struct HookNamespace {
    name: Arc<str>,
    send_hooks: RwLock<Vec<Arc<dyn SendHook>>>,
    activity_hooks: RwLock<Vec<Arc<dyn ActivityHook>>>,
}

impl HookNamespace {
    fn new(name: &str) -> Self {
        Self {
            name: Arc::from(name),
            send_hooks: RwLock::new(Vec::new()),
            activity_hooks: RwLock::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Origin value to attach to actions this module initiates.
    #[must_use]
    pub fn origin(&self) -> Origin {
        Origin::Namespace(self.name.clone())
    }

    /// Append a send hook. Returns `false` if the same hook is already present.
    pub fn register_send_hook(&self, hook: Arc<dyn SendHook>) -> bool {
        let mut hooks = self
            .send_hooks
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        push_unique(&mut hooks, hook)
    }

    /// Append an activity hook. Returns `false` if the same hook is already present.
    pub fn register_activity_hook(&self, hook: Arc<dyn ActivityHook>) -> bool {
        let mut hooks = self
            .activity_hooks
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        push_unique(&mut hooks, hook)
    }

    #[must_use]
    pub fn send_hook_count(&self) -> usize {
        self.send_hooks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn activity_hook_count(&self) -> usize {
        self.activity_hooks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn send_snapshot(&self) -> Vec<Arc<dyn SendHook>> {
        self.send_hooks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn activity_snapshot(&self) -> Vec<Arc<dyn ActivityHook>> {
        self.activity_hooks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl fmt::Debug for HookNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookNamespace")
            .field("name", &self.name)
            .field("send_hooks", &self.send_hook_count())
            .field("activity_hooks", &self.activity_hook_count())
            .finish()
    }
}

// Identity is the data pointer; vtable pointers are not stable across codegen units.
fn push_unique<T: ?Sized>(hooks: &mut Vec<Arc<T>>, hook: Arc<T>) -> bool {
    let ptr = Arc::as_ptr(&hook).cast::<()>();
    if hooks.iter().any(|h| Arc::as_ptr(h).cast::<()>() == ptr) {
        return false;
    }
    hooks.push(hook);
    true
}

/// Registry of every consumer namespace.
#[derive(Debug)]
pub struct HookRegistry {
    namespaces: RwLock<Vec<Arc<HookNamespace>>>,
    metrics: Arc<Metrics>,
}

impl HookRegistry {
    #[must_use]
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self {
            namespaces: RwLock::new(Vec::new()),
            metrics,
        }
    }

    /// Get the namespace with this name, creating it on first use.
    pub fn namespace(&self, name: &str) -> Arc<HookNamespace> {
        let mut namespaces = self
            .namespaces
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = namespaces.iter().find(|ns| ns.name() == name) {
            return existing.clone();
        }

        tracing::debug!(namespace = %name, "Created hook namespace");
        let ns = Arc::new(HookNamespace::new(name));
        namespaces.push(ns.clone());
        ns
    }

    #[must_use]
    pub fn namespace_names(&self) -> Vec<String> {
        self.snapshot()
            .iter()
            .map(|ns| ns.name().to_string())
            .collect()
    }

    fn snapshot(&self) -> Vec<Arc<HookNamespace>> {
        self.namespaces
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Run every send hook against `event`.
    pub async fn dispatch_send(&self, event: &SendObserved) -> DispatchReport {
        let mut report = DispatchReport::default();
        for ns in self.snapshot() {
            for hook in ns.send_snapshot() {
                report.invoked += 1;
                let outcome = AssertUnwindSafe(hook.on_send(event)).catch_unwind().await;
                if !self.settle(ns.name(), "send", outcome) {
                    report.failed += 1;
                }
            }
        }
        report
    }

    /// Run every activity hook against `event`.
    pub async fn dispatch_activity(&self, event: &ActivityObserved) -> DispatchReport {
        let mut report = DispatchReport::default();
        for ns in self.snapshot() {
            for hook in ns.activity_snapshot() {
                report.invoked += 1;
                let outcome = AssertUnwindSafe(hook.on_activity(event))
                    .catch_unwind()
                    .await;
                if !self.settle(ns.name(), "activity", outcome) {
                    report.failed += 1;
                }
            }
        }
        report
    }

    fn settle(
        &self,
        namespace: &str,
        kind: &'static str,
        outcome: Result<AppResult<()>, Box<dyn Any + Send>>,
    ) -> bool {
        match outcome {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                self.metrics.record_hook_failure();
                tracing::warn!(namespace = %namespace, kind, error = %e, "Hook failed");
                false
            }
            Err(panic) => {
                self.metrics.record_hook_failure();
                tracing::error!(
                    namespace = %namespace,
                    kind,
                    panic = %panic_message(panic.as_ref()),
                    "Hook panicked"
                );
                false
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string panic>")
}
