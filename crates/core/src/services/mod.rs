//! Core services.

pub mod activity;
pub mod activity_query;
pub mod binding;
pub mod hooks;
pub mod messaging;
pub mod observers;
pub mod write_gate;

pub use activity::{
    ActivityAggregator, ActivitySignal, ActivitySink, FlushReport, FlushTask, GatedActivitySink,
};
pub use activity_query::ActivityQueryService;
pub use binding::{BindingResolver, StoredBindingResolver};
pub use hooks::{
    ActivityHook, ActivityObserved, DispatchReport, HookNamespace, HookRegistry, Origin, SendHook,
    SendObserved,
};
pub use messaging::{
    AttributedSender, BroadcastTarget, ChannelKind, MessageSender, ObservedSender, OutboundMessage,
};
pub use observers::{ActivityRecorder, BindingRefresher};
pub use write_gate::{WriteGate, WriteGuard};
