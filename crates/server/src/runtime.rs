//! Wiring of every long-lived component.

use std::sync::Arc;

use rover_common::{AppResult, Config, Metrics, MetricsSnapshot};
use rover_core::{
    ActivityAggregator, ActivityQueryService, ActivityRecorder, BindingRefresher, FlushTask,
    GatedActivitySink, HookRegistry, MessageSender, ObservedSender, StoredBindingResolver,
    WriteGate, observers,
};
use rover_db::repositories::{
    GroupBindingRepository, SignRecordRepository, SubscriptionRepository, UserActivityRepository,
};
use rover_queue::{
    BroadcastDispatcher, JobStateStore, Orchestrator, PacingConfig, SIGN_RESULT_TASK,
    SchedulePlan, SchedulerTask, SubscriptionNotifier, run_scheduler,
};
use sea_orm::DatabaseConnection;

use crate::adapters::{IdleSignRunner, LogSender};

/// Namespace this module registers its hooks under.
pub const NAMESPACE: &str = "RoverSign";

/// Running components, in the order they have to be stopped.
pub struct Runtime {
    metrics: Arc<Metrics>,
    scheduler: SchedulerTask,
    binding_refresher: Arc<BindingRefresher>,
    flush_task: FlushTask,
    activity: ActivityQueryService,
    config: Config,
}

impl Runtime {
    /// Build every component and start the background tasks.
    pub fn start(config: Config, db: DatabaseConnection) -> AppResult<Self> {
        let db = Arc::new(db);
        let metrics = Arc::new(Metrics::new());
        let timing = &config.timing;

        // Activity and binding writes contend on different rows
        let activity_gate = Arc::new(WriteGate::new(
            "activity",
            timing.write_lock_timeout(),
            metrics.clone(),
        ));
        let binding_gate = Arc::new(WriteGate::new(
            "group_binding",
            timing.write_lock_timeout(),
            metrics.clone(),
        ));

        let subscriptions = SubscriptionRepository::new(db.clone());
        let groups = GroupBindingRepository::new(db.clone());

        let activity = ActivityQueryService::new(
            UserActivityRepository::new(db.clone()),
            config.schedule.active_days,
        );
        let aggregator = Arc::new(ActivityAggregator::new(
            Arc::new(GatedActivitySink::new(
                UserActivityRepository::new(db.clone()),
                activity_gate,
            )),
            timing.activity_flush_interval(),
            metrics.clone(),
        ));

        let registry = Arc::new(HookRegistry::new(metrics.clone()));
        let namespace = registry.namespace(NAMESPACE);
        let binding_refresher = Arc::new(BindingRefresher::new(groups.clone(), binding_gate));
        observers::install(
            &namespace,
            &Arc::new(ActivityRecorder::new(NAMESPACE, aggregator.clone())),
            &binding_refresher,
        );

        let observed = Arc::new(ObservedSender::new(LogSender, registry));
        let sender: Arc<dyn MessageSender> = Arc::new(observed.attributed(namespace.origin()));

        let dispatcher = Arc::new(BroadcastDispatcher::new(
            sender.clone(),
            Arc::new(StoredBindingResolver::new(
                SIGN_RESULT_TASK,
                subscriptions.clone(),
                groups,
            )),
            PacingConfig::from_timing(timing),
            metrics.clone(),
        ));

        let store = Arc::new(JobStateStore::new(
            config.state.state_file(),
            timing.stale_job_threshold(),
            metrics.clone(),
        ));

        let orchestrator = Arc::new(Orchestrator::new(
            store,
            Arc::new(IdleSignRunner),
            Arc::new(SubscriptionNotifier::new(
                SIGN_RESULT_TASK,
                subscriptions,
                sender,
            )),
            dispatcher,
            SignRecordRepository::new(db),
            config.schedule.clone(),
            metrics.clone(),
        ));

        let plan = SchedulePlan::from_config(&config.schedule, timing)?;
        tracing::info!(jobs = ?plan.ids(), "Registering scheduled jobs");

        let scheduler = run_scheduler(plan, orchestrator);
        let flush_task = aggregator.start();

        Ok(Self {
            metrics,
            scheduler,
            binding_refresher,
            flush_task,
            activity,
            config,
        })
    }

    /// Read side of the activity table.
    #[must_use]
    pub const fn activity(&self) -> &ActivityQueryService {
        &self.activity
    }

    /// Stop the scheduler, let pending binding writes land, then drain the
    /// activity buffer. Each step waits at most the shutdown grace.
    ///
    /// A sign-in job interrupted here keeps its state record and is picked
    /// up again on the next start.
    pub async fn shutdown(self) -> MetricsSnapshot {
        let grace = self.config.timing.shutdown_flush_grace();

        self.scheduler.shutdown(grace).await;
        self.binding_refresher.drain(grace).await;
        self.flush_task.shutdown(grace).await;

        self.metrics.snapshot()
    }
}
