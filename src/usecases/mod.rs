//! Application use cases. Orchestrate domain logic via ports.

pub mod fanout_coordinator;
pub mod history_service;
pub mod metrics_aggregator;
pub mod reminder_scheduler;
pub mod session_manager;

pub use fanout_coordinator::{DEFAULT_FANOUT_CONCURRENCY, FanoutCoordinator, FanoutReport};
pub use history_service::{HistoryPeriod, HistoryService, HistoryTotals};
pub use metrics_aggregator::MetricsAggregator;
pub use reminder_scheduler::{ArmReport, ReminderScheduler};
pub use session_manager::{
    CreateOutcome, SessionManager, SessionPorts, SessionView, StartOutcome, TickReport,
    TrackingStatus,
};
