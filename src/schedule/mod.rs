//! PU time handling - resolution, lead times, the picker and delivery.

pub mod datetime;
pub mod offset;
pub mod planner;
pub mod scheduler;
pub mod selection;
pub mod tz;

pub use datetime::{strip_pu_prefix, DateTimeResolver, Grammar, ResolveError};
pub use offset::{parse_offset, parse_offset_line, LeadTime};
pub use planner::FireTimePlanner;
pub use scheduler::{
    spawn_timer, DelayedExecutor, JobId, JobQueue, PastDuePolicy, ScheduleError, Scheduled,
    ScheduledJob, SchedulerAdapter, TimerHandle,
};
pub use selection::{
    CallbackData, Choice, Selection, SelectionPhase, SelectionToken, SubmitOutcome, ToggleOutcome,
};
pub use tz::TimezoneTable;
