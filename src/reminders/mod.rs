//! 提醒流水线：存储、调度（插入）、投递（pending → sent）

pub mod scheduler;
pub mod store;
pub mod worker;

pub use scheduler::{default_lead, parse_clock, ReminderScheduler, ScheduleReport};
pub use store::{
    InMemoryReminderStore, InsertOutcome, NewReminder, ReminderRecord, ReminderStatus,
    ReminderStore, SqliteReminderStore,
};
pub use worker::{format_reminder, DispatchWorker, SweepReport};
