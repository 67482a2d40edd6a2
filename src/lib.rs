//! Ayah Reminder: periodic Quran verse notifications.
//!
//! A background scheduler keeps one recurring timer alive, decides when a
//! verse is due, fetches it (falling back to an embedded list when offline),
//! and shows it as a desktop notification. Frontends talk to the scheduler
//! through versioned JSON envelopes.
//!
//! # Architecture
//!
//! - **Scheduler**: the [`scheduler::ReminderScheduler`] state machine, driven
//!   serially by [`scheduler::runner`]
//! - **Collaborators**: traits for the state store, timer service, verse
//!   source, notifications and link opening, with tokio/disk/HTTP/desktop
//!   implementations
//! - **Host**: control contract, router and stdin/stdout bridge used by the
//!   `ayah-host` binary

pub mod app_dirs;
pub mod config;
pub mod error;
pub mod host;
pub mod notify;
pub mod scheduler;
pub mod settings;
pub mod store;
pub mod testing;
pub mod timer;
pub mod verse;

pub use config::ReminderConfig;
pub use error::{ReminderError, Result};
pub use scheduler::{ReminderScheduler, SchedulerHandle};
