pub mod config;
pub mod constants;
pub mod database_manager;
pub mod db;
pub mod error;
pub mod format;
pub mod glob;
pub mod lock;
pub mod orchestrator;
pub mod reconcile;
pub mod retention;
pub mod scheduler;
pub mod script;

pub use config::AppConfig;
pub use db::Database;
pub use error::{PhileError, Result};
pub use orchestrator::{RetentionOutcome, RunOrchestrator, RunReport};
pub use scheduler::{RunMode, Scheduler, SchedulerOptions};
pub use script::{ScriptRunner, ScriptSettings};
