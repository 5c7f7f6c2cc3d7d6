pub mod commands;
pub mod config;
pub mod error;
pub mod ledger;

pub use config::{AppConfig, ConfigError, DetectionConfig, ImportConfig};
pub use error::{AppError, Result};
pub use ledger::{ApplyRulesOutcome, Ledger, RecurringSummary, TransferStats};
