pub mod cli;
pub mod commands;
pub mod history;
pub mod logging;
pub mod runner;
pub mod scheduler;

pub use commands::AppContext;
pub use history::{HistoryEntry, HistoryLog};
pub use runner::Runner;
