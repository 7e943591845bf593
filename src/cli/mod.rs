pub mod commands;
pub mod handlers;
pub mod output;

pub use commands::{BuildArgs, CancelArgs, CliArgs, Commands, GraphArgs, ListArgs, StatusArgs};
pub use output::{GraphReport, OutputFormat, OutputFormatter};
