//! Progress reporting for build jobs

mod handler;
mod logging;

pub use handler::{
    ChannelHandler, NoOpHandler, ProgressEvent, ProgressHandler, ProgressStatus, PublishError,
};
pub use logging::LoggingHandler;
