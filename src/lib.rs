pub mod config;
pub mod error;
pub mod labels;
pub mod model;
pub mod pipeline;
pub mod report;
pub mod server;

pub use error::{Error, Result};
