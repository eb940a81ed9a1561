pub mod app;
pub mod config;
pub mod dsl;
pub mod pipeline;
pub mod quest;
pub mod record;
pub mod sinks;
pub mod utils;
