pub mod annotate;
pub mod cli;
pub mod config;
pub mod extract;
pub mod locate;
pub mod monitor;
pub mod page;
pub mod parse;
pub mod pipeline;
pub mod report;
pub mod snapshot;
pub mod store;
pub mod watch;
