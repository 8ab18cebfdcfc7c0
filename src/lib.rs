pub mod capability;
pub mod cli;
pub mod config;
pub mod extract;
pub mod orchestrator;
pub mod pipeline;
pub mod server;
pub mod session;
pub mod shared;
pub mod snapshot;
