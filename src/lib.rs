// Library for the daemon binary and tests

pub mod command;
pub mod config;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod plan;
pub mod platform;
pub mod rate;
pub mod routes;
pub mod sampler;
pub mod settings;
pub mod status;
pub mod sysinfo_repo;
pub mod version;
