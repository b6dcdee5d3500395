pub mod cli;
pub mod config;
pub mod constants;
pub mod error;
pub mod ingestion;
pub mod paths;
pub mod pipeline;
pub mod services;
