pub mod cli;
pub mod config;
pub mod csv_writer;
pub mod error;
pub mod matrix;
pub mod orchestrator;
pub mod partition;
pub mod reporter;
pub mod strategy;
pub mod timing;
pub mod transport;
pub mod types;
pub mod validate;
