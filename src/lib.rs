pub mod batch;
pub mod clients;
pub mod config;
pub mod drainer;
pub mod models;
pub mod pipeline;
pub mod utils;
