pub mod aggregator;
pub mod api;
pub mod broker;
pub mod config;
pub mod data_models;
pub mod db;
pub mod db_operations;
pub mod enricher;
pub mod errors;
pub mod external_data;
pub mod metrics;
pub mod parsers;
pub mod retry;
pub mod subscriber;
pub mod validation;

#[cfg(test)]
mod tests;
