pub mod analyzer;
pub mod config;
pub mod consumer;
pub mod mqtt;
pub mod producer;
pub mod reading;
