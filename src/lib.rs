pub mod ai;
pub mod config;
pub mod data;
pub mod estimator;
pub mod monitoring;
pub mod strategies;
