pub mod commands;
pub mod config;
pub mod data;
pub mod indicators;
pub mod metrics;
pub mod models;
pub mod param_utils;
pub mod report;
pub mod simulator;
pub mod strategy;
pub mod tuner;
pub mod walkforward;
