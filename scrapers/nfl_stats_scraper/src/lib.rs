pub mod boxscore;
pub mod config;
pub mod drives;
pub mod fetch;
pub mod integration;
pub mod join;
pub mod metrics;
pub mod normalize;
pub mod schedule;
pub mod stats;
pub mod strength;
pub mod table;
pub mod teams;
pub mod types;
pub mod utils;
