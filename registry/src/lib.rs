pub mod api;
pub mod config;
pub mod error;
pub mod history;
pub mod metrics_defs;
pub mod model;
pub mod service;
pub mod store;
pub mod tags;
