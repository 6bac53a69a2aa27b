#![allow(clippy::result_large_err)]

pub mod api;
pub mod app;
pub mod app_state;
pub mod config;
pub mod connectors;
pub mod domain;
pub mod error;
pub mod index;
pub mod instance;
pub mod kv;
pub mod secrets;
pub mod telemetry;
pub mod watchers;
