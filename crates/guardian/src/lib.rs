//! Process wiring for the cronjob-guardian binary: settings and the HTTP API

pub mod api;
pub mod config;
