//! Send one prompt to several language models and compare what comes back:
//! response text, latency, token usage and cost, side by side.

pub mod catalog;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod gateway;
pub mod history;
pub mod model;
pub mod providers;
pub mod stats;
