//! Prospect lifecycle & outreach sequencing engine.

pub mod activity;
pub mod config;
pub mod engine;
pub mod error;
pub mod llm;
pub mod notify;
pub mod outreach;
pub mod prospects;
pub mod scheduler;
pub mod scout;
pub mod services;
pub mod store;
