// src/lib.rs

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod models;
pub mod policy;
pub mod progress;
pub mod quiz;
pub mod repositories;
pub mod routes;
pub mod state;
pub mod telemetry;
pub mod timed_tasks;
pub mod utils;

pub use routes::create_router;
