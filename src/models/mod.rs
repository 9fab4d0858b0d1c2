// src/models/mod.rs

pub mod file;
pub mod part;
pub mod progress;
pub mod quiz;
pub mod timed_task;
pub mod user;
