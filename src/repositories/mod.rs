// src/repositories/mod.rs

//! Queries shared between the HTTP handlers and the timed task runner.

pub mod part_repo;
pub mod timed_task_repo;

pub use part_repo::PartRepo;
pub use timed_task_repo::TimedTaskRepo;
