//! Row models and DTOs.

pub mod domain;
pub mod job;
pub mod task;
