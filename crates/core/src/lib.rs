//! Domain types and pure logic shared by every Bigshot crate.
//!
//! Nothing in here performs I/O: the job state machine, typed result
//! payloads, the work-item model and progress maths all live here so the
//! database, event and pipeline layers agree on one definition.

pub mod domain_names;
pub mod error;
pub mod job_events;
pub mod job_result;
pub mod job_status;
pub mod job_type;
pub mod progress;
pub mod task_state;
pub mod types;
pub mod work;
