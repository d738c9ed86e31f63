//! Postgres repositories. Each is a zero-sized struct whose functions take
//! a `&PgPool`.

pub mod domain_repo;
pub mod job_repo;
pub mod task_repo;

pub use domain_repo::DomainRepo;
pub use job_repo::JobRepo;
pub use task_repo::TaskRepo;
