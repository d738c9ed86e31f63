//! Task execution process: the worker pool and the enumeration sources.

pub mod config;
pub mod pool;
pub mod shutdown;
pub mod sources;

pub use config::WorkerConfig;
pub use pool::WorkerPool;
pub use shutdown::ShutdownSignal;
