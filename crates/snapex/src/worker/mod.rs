pub mod job;
pub mod pool;
pub mod scanner;

pub use job::{UnitResult, WorkUnit};
pub use pool::WorkerPool;
pub use scanner::{FileDescriptor, ScanReport, TreeScanner};
