pub mod job;
pub mod pool;

pub use job::{JobOutcome, SummaryJob};
pub use pool::SummaryPool;
