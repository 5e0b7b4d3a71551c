//! Job dispatch: the durable queue, the pool of workers consuming it, and
//! the wiring that ties both to the orchestrator

mod harvester;
mod pool;
mod queue;

pub use harvester::{run_harvest, Harvester};
pub use pool::WorkerPool;
pub use queue::JobQueue;
