pub mod event_log;
pub mod initialize;
pub mod log;
pub mod migrate;
pub mod operators;
pub mod pool;
pub mod snapshot;
