pub mod engine;
pub mod gate;
pub mod reconciler;
pub mod report;
