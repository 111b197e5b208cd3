pub mod event;
pub mod operator;
pub mod segment;
pub mod snapshot;
pub mod status;
