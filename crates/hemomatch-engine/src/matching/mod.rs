pub mod engine;
pub mod ranking;
