#![forbid(unsafe_code)]

pub mod config;
pub mod errors;
pub mod model;
pub mod schema;
pub mod traits;
pub mod types;
