#![forbid(unsafe_code)]

pub mod ledger;
pub mod matching;
pub mod scoring;
pub mod tracker;
pub mod weights;
