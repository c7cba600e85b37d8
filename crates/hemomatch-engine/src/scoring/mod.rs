pub mod distance;
pub mod urgency;
