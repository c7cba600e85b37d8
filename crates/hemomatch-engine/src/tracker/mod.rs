pub mod leaderboard;
pub mod performance;
