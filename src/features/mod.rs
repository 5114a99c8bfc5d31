pub mod antibot;
pub mod challenge;
pub mod snapshots;
