pub mod health;
pub mod update_runs;
