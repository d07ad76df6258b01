pub mod app;
pub mod infra;
pub mod state;
