pub mod config;
pub mod event;
pub mod ids;
pub mod state;
