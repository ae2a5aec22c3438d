pub mod app;
pub mod config;
pub mod explorer;
pub mod monitor;
pub mod orchestration;
pub mod shared;
pub mod tool;
