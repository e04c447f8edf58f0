pub mod cli;
pub mod config;
pub mod core;
pub mod transport;
pub mod ui;
pub mod utils;
