pub mod build_info;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod db;
pub mod hierarchy;
pub mod logging;
pub mod ordering;
pub mod server;
pub mod state;
