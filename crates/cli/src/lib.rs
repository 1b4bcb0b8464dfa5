pub mod cli;
pub mod commands;
pub mod config;
pub mod hooks;
pub mod logging;
pub mod output;
