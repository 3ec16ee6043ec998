pub mod common;
pub mod completions;
pub mod config;
pub mod list;
pub mod pull;
pub mod run;
