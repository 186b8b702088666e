//! Subcommand entry points

pub mod browse;
pub mod run;
