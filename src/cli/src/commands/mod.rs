//! Subcommand implementations.

pub mod cache;
pub mod config;
pub mod course;
pub mod event;
pub mod health;
