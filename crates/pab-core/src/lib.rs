//! Core domain + application logic for the post approver bot.
//!
//! This crate is framework-agnostic. Telegram and Airtable live behind ports
//! (traits) implemented in adapter crates.

pub mod audit;
pub mod commands;
pub mod config;
pub mod decision;
pub mod domain;
pub mod errors;
pub mod logging;
pub mod messaging;
pub mod moderation;
pub mod ports;
pub mod security;
pub mod session;
pub mod skip_cache;

pub use errors::{Error, Result};
