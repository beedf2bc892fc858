//! # Vantage
//!
//! Startup configuration for the coordination hub.
//!
//! The hub itself lives in `vantage_core` and its transport in
//! `vantage_networking`; this crate turns a TOML file plus command line
//! overrides into a running [`vantage_networking::HubServer`].

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;

pub use config::{CalibrationEntry, ConfigError, HubConfig, ServerSection};
