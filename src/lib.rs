//! Library crate for probe-engine exposing reusable modules.
pub mod config;
pub mod controller;
pub mod error;
pub mod inputs;
pub mod log;
pub mod rng;
pub mod server;
pub mod session;
pub mod strategy;
pub mod tables;
pub mod types;
