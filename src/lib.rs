//! VeriPass Backend Library
//!
//! Record store API for asset passports and the oracle worker that records
//! verified service history on-chain.

pub mod app_state;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod hash;
pub mod jobs;
pub mod middleware;
pub mod models;
pub mod oracle;
pub mod routes;
pub mod services;
