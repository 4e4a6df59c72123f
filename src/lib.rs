//! Listing Auto-Fill Analysis Pipeline
//!
//! This library provides the core functionality for the listing-autofill
//! system, which analyzes item photos through an external vision provider
//! (with a local fallback) and proposes listing fields with learned
//! confidence scores.

pub mod app_state;
pub mod config;
pub mod db;
pub mod models;
pub mod routes;
pub mod services;
