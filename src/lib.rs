//! IP tracker - request interception with blocklisting, geolocation and anomaly detection
//!
//! Every inbound request is attributed to a client address, refused if that
//! address is blocklisted, handed to the application, and then logged with
//! cached geolocation. An hourly job scans the recent logs and flags addresses
//! with excessive traffic or access to sensitive paths.

pub mod admin;
pub mod anomaly;
pub mod blocklist;
pub mod config;
pub mod db;
pub mod error;
pub mod geo;
pub mod logging;
pub mod web;
