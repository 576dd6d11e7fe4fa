//! Core entry point for the athlete_report crate.
//!
//! Two loosely related pieces live here: an authenticated API client that
//! transparently refreshes expired bearer tokens, and a PDF exporter that lays
//! out an athlete report with its four chart sections.

pub mod api;
pub mod charts;
pub mod client;
pub mod config;
pub mod elements;
pub mod export;
pub mod fonts;
pub mod layout;
pub mod model;
pub mod render;
pub mod report;
pub mod session;

#[cfg(feature = "bookmarks")]
pub mod bookmarks;
