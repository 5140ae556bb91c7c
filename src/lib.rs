//! libterm - a terminal client for the campus library
//!
//! The query cache, API client and views live here so the binary stays a
//! thin entry point and the cache can be reused on its own.

pub mod api;
pub mod app;
pub mod cache;
pub mod commands;
pub mod config;
pub mod derived;
pub mod event;
pub mod library;
pub mod query;
pub mod screen;
pub mod session;
pub mod ui;
