//! NeuroGym API Library Crate
//!
//! This library contains the web service around the tutoring core: the
//! application state and session registry, the PostgreSQL store, API handlers,
//! WebSocket chat and routing. The `api` binary is a thin wrapper around this library.

pub mod config;
pub mod db;
pub mod handlers;
pub mod models;
pub mod router;
pub mod state;
pub mod ws;
