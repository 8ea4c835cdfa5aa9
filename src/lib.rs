//! Pulse hub library.
//! This crate exposes internal modules for integration testing.
//! The binary entry point is in main.rs.

pub mod bus;
pub mod config;
pub mod error;
pub mod events;
pub mod fanout;
pub mod identity;
pub mod persist;
pub mod presence;
pub mod registry;
pub mod router;
pub mod routes;
pub mod state;
pub mod ws;
