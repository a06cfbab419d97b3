//! AidLink coordination server.
//!
//! Matches aid needs with offers, carries conversations between the parties
//! in real time over WebSocket, and fans out notifications: persisted first,
//! then pushed to whatever connections happen to be live.

pub mod aid;
pub mod auth;
pub mod chat;
pub mod config;
pub mod db;
pub mod error;
pub mod matching;
pub mod notify;
pub mod roles;
pub mod routes;
pub mod state;
pub mod ws;
