//! Attache - personal AI assistant API
//!
//! Authenticated chat backend: messages are routed through rule-based
//! actions first, then (for knowledge queries) web-search grounding, and
//! finally a generative reply chain that falls back to built-in responses
//! when the remote generation service is unavailable.

pub mod auth;
pub mod config;
pub mod conversation;
pub mod core;
pub mod providers;
pub mod routes;
pub mod search;
pub mod speech;
pub mod state;
