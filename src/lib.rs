//! Multi-engine OCR orchestration service.
//!
//! This library wires interchangeable recognition engines (a command-line
//! OCR binary, a remote neural recognizer, deployment-specific plugins)
//! behind one registry with per-engine circuit breaking, and exposes both a
//! bounded synchronous dispatch path and a Redis-backed asynchronous job
//! lifecycle with TTL retention.

pub mod app_state;
pub mod config;
pub mod engines;
pub mod error;
pub mod models;
pub mod registry;
pub mod routes;
pub mod services;
