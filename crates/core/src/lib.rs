//! Domain core for Cantor: shared types, the error taxonomy, annotation
//! validation, the SVG compression codec, and the realtime wire protocol.
//!
//! This crate has no internal dependencies so the persistence layer, the
//! HTTP handlers, and the WebSocket router can all share it.

pub mod annotation;
pub mod collaboration;
pub mod compression;
pub mod error;
pub mod types;
