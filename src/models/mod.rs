//! Core data models for the image service.
//!
//! `image` holds the durable record shared by both stores; `operation` holds
//! the canonical request/response shapes the dispatcher speaks.

pub mod image;
pub mod operation;
