//! Core data models for the image upload gateway.
//!
//! These types describe a single upload as it moves through the pipeline:
//! the client payload, the format detected from its bytes, and the stored
//! outcome. They carry no I/O of their own.

pub mod upload;
