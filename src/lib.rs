//! PDF Drop Server Library
//!
//! Accepts a batch of uploaded images and turns it into a single PDF that
//! stays retrievable for a short retention window.
//!
//! # Modules
//!
//! - `upload`: Multipart intake and content-type validation
//! - `pdf`: Image decoding and PDF assembly
//! - `storage`: Ephemeral artifact store with scheduled deletion
//! - `routes`: HTTP endpoints

pub mod config;
pub mod error;
pub mod pdf;
pub mod routes;
pub mod state;
pub mod storage;
pub mod upload;

#[cfg(test)]
mod test_support;
