//! Upload Module
//!
//! Turns a multipart upload into validated images:
//! - Streaming intake of `files` parts into temporary files
//! - Content-type whitelist validation preserving arrival order
//!
//! Temporary files are owned by the items, so they are released on every
//! exit path of the request.

pub mod intake;
pub mod types;
pub mod validation;

pub use intake::collect_files;
pub use types::*;
pub use validation::Validator;
