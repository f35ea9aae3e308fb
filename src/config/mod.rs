//! Profile configuration for the editor
//!
//! - **profile**: the sectioned key-value store loaded from the INI file
//! - **persistent**: durable commit of a profile back to disk
//! - **schema**: which fields a front end shows
//! - **settings**: file locations and transformer invocation

pub mod persistent;
pub mod profile;
pub mod schema;
pub mod settings;

// Re-export commonly used types
pub use settings::{Overrides, Settings};
