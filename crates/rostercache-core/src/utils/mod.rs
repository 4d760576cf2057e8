//! Utility functions for working with loosely-typed JSON values.

pub mod json;

pub use json::{is_truthy, to_text};
