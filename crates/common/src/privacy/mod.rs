//! Privacy - scrubbing secrets from diagnostic text
//!
//! Anything the retry loop hands to an attempt logger passes through a
//! [`Redactor`] first.

pub mod redact;

pub use redact::{NoOpRedactor, Redactor, SecretRedactor, SharedRedactor};
