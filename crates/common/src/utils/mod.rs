//! Small helpers shared across modules
//!
//! - **[`serde`]**: `Duration` codecs used by the wire shapes of errors,
//!   faults and breaker stats

pub mod serde;

pub use self::serde::{duration_millis, option_duration_millis};
