//! Triage Core - Shared types for the triage crates.
//!
//! This crate provides the foundational types used on the ingestion path:
//!
//! - `Value`: A dynamically typed field value (Null, Boolean, Int64, Float64, String, Bytes)
//! - `Record`: One unit of incoming streaming data, a map of field name to `Value`
//! - `Error`: Error types for ingestion and query management
//!
//! # Example
//!
//! ```rust
//! use triage_core::{Record, Value};
//!
//! let record = Record::new()
//!     .with_field("region", "eu-west")
//!     .with_field("latency_ms", 42i64);
//!
//! assert_eq!(record.len(), 2);
//! assert_eq!(record.get("region"), Some(&Value::String("eu-west".into())));
//! assert_eq!(record.get("latency_ms").and_then(Value::as_i64), Some(42));
//! ```

#![no_std]

extern crate alloc;

mod error;
mod record;
mod value;

pub use error::{Error, Result};
pub use record::Record;
pub use value::Value;
