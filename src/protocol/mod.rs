//! Wire protocol types for telemetry publishing
//!
//! The only protocol object is the [`Envelope`] and its canonical JSON
//! encoding. See [`envelope`] for the format contract.

pub mod envelope;

pub use envelope::{Envelope, FormatError, WIRE_FORMAT_VERSION};
