//! Protocol module - wire format, transaction frames and topic envelopes.
//!
//! This module implements the two fixed-layout prefixes:
//! - 16-byte transaction header for request/reply
//! - 24-byte envelope header (15-byte topic) for publish/subscribe

mod envelope;
mod frame;
mod topic;
mod wire_format;

pub use envelope::Envelope;
pub use frame::{build_frame, Frame};
pub use topic::{Topic, TOPIC_SIZE};
pub use wire_format::{EnvelopeHeader, TransactionHeader, ENVELOPE_HEADER_SIZE, HEADER_SIZE};
