//! In-process broker for resumable generation streams.
//!
//! A producer opens a stream under an opaque id and writes ordered chunks;
//! any number of readers may attach at any point — including after the
//! stream has closed — and each reader replays the buffer from the start
//! before following live output.  Closed streams are retained for a bounded
//! window so a consumer that reconnects "just too late" still finds the
//! finished stream instead of racing eviction.
//!
//! The broker holds no HTTP or storage knowledge; chunks are opaque
//! [`bytes::Bytes`] and eviction is purely time-based.

mod broker;
mod reader;

pub use broker::{BrokerConfig, BrokerError, StreamBroker, StreamWriter};
pub use reader::StreamReader;
