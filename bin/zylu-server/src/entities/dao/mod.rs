//! Row types shared between the store traits and the wire layer.

mod chat;
mod message;

pub use chat::ChatRecord;
pub use message::{MessagePart, MessageRecord, Role};
