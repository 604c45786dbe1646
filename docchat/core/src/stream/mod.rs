//! Answer Streaming
//!
//! The streaming path from raw bytes to answer fragments:
//!
//! - [`LineDecoder`] / [`LineStream`] - reassemble lines across reads
//! - [`EventParser`] - classify lines as chunk, done or error events
//! - [`StreamingSession`] - one request, driven to exactly one terminal callback

mod decoder;
mod event;
mod session;

pub use decoder::{LineDecoder, LineStream};
pub use event::{parse_event_line, EventParser, StreamEvent, EVENT_PREFIX};
pub use session::{
    ChannelSink, FailureKind, StreamFailure, StreamOutcome, StreamSink, StreamState,
    StreamStats, StreamUpdate, StreamingSession, Termination, CANCELLED_DESCRIPTION,
};
