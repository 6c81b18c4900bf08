//! IRC protocol handling: line parsing, transport and the connection state machine.

pub mod connection;
pub mod event;
pub mod parser;
pub mod reader;
pub mod sender;

pub use connection::{
    Connection, ConnectionInfo, ConnectionOptions, ConnectionState, EventHandler, RawObserver,
};
pub use event::{Event, EventKind, TagValue};
pub use parser::parse;
pub use reader::LineReader;
pub use sender::{MessageSink, RateLimiter, Sender};
