//! Safe construction of protocol lines from untrusted network input.
//!
//! `read_line` pulls one terminator-delimited line off a socket into a
//! caller-owned fixed buffer. It inspects pending data with a non-consuming
//! peek and then consumes exactly what it inspected, so a peer can neither
//! grow memory past the buffer nor desynchronise the byte stream.

mod reader;
mod stream;
mod write;

pub use reader::{read_line, LineError, PeekRead};
pub use write::{read_exact_len, write_line, NetStrError};
