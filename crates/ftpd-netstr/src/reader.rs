use std::fmt;
use std::io;

/// A byte source that can look at pending data before committing to it.
pub trait PeekRead {
    /// Copies up to `buf.len()` pending bytes without consuming them.
    /// Returns 0 only on orderly shutdown by the peer.
    fn peek(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Consumes bytes into `buf`, reading until it is full or the stream ends.
    fn consume(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

impl<T: PeekRead + ?Sized> PeekRead for &mut T {
    fn peek(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).peek(buf)
    }

    fn consume(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).consume(buf)
    }
}

#[derive(Debug)]
pub enum LineError {
    /// Peer closed the connection before any further byte arrived.
    Eof,
    /// The buffer filled up without a terminator.
    TooLong,
    Peek(io::Error),
    Consume(io::Error),
    ConsumeMismatch { expected: usize, actual: usize },
    PeekOverrun { peeked: usize, left: usize },
    MissingTerminator,
}

impl LineError {
    /// `Eof` and `TooLong` are ordinary outcomes of talking to a peer; every
    /// other variant means peek and consume disagreed about the stream.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, LineError::Eof | LineError::TooLong)
    }
}

impl fmt::Display for LineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LineError::Eof => f.write_str("end of stream"),
            LineError::TooLong => f.write_str("line exceeds buffer capacity"),
            LineError::Peek(err) => write!(f, "recv peek: {err}"),
            LineError::Consume(err) => write!(f, "read loop: {err}"),
            LineError::ConsumeMismatch { expected, actual } => {
                write!(f, "read loop: consumed {actual} bytes, peeked {expected}")
            }
            LineError::PeekOverrun { peeked, left } => {
                write!(f, "poor buffer accounting: peeked {peeked} with {left} left")
            }
            LineError::MissingTerminator => f.write_str("missing terminator after consume"),
        }
    }
}

impl std::error::Error for LineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LineError::Peek(err) | LineError::Consume(err) => Some(err),
            _ => None,
        }
    }
}

/// Reads one `terminator`-delimited line into `buf` and returns its length,
/// terminator included. The line occupies `buf[..len]`.
///
/// No more than `buf.len()` bytes are ever consumed; bytes after the
/// terminator stay on the stream for the next call.
pub fn read_line<S: PeekRead + ?Sized>(
    src: &mut S,
    terminator: u8,
    buf: &mut [u8],
) -> Result<usize, LineError> {
    let capacity = buf.len();
    let mut pos = 0usize;

    loop {
        let left = capacity - pos;
        if left == 0 {
            return Err(LineError::TooLong);
        }

        let peeked = src.peek(&mut buf[pos..]).map_err(LineError::Peek)?;
        if peeked == 0 {
            return Err(LineError::Eof);
        }
        if peeked > left {
            return Err(LineError::PeekOverrun { peeked, left });
        }

        if let Some(i) = buf[pos..pos + peeked].iter().position(|&b| b == terminator) {
            let want = i + 1;
            consume_exact(src, &mut buf[pos..pos + want])?;
            if buf[pos + want - 1] != terminator {
                return Err(LineError::MissingTerminator);
            }
            return Ok(pos + want);
        }

        consume_exact(src, &mut buf[pos..pos + peeked])?;
        pos += peeked;
    }
}

fn consume_exact<S: PeekRead + ?Sized>(src: &mut S, chunk: &mut [u8]) -> Result<(), LineError> {
    let expected = chunk.len();
    let actual = src.consume(chunk).map_err(LineError::Consume)?;
    if actual != expected {
        return Err(LineError::ConsumeMismatch { expected, actual });
    }
    Ok(())
}
