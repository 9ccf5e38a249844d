use std::fmt;
use std::io::{self, Read, Write};

#[derive(Debug)]
pub enum NetStrError {
    /// Writing nothing to the network is always a caller bug.
    EmptyWrite,
    ShortRead { expected: usize, actual: usize },
    Io(io::Error),
}

impl fmt::Display for NetStrError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetStrError::EmptyWrite => f.write_str("zero-length network write"),
            NetStrError::ShortRead { expected, actual } => {
                write!(f, "short network read: wanted {expected} bytes, got {actual}")
            }
            NetStrError::Io(err) => write!(f, "network io: {err}"),
        }
    }
}

impl std::error::Error for NetStrError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            NetStrError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for NetStrError {
    fn from(err: io::Error) -> Self {
        NetStrError::Io(err)
    }
}

pub fn write_line<W: Write + ?Sized>(w: &mut W, data: &[u8]) -> Result<(), NetStrError> {
    if data.is_empty() {
        return Err(NetStrError::EmptyWrite);
    }
    w.write_all(data)?;
    w.flush()?;
    Ok(())
}

/// Reads exactly `len` bytes; a stream that ends early is an error.
pub fn read_exact_len<R: Read + ?Sized>(r: &mut R, len: usize) -> Result<Vec<u8>, NetStrError> {
    let mut out = vec![0u8; len];
    let mut off = 0usize;
    while off < len {
        match r.read(&mut out[off..]) {
            Ok(0) => {
                return Err(NetStrError::ShortRead {
                    expected: len,
                    actual: off,
                })
            }
            Ok(n) => off += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => return Err(err.into()),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_write_is_rejected() {
        let mut out = Vec::new();
        assert!(matches!(
            write_line(&mut out, b""),
            Err(NetStrError::EmptyWrite)
        ));
        assert!(out.is_empty());
    }

    #[test]
    fn write_line_passes_bytes_through() {
        let mut out = Vec::new();
        write_line(&mut out, b"220 Ready.\r\n").unwrap();
        assert_eq!(out, b"220 Ready.\r\n");
    }

    #[test]
    fn read_exact_len_reports_short_stream() {
        let mut r: &[u8] = b"abc";
        match read_exact_len(&mut r, 5) {
            Err(NetStrError::ShortRead { expected, actual }) => {
                assert_eq!((expected, actual), (5, 3));
            }
            other => panic!("unexpected: {other:?}"),
        }

        let mut r: &[u8] = b"abcdef";
        assert_eq!(read_exact_len(&mut r, 4).unwrap(), b"abcd");
    }

    #[test]
    fn write_errors_surface_as_io() {
        struct Broken;
        impl Write for Broken {
            fn write(&mut self, _: &[u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::BrokenPipe, "gone"))
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }
        assert!(matches!(
            write_line(&mut Broken, b"x"),
            Err(NetStrError::Io(_))
        ));
    }
}
