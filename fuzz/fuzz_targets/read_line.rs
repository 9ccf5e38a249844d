#![no_main]

use std::io::{self, Read};

use ftpd_netstr::{read_exact_len, read_line, NetStrError, PeekRead};
use libfuzzer_sys::fuzz_target;

/// Surfaces at most `chunk` bytes per peek.
struct Segments<'a> {
    data: &'a [u8],
    chunk: usize,
}

impl PeekRead for Segments<'_> {
    fn peek(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = buf.len().min(self.chunk).min(self.data.len());
        buf[..n].copy_from_slice(&self.data[..n]);
        Ok(n)
    }

    fn consume(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = buf.len().min(self.data.len());
        buf[..n].copy_from_slice(&self.data[..n]);
        self.data = &self.data[n..];
        Ok(n)
    }
}

impl Read for Segments<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = buf.len().min(self.chunk);
        self.consume(&mut buf[..n])
    }
}

fuzz_target!(|data: &[u8]| {
    let [chunk, capacity, rest @ ..] = data else {
        return;
    };
    let mut src = Segments {
        data: rest,
        chunk: usize::from(*chunk).max(1),
    };
    let mut buf = vec![0u8; usize::from(*capacity)];

    while !src.data.is_empty() {
        let before = src.data.len();
        match read_line(&mut src, b'\n', &mut buf) {
            Ok(len) => {
                assert!(len >= 1 && len <= buf.len());
                assert_eq!(buf[len - 1], b'\n');
                assert!(!buf[..len - 1].contains(&b'\n'));
                assert_eq!(before - src.data.len(), len);
            }
            Err(err) => {
                assert!(!err.is_fatal(), "{err}");
                assert!(before - src.data.len() <= buf.len());
                break;
            }
        }
    }

    // Whatever is left can be taken as one sized block; one byte more cannot.
    let left = src.data.len();
    let expected = src.data.to_vec();
    assert_eq!(read_exact_len(&mut src, left).ok(), Some(expected));
    match read_exact_len(&mut src, 1) {
        Err(NetStrError::ShortRead { expected: 1, actual: 0 }) => {}
        other => panic!("read past the end: {other:?}"),
    }
});
