use std::io::{self, Read};
use std::net::TcpStream;
#[cfg(unix)]
use std::os::unix::io::{AsRawFd as _, RawFd};
#[cfg(unix)]
use std::os::unix::net::UnixStream;

use crate::reader::PeekRead;

fn read_loop<R: Read + ?Sized>(r: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut off = 0usize;
    while off < buf.len() {
        match r.read(&mut buf[off..]) {
            Ok(0) => break,
            Ok(n) => off += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => return Err(err),
        }
    }
    Ok(off)
}

impl PeekRead for TcpStream {
    fn peek(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            match TcpStream::peek(self, buf) {
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                other => return other,
            }
        }
    }

    fn consume(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        read_loop(self, buf)
    }
}

#[cfg(unix)]
fn recv_peek(fd: RawFd, buf: &mut [u8]) -> io::Result<usize> {
    loop {
        let rc = unsafe {
            libc::recv(
                fd,
                buf.as_mut_ptr() as *mut libc::c_void,
                buf.len(),
                libc::MSG_PEEK,
            )
        };
        if rc >= 0 {
            return Ok(rc as usize);
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

#[cfg(unix)]
impl PeekRead for UnixStream {
    fn peek(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        recv_peek(self.as_raw_fd(), buf)
    }

    fn consume(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        read_loop(self, buf)
    }
}
