use std::io::{Read as _, Write as _};
use std::net::{Shutdown, TcpListener, TcpStream};
#[cfg(unix)]
use std::os::unix::net::UnixStream;
use std::time::Duration;

use ftpd_netstr::{read_exact_len, read_line, write_line, LineError, NetStrError};

#[cfg(unix)]
#[test]
fn unix_socket_line_leaves_tail_unread() {
    let (mut client, mut server) = UnixStream::pair().expect("socketpair");
    client.write_all(b"AB\nCD").expect("write");

    let mut buf = [0u8; 32];
    let n = read_line(&mut server, b'\n', &mut buf).expect("read_line");
    assert_eq!(&buf[..n], b"AB\n");

    client.shutdown(Shutdown::Write).expect("shutdown");
    let mut tail = Vec::new();
    server.read_to_end(&mut tail).expect("read tail");
    assert_eq!(tail, b"CD");
}

#[cfg(unix)]
#[test]
fn unix_socket_closed_without_data_is_eof() {
    let (client, mut server) = UnixStream::pair().expect("socketpair");
    drop(client);

    let mut buf = [0u8; 32];
    assert!(matches!(
        read_line(&mut server, b'\n', &mut buf),
        Err(LineError::Eof)
    ));
}

#[cfg(unix)]
#[test]
fn unix_socket_unterminated_flood_is_too_long() {
    let (mut client, mut server) = UnixStream::pair().expect("socketpair");
    client.write_all(&[b'A'; 200]).expect("write");

    let mut buf = [0u8; 64];
    assert!(matches!(
        read_line(&mut server, b'\n', &mut buf),
        Err(LineError::TooLong)
    ));

    // Only the buffer's worth was taken off the socket.
    drop(client);
    let mut rest = Vec::new();
    server.read_to_end(&mut rest).expect("read rest");
    assert_eq!(rest.len(), 136);
}

#[test]
fn tcp_lines_arriving_in_pieces() {
    let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind");
    let addr = listener.local_addr().expect("local_addr");

    let writer = std::thread::spawn(move || {
        let mut s = TcpStream::connect(addr).expect("connect");
        for piece in [&b"NO"[..], b"OP\r", b"\nQU", b"IT\r\n"] {
            s.write_all(piece).expect("write piece");
            s.flush().expect("flush");
            std::thread::sleep(Duration::from_millis(20));
        }
    });

    let (mut conn, _) = listener.accept().expect("accept");
    let mut buf = [0u8; 128];
    let n = read_line(&mut conn, b'\n', &mut buf).expect("first line");
    assert_eq!(&buf[..n], b"NOOP\r\n");
    let n = read_line(&mut conn, b'\n', &mut buf).expect("second line");
    assert_eq!(&buf[..n], b"QUIT\r\n");

    writer.join().expect("writer thread");
    assert!(matches!(
        read_line(&mut conn, b'\n', &mut buf),
        Err(LineError::Eof)
    ));
}

#[cfg(unix)]
#[test]
fn sized_payload_follows_a_header_line() {
    let (mut client, mut server) = UnixStream::pair().expect("socketpair");
    let writer = std::thread::spawn(move || {
        write_line(&mut client, b"SIZE 11\r\n").expect("header");
        for piece in [&b"hello"[..], b" ", b"world"] {
            write_line(&mut client, piece).expect("payload piece");
            std::thread::sleep(Duration::from_millis(10));
        }
        write_line(&mut client, b"tail").expect("tail");
    });

    let mut buf = [0u8; 32];
    let n = read_line(&mut server, b'\n', &mut buf).expect("header line");
    assert_eq!(&buf[..n], b"SIZE 11\r\n");
    assert_eq!(read_exact_len(&mut server, 11).expect("payload"), b"hello world");

    writer.join().expect("writer thread");
    match read_exact_len(&mut server, 8) {
        Err(NetStrError::ShortRead { expected, actual }) => {
            assert_eq!((expected, actual), (8, 4));
        }
        other => panic!("expected a short read, got {other:?}"),
    }
}
