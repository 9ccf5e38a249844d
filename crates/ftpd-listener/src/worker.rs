use std::io::Write;
use std::net::TcpStream;
use std::os::unix::io::FromRawFd as _;
use std::process::ExitCode;

use anyhow::{Context, Result};
use ftpd_contracts::{
    COMMAND_FD_IN, COMMAND_FD_OUT, COMMAND_TERMINATOR, FTP_BADCMD, FTP_BADOPTS, FTP_GOODBYE,
    FTP_GREET, FTP_NOOPOK, FTP_OPTSOK,
};
use ftpd_ledger::LaunchDescriptor;
use ftpd_netstr::{read_line, write_line, LineError, PeekRead};
use tracing::{debug, error};

use crate::admission::{AdmissionLimits, Verdict};
use crate::config::Tunables;
use crate::supervisor::WorkerLaunch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    Refused(Verdict),
    Quit,
    PeerClosed,
    LineTooLong,
}

/// Worker entry point. Expects the command connection on fds 0 and 1.
pub fn run(launch: WorkerLaunch) -> ExitCode {
    let mut input = unsafe { TcpStream::from_raw_fd(COMMAND_FD_IN) };
    let mut output = unsafe { TcpStream::from_raw_fd(COMMAND_FD_OUT) };

    match serve(&mut input, &mut output, &launch.descriptor, &launch.tunables) {
        Ok(end) => {
            debug!(?end, ordinal = launch.descriptor.ordinal, "session ended");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("worker failed: {err:#}");
            let _ = reply(&mut output, FTP_BADCMD, &format!("OOPS: {err}"));
            ExitCode::from(2)
        }
    }
}

pub fn serve<S, W>(
    input: &mut S,
    output: &mut W,
    descriptor: &LaunchDescriptor,
    tunables: &Tunables,
) -> Result<SessionEnd>
where
    S: PeekRead + ?Sized,
    W: Write + ?Sized,
{
    let verdict = AdmissionLimits::from_tunables(tunables).check(descriptor);
    if let Some((code, text)) = verdict.refusal() {
        reply(output, code, text)?;
        return Ok(SessionEnd::Refused(verdict));
    }
    reply(output, FTP_GREET, "Ready.")?;

    let mut buf = vec![0u8; tunables.line_buffer_bytes.max(1)];
    loop {
        let len = match read_line(input, COMMAND_TERMINATOR, &mut buf) {
            Ok(len) => len,
            Err(LineError::Eof) => return Ok(SessionEnd::PeerClosed),
            Err(LineError::TooLong) => {
                reply(output, FTP_BADCMD, "Input line too long.")?;
                return Ok(SessionEnd::LineTooLong);
            }
            Err(err) => return Err(err).context("read command line"),
        };

        let cmd = Command::parse(&buf[..len]);
        match cmd.verb.as_str() {
            "NOOP" => reply(output, FTP_NOOPOK, "NOOP ok.")?,
            "OPTS" => {
                if cmd.arg.eq_ignore_ascii_case("UTF8 ON") {
                    reply(output, FTP_OPTSOK, "Always in UTF8 mode.")?;
                } else {
                    reply(output, FTP_BADOPTS, "Option not understood.")?;
                }
            }
            "QUIT" => {
                reply(output, FTP_GOODBYE, "Goodbye.")?;
                return Ok(SessionEnd::Quit);
            }
            _ => reply(output, FTP_BADCMD, "Unknown command.")?,
        }
    }
}

fn reply<W: Write + ?Sized>(output: &mut W, code: u16, text: &str) -> Result<()> {
    write_line(output, format!("{code} {text}\r\n").as_bytes()).context("write reply")
}

#[derive(Debug, PartialEq, Eq)]
struct Command {
    verb: String,
    arg: String,
}

impl Command {
    fn parse(line: &[u8]) -> Self {
        let line = line.strip_suffix(b"\n").unwrap_or(line);
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        let lossy = String::from_utf8_lossy(line);
        let text: &str = &lossy;
        let (verb, arg) = text.split_once(' ').unwrap_or((text, ""));
        Command {
            verb: verb.to_ascii_uppercase(),
            arg: arg.to_string(),
        }
    }
}
