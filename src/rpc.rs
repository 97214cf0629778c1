//! Control-socket framing and method routing.
//!
//! The wire frame is an ASCII decimal length, a newline, then exactly that
//! many payload bytes; replies are framed the same way. Payloads are the
//! `weir-config-leader-v1` convention: a JSON `{"method", "args"}` object
//! going in, a JSON result (or `{"error"}`) coming back.
//!
//! Each accepted connection is a [`Peer`]: a little state machine driven
//! once per tick, never blocking. A peer serves exactly one request and is
//! torn down after the reply (or on the first framing violation).

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::io::{Read, Write};
use std::os::unix::net::UnixStream;

/// Name of the payload convention spoken over the socket.
pub const PROTOCOL: &str = "weir-config-leader-v1";

/// Frames longer than this are a protocol violation; the peer is dropped
/// before any buffer is allocated.
pub const MAX_FRAME_LEN: u64 = 100_000_000;

/// Peer lifecycle. State names match what the tick does in them.
#[derive(Debug)]
pub enum PeerState {
    /// Accumulating ASCII length digits, one byte at a time.
    Length {
        /// Digits accumulated so far.
        len: u64,
        /// Whether any digit has arrived.
        any: bool,
    },
    /// Reading `len` payload bytes.
    Payload {
        /// Payload buffer, allocated at its final size.
        buf: Vec<u8>,
        /// Bytes read so far.
        pos: usize,
    },
    /// A full request is buffered and awaits the handler.
    Ready {
        /// The request payload.
        payload: Vec<u8>,
    },
    /// Writing the framed reply.
    Reply {
        /// Framed reply bytes.
        buf: Vec<u8>,
        /// Bytes written so far.
        pos: usize,
    },
    /// Reply fully delivered; the connection is done.
    Done,
    /// The peer misbehaved or vanished; holds the reason.
    Error(String),
}

/// One control-socket connection.
#[derive(Debug)]
pub struct Peer {
    stream: UnixStream,
    state: PeerState,
}

impl Peer {
    /// Wraps an accepted stream, switching it to non-blocking mode.
    pub fn new(stream: UnixStream) -> Result<Self> {
        stream
            .set_nonblocking(true)
            .context("setting peer non-blocking")?;
        Ok(Self {
            stream,
            state: PeerState::Length { len: 0, any: false },
        })
    }

    /// The current state.
    pub fn state(&self) -> &PeerState {
        &self.state
    }

    /// True when the peer should be dropped from the peer list.
    pub fn is_finished(&self) -> bool {
        matches!(self.state, PeerState::Done | PeerState::Error(_))
    }

    /// Drives the peer as far as the socket allows without blocking. When
    /// a full request is buffered, `handler` maps it to a reply payload,
    /// which is framed and flushed as far as possible in the same tick.
    pub fn serve(&mut self, handler: &mut dyn FnMut(&[u8]) -> Vec<u8>) {
        self.fill();
        if let PeerState::Ready { payload } = &self.state {
            let reply = handler(payload);
            let mut framed = format!("{}\n", reply.len()).into_bytes();
            framed.extend(reply);
            self.state = PeerState::Reply {
                buf: framed,
                pos: 0,
            };
        }
        self.flush();
    }

    fn fail(&mut self, why: impl Into<String>) {
        self.state = PeerState::Error(why.into());
    }

    fn fill(&mut self) {
        loop {
            match &mut self.state {
                PeerState::Length { len, any } => {
                    let mut byte = [0u8; 1];
                    match self.stream.read(&mut byte) {
                        Ok(0) => return self.fail("eof while reading frame length"),
                        Ok(_) => match byte[0] {
                            b'0'..=b'9' => {
                                *len = *len * 10 + u64::from(byte[0] - b'0');
                                *any = true;
                                if *len > MAX_FRAME_LEN {
                                    let len = *len;
                                    return self.fail(format!("overlong frame: {len}"));
                                }
                            }
                            b'\n' if *any => {
                                let len = *len as usize;
                                self.state = PeerState::Payload {
                                    buf: vec![0u8; len],
                                    pos: 0,
                                };
                            }
                            other => {
                                return self.fail(format!(
                                    "invalid length byte {:?}",
                                    other as char
                                ))
                            }
                        },
                        Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => return,
                        Err(err) if err.kind() == std::io::ErrorKind::Interrupted => {}
                        Err(err) => return self.fail(format!("read failed: {err}")),
                    }
                }
                PeerState::Payload { buf, pos } => {
                    if *pos == buf.len() {
                        let payload = std::mem::take(buf);
                        self.state = PeerState::Ready { payload };
                        continue;
                    }
                    match self.stream.read(&mut buf[*pos..]) {
                        Ok(0) => return self.fail("short read in payload"),
                        Ok(n) => *pos += n,
                        Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => return,
                        Err(err) if err.kind() == std::io::ErrorKind::Interrupted => {}
                        Err(err) => return self.fail(format!("read failed: {err}")),
                    }
                }
                _ => return,
            }
        }
    }

    fn flush(&mut self) {
        loop {
            match &mut self.state {
                PeerState::Reply { buf, pos } => {
                    if *pos == buf.len() {
                        self.state = PeerState::Done;
                        return;
                    }
                    match self.stream.write(&buf[*pos..]) {
                        Ok(0) => return self.fail("short write in reply"),
                        Ok(n) => *pos += n,
                        Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => return,
                        Err(err) if err.kind() == std::io::ErrorKind::Interrupted => {}
                        Err(err) => return self.fail(format!("write failed: {err}")),
                    }
                }
                _ => return,
            }
        }
    }
}

/// A parsed RPC request.
#[derive(Debug, Deserialize)]
pub struct Request {
    /// Method name, e.g. `get-config`.
    pub method: String,
    /// Method arguments; an object for every defined method.
    #[serde(default)]
    pub args: serde_json::Value,
}

/// Parses a request payload.
pub fn parse_request(payload: &[u8]) -> Result<Request> {
    serde_json::from_slice(payload).context("malformed request payload")
}

/// Pulls a required string argument out of a request.
pub fn arg_str<'a>(request: &'a Request, name: &str) -> Result<&'a str> {
    match request.args.get(name).and_then(|v| v.as_str()) {
        Some(s) => Ok(s),
        None => bail!("{} needs a string {name:?} argument", request.method),
    }
}

/// Marshals a successful reply payload.
pub fn ok_reply(result: serde_json::Value) -> Vec<u8> {
    result.to_string().into_bytes()
}

/// Marshals an error reply payload.
pub fn error_reply(message: &str) -> Vec<u8> {
    serde_json::json!({ "error": message }).to_string().into_bytes()
}
