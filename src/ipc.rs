//! Interprocess parameter channel for management tools.
//!
//! A channel is a Unix-domain stream socket under `/tmp/OscIpc…`
//! connecting one server (usually the camera application) with one
//! client (a management tool). The wire protocol is a small
//! little-endian record format: a request carries its type (read or
//! write), a parameter identifier and an optional payload; the server
//! answers every request with an explicit ack or nack.
//!
//! Channels can run blocking or non-blocking. A non-blocking server
//! polls with [`IpcServer::next_request`], which reports
//! `NoMessageAvailable` while nothing is pending, so the camera's main
//! loop can interleave parameter handling with capturing.

use std::io::{ErrorKind, Read, Write};
use std::os::unix::io::AsRawFd;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::PathBuf;

// `UnixStream::peek` is not available in this toolchain (it sits
// behind the unstable `unix_socket_peek` feature here), so the one
// non-consuming read this module needs is done via a direct `recv`
// with `MSG_PEEK`, matching the same semantics.
const MSG_PEEK: i32 = 2;

extern "C" {
    fn recv(fd: i32, buf: *mut u8, len: usize, flags: i32) -> isize;
}

fn peek_one_byte(stream: &UnixStream, buf: &mut [u8; 1]) -> std::io::Result<usize> {
    let ret = unsafe { recv(stream.as_raw_fd(), buf.as_mut_ptr(), buf.len(), MSG_PEEK) };
    if ret < 0 {
        Err(std::io::Error::last_os_error())
    } else {
        Ok(ret as usize)
    }
}

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use tracing::{debug, warn};

use crate::error::{OscarError, OscarResult};

/// Directory and prefix under which channel sockets are created.
pub const SOCKET_PATH_PREFIX: &str = "/tmp/OscIpc";

/// Upper bound on a request payload, to keep a broken peer from
/// forcing large allocations.
const MAX_PAYLOAD: u32 = 1 << 20;

const STATUS_ACK: u32 = 1;
const STATUS_NACK: u32 = 0;

/// What a request asks the parameter owner to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// Read the parameter; the payload of the ack carries its value.
    Read,
    /// Write the parameter from the request payload.
    Write,
}

impl RequestKind {
    fn to_wire(self) -> u32 {
        match self {
            RequestKind::Read => 0,
            RequestKind::Write => 1,
        }
    }

    fn from_wire(value: u32) -> OscarResult<Self> {
        match value {
            0 => Ok(RequestKind::Read),
            1 => Ok(RequestKind::Write),
            other => Err(OscarError::FileParseError(format!(
                "unknown request type {other}"
            ))),
        }
    }
}

/// One parameter request as received by the server.
#[derive(Debug)]
pub struct IpcRequest {
    pub kind: RequestKind,
    pub param_id: u32,
    pub payload: Vec<u8>,
}

fn socket_path(name: &str) -> PathBuf {
    PathBuf::from(format!("{SOCKET_PATH_PREFIX}{name}"))
}

fn write_request(stream: &mut UnixStream, request: &IpcRequest) -> OscarResult<()> {
    stream.write_u32::<LittleEndian>(request.kind.to_wire())?;
    stream.write_u32::<LittleEndian>(request.param_id)?;
    stream.write_u32::<LittleEndian>(request.payload.len() as u32)?;
    stream.write_all(&request.payload)?;
    Ok(())
}

fn read_request(stream: &mut UnixStream) -> OscarResult<IpcRequest> {
    let kind = RequestKind::from_wire(stream.read_u32::<LittleEndian>()?)?;
    let param_id = stream.read_u32::<LittleEndian>()?;
    let len = stream.read_u32::<LittleEndian>()?;
    if len > MAX_PAYLOAD {
        return Err(OscarError::FileParseError(format!(
            "oversized payload ({len} bytes)"
        )));
    }
    let mut payload = vec![0u8; len as usize];
    stream.read_exact(&mut payload)?;
    Ok(IpcRequest {
        kind,
        param_id,
        payload,
    })
}

/// Server side of a channel. Owns the well-known socket; the socket
/// file is removed again on drop.
pub struct IpcServer {
    listener: UnixListener,
    path: PathBuf,
    connection: Option<UnixStream>,
    nonblocking: bool,
}

impl IpcServer {
    /// Bind the channel `name` (socket `/tmp/OscIpc<name>`). The server
    /// must be up before any client connects.
    pub fn bind(name: &str, nonblocking: bool) -> OscarResult<Self> {
        let path = socket_path(name);
        // A stale socket file from a crashed predecessor would make the
        // bind fail.
        if path.exists() {
            warn!(path = %path.display(), "removing stale channel socket");
            let _ = std::fs::remove_file(&path);
        }
        let listener = UnixListener::bind(&path).map_err(|source| OscarError::UnableToOpenFile {
            path: path.clone(),
            source,
        })?;
        listener.set_nonblocking(nonblocking)?;
        debug!(path = %path.display(), nonblocking, "channel bound");
        Ok(IpcServer {
            listener,
            path,
            connection: None,
            nonblocking,
        })
    }

    /// Fetch the next pending request. On a non-blocking channel this
    /// reports `NoMessageAvailable` when no client is connected or
    /// nothing has arrived.
    pub fn next_request(&mut self) -> OscarResult<IpcRequest> {
        if self.connection.is_none() {
            match self.listener.accept() {
                Ok((stream, _)) => {
                    // Individual records are read blocking; the
                    // non-blocking behaviour applies to waiting for
                    // clients and requests, not to partial records.
                    stream.set_nonblocking(false)?;
                    self.connection = Some(stream);
                }
                Err(err) if err.kind() == ErrorKind::WouldBlock => {
                    return Err(OscarError::NoMessageAvailable);
                }
                Err(err) => return Err(err.into()),
            }
        }

        let stream = self.connection.as_mut().ok_or(OscarError::NoMessageAvailable)?;
        if self.nonblocking {
            // Peek one byte to learn whether a record has started.
            stream.set_nonblocking(true)?;
            let mut probe = [0u8; 1];
            let probed = peek_one_byte(stream, &mut probe);
            stream.set_nonblocking(false)?;
            match probed {
                Ok(0) => {
                    // Peer went away; wait for the next client.
                    self.connection = None;
                    return Err(OscarError::NoMessageAvailable);
                }
                Ok(_) => {}
                Err(err) if err.kind() == ErrorKind::WouldBlock => {
                    return Err(OscarError::NoMessageAvailable);
                }
                Err(err) => return Err(err.into()),
            }
        }

        match read_request(stream) {
            Ok(request) => Ok(request),
            Err(err) => {
                // A half-closed or garbled connection is dropped; the
                // listener keeps serving subsequent clients.
                self.connection = None;
                Err(err)
            }
        }
    }

    fn respond(&mut self, status: u32, payload: &[u8]) -> OscarResult<()> {
        let stream = self
            .connection
            .as_mut()
            .ok_or_else(|| OscarError::Device("no client connected".into()))?;
        stream.write_u32::<LittleEndian>(status)?;
        stream.write_u32::<LittleEndian>(payload.len() as u32)?;
        stream.write_all(payload)?;
        Ok(())
    }

    /// Acknowledge the request last returned by
    /// [`Self::next_request`], optionally carrying a read result.
    pub fn acknowledge(&mut self, payload: &[u8]) -> OscarResult<()> {
        self.respond(STATUS_ACK, payload)
    }

    /// Reject the request last returned by [`Self::next_request`].
    pub fn negative_acknowledge(&mut self) -> OscarResult<()> {
        self.respond(STATUS_NACK, &[])
    }
}

impl Drop for IpcServer {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Client side of a channel.
pub struct IpcClient {
    stream: UnixStream,
}

impl IpcClient {
    /// Connect to the channel `name`. Fails if no server has bound it.
    pub fn connect(name: &str) -> OscarResult<Self> {
        let path = socket_path(name);
        let stream = UnixStream::connect(&path).map_err(|source| OscarError::UnableToOpenFile {
            path,
            source,
        })?;
        Ok(IpcClient { stream })
    }

    fn transact(&mut self, request: &IpcRequest) -> OscarResult<Vec<u8>> {
        write_request(&mut self.stream, request)?;
        let status = self.stream.read_u32::<LittleEndian>()?;
        let len = self.stream.read_u32::<LittleEndian>()?;
        if len > MAX_PAYLOAD {
            return Err(OscarError::FileParseError(format!(
                "oversized response ({len} bytes)"
            )));
        }
        let mut payload = vec![0u8; len as usize];
        self.stream.read_exact(&mut payload)?;
        if status != STATUS_ACK {
            return Err(OscarError::NegativeAcknowledge);
        }
        Ok(payload)
    }

    /// Read parameter `param_id` from the peer.
    pub fn read_param(&mut self, param_id: u32) -> OscarResult<Vec<u8>> {
        self.transact(&IpcRequest {
            kind: RequestKind::Read,
            param_id,
            payload: Vec::new(),
        })
    }

    /// Write parameter `param_id` on the peer.
    pub fn write_param(&mut self, param_id: u32, data: &[u8]) -> OscarResult<()> {
        self.transact(&IpcRequest {
            kind: RequestKind::Write,
            param_id,
            payload: data.to_vec(),
        })?;
        Ok(())
    }
}
