// Copyright 2021 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Message channel carrying serde_json encoded values over a Unix stream socket.
//!
//! Every message is a little-endian `u32` byte count followed by that many bytes of JSON. A
//! clean close of the peer shows up as `Error::Disconnected` on the next `recv`.

use std::io;
use std::io::ErrorKind;
use std::io::Read;
use std::io::Write;
use std::mem;
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::path::Path;

use remain::sorted;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error as ThisError;

/// Upper bound on a single message body.
const MAX_MESSAGE_SIZE: usize = 16 << 20;

#[sorted]
#[derive(ThisError, Debug)]
pub enum Error {
    #[error("failed to clone transport: {0}")]
    Clone(io::Error),
    #[error("failed to connect to {0}: {1}")]
    Connect(String, io::Error),
    #[error("tube was disconnected")]
    Disconnected,
    #[error("failed to serialize/deserialize json from packet: {0}")]
    Json(serde_json::Error),
    #[error("message of {0} bytes exceeds the tube limit")]
    MessageTooLarge(usize),
    #[error("failed to create tube pair: {0}")]
    Pair(io::Error),
    #[error("failed to receive packet: {0}")]
    Recv(io::Error),
    #[error("Received a message with a zero sized body. This should not happen.")]
    RecvUnexpectedEmptyBody,
    #[error("failed to send packet: {0}")]
    Send(io::Error),
    #[error("failed to shut down tube: {0}")]
    Shutdown(io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Bidirectional message channel.
///
/// A single `Tube` must not be used by more than one sender (or more than one receiver) at a
/// time; callers that share one serialize access themselves.
#[derive(Debug)]
pub struct Tube {
    stream: UnixStream,
}

impl Tube {
    /// Creates a pair of connected tubes.
    pub fn pair() -> Result<(Tube, Tube)> {
        let (s1, s2) = UnixStream::pair().map_err(Error::Pair)?;
        Ok((Tube::new(s1), Tube::new(s2)))
    }

    pub fn new(stream: UnixStream) -> Tube {
        Tube { stream }
    }

    /// Connects to a listening Unix socket at `path`.
    pub fn connect<P: AsRef<Path>>(path: P) -> Result<Tube> {
        let path = path.as_ref();
        UnixStream::connect(path)
            .map(Tube::new)
            .map_err(|e| Error::Connect(path.display().to_string(), e))
    }

    /// Returns another handle to the same connection.
    pub fn try_clone(&self) -> Result<Tube> {
        self.stream.try_clone().map(Tube::new).map_err(Error::Clone)
    }

    pub fn send<T: Serialize>(&self, msg: &T) -> Result<()> {
        let msg_json = serde_json::to_vec(msg).map_err(Error::Json)?;
        if msg_json.len() > MAX_MESSAGE_SIZE {
            return Err(Error::MessageTooLarge(msg_json.len()));
        }

        let mut packet = Vec::with_capacity(mem::size_of::<u32>() + msg_json.len());
        packet.extend_from_slice(&(msg_json.len() as u32).to_le_bytes());
        packet.extend_from_slice(&msg_json);

        (&self.stream).write_all(&packet).map_err(|e| match e.kind() {
            ErrorKind::BrokenPipe | ErrorKind::ConnectionReset | ErrorKind::NotConnected => {
                Error::Disconnected
            }
            _ => Error::Send(e),
        })
    }

    pub fn recv<T: DeserializeOwned>(&self) -> Result<T> {
        let mut header = [0u8; mem::size_of::<u32>()];
        (&self.stream)
            .read_exact(&mut header)
            .map_err(|e| match e.kind() {
                ErrorKind::UnexpectedEof | ErrorKind::ConnectionReset => Error::Disconnected,
                _ => Error::Recv(e),
            })?;

        let msg_size = u32::from_le_bytes(header) as usize;
        if msg_size == 0 {
            return Err(Error::RecvUnexpectedEmptyBody);
        }
        if msg_size > MAX_MESSAGE_SIZE {
            return Err(Error::MessageTooLarge(msg_size));
        }

        let mut msg_json = vec![0u8; msg_size];
        (&self.stream)
            .read_exact(&mut msg_json)
            .map_err(|e| match e.kind() {
                ErrorKind::UnexpectedEof | ErrorKind::ConnectionReset => Error::Disconnected,
                _ => Error::Recv(e),
            })?;

        serde_json::from_slice(&msg_json).map_err(Error::Json)
    }

    /// Closes both directions of the connection for every handle sharing it. Blocked `recv`
    /// calls on either end return `Error::Disconnected`.
    pub fn shutdown(&self) -> Result<()> {
        match self.stream.shutdown(Shutdown::Both) {
            Ok(()) => Ok(()),
            // Already closed by the peer.
            Err(e) if e.kind() == ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(Error::Shutdown(e)),
        }
    }
}
