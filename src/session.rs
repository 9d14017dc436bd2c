//! The per-connection relay state machine: one task, one client socket, one
//! upstream socket, driven by a `select!` loop whose armed branches encode
//! the read/write-interest toggling of the original design.

use std::time::Duration;

use log::{debug, trace, warn};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time;

use crate::address::{self, Address, ParseOutcome};
use crate::buffer::{RelayBuffer, BUF_SIZE};
use crate::cipher::{CipherMethod, Decryptor, Encryptor};
use crate::error::{Error, Result};

/// Cap on the header-accumulation buffer. Comfortably larger than any legal
/// ATYP=3 header (1 + 1 + 255 + 2 bytes at most).
const MAX_HEADER_LEN: usize = 512;

enum Stage {
    AwaitingHeader,
    AwaitingUpstream,
    Streaming,
    Closed,
}

/// One client↔upstream relay. Owns both sockets, both buffers, and both
/// cipher contexts directly; there is no cross-reference to a peer session
/// to clear on teardown, because there is no peer session — this struct is
/// self-contained.
pub struct Session {
    client: TcpStream,
    upstream: Option<TcpStream>,
    stage: Stage,
    connect_timeout: Duration,

    c2u: RelayBuffer,
    u2c: RelayBuffer,

    encryptor: Encryptor,
    decryptor: Decryptor,

    header: Vec<u8>,
    pending_destination: Option<Address>,
}

impl Session {
    pub fn new(client: TcpStream, cipher: &CipherMethod, connect_timeout: Duration) -> Self {
        let (encryptor, decryptor) = cipher.new_contexts();
        Session {
            client,
            upstream: None,
            stage: Stage::AwaitingHeader,
            connect_timeout,
            c2u: RelayBuffer::new(),
            u2c: RelayBuffer::new(),
            encryptor,
            decryptor,
            header: Vec::new(),
            pending_destination: None,
        }
    }

    /// Drives the session to completion (teardown), handling every stage in
    /// turn. Errors are never returned to the caller: every failure mode
    /// here is session-local and is absorbed by closing the session.
    pub async fn run(mut self) {
        loop {
            match self.stage {
                Stage::AwaitingHeader => match self.read_header().await {
                    Ok(true) => self.stage = Stage::AwaitingUpstream,
                    Ok(false) => {
                        trace!("client closed before sending a complete header");
                        self.stage = Stage::Closed;
                    }
                    Err(e) => {
                        debug!("header parse failed: {}", e);
                        self.stage = Stage::Closed;
                    }
                },
                Stage::AwaitingUpstream => match self.connect_upstream().await {
                    Ok(()) => self.stage = Stage::Streaming,
                    Err(_) => self.stage = Stage::Closed,
                },
                Stage::Streaming => match self.stream().await {
                    Ok(()) => self.stage = Stage::Closed,
                    Err(e) => {
                        trace!("session ended: {}", e);
                        self.stage = Stage::Closed;
                    }
                },
                Stage::Closed => break,
            }
        }
    }

    /// Reads and accumulates bytes until a complete address header can be
    /// parsed. Returns `Ok(false)` on an orderly EOF before any header byte
    /// arrived (or mid-header — both are a clean close, not an error).
    async fn read_header(&mut self) -> Result<bool> {
        loop {
            if self.header.len() >= MAX_HEADER_LEN {
                return Err(Error::Protocol("header exceeded maximum accumulation size"));
            }

            let mut chunk = [0u8; BUF_SIZE];
            let n = self.client.read(&mut chunk).await?;
            if n == 0 {
                return Ok(false);
            }

            let mut decrypted = chunk[..n].to_vec();
            self.decryptor.decrypt(&mut decrypted);
            self.header.extend_from_slice(&decrypted);

            match address::parse(&self.header)? {
                ParseOutcome::Incomplete => continue,
                ParseOutcome::Complete { address, consumed } => {
                    let payload = self.header.split_off(consumed);
                    self.pending_destination = Some(address);
                    if !payload.is_empty() {
                        let slot = self.c2u.read_slot();
                        slot[..payload.len()].copy_from_slice(&payload);
                        self.c2u.fill(payload.len());
                    }
                    return Ok(true);
                }
            }
        }
    }

    /// Opens the upstream connection, racing it against the connect
    /// timeout.
    async fn connect_upstream(&mut self) -> Result<()> {
        let address = self
            .pending_destination
            .take()
            .expect("connect_upstream is only called after a header has been parsed");
        let (host, port) = address.host_port();

        let connect = TcpStream::connect((host.as_str(), port));
        let stream = match time::timeout(self.connect_timeout, connect).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => {
                warn!("connect to {}:{} failed: {}", host, port, source);
                return Err(Error::Connect { host, port, source });
            }
            Err(_) => {
                warn!("remote timeout connecting to {}:{}", host, port);
                return Err(Error::Timeout);
            }
        };

        debug!("connected to {}", address);
        self.upstream = Some(stream);
        Ok(())
    }

    /// The steady-state forwarding loop. Returns once either side closes or
    /// an unrecoverable I/O error occurs.
    async fn stream(&mut self) -> Result<()> {
        let upstream = self.upstream.as_mut().expect("streaming requires a connected upstream");

        loop {
            let want_read_client = self.c2u.is_empty();
            let want_write_upstream = !self.c2u.is_empty();
            let want_read_upstream = self.u2c.is_empty();
            let want_write_client = !self.u2c.is_empty();

            tokio::select! {
                result = self.client.read(self.c2u.read_slot()), if want_read_client => {
                    let n = result?;
                    if n == 0 {
                        trace!("client closed the connection");
                        return Ok(());
                    }
                    self.c2u.fill(n);
                    self.c2u.transform_pending(|buf| self.decryptor.decrypt(buf));
                }
                result = upstream.write(self.c2u.pending()), if want_write_upstream => {
                    let n = result?;
                    self.c2u.advance(n);
                }
                result = upstream.read(self.u2c.read_slot()), if want_read_upstream => {
                    let n = result?;
                    if n == 0 {
                        trace!("upstream closed the connection");
                        return Ok(());
                    }
                    self.u2c.fill(n);
                    self.u2c.transform_pending(|buf| self.encryptor.encrypt(buf));
                }
                result = self.client.write(self.u2c.pending()), if want_write_client => {
                    let n = result?;
                    self.u2c.advance(n);
                }
            }
        }
    }
}
