// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Datagram producer for the ingest queue.
//!
//! Every received datagram is submitted as one event, byte for byte. The
//! listener stops when its cancellation token fires; dropping it releases its
//! ingest handle so the workers can drain and stop.

use crate::errors::ListenerError;
use crate::queue::{IngestHandle, Submitted};
use std::net::SocketAddr;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

// Largest UDP payload
const BUFFER_SIZE: usize = 65_535;

enum BufferReader {
    UdpSocket(tokio::net::UdpSocket),

    /// Replays a fixed datagram, for tests
    #[allow(dead_code)]
    MirrorTest(Vec<u8>, SocketAddr),
}

impl BufferReader {
    async fn read(&self) -> std::io::Result<(Vec<u8>, SocketAddr)> {
        match self {
            BufferReader::UdpSocket(socket) => {
                let mut buf = [0; BUFFER_SIZE];
                let (amt, src) = socket.recv_from(&mut buf).await?;
                Ok((buf[..amt].to_vec(), src))
            }
            BufferReader::MirrorTest(data, src) => Ok((data.clone(), *src)),
        }
    }
}

pub struct EventListener {
    cancel_token: CancellationToken,
    ingest: IngestHandle,
    buffer_reader: BufferReader,
}

impl EventListener {
    /// Binds a UDP socket on `address` and forwards datagrams to `ingest`.
    pub async fn bind(
        address: &str,
        ingest: IngestHandle,
        cancel_token: CancellationToken,
    ) -> Result<Self, ListenerError> {
        let socket = tokio::net::UdpSocket::bind(address)
            .await
            .map_err(|source| ListenerError::Bind {
                address: address.to_string(),
                source,
            })?;
        debug!("Event listener bound to {}", address);

        Ok(Self {
            cancel_token,
            ingest,
            buffer_reader: BufferReader::UdpSocket(socket),
        })
    }

    /// Bound address, `None` for non-socket readers
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &self.buffer_reader {
            BufferReader::UdpSocket(socket) => socket.local_addr().ok(),
            BufferReader::MirrorTest(..) => None,
        }
    }

    /// Main receive loop, runs until cancelled.
    pub async fn spin(self) {
        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => break,
                result = self.consume_event() => {
                    if let Err(e) = result {
                        error!("{}", e);
                    }
                }
            }
        }
        debug!("Event listener stopped");
    }

    /// Receives one datagram and submits it.
    async fn consume_event(&self) -> Result<Submitted, ListenerError> {
        let (buf, src) = self
            .buffer_reader
            .read()
            .await
            .map_err(ListenerError::Receive)?;
        trace!("Received {} bytes from {}", buf.len(), src);

        Ok(self.ingest.submit(buf).await)
    }
}
