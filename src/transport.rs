//! # MQTT Transport Abstraction
//!
//! This module defines two transport traits, one per adapter style the spec
//! requires:
//!
//! - [`MqttTransport`]: the async, event-driven adapter. With the Rust 2024
//!   Edition this uses native `async fn`, removing the need for the
//!   `#[async_trait]` macro.
//! - [`BlockingMqttTransport`]: the poll-driven adapter, for callers that
//!   drive the session engine from a plain loop instead of an async
//!   executor.
//!
//! Both are hardware and network-stack agnostic; [`TcpTransport`] is the one
//! concrete implementation provided, built on `embassy-net`.

use crate::error::MqttError;
use embassy_net::tcp::{Error as TcpError, TcpSocket};
use embassy_time::{Duration, Timer};
use embedded_io_async::Write;

/// A trait representing a transport for MQTT packets.
#[allow(async_fn_in_trait)]
pub trait MqttTransport {
    /// The error type returned by the transport.
    type Error: core::fmt::Debug;

    /// Sends a buffer of data over the transport.
    async fn send(&mut self, buf: &[u8]) -> Result<(), Self::Error>;

    /// Receives data from the transport into a buffer.
    ///
    /// Returns the number of bytes read.
    async fn recv(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;
}

/// A marker trait for transport-related errors.
pub trait TransportError: core::fmt::Debug {}

// Implement TransportError for MqttError so TcpTransport works with client methods
impl<T: core::fmt::Debug> TransportError for MqttError<T> {}

// Implement TransportError for embassy_net tcp error
impl TransportError for TcpError {}

/// Outcome of a non-blocking send/receive attempt on a
/// [`BlockingMqttTransport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IoStatus {
    /// `n` bytes were transferred.
    Done(usize),
    /// The transport cannot make progress right now (connection not yet
    /// established, send buffer full) — retry on the next poll.
    Pending,
}

/// A poll-driven transport: `open_conn`/`close_conn` manage the connection,
/// `send`/`recv` never block and report [`IoStatus::Pending`] instead.
///
/// Grounded on the two concrete adapters in the original implementation:
/// a Berkeley-sockets adapter built on blocking `poll()` with a fixed
/// timeout, and an lwIP adapter whose `send` defers the client's CONNECT
/// until the stack's own connection-established callback fires, reporting
/// `Pending` in the meantime. Both shapes are expressible through this one
/// trait; which behavior a concrete implementation exhibits is up to it.
pub trait BlockingMqttTransport {
    type Error: core::fmt::Debug;

    /// Whether the underlying channel (TCP/TLS) is up. Distinct from the
    /// session engine's own `connected` flag, which additionally requires a
    /// successful CONNACK — grounded on the original's separate
    /// `net.connected` (channel) vs. `client->connected` (session) fields.
    fn is_connected(&self) -> bool;

    /// Opens a connection to `addr`. Implementations that connect
    /// asynchronously (e.g. via a network stack callback) may return before
    /// the connection is established; `send`/`recv` then report `Pending`
    /// until it completes, and `is_connected` reports `false` in the
    /// meantime.
    fn open_conn(&mut self, addr: &str) -> Result<(), Self::Error>;

    fn close_conn(&mut self) -> Result<(), Self::Error>;

    /// Reserves a send buffer of exactly `len` bytes. Implementations
    /// backed by a fixed-size scratch buffer (the common embedded case)
    /// fail with an out-of-memory error when `len` exceeds their capacity,
    /// matching the lwIP adapter's `alloc_send_buf` bounds check against its
    /// static buffer.
    fn alloc_send_buf(&mut self, len: usize) -> Result<(), Self::Error>;

    /// Releases the buffer reserved by `alloc_send_buf`. A no-op for
    /// implementations that never actually allocated anything.
    fn free_send_buf(&mut self);

    /// Symmetric to `alloc_send_buf`, for the receive side.
    fn alloc_recv_buf(&mut self, cap: usize) -> Result<(), Self::Error>;

    fn free_recv_buf(&mut self);

    /// Attempts to send `buf`. Returns `Pending` rather than blocking when
    /// the connection is not yet ready or the underlying send buffer is
    /// full — the deferred-connect path relies on this: the caller keeps
    /// `buf`'s bytes and retries once `is_connected()` turns true.
    fn send(&mut self, buf: &[u8]) -> Result<IoStatus, Self::Error>;

    /// Attempts to receive into `buf`. Returns `Pending` rather than
    /// blocking when no data is currently available.
    fn recv(&mut self, buf: &mut [u8]) -> Result<IoStatus, Self::Error>;
}

/// TCP transport implementation using `embassy-net`.
pub struct TcpTransport<'a> {
    socket: TcpSocket<'a>,
    timeout: Duration,
}

impl<'a> TcpTransport<'a> {
    /// Creates a new `TcpTransport` with the given socket and timeout.
    pub fn new(socket: TcpSocket<'a>, timeout: Duration) -> Self {
        Self { socket, timeout }
    }

    /// A helper function to perform a read with a timeout.
    async fn read_with_timeout(
        &mut self,
        buf: &mut [u8],
    ) -> Result<usize, MqttError<embassy_net::tcp::Error>> {
        // Use `select` to race the read operation against a timer.
        let read_fut = self.socket.read(buf);
        let timer = Timer::after(self.timeout);

        match futures::future::select(core::pin::pin!(read_fut), core::pin::pin!(timer)).await {
            futures::future::Either::Left((Ok(n), _)) => {
                #[cfg(feature = "esp-println")]
                esp_println::println!("TCP read: {} bytes", n);

                if n == 0 {
                    // If the peer closes the connection, read returns 0.
                    #[cfg(feature = "esp-println")]
                    esp_println::println!("TCP connection closed by peer!");

                    Err(MqttError::Protocol(
                        super::error::ProtocolError::ConnectionClosed,
                    ))
                } else {
                    Ok(n)
                }
            }
            futures::future::Either::Left((Err(e), _)) => {
                #[cfg(feature = "esp-println")]
                esp_println::println!("TCP read error: {:?}", e);

                Err(MqttError::Transport(e))
            }
            futures::future::Either::Right(((), _)) => {
                #[cfg(feature = "esp-println")]
                esp_println::println!("TCP read timeout!");

                Err(MqttError::Timeout)
            }
        }
    }
}

impl<'a> MqttTransport for TcpTransport<'a> {
    type Error = MqttError<embassy_net::tcp::Error>;

    async fn send(&mut self, buf: &[u8]) -> Result<(), Self::Error> {
        #[cfg(feature = "esp-println")]
        esp_println::println!("TCP TX ({} bytes): {:02X?}", buf.len(), buf);

        self.socket.write_all(buf).await.map_err(|e| {
            #[cfg(feature = "esp-println")]
            esp_println::println!("TCP write error: {:?}", e);
            MqttError::Transport(e)
        })?;

        // Flush to ensure data is actually sent to the network
        self.socket.flush().await.map_err(MqttError::Transport)
    }

    async fn recv(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        self.read_with_timeout(buf).await
    }
}
