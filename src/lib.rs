//! # MQTT 5.0 Protocol Engine
//!
//! `mqtt5-core` is a `no_std`, `no_alloc` implementation of the MQTT 5.0
//! protocol layer: the wire codec for all fourteen control-packet types, the
//! property system, UTF-8 validation of every identifier and string
//! exchanged with the broker, in-flight packet-identifier bookkeeping, and
//! the QoS 1/2 delivery handshakes.
//!
//! ## What this crate is not
//!
//! It is a protocol engine, not a full client stack. It never opens a
//! socket, never chooses a concurrency model, and never matches topics to
//! local subscribers — those are the caller's job. Bytes go in, bytes come
//! out, through whichever transport the caller supplies.
//!
//! ## Core Features
//!
//! - **`no_std` & `no_alloc`:** buffers are `heapless`-backed; nothing here
//!   requires the standard library or a global allocator.
//! - **Transport agnostic:** [`transport::MqttTransport`] (async) and
//!   [`transport::BlockingMqttTransport`] (poll-driven) are both plain
//!   traits the caller implements over TCP, TLS, or anything else.
//! - **All fourteen MQTT 5.0 control packets**, with two-pass-equivalent
//!   encoding (size and emission always agree, see [`packet`]) and
//!   property-id dispatch on decode (see [`property`]).
//! - **QoS 0, 1, and 2**, including the sender- and receiver-side QoS 2
//!   handshake and idempotent re-acknowledgement of duplicate deliveries.
//!
//! ## Usage
//!
//! ```ignore
//! use mqtt5_core::{Client, MqttEventHandler, QoS};
//!
//! let mut client: Client<_, 20> = Client::new(transport);
//! client.connect("broker.local:1883", "device-1", 60, true, 0).await?;
//! client.publish("sensors/temp", b"21.5", QoS::AtLeastOnce, false).await?;
//! ```
//!
//! Caller-overridable session events live behind [`client::MqttEventHandler`]
//! — every method has a no-op default, so implementing a handful is enough.

#![no_std]

pub mod client;
pub mod codec;
pub mod error;
pub mod inflight;
pub mod packet;
pub mod property;
pub mod transport;
pub mod utf8;

/// In-flight table capacity when a caller has no stronger requirement —
/// mirrors the protocol's own `Receive Maximum` default.
pub const MQTT_RECEIVE_MAXIMUM: usize = 20;

/// Correlation-data bytes kept for a received PUBLISH before the decoder
/// silently drops the remainder (the packet still parses; see
/// [`client::ReceivedPublish`]).
pub const MQTT_CORRELATION_DATA_MAXIMUM: usize = 64;

/// Default TCP port for unencrypted MQTT.
pub const MQTT_PORT: u16 = 1883;

/// Default poll timeout, in milliseconds, for a [`transport::BlockingMqttTransport`]
/// adapter built around a poll loop.
pub const MQTT_POLL_TIMEOUT: u32 = 100;

// Re-export the most commonly used types at the crate root.
pub use client::{BlockingClient, Client, MqttEventHandler, NoopEventHandler};
pub use error::{MqttError, ProtocolError};
pub use packet::QoS;
pub use transport::{BlockingMqttTransport, MqttTransport, TcpTransport};
