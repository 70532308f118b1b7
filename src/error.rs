//! # Error Types
//!
//! This module defines the error types used throughout the MQTT client library,
//! providing detailed information about potential failures, from transport issues
//! to protocol violations.

use crate::transport;

/// A placeholder error type used in generic contexts where the specific transport
/// error is not yet known, such as inside the wire codec which never touches a
/// transport.
#[derive(Debug, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ErrorPlaceHolder;

impl transport::TransportError for ErrorPlaceHolder {}

/// The primary error enum for the MQTT client.
///
/// It is generic over the transport error type `T`, allowing it to wrap
/// specific errors from the underlying network transport (e.g., TCP, UART).
#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MqttError<T> {
    /// An error occurred in the underlying transport layer.
    Transport(T),
    /// A protocol-level error occurred, indicating a violation of the MQTT specification.
    Protocol(ProtocolError),
    /// The connection was refused by the broker. The enclosed code provides the reason.
    ConnectionRefused(ConnectReasonCode),
    /// The client is not currently connected to the broker.
    NotConnected,
    /// The buffer provided for an operation was too small.
    BufferTooSmall,
    /// An operation timed out.
    Timeout,
}

/// Implements the `From` trait to allow for automatic conversion of any transport
/// error into an `MqttError`. This is what allows the `?` operator to work
/// seamlessly on `Result`s from the transport layer.
impl<T: transport::TransportError> From<T> for MqttError<T> {
    fn from(err: T) -> Self {
        MqttError::Transport(err)
    }
}

impl<T> MqttError<T> {
    /// Re-wraps an error that is known to never carry the `Transport` variant
    /// (codec and property errors never touch a transport) into the caller's
    /// concrete error type `T`.
    pub fn cast_protocol_error(other: MqttError<ErrorPlaceHolder>) -> MqttError<T> {
        match other {
            MqttError::Protocol(p) => MqttError::Protocol(p),
            MqttError::ConnectionRefused(c) => MqttError::ConnectionRefused(c),
            MqttError::NotConnected => MqttError::NotConnected,
            MqttError::BufferTooSmall => MqttError::BufferTooSmall,
            MqttError::Timeout => MqttError::Timeout,
            MqttError::Transport(ErrorPlaceHolder) => {
                // Unreachable: nothing that produces `MqttError<ErrorPlaceHolder>`
                // ever constructs the `Transport` variant.
                MqttError::Protocol(ProtocolError::MalformedPacket)
            }
        }
    }
}

/// Represents the reason codes for a connection refusal (`CONNACK`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectReasonCode {
    Success,
    UnspecifiedError,
    MalformedPacket,
    ProtocolError,
    ImplementationSpecificError,
    UnsupportedProtocolVersion,
    ClientIdentifierNotValid,
    BadUserNameOrPassword,
    NotAuthorized,
    ServerUnavailable,
    ServerBusy,
    Banned,
    BadAuthenticationMethod,
    TopicNameInvalid,
    PacketTooLarge,
    QuotaExceeded,
    PayloadFormatInvalid,
    RetainNotSupported,
    QoSNotSupported,
    UseAnotherServer,
    ServerMoved,
    ConnectionRateExceeded,
    Other(u8),
}

impl From<u8> for ConnectReasonCode {
    fn from(val: u8) -> Self {
        match val {
            0x00 => Self::Success,
            0x80 => Self::UnspecifiedError,
            0x81 => Self::MalformedPacket,
            0x82 => Self::ProtocolError,
            0x83 => Self::ImplementationSpecificError,
            0x84 => Self::UnsupportedProtocolVersion,
            0x85 => Self::ClientIdentifierNotValid,
            0x86 => Self::BadUserNameOrPassword,
            0x87 => Self::NotAuthorized,
            0x88 => Self::ServerUnavailable,
            0x89 => Self::ServerBusy,
            0x8A => Self::Banned,
            0x8C => Self::BadAuthenticationMethod,
            0x90 => Self::TopicNameInvalid,
            0x95 => Self::PacketTooLarge,
            0x97 => Self::QuotaExceeded,
            0x99 => Self::PayloadFormatInvalid,
            0x9A => Self::RetainNotSupported,
            0x9B => Self::QoSNotSupported,
            0x9C => Self::UseAnotherServer,
            0x9D => Self::ServerMoved,
            0x9F => Self::ConnectionRateExceeded,
            other => Self::Other(other),
        }
    }
}

impl ConnectReasonCode {
    /// Reason codes below 0x80 indicate the broker accepted the connection.
    pub fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Enumerates specific MQTT protocol errors. Kinds only, not identifiers —
/// matches the taxonomy every caller of this crate is expected to branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProtocolError {
    /// A required input (slice, handle) was absent where one is mandatory.
    NullReference,
    /// The operation requires an established MQTT session (CONNACK received).
    NotConnected,
    /// A string supplied by the caller, or read from the wire, failed UTF-8 validation.
    InvalidEncoding,
    /// A QoS value outside {0, 1, 2} was supplied.
    InvalidQoS,
    /// The broker does not support the requested QoS for this operation.
    QoSNotSupported,
    /// The broker does not support retained messages.
    RetainNotSupported,
    /// The broker does not support a requested capability (wildcard or shared subscriptions).
    Unsupported,
    /// A publish topic contained a wildcard character (`+` or `#`).
    InvalidTopic,
    /// A packet identifier was zero, or did not match an in-flight reservation.
    InvalidPacketId,
    /// The in-flight table has no free slots.
    OutOfResource,
    /// A fixed-capacity allocation (buffer, string, property list) overflowed.
    OutOfMemory,
    /// A received packet's structure did not match its declared length.
    MalformedPacket,
    /// A property identifier is not valid within the containing packet type.
    UnknownIdentifier,
    /// A received packet's type bit was not set in the expected-packet mask,
    /// or its packet-id was awaiting a different response type.
    UnexpectedPacketType,
    /// The fixed-header remaining-length disagreed with the number of bytes received.
    InvalidPacketSize,
    /// An invalid packet type byte was received.
    InvalidPacketType(u8),
    /// The server sent an invalid or unexpected response.
    InvalidResponse,
    /// The connection was closed by the broker.
    ConnectionClosed,
    /// The payload of a message exceeds the maximum allowable size.
    PayloadTooLarge,
    /// A string was not valid UTF-8 (alias of `InvalidEncoding` kept for call sites
    /// that specifically decode a UTF-8 string field).
    InvalidUtf8String,
    /// A packet contained more properties than this implementation's fixed capacity.
    TooManyProperties,
    /// The remote host could not be reached.
    HostUnavailable,
    /// A hardware failure was reported by the transport.
    HwFailure,
    /// A software failure was reported by the transport (e.g. stack exhaustion).
    SwFailure,
    /// CONNACK reason code was >= 0x80.
    ServerDeclined(u8),
}
