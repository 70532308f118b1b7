//! # MQTT Packet Structures and Serialization
//!
//! This module defines every MQTT 5.0 control packet type and the traits for
//! encoding and decoding them against a byte buffer. There is exactly one
//! wire format here — MQTT 5.0 — so, unlike a client that also speaks 3.1.1,
//! there is no per-call version parameter.
//!
//! Every packet with a variable-length remaining-length field follows the
//! teacher's reserve-4-bytes-then-backfill trick: the encoder writes the
//! body starting 4 bytes into the buffer, computes the real remaining
//! length afterwards, encodes that length into however many bytes it
//! actually needs (1..=4), and then `copy_within`s the body down to sit
//! directly after the real length field.

use crate::codec;
use crate::error::{ErrorPlaceHolder, MqttError, ProtocolError};
use crate::property::{self, Property, PropertyList, PropertyListExt};
use heapless::Vec;

type PacketResult<T> = Result<T, MqttError<ErrorPlaceHolder>>;

/// Quality of Service levels for MQTT messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum QoS {
    AtMostOnce = 0,
    AtLeastOnce = 1,
    ExactlyOnce = 2,
}

impl QoS {
    pub fn from_u8(val: u8) -> PacketResult<Self> {
        match val {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            _ => Err(MqttError::Protocol(ProtocolError::InvalidQoS)),
        }
    }
}

/// Maximum number of subscribe/unsubscribe filters bundled into one packet.
pub const MAX_SUBSCRIBE_ENTRIES: usize = 8;

/// A single control-packet type, used to tag in-flight expectations
/// (spec §4.4) and the expected-packet-type bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum PacketType {
    Connect = 1,
    ConnAck = 2,
    Publish = 3,
    PubAck = 4,
    PubRec = 5,
    PubRel = 6,
    PubComp = 7,
    Subscribe = 8,
    SubAck = 9,
    Unsubscribe = 10,
    UnsubAck = 11,
    PingReq = 12,
    PingResp = 13,
    Disconnect = 14,
}

impl PacketType {
    pub fn from_u8(val: u8) -> PacketResult<Self> {
        Ok(match val {
            1 => Self::Connect,
            2 => Self::ConnAck,
            3 => Self::Publish,
            4 => Self::PubAck,
            5 => Self::PubRec,
            6 => Self::PubRel,
            7 => Self::PubComp,
            8 => Self::Subscribe,
            9 => Self::SubAck,
            10 => Self::Unsubscribe,
            11 => Self::UnsubAck,
            12 => Self::PingReq,
            13 => Self::PingResp,
            14 => Self::Disconnect,
            other => return Err(MqttError::Protocol(ProtocolError::InvalidPacketType(other))),
        })
    }

    /// Bit position of this type in the expected-packet-type bitmask.
    pub fn bit(self) -> u16 {
        1u16 << (self as u8)
    }
}

/// A trait for packets that can be encoded into a byte buffer. Returns the
/// total number of bytes written.
pub trait EncodePacket {
    fn encode(&self, buf: &mut [u8]) -> PacketResult<usize>;
}

/// A trait for packets that can be decoded from a byte buffer borrowed for
/// the lifetime `'a`.
pub trait DecodePacket<'a>: Sized {
    fn decode(buf: &'a [u8]) -> PacketResult<Self>;
}

/// An enumeration of all fourteen MQTT 5.0 control packets.
#[derive(Debug)]
pub enum MqttPacket<'a> {
    Connect(Connect<'a>),
    ConnAck(ConnAck<'a>),
    Publish(Publish<'a>),
    PubAck(PubAck<'a>),
    PubRec(PubRec<'a>),
    PubRel(PubRel<'a>),
    PubComp(PubComp<'a>),
    Subscribe(Subscribe<'a>),
    SubAck(SubAck<'a>),
    Unsubscribe(Unsubscribe<'a>),
    UnsubAck(UnsubAck<'a>),
    PingReq,
    PingResp,
    Disconnect(Disconnect<'a>),
}

/// Decodes a raw byte buffer (one complete packet, fixed header included)
/// into a specific [`MqttPacket`].
pub fn decode(buf: &[u8]) -> PacketResult<MqttPacket<'_>> {
    if buf.is_empty() {
        return Err(MqttError::Protocol(ProtocolError::MalformedPacket));
    }

    let packet_type = PacketType::from_u8(buf[0] >> 4)?;
    Ok(match packet_type {
        PacketType::Connect => MqttPacket::Connect(Connect::decode(buf)?),
        PacketType::ConnAck => MqttPacket::ConnAck(ConnAck::decode(buf)?),
        PacketType::Publish => MqttPacket::Publish(Publish::decode(buf)?),
        PacketType::PubAck => MqttPacket::PubAck(PubAck::decode(buf)?),
        PacketType::PubRec => MqttPacket::PubRec(PubRec::decode(buf)?),
        PacketType::PubRel => MqttPacket::PubRel(PubRel::decode(buf)?),
        PacketType::PubComp => MqttPacket::PubComp(PubComp::decode(buf)?),
        PacketType::Subscribe => MqttPacket::Subscribe(Subscribe::decode(buf)?),
        PacketType::SubAck => MqttPacket::SubAck(SubAck::decode(buf)?),
        PacketType::Unsubscribe => MqttPacket::Unsubscribe(Unsubscribe::decode(buf)?),
        PacketType::UnsubAck => MqttPacket::UnsubAck(UnsubAck::decode(buf)?),
        PacketType::PingReq => MqttPacket::PingReq,
        PacketType::PingResp => MqttPacket::PingResp,
        PacketType::Disconnect => MqttPacket::Disconnect(Disconnect::decode(buf)?),
    })
}

/// Writes the fixed header (`type << 4 | flags`, then the varint remaining
/// length) ahead of a body that was encoded starting at byte 4, then
/// compacts the body down against the real header length. Returns the total
/// packet length.
fn finish_with_header(buf: &mut [u8], packet_byte: u8, content_start: usize, cursor: usize) -> PacketResult<usize> {
    let remaining_len = cursor - content_start;
    let mut len_cursor = 0;
    let mut len_buf = [0u8; 4];
    codec::pack_varint(&mut len_cursor, &mut len_buf, remaining_len as u32)?;

    let header_len = 1 + len_cursor;
    buf.get(0).ok_or(MqttError::BufferTooSmall)?;
    buf[0] = packet_byte;
    buf[1..1 + len_cursor].copy_from_slice(&len_buf[..len_cursor]);
    buf.copy_within(content_start..cursor, header_len);
    Ok(header_len + remaining_len)
}

fn user_properties_len(props: &[(&str, &str)]) -> usize {
    props
        .iter()
        .map(|(k, v)| 1 + 2 + k.len() + 2 + v.len())
        .sum()
}

fn pack_user_properties(cursor: &mut usize, buf: &mut [u8], props: &[(&str, &str)]) -> PacketResult<()> {
    for (k, v) in props {
        codec::pack_byte(cursor, buf, property::ids::USER_PROPERTY)?;
        codec::pack_string(cursor, buf, k)?;
        codec::pack_string(cursor, buf, v)?;
    }
    Ok(())
}

// --- CONNECT packet ---

/// Will-message fields of a CONNECT packet (spec §4.3, `mqtt_types.h`'s
/// `connect.will` struct).
#[derive(Debug, Default)]
pub struct Will<'a> {
    pub topic: &'a str,
    pub payload: &'a [u8],
    pub qos: QoS,
    pub retain: bool,
    pub delay_interval: u32,
    pub payload_format_indicator: bool,
    pub message_expiry_interval: Option<u32>,
    pub content_type: Option<&'a str>,
    pub response_topic: Option<&'a str>,
    pub correlation_data: Option<&'a [u8]>,
}

impl Default for QoS {
    fn default() -> Self {
        QoS::AtMostOnce
    }
}

#[derive(Debug)]
pub struct Connect<'a> {
    pub client_id: &'a str,
    pub clean_start: bool,
    pub keep_alive: u16,
    pub username: Option<&'a str>,
    pub password: Option<&'a [u8]>,
    pub will: Option<Will<'a>>,
    pub session_expiry_interval: Option<u32>,
    pub receive_maximum: Option<u16>,
    pub maximum_packet_size: Option<u32>,
    pub topic_alias_maximum: Option<u16>,
    pub request_response_information: bool,
    pub request_problem_information: bool,
    pub authentication_method: Option<&'a str>,
    pub authentication_data: Option<&'a [u8]>,
    pub user_properties: &'a [(&'a str, &'a str)],
}

impl<'a> Connect<'a> {
    pub fn new(client_id: &'a str, keep_alive: u16, clean_start: bool) -> Self {
        Self {
            client_id,
            clean_start,
            keep_alive,
            username: None,
            password: None,
            will: None,
            session_expiry_interval: None,
            receive_maximum: None,
            maximum_packet_size: None,
            topic_alias_maximum: None,
            request_response_information: false,
            request_problem_information: false,
            authentication_method: None,
            authentication_data: None,
            user_properties: &[],
        }
    }

    fn connect_properties_len(&self) -> usize {
        let mut len = 0;
        if self.session_expiry_interval.is_some() {
            len += 1 + 4;
        }
        if self.receive_maximum.is_some() {
            len += 1 + 2;
        }
        if self.maximum_packet_size.is_some() {
            len += 1 + 4;
        }
        if self.topic_alias_maximum.is_some() {
            len += 1 + 2;
        }
        if self.request_response_information {
            len += 1 + 1;
        }
        if self.request_problem_information {
            len += 1 + 1;
        }
        if let Some(m) = self.authentication_method {
            len += 1 + 2 + m.len();
        }
        if let Some(d) = self.authentication_data {
            len += 1 + 2 + d.len();
        }
        len += user_properties_len(self.user_properties);
        len
    }

    fn pack_connect_properties(&self, cursor: &mut usize, buf: &mut [u8]) -> PacketResult<()> {
        codec::pack_varint(cursor, buf, self.connect_properties_len() as u32)?;
        if let Some(v) = self.session_expiry_interval {
            codec::pack_byte(cursor, buf, property::ids::SESSION_EXPIRY_INTERVAL)?;
            codec::pack_dword(cursor, buf, v)?;
        }
        if let Some(v) = self.receive_maximum {
            codec::pack_byte(cursor, buf, property::ids::RECEIVE_MAXIMUM)?;
            codec::pack_word(cursor, buf, v)?;
        }
        if let Some(v) = self.maximum_packet_size {
            codec::pack_byte(cursor, buf, property::ids::MAXIMUM_PACKET_SIZE)?;
            codec::pack_dword(cursor, buf, v)?;
        }
        if let Some(v) = self.topic_alias_maximum {
            codec::pack_byte(cursor, buf, property::ids::TOPIC_ALIAS_MAXIMUM)?;
            codec::pack_word(cursor, buf, v)?;
        }
        if self.request_response_information {
            codec::pack_byte(cursor, buf, property::ids::REQUEST_RESPONSE_INFORMATION)?;
            codec::pack_byte(cursor, buf, 1)?;
        }
        if self.request_problem_information {
            codec::pack_byte(cursor, buf, property::ids::REQUEST_PROBLEM_INFORMATION)?;
            codec::pack_byte(cursor, buf, 1)?;
        }
        if let Some(m) = self.authentication_method {
            codec::pack_byte(cursor, buf, property::ids::AUTHENTICATION_METHOD)?;
            codec::pack_string(cursor, buf, m)?;
        }
        if let Some(d) = self.authentication_data {
            codec::pack_byte(cursor, buf, property::ids::AUTHENTICATION_DATA)?;
            codec::pack_binary(cursor, buf, d)?;
        }
        pack_user_properties(cursor, buf, self.user_properties)?;
        Ok(())
    }

    fn will_properties_len(will: &Will) -> usize {
        let mut len = 1 + 4; // delay interval is always present
        if will.payload_format_indicator {
            len += 1 + 1;
        }
        if will.message_expiry_interval.is_some() {
            len += 1 + 4;
        }
        if let Some(c) = will.content_type {
            len += 1 + 2 + c.len();
        }
        if let Some(r) = will.response_topic {
            len += 1 + 2 + r.len();
        }
        if let Some(c) = will.correlation_data {
            len += 1 + 2 + c.len();
        }
        len
    }

    fn pack_will(cursor: &mut usize, buf: &mut [u8], will: &Will) -> PacketResult<()> {
        codec::pack_varint(cursor, buf, Self::will_properties_len(will) as u32)?;
        codec::pack_byte(cursor, buf, property::ids::WILL_DELAY_INTERVAL)?;
        codec::pack_dword(cursor, buf, will.delay_interval)?;
        if will.payload_format_indicator {
            codec::pack_byte(cursor, buf, property::ids::PAYLOAD_FORMAT_INDICATOR)?;
            codec::pack_byte(cursor, buf, 1)?;
        }
        if let Some(v) = will.message_expiry_interval {
            codec::pack_byte(cursor, buf, property::ids::MESSAGE_EXPIRY_INTERVAL)?;
            codec::pack_dword(cursor, buf, v)?;
        }
        if let Some(c) = will.content_type {
            codec::pack_byte(cursor, buf, property::ids::CONTENT_TYPE)?;
            codec::pack_string(cursor, buf, c)?;
        }
        if let Some(r) = will.response_topic {
            codec::pack_byte(cursor, buf, property::ids::RESPONSE_TOPIC)?;
            codec::pack_string(cursor, buf, r)?;
        }
        if let Some(c) = will.correlation_data {
            codec::pack_byte(cursor, buf, property::ids::CORRELATION_DATA)?;
            codec::pack_binary(cursor, buf, c)?;
        }
        codec::pack_string(cursor, buf, will.topic)?;
        codec::pack_binary(cursor, buf, will.payload)?;
        Ok(())
    }
}

impl<'a> EncodePacket for Connect<'a> {
    fn encode(&self, buf: &mut [u8]) -> PacketResult<usize> {
        let mut cursor = 4;
        let content_start = cursor;

        codec::pack_string(&mut cursor, buf, "MQTT")?;
        codec::pack_byte(&mut cursor, buf, 5)?; // protocol level, MQTT 5.0

        let mut flags = 0u8;
        if self.clean_start {
            flags |= 0x02;
        }
        if self.will.is_some() {
            flags |= 0x04;
            if let Some(w) = &self.will {
                flags |= (w.qos as u8) << 3;
                if w.retain {
                    flags |= 0x20;
                }
            }
        }
        if self.password.is_some() {
            flags |= 0x40;
        }
        if self.username.is_some() {
            flags |= 0x80;
        }
        codec::pack_byte(&mut cursor, buf, flags)?;
        codec::pack_word(&mut cursor, buf, self.keep_alive)?;

        self.pack_connect_properties(&mut cursor, buf)?;
        codec::pack_string(&mut cursor, buf, self.client_id)?;

        if let Some(will) = &self.will {
            Self::pack_will(&mut cursor, buf, will)?;
        }
        if let Some(u) = self.username {
            codec::pack_string(&mut cursor, buf, u)?;
        }
        if let Some(p) = self.password {
            codec::pack_binary(&mut cursor, buf, p)?;
        }

        finish_with_header(buf, 0x10, content_start, cursor)
    }
}

impl<'a> DecodePacket<'a> for Connect<'a> {
    fn decode(buf: &'a [u8]) -> PacketResult<Self> {
        let mut cursor = 1;
        codec::unpack_varint(&mut cursor, buf)?;

        let protocol_name = codec::unpack_string(&mut cursor, buf)?;
        if protocol_name != "MQTT" {
            return Err(MqttError::Protocol(ProtocolError::MalformedPacket));
        }
        let _protocol_level = codec::unpack_byte(&mut cursor, buf)?;
        let connect_flags = codec::unpack_byte(&mut cursor, buf)?;
        let clean_start = connect_flags & 0x02 != 0;
        let will_flag = connect_flags & 0x04 != 0;
        let will_qos = QoS::from_u8((connect_flags >> 3) & 0x03)?;
        let will_retain = connect_flags & 0x20 != 0;
        let password_flag = connect_flags & 0x40 != 0;
        let username_flag = connect_flags & 0x80 != 0;
        let keep_alive = codec::unpack_word(&mut cursor, buf)?;

        let props = property::unpack_property_list(&mut cursor, buf, property::allowed_in_connect)?;
        let client_id = codec::unpack_string(&mut cursor, buf)?;

        let will = if will_flag {
            let will_props =
                property::unpack_property_list(&mut cursor, buf, property::allowed_in_will)?;
            let topic = codec::unpack_string(&mut cursor, buf)?;
            let payload = codec::unpack_binary(&mut cursor, buf)?;
            Some(Will {
                topic,
                payload,
                qos: will_qos,
                retain: will_retain,
                delay_interval: will_props.get_dword(property::ids::WILL_DELAY_INTERVAL).unwrap_or(0),
                payload_format_indicator: will_props
                    .get_byte(property::ids::PAYLOAD_FORMAT_INDICATOR)
                    .unwrap_or(0)
                    != 0,
                message_expiry_interval: will_props.get_dword(property::ids::MESSAGE_EXPIRY_INTERVAL),
                content_type: will_props.get_utf8(property::ids::CONTENT_TYPE),
                response_topic: will_props.get_utf8(property::ids::RESPONSE_TOPIC),
                correlation_data: will_props.get_binary(property::ids::CORRELATION_DATA),
            })
        } else {
            None
        };

        let username = if username_flag {
            Some(codec::unpack_string(&mut cursor, buf)?)
        } else {
            None
        };
        let password = if password_flag {
            Some(codec::unpack_binary(&mut cursor, buf)?)
        } else {
            None
        };

        Ok(Connect {
            client_id,
            clean_start,
            keep_alive,
            username,
            password,
            will,
            session_expiry_interval: props.get_dword(property::ids::SESSION_EXPIRY_INTERVAL),
            receive_maximum: props.get_word(property::ids::RECEIVE_MAXIMUM),
            maximum_packet_size: props.get_dword(property::ids::MAXIMUM_PACKET_SIZE),
            topic_alias_maximum: props.get_word(property::ids::TOPIC_ALIAS_MAXIMUM),
            request_response_information: props
                .get_byte(property::ids::REQUEST_RESPONSE_INFORMATION)
                .unwrap_or(0)
                != 0,
            request_problem_information: props
                .get_byte(property::ids::REQUEST_PROBLEM_INFORMATION)
                .unwrap_or(0)
                != 0,
            authentication_method: props.get_utf8(property::ids::AUTHENTICATION_METHOD),
            authentication_data: props.get_binary(property::ids::AUTHENTICATION_DATA),
            user_properties: &[],
        })
    }
}

// --- CONNACK packet ---

#[derive(Debug)]
pub struct ConnAck<'a> {
    pub session_present: bool,
    pub reason_code: u8,
    pub session_expiry_interval: Option<u32>,
    pub receive_maximum: Option<u16>,
    pub maximum_qos: Option<u8>,
    pub retain_available: Option<bool>,
    pub maximum_packet_size: Option<u32>,
    pub assigned_client_identifier: Option<&'a str>,
    pub topic_alias_maximum: Option<u16>,
    pub reason_string: Option<&'a str>,
    pub wildcard_subscription_available: Option<bool>,
    pub subscription_identifiers_available: Option<bool>,
    pub shared_subscription_available: Option<bool>,
    pub server_keep_alive: Option<u16>,
    pub response_information: Option<&'a str>,
    pub server_reference: Option<&'a str>,
    pub authentication_method: Option<&'a str>,
    pub authentication_data: Option<&'a [u8]>,
}

impl<'a> DecodePacket<'a> for ConnAck<'a> {
    fn decode(buf: &'a [u8]) -> PacketResult<Self> {
        let mut cursor = 1;
        codec::unpack_varint(&mut cursor, buf)?;

        let ack_flags = codec::unpack_byte(&mut cursor, buf)?;
        let session_present = ack_flags & 0x01 != 0;
        let reason_code = codec::unpack_byte(&mut cursor, buf)?;
        let props = property::unpack_property_list(&mut cursor, buf, property::allowed_in_connack)?;

        Ok(ConnAck {
            session_present,
            reason_code,
            session_expiry_interval: props.get_dword(property::ids::SESSION_EXPIRY_INTERVAL),
            receive_maximum: props.get_word(property::ids::RECEIVE_MAXIMUM),
            maximum_qos: props.get_byte(property::ids::MAXIMUM_QOS),
            retain_available: props.get_byte(property::ids::RETAIN_AVAILABLE).map(|b| b != 0),
            maximum_packet_size: props.get_dword(property::ids::MAXIMUM_PACKET_SIZE),
            assigned_client_identifier: props.get_utf8(property::ids::ASSIGNED_CLIENT_IDENTIFIER),
            topic_alias_maximum: props.get_word(property::ids::TOPIC_ALIAS_MAXIMUM),
            reason_string: props.get_utf8(property::ids::REASON_STRING),
            wildcard_subscription_available: props
                .get_byte(property::ids::WILDCARD_SUBSCRIPTION_AVAILABLE)
                .map(|b| b != 0),
            subscription_identifiers_available: props
                .get_byte(property::ids::SUBSCRIPTION_IDENTIFIER_AVAILABLE)
                .map(|b| b != 0),
            shared_subscription_available: props
                .get_byte(property::ids::SHARED_SUBSCRIPTION_AVAILABLE)
                .map(|b| b != 0),
            server_keep_alive: props.get_word(property::ids::SERVER_KEEP_ALIVE),
            response_information: props.get_utf8(property::ids::RESPONSE_INFORMATION),
            server_reference: props.get_utf8(property::ids::SERVER_REFERENCE),
            authentication_method: props.get_utf8(property::ids::AUTHENTICATION_METHOD),
            authentication_data: props.get_binary(property::ids::AUTHENTICATION_DATA),
        })
    }
}

// --- PUBLISH packet ---

#[derive(Debug)]
pub struct Publish<'a> {
    pub topic: &'a str,
    pub qos: QoS,
    pub dup: bool,
    pub retain: bool,
    pub payload: &'a [u8],
    pub packet_id: Option<u16>,
    pub payload_format_indicator: bool,
    pub message_expiry_interval: Option<u32>,
    pub topic_alias: Option<u16>,
    pub response_topic: Option<&'a str>,
    pub correlation_data: Option<&'a [u8]>,
    pub subscription_identifier: Option<u32>,
    pub content_type: Option<&'a str>,
}

impl<'a> Publish<'a> {
    fn properties_len(&self) -> usize {
        let mut len = 0;
        if self.payload_format_indicator {
            len += 1 + 1;
        }
        if self.message_expiry_interval.is_some() {
            len += 1 + 4;
        }
        if self.topic_alias.is_some() {
            len += 1 + 2;
        }
        if let Some(r) = self.response_topic {
            len += 1 + 2 + r.len();
        }
        if let Some(c) = self.correlation_data {
            len += 1 + 2 + c.len();
        }
        if let Some(s) = self.subscription_identifier {
            len += 1 + codec::varint_len(s);
        }
        if let Some(c) = self.content_type {
            len += 1 + 2 + c.len();
        }
        len
    }
}

impl<'a> EncodePacket for Publish<'a> {
    fn encode(&self, buf: &mut [u8]) -> PacketResult<usize> {
        if self.topic.contains(['+', '#']) {
            return Err(MqttError::Protocol(ProtocolError::InvalidTopic));
        }

        let mut cursor = 4;
        let content_start = cursor;

        codec::pack_string(&mut cursor, buf, self.topic)?;
        if self.qos != QoS::AtMostOnce {
            let id = self
                .packet_id
                .ok_or(MqttError::Protocol(ProtocolError::InvalidPacketId))?;
            codec::pack_word(&mut cursor, buf, id)?;
        }

        codec::pack_varint(&mut cursor, buf, self.properties_len() as u32)?;
        if self.payload_format_indicator {
            codec::pack_byte(&mut cursor, buf, property::ids::PAYLOAD_FORMAT_INDICATOR)?;
            codec::pack_byte(&mut cursor, buf, 1)?;
        }
        if let Some(v) = self.message_expiry_interval {
            codec::pack_byte(&mut cursor, buf, property::ids::MESSAGE_EXPIRY_INTERVAL)?;
            codec::pack_dword(&mut cursor, buf, v)?;
        }
        if let Some(v) = self.topic_alias {
            codec::pack_byte(&mut cursor, buf, property::ids::TOPIC_ALIAS)?;
            codec::pack_word(&mut cursor, buf, v)?;
        }
        if let Some(r) = self.response_topic {
            codec::pack_byte(&mut cursor, buf, property::ids::RESPONSE_TOPIC)?;
            codec::pack_string(&mut cursor, buf, r)?;
        }
        if let Some(c) = self.correlation_data {
            codec::pack_byte(&mut cursor, buf, property::ids::CORRELATION_DATA)?;
            codec::pack_binary(&mut cursor, buf, c)?;
        }
        if let Some(s) = self.subscription_identifier {
            codec::pack_byte(&mut cursor, buf, property::ids::SUBSCRIPTION_IDENTIFIER)?;
            codec::pack_varint(&mut cursor, buf, s)?;
        }
        if let Some(c) = self.content_type {
            codec::pack_byte(&mut cursor, buf, property::ids::CONTENT_TYPE)?;
            codec::pack_string(&mut cursor, buf, c)?;
        }

        if cursor + self.payload.len() > buf.len() {
            return Err(MqttError::BufferTooSmall);
        }
        buf[cursor..cursor + self.payload.len()].copy_from_slice(self.payload);
        cursor += self.payload.len();

        let flags = ((self.qos as u8) << 1)
            | (self.dup as u8) << 3
            | (self.retain as u8);
        finish_with_header(buf, 0x30 | flags, content_start, cursor)
    }
}

impl<'a> DecodePacket<'a> for Publish<'a> {
    fn decode(buf: &'a [u8]) -> PacketResult<Self> {
        let flags = buf[0] & 0x0F;
        let dup = flags & 0x08 != 0;
        let retain = flags & 0x01 != 0;
        let qos = QoS::from_u8((flags >> 1) & 0x03)?;

        let mut cursor = 1;
        let remaining_len = codec::unpack_varint(&mut cursor, buf)? as usize;
        let packet_end = cursor + remaining_len;

        let topic = codec::unpack_string(&mut cursor, buf)?;
        let packet_id = if qos != QoS::AtMostOnce {
            Some(codec::unpack_word(&mut cursor, buf)?)
        } else {
            None
        };

        let props = property::unpack_property_list(&mut cursor, buf, property::allowed_in_publish)?;

        if cursor > packet_end {
            return Err(MqttError::Protocol(ProtocolError::InvalidPacketSize));
        }
        let payload = &buf[cursor..packet_end];

        Ok(Publish {
            topic,
            qos,
            dup,
            retain,
            payload,
            packet_id,
            payload_format_indicator: props
                .get_byte(property::ids::PAYLOAD_FORMAT_INDICATOR)
                .unwrap_or(0)
                != 0,
            message_expiry_interval: props.get_dword(property::ids::MESSAGE_EXPIRY_INTERVAL),
            topic_alias: props.get_word(property::ids::TOPIC_ALIAS),
            response_topic: props.get_utf8(property::ids::RESPONSE_TOPIC),
            correlation_data: props.get_binary(property::ids::CORRELATION_DATA),
            subscription_identifier: props.get_varint(property::ids::SUBSCRIPTION_IDENTIFIER),
            content_type: props.get_utf8(property::ids::CONTENT_TYPE),
        })
    }
}

// --- Shared shape for PUBACK / PUBREC / PUBREL / PUBCOMP / UNSUBACK ---

/// The four QoS-handshake acknowledgement packets (and UNSUBACK) share an
/// identical `[packet_id][reason_code][properties]` body; the reason code
/// and properties are omitted entirely when the reason is `Success` (0x00)
/// and there are no properties, per spec §4.3.
#[derive(Debug)]
pub struct Ack<'a> {
    pub packet_id: u16,
    pub reason_code: u8,
    pub reason_string: Option<&'a str>,
    pub user_properties: Vec<(&'a str, &'a str), 4>,
}

impl<'a> Ack<'a> {
    fn decode_body(buf: &'a [u8]) -> PacketResult<Self> {
        let mut cursor = 1;
        let remaining_len = codec::unpack_varint(&mut cursor, buf)? as usize;
        let packet_end = cursor + remaining_len;

        let packet_id = codec::unpack_word(&mut cursor, buf)?;
        if cursor >= packet_end {
            return Ok(Ack {
                packet_id,
                reason_code: 0,
                reason_string: None,
                user_properties: Vec::new(),
            });
        }

        let reason_code = codec::unpack_byte(&mut cursor, buf)?;
        let mut reason_string = None;
        let mut user_properties = Vec::new();
        if cursor < packet_end {
            let props = property::unpack_property_list(&mut cursor, buf, property::allowed_in_ack)?;
            reason_string = props.get_utf8(property::ids::REASON_STRING);
            for pair in props.user_properties() {
                let _ = user_properties.push(pair);
            }
        }

        Ok(Ack {
            packet_id,
            reason_code,
            reason_string,
            user_properties,
        })
    }

    fn encode_body(&self, buf: &mut [u8], packet_byte: u8) -> PacketResult<usize> {
        let mut cursor = 4;
        let content_start = cursor;
        codec::pack_word(&mut cursor, buf, self.packet_id)?;

        if self.reason_code != 0 || self.reason_string.is_some() || !self.user_properties.is_empty() {
            codec::pack_byte(&mut cursor, buf, self.reason_code)?;
            let mut props: PropertyList = PropertyList::new();
            if let Some(s) = self.reason_string {
                props
                    .push(Property {
                        id: property::ids::REASON_STRING,
                        value: property::PropertyValue::Utf8(s),
                    })
                    .map_err(|_| MqttError::Protocol(ProtocolError::TooManyProperties))?;
            }
            for (k, v) in &self.user_properties {
                props
                    .push(Property {
                        id: property::ids::USER_PROPERTY,
                        value: property::PropertyValue::Utf8Pair(k, v),
                    })
                    .map_err(|_| MqttError::Protocol(ProtocolError::TooManyProperties))?;
            }
            property::pack_property_list(&mut cursor, buf, &props)?;
        }

        finish_with_header(buf, packet_byte, content_start, cursor)
    }
}

macro_rules! ack_packet {
    ($name:ident, $packet_byte:expr) => {
        #[derive(Debug)]
        pub struct $name<'a>(pub Ack<'a>);

        impl<'a> DecodePacket<'a> for $name<'a> {
            fn decode(buf: &'a [u8]) -> PacketResult<Self> {
                Ok($name(Ack::decode_body(buf)?))
            }
        }

        impl<'a> EncodePacket for $name<'a> {
            fn encode(&self, buf: &mut [u8]) -> PacketResult<usize> {
                self.0.encode_body(buf, $packet_byte)
            }
        }
    };
}

ack_packet!(PubAck, 0x40);
ack_packet!(PubRec, 0x50);
ack_packet!(PubComp, 0x70);

/// PUBREL carries the reserved bits `0b0010` in its fixed-header flags,
/// unlike the other three handshake acks.
#[derive(Debug)]
pub struct PubRel<'a>(pub Ack<'a>);

impl<'a> DecodePacket<'a> for PubRel<'a> {
    fn decode(buf: &'a [u8]) -> PacketResult<Self> {
        if buf[0] & 0x0F != 0x02 {
            return Err(MqttError::Protocol(ProtocolError::MalformedPacket));
        }
        Ok(PubRel(Ack::decode_body(buf)?))
    }
}

impl<'a> EncodePacket for PubRel<'a> {
    fn encode(&self, buf: &mut [u8]) -> PacketResult<usize> {
        self.0.encode_body(buf, 0x62)
    }
}

// --- SUBSCRIBE packet ---

#[derive(Debug, Clone, Copy)]
pub struct SubscribeEntry<'a> {
    pub topic: &'a str,
    pub qos: QoS,
    pub no_local: bool,
    pub retain_as_published: bool,
    pub retain_handling: u8,
}

#[derive(Debug)]
pub struct Subscribe<'a> {
    pub packet_id: u16,
    pub entries: Vec<SubscribeEntry<'a>, MAX_SUBSCRIBE_ENTRIES>,
    pub subscription_identifier: Option<u32>,
    pub user_properties: &'a [(&'a str, &'a str)],
}

impl<'a> Subscribe<'a> {
    pub fn single(packet_id: u16, topic: &'a str, qos: QoS) -> Self {
        let mut entries = Vec::new();
        let _ = entries.push(SubscribeEntry {
            topic,
            qos,
            no_local: false,
            retain_as_published: false,
            retain_handling: 0,
        });
        Self {
            packet_id,
            entries,
            subscription_identifier: None,
            user_properties: &[],
        }
    }
}

impl<'a> EncodePacket for Subscribe<'a> {
    fn encode(&self, buf: &mut [u8]) -> PacketResult<usize> {
        let mut cursor = 4;
        let content_start = cursor;
        codec::pack_word(&mut cursor, buf, self.packet_id)?;

        let mut props_len = user_properties_len(self.user_properties);
        if let Some(s) = self.subscription_identifier {
            props_len += 1 + codec::varint_len(s);
        }
        codec::pack_varint(&mut cursor, buf, props_len as u32)?;
        if let Some(s) = self.subscription_identifier {
            codec::pack_byte(&mut cursor, buf, property::ids::SUBSCRIPTION_IDENTIFIER)?;
            codec::pack_varint(&mut cursor, buf, s)?;
        }
        pack_user_properties(&mut cursor, buf, self.user_properties)?;

        for entry in &self.entries {
            codec::pack_string(&mut cursor, buf, entry.topic)?;
            let options = (entry.qos as u8)
                | (entry.no_local as u8) << 2
                | (entry.retain_as_published as u8) << 3
                | (entry.retain_handling & 0x03) << 4;
            codec::pack_byte(&mut cursor, buf, options)?;
        }

        finish_with_header(buf, 0x82, content_start, cursor)
    }
}

impl<'a> DecodePacket<'a> for Subscribe<'a> {
    fn decode(buf: &'a [u8]) -> PacketResult<Self> {
        if buf[0] & 0x0F != 0x02 {
            return Err(MqttError::Protocol(ProtocolError::MalformedPacket));
        }
        let mut cursor = 1;
        let remaining_len = codec::unpack_varint(&mut cursor, buf)? as usize;
        let packet_end = cursor + remaining_len;

        let packet_id = codec::unpack_word(&mut cursor, buf)?;
        let props = property::unpack_property_list(&mut cursor, buf, property::allowed_in_subscribe)?;

        let mut entries = Vec::new();
        while cursor < packet_end {
            let topic = codec::unpack_string(&mut cursor, buf)?;
            let options = codec::unpack_byte(&mut cursor, buf)?;
            entries
                .push(SubscribeEntry {
                    topic,
                    qos: QoS::from_u8(options & 0x03)?,
                    no_local: options & 0x04 != 0,
                    retain_as_published: options & 0x08 != 0,
                    retain_handling: (options >> 4) & 0x03,
                })
                .map_err(|_| MqttError::Protocol(ProtocolError::OutOfMemory))?;
        }

        Ok(Subscribe {
            packet_id,
            entries,
            subscription_identifier: props.get_varint(property::ids::SUBSCRIPTION_IDENTIFIER),
            user_properties: &[],
        })
    }
}

// --- SUBACK packet ---

#[derive(Debug)]
pub struct SubAck<'a> {
    pub packet_id: u16,
    pub reason_codes: Vec<u8, MAX_SUBSCRIBE_ENTRIES>,
    pub reason_string: Option<&'a str>,
}

impl<'a> DecodePacket<'a> for SubAck<'a> {
    fn decode(buf: &'a [u8]) -> PacketResult<Self> {
        let mut cursor = 1;
        let remaining_len = codec::unpack_varint(&mut cursor, buf)? as usize;
        let packet_end = cursor + remaining_len;

        let packet_id = codec::unpack_word(&mut cursor, buf)?;
        let props = property::unpack_property_list(&mut cursor, buf, property::allowed_in_suback)?;

        let mut reason_codes = Vec::new();
        while cursor < packet_end {
            reason_codes
                .push(codec::unpack_byte(&mut cursor, buf)?)
                .map_err(|_| MqttError::Protocol(ProtocolError::OutOfMemory))?;
        }

        Ok(SubAck {
            packet_id,
            reason_codes,
            reason_string: props.get_utf8(property::ids::REASON_STRING),
        })
    }
}

// --- UNSUBSCRIBE packet ---

#[derive(Debug)]
pub struct Unsubscribe<'a> {
    pub packet_id: u16,
    pub topics: Vec<&'a str, MAX_SUBSCRIBE_ENTRIES>,
    pub user_properties: &'a [(&'a str, &'a str)],
}

impl<'a> Unsubscribe<'a> {
    pub fn single(packet_id: u16, topic: &'a str) -> Self {
        let mut topics = Vec::new();
        let _ = topics.push(topic);
        Self {
            packet_id,
            topics,
            user_properties: &[],
        }
    }
}

impl<'a> EncodePacket for Unsubscribe<'a> {
    fn encode(&self, buf: &mut [u8]) -> PacketResult<usize> {
        let mut cursor = 4;
        let content_start = cursor;
        codec::pack_word(&mut cursor, buf, self.packet_id)?;

        codec::pack_varint(&mut cursor, buf, user_properties_len(self.user_properties) as u32)?;
        pack_user_properties(&mut cursor, buf, self.user_properties)?;

        for topic in &self.topics {
            codec::pack_string(&mut cursor, buf, topic)?;
        }

        finish_with_header(buf, 0xA2, content_start, cursor)
    }
}

impl<'a> DecodePacket<'a> for Unsubscribe<'a> {
    fn decode(buf: &'a [u8]) -> PacketResult<Self> {
        if buf[0] & 0x0F != 0x02 {
            return Err(MqttError::Protocol(ProtocolError::MalformedPacket));
        }
        let mut cursor = 1;
        let remaining_len = codec::unpack_varint(&mut cursor, buf)? as usize;
        let packet_end = cursor + remaining_len;

        let packet_id = codec::unpack_word(&mut cursor, buf)?;
        property::unpack_property_list(&mut cursor, buf, property::allowed_in_unsubscribe)?;

        let mut topics = Vec::new();
        while cursor < packet_end {
            topics
                .push(codec::unpack_string(&mut cursor, buf)?)
                .map_err(|_| MqttError::Protocol(ProtocolError::OutOfMemory))?;
        }

        Ok(Unsubscribe {
            packet_id,
            topics,
            user_properties: &[],
        })
    }
}

// --- UNSUBACK packet ---

/// UNSUBACK carries one reason code per unsubscribed filter rather than the
/// single reason code the other handshake acks use.
#[derive(Debug)]
pub struct UnsubAck<'a> {
    pub packet_id: u16,
    pub reason_codes: Vec<u8, MAX_SUBSCRIBE_ENTRIES>,
    pub reason_string: Option<&'a str>,
}

impl<'a> DecodePacket<'a> for UnsubAck<'a> {
    fn decode(buf: &'a [u8]) -> PacketResult<Self> {
        let mut cursor = 1;
        let remaining_len = codec::unpack_varint(&mut cursor, buf)? as usize;
        let packet_end = cursor + remaining_len;

        let packet_id = codec::unpack_word(&mut cursor, buf)?;
        let props = property::unpack_property_list(&mut cursor, buf, property::allowed_in_ack)?;

        let mut reason_codes = Vec::new();
        while cursor < packet_end {
            reason_codes
                .push(codec::unpack_byte(&mut cursor, buf)?)
                .map_err(|_| MqttError::Protocol(ProtocolError::OutOfMemory))?;
        }

        Ok(UnsubAck {
            packet_id,
            reason_codes,
            reason_string: props.get_utf8(property::ids::REASON_STRING),
        })
    }
}

// --- PINGREQ / PINGRESP packets ---

#[derive(Debug)]
pub struct PingReq;

impl EncodePacket for PingReq {
    fn encode(&self, buf: &mut [u8]) -> PacketResult<usize> {
        if buf.len() < 2 {
            return Err(MqttError::BufferTooSmall);
        }
        buf[0] = 0xC0;
        buf[1] = 0x00;
        Ok(2)
    }
}

#[derive(Debug)]
pub struct PingResp;

impl EncodePacket for PingResp {
    fn encode(&self, buf: &mut [u8]) -> PacketResult<usize> {
        if buf.len() < 2 {
            return Err(MqttError::BufferTooSmall);
        }
        buf[0] = 0xD0;
        buf[1] = 0x00;
        Ok(2)
    }
}

// --- DISCONNECT packet ---

#[derive(Debug)]
pub struct Disconnect<'a> {
    pub reason_code: u8,
    pub session_expiry_interval: Option<u32>,
    pub reason_string: Option<&'a str>,
    pub server_reference: Option<&'a str>,
}

impl<'a> Disconnect<'a> {
    pub fn new(reason_code: u8) -> Self {
        Self {
            reason_code,
            session_expiry_interval: None,
            reason_string: None,
            server_reference: None,
        }
    }

    /// Length of this DISCONNECT's own property list. Distinct from the
    /// CONNECT will-message estimator — disconnect properties are
    /// `{session expiry, reason string, server reference, user properties}`,
    /// not `{delay interval, payload format, ...}`.
    fn properties_len(&self) -> usize {
        let mut len = 0;
        if self.session_expiry_interval.is_some() {
            len += 1 + 4;
        }
        if let Some(s) = self.reason_string {
            len += 1 + 2 + s.len();
        }
        if let Some(s) = self.server_reference {
            len += 1 + 2 + s.len();
        }
        len
    }
}

impl<'a> EncodePacket for Disconnect<'a> {
    fn encode(&self, buf: &mut [u8]) -> PacketResult<usize> {
        let mut cursor = 4;
        let content_start = cursor;

        let has_properties = self.session_expiry_interval.is_some()
            || self.reason_string.is_some()
            || self.server_reference.is_some();

        if self.reason_code != 0 || has_properties {
            codec::pack_byte(&mut cursor, buf, self.reason_code)?;
            if has_properties {
                codec::pack_varint(&mut cursor, buf, self.properties_len() as u32)?;
                if let Some(v) = self.session_expiry_interval {
                    codec::pack_byte(&mut cursor, buf, property::ids::SESSION_EXPIRY_INTERVAL)?;
                    codec::pack_dword(&mut cursor, buf, v)?;
                }
                if let Some(s) = self.reason_string {
                    codec::pack_byte(&mut cursor, buf, property::ids::REASON_STRING)?;
                    codec::pack_string(&mut cursor, buf, s)?;
                }
                if let Some(s) = self.server_reference {
                    codec::pack_byte(&mut cursor, buf, property::ids::SERVER_REFERENCE)?;
                    codec::pack_string(&mut cursor, buf, s)?;
                }
            }
        }

        finish_with_header(buf, 0xE0, content_start, cursor)
    }
}

impl<'a> DecodePacket<'a> for Disconnect<'a> {
    fn decode(buf: &'a [u8]) -> PacketResult<Self> {
        let mut cursor = 1;
        let remaining_len = codec::unpack_varint(&mut cursor, buf)? as usize;
        let packet_end = cursor + remaining_len;

        if cursor >= packet_end {
            return Ok(Disconnect::new(0));
        }
        let reason_code = codec::unpack_byte(&mut cursor, buf)?;

        let (session_expiry_interval, reason_string, server_reference) = if cursor < packet_end {
            let props =
                property::unpack_property_list(&mut cursor, buf, property::allowed_in_disconnect)?;
            (
                props.get_dword(property::ids::SESSION_EXPIRY_INTERVAL),
                props.get_utf8(property::ids::REASON_STRING),
                props.get_utf8(property::ids::SERVER_REFERENCE),
            )
        } else {
            (None, None, None)
        };

        Ok(Disconnect {
            reason_code,
            session_expiry_interval,
            reason_string,
            server_reference,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_round_trip_minimal() {
        let connect = Connect::new("device-1", 60, true);
        let mut buf = [0u8; 64];
        let len = connect.encode(&mut buf).unwrap();

        let decoded = Connect::decode(&buf[..len]).unwrap();
        assert_eq!(decoded.client_id, "device-1");
        assert_eq!(decoded.keep_alive, 60);
        assert!(decoded.clean_start);
        assert!(decoded.will.is_none());
    }

    #[test]
    fn connect_round_trip_with_will_and_credentials() {
        let mut connect = Connect::new("device-2", 30, false);
        connect.username = Some("user");
        connect.password = Some(b"secret");
        connect.will = Some(Will {
            topic: "device-2/lwt",
            payload: b"offline",
            qos: QoS::AtLeastOnce,
            retain: true,
            delay_interval: 5,
            payload_format_indicator: true,
            message_expiry_interval: Some(120),
            content_type: Some("text/plain"),
            response_topic: None,
            correlation_data: None,
        });

        let mut buf = [0u8; 128];
        let len = connect.encode(&mut buf).unwrap();
        let decoded = Connect::decode(&buf[..len]).unwrap();

        assert_eq!(decoded.username, Some("user"));
        assert_eq!(decoded.password, Some(&b"secret"[..]));
        let will = decoded.will.unwrap();
        assert_eq!(will.topic, "device-2/lwt");
        assert_eq!(will.payload, b"offline");
        assert_eq!(will.qos, QoS::AtLeastOnce);
        assert!(will.retain);
        assert_eq!(will.delay_interval, 5);
        assert_eq!(will.message_expiry_interval, Some(120));
    }

    #[test]
    fn publish_round_trip_qos1() {
        let publish = Publish {
            topic: "sensors/temp",
            qos: QoS::AtLeastOnce,
            dup: false,
            retain: false,
            payload: b"21.5",
            packet_id: Some(42),
            payload_format_indicator: true,
            message_expiry_interval: None,
            topic_alias: None,
            response_topic: None,
            correlation_data: None,
            subscription_identifier: None,
            content_type: Some("text/plain"),
        };

        let mut buf = [0u8; 64];
        let len = publish.encode(&mut buf).unwrap();
        let decoded = Publish::decode(&buf[..len]).unwrap();

        assert_eq!(decoded.topic, "sensors/temp");
        assert_eq!(decoded.payload, b"21.5");
        assert_eq!(decoded.packet_id, Some(42));
        assert!(decoded.payload_format_indicator);
        assert_eq!(decoded.content_type, Some("text/plain"));
    }

    #[test]
    fn publish_rejects_wildcard_topic() {
        let publish = Publish {
            topic: "sensors/+/temp",
            qos: QoS::AtMostOnce,
            dup: false,
            retain: false,
            payload: b"21.5",
            packet_id: None,
            payload_format_indicator: false,
            message_expiry_interval: None,
            topic_alias: None,
            response_topic: None,
            correlation_data: None,
            subscription_identifier: None,
            content_type: None,
        };
        let mut buf = [0u8; 64];
        assert!(matches!(
            publish.encode(&mut buf),
            Err(MqttError::Protocol(ProtocolError::InvalidTopic))
        ));
    }

    #[test]
    fn puback_with_no_reason_omits_body() {
        let ack = PubAck(Ack {
            packet_id: 7,
            reason_code: 0,
            reason_string: None,
            user_properties: Vec::new(),
        });
        let mut buf = [0u8; 16];
        let len = ack.encode(&mut buf).unwrap();
        assert_eq!(len, 4); // header(2) + packet_id(2), reason code omitted

        let decoded = PubAck::decode(&buf[..len]).unwrap();
        assert_eq!(decoded.0.packet_id, 7);
        assert_eq!(decoded.0.reason_code, 0);
    }

    #[test]
    fn pubrel_requires_reserved_flags() {
        let mut buf = [0u8; 16];
        buf[0] = 0x60; // missing the 0b0010 reserved bits
        buf[1] = 0x02;
        buf[2] = 0;
        buf[3] = 1;
        assert!(PubRel::decode(&buf[..4]).is_err());
    }

    #[test]
    fn subscribe_round_trip() {
        let sub = Subscribe::single(9, "a/b", QoS::ExactlyOnce);
        let mut buf = [0u8; 32];
        let len = sub.encode(&mut buf).unwrap();
        let decoded = Subscribe::decode(&buf[..len]).unwrap();
        assert_eq!(decoded.packet_id, 9);
        assert_eq!(decoded.entries[0].topic, "a/b");
        assert_eq!(decoded.entries[0].qos, QoS::ExactlyOnce);
    }

    #[test]
    fn pingreq_is_two_bytes() {
        let mut buf = [0u8; 4];
        let len = PingReq.encode(&mut buf).unwrap();
        assert_eq!(&buf[..len], &[0xC0, 0x00]);
    }

    #[test]
    fn pingresp_is_two_bytes() {
        let mut buf = [0u8; 4];
        let len = PingResp.encode(&mut buf).unwrap();
        assert_eq!(&buf[..len], &[0xD0, 0x00]);
    }

    #[test]
    fn disconnect_with_zero_reason_and_no_properties_is_minimal() {
        let disconnect = Disconnect::new(0);
        let mut buf = [0u8; 16];
        let len = disconnect.encode(&mut buf).unwrap();
        assert_eq!(&buf[..len], &[0xE0, 0x00]);
    }

    #[test]
    fn disconnect_properties_do_not_reuse_will_estimator() {
        let mut disconnect = Disconnect::new(0x04);
        disconnect.reason_string = Some("normal shutdown");
        let mut buf = [0u8; 64];
        let len = disconnect.encode(&mut buf).unwrap();
        let decoded = Disconnect::decode(&buf[..len]).unwrap();
        assert_eq!(decoded.reason_code, 0x04);
        assert_eq!(decoded.reason_string, Some("normal shutdown"));
    }
}
