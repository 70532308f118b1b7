//! # MQTT 5 Property System
//!
//! Property identifiers and the typed value codec shared by every packet
//! type's property list. A property list is framed as
//! `[varint total_len][id:u8][value]...` (spec §4.3); this module knows,
//! for every identifier, which of the six MQTT value kinds it carries and
//! which packet types may legally contain it.
//!
//! Decoding tracks the declared length with [`u32::checked_sub`] so it can
//! never wrap past zero and read out of bounds, and decrements it by
//! exactly the bytes a property consumed (one id byte plus the value's own
//! length) — not by any extra per-iteration constant.

use crate::codec;
use crate::error::{ErrorPlaceHolder, MqttError, ProtocolError};
use heapless::Vec;

type CodecResult<T> = Result<T, MqttError<ErrorPlaceHolder>>;

/// Property identifiers defined by the MQTT 5.0 specification.
pub mod ids {
    pub const PAYLOAD_FORMAT_INDICATOR: u8 = 0x01;
    pub const MESSAGE_EXPIRY_INTERVAL: u8 = 0x02;
    pub const CONTENT_TYPE: u8 = 0x03;
    pub const RESPONSE_TOPIC: u8 = 0x08;
    pub const CORRELATION_DATA: u8 = 0x09;
    pub const SUBSCRIPTION_IDENTIFIER: u8 = 0x0B;
    pub const SESSION_EXPIRY_INTERVAL: u8 = 0x11;
    pub const ASSIGNED_CLIENT_IDENTIFIER: u8 = 0x12;
    pub const SERVER_KEEP_ALIVE: u8 = 0x13;
    pub const AUTHENTICATION_METHOD: u8 = 0x15;
    pub const AUTHENTICATION_DATA: u8 = 0x16;
    pub const REQUEST_PROBLEM_INFORMATION: u8 = 0x17;
    pub const WILL_DELAY_INTERVAL: u8 = 0x18;
    pub const REQUEST_RESPONSE_INFORMATION: u8 = 0x19;
    pub const RESPONSE_INFORMATION: u8 = 0x1A;
    pub const SERVER_REFERENCE: u8 = 0x1C;
    pub const REASON_STRING: u8 = 0x1F;
    pub const RECEIVE_MAXIMUM: u8 = 0x21;
    pub const TOPIC_ALIAS_MAXIMUM: u8 = 0x22;
    pub const TOPIC_ALIAS: u8 = 0x23;
    pub const MAXIMUM_QOS: u8 = 0x24;
    pub const RETAIN_AVAILABLE: u8 = 0x25;
    pub const USER_PROPERTY: u8 = 0x26;
    pub const MAXIMUM_PACKET_SIZE: u8 = 0x27;
    pub const WILDCARD_SUBSCRIPTION_AVAILABLE: u8 = 0x28;
    pub const SUBSCRIPTION_IDENTIFIER_AVAILABLE: u8 = 0x29;
    pub const SHARED_SUBSCRIPTION_AVAILABLE: u8 = 0x2A;
}

/// How many wire bytes (beyond the id byte) a property's value kind occupies,
/// and how to read/write one.
#[derive(Clone, Copy, PartialEq, Eq)]
enum ValueKind {
    Byte,
    Word,
    Dword,
    VarInt,
    Utf8,
    Binary,
    Utf8Pair,
}

fn value_kind(id: u8) -> Option<ValueKind> {
    use ids::*;
    Some(match id {
        PAYLOAD_FORMAT_INDICATOR
        | REQUEST_PROBLEM_INFORMATION
        | REQUEST_RESPONSE_INFORMATION
        | MAXIMUM_QOS
        | RETAIN_AVAILABLE
        | WILDCARD_SUBSCRIPTION_AVAILABLE
        | SUBSCRIPTION_IDENTIFIER_AVAILABLE
        | SHARED_SUBSCRIPTION_AVAILABLE => ValueKind::Byte,
        SERVER_KEEP_ALIVE | RECEIVE_MAXIMUM | TOPIC_ALIAS_MAXIMUM | TOPIC_ALIAS => ValueKind::Word,
        MESSAGE_EXPIRY_INTERVAL | SESSION_EXPIRY_INTERVAL | WILL_DELAY_INTERVAL
        | MAXIMUM_PACKET_SIZE => ValueKind::Dword,
        SUBSCRIPTION_IDENTIFIER => ValueKind::VarInt,
        CONTENT_TYPE | RESPONSE_TOPIC | ASSIGNED_CLIENT_IDENTIFIER | AUTHENTICATION_METHOD
        | RESPONSE_INFORMATION | SERVER_REFERENCE | REASON_STRING => ValueKind::Utf8,
        CORRELATION_DATA | AUTHENTICATION_DATA => ValueKind::Binary,
        USER_PROPERTY => ValueKind::Utf8Pair,
        _ => return None,
    })
}

/// A decoded (or to-be-encoded) property value, typed by its identifier.
#[derive(Debug, Clone, Copy)]
pub enum PropertyValue<'a> {
    Byte(u8),
    Word(u16),
    Dword(u32),
    VarInt(u32),
    Utf8(&'a str),
    Binary(&'a [u8]),
    Utf8Pair(&'a str, &'a str),
}

/// One `(identifier, value)` pair.
#[derive(Debug, Clone, Copy)]
pub struct Property<'a> {
    pub id: u8,
    pub value: PropertyValue<'a>,
}

/// Maximum number of properties this implementation stores per packet.
/// Generous for any realistic broker exchange; overflow yields
/// `TooManyProperties` rather than silently dropping entries.
pub const MAX_PROPERTIES: usize = 12;

pub type PropertyList<'a> = Vec<Property<'a>, MAX_PROPERTIES>;

fn value_encoded_len(value: &PropertyValue) -> usize {
    match value {
        PropertyValue::Byte(_) => 1,
        PropertyValue::Word(_) => 2,
        PropertyValue::Dword(_) => 4,
        PropertyValue::VarInt(v) => codec::varint_len(*v),
        PropertyValue::Utf8(s) => 2 + s.len(),
        PropertyValue::Binary(b) => 2 + b.len(),
        PropertyValue::Utf8Pair(k, v) => 2 + k.len() + 2 + v.len(),
    }
}

/// Total encoded length of a property list's *contents* (not including the
/// length-prefix varint itself) — one id byte plus the value's own length,
/// per property.
pub fn property_list_len(props: &[Property]) -> usize {
    props.iter().map(|p| 1 + value_encoded_len(&p.value)).sum()
}

fn pack_value(cursor: &mut usize, buf: &mut [u8], value: &PropertyValue) -> CodecResult<()> {
    match value {
        PropertyValue::Byte(v) => codec::pack_byte(cursor, buf, *v),
        PropertyValue::Word(v) => codec::pack_word(cursor, buf, *v),
        PropertyValue::Dword(v) => codec::pack_dword(cursor, buf, *v),
        PropertyValue::VarInt(v) => codec::pack_varint(cursor, buf, *v),
        PropertyValue::Utf8(s) => codec::pack_string(cursor, buf, s),
        PropertyValue::Binary(b) => codec::pack_binary(cursor, buf, b),
        PropertyValue::Utf8Pair(k, v) => {
            codec::pack_string(cursor, buf, k)?;
            codec::pack_string(cursor, buf, v)
        }
    }
}

/// Writes `[varint total_len][id][value]...` for the given property list.
pub fn pack_property_list(cursor: &mut usize, buf: &mut [u8], props: &[Property]) -> CodecResult<()> {
    let total_len = property_list_len(props);
    codec::pack_varint(cursor, buf, total_len as u32)?;
    for prop in props {
        codec::pack_byte(cursor, buf, prop.id)?;
        pack_value(cursor, buf, &prop.value)?;
    }
    Ok(())
}

/// Reads `[varint total_len][id][value]...`, validating every id against
/// `allowed` and returning `UnknownIdentifier` otherwise. Declared length
/// bookkeeping uses `checked_sub`, so a malformed declared length that is
/// shorter than its properties fails with `MalformedPacket` rather than
/// silently wrapping or reading past the list.
pub fn unpack_property_list<'a>(
    cursor: &mut usize,
    buf: &'a [u8],
    allowed: impl Fn(u8) -> bool,
) -> CodecResult<PropertyList<'a>> {
    let declared_len = codec::unpack_varint(cursor, buf)? as usize;
    let mut remaining = declared_len;
    let mut list = PropertyList::new();

    while remaining > 0 {
        let start = *cursor;
        let id = codec::unpack_byte(cursor, buf)?;
        if !allowed(id) {
            return Err(MqttError::Protocol(ProtocolError::UnknownIdentifier));
        }
        let kind = value_kind(id).ok_or(MqttError::Protocol(ProtocolError::UnknownIdentifier))?;
        let value = match kind {
            ValueKind::Byte => PropertyValue::Byte(codec::unpack_byte(cursor, buf)?),
            ValueKind::Word => PropertyValue::Word(codec::unpack_word(cursor, buf)?),
            ValueKind::Dword => PropertyValue::Dword(codec::unpack_dword(cursor, buf)?),
            ValueKind::VarInt => PropertyValue::VarInt(codec::unpack_varint(cursor, buf)?),
            ValueKind::Utf8 => PropertyValue::Utf8(codec::unpack_string(cursor, buf)?),
            ValueKind::Binary => PropertyValue::Binary(codec::unpack_binary(cursor, buf)?),
            ValueKind::Utf8Pair => {
                let key = codec::unpack_string(cursor, buf)?;
                let val = codec::unpack_string(cursor, buf)?;
                PropertyValue::Utf8Pair(key, val)
            }
        };

        let consumed = *cursor - start;
        remaining = remaining
            .checked_sub(consumed)
            .ok_or(MqttError::Protocol(ProtocolError::MalformedPacket))?;

        list.push(Property { id, value })
            .map_err(|_| MqttError::Protocol(ProtocolError::TooManyProperties))?;
    }

    Ok(list)
}

/// Convenience accessors scanning a decoded property list for a named field.
pub trait PropertyListExt<'a> {
    fn find(&self, id: u8) -> Option<&PropertyValue<'a>>;
    fn get_byte(&self, id: u8) -> Option<u8>;
    fn get_word(&self, id: u8) -> Option<u16>;
    fn get_dword(&self, id: u8) -> Option<u32>;
    fn get_varint(&self, id: u8) -> Option<u32>;
    fn get_utf8(&self, id: u8) -> Option<&'a str>;
    fn get_binary(&self, id: u8) -> Option<&'a [u8]>;
    fn user_properties(&self) -> impl Iterator<Item = (&'a str, &'a str)>;
}

impl<'a> PropertyListExt<'a> for PropertyList<'a> {
    fn find(&self, id: u8) -> Option<&PropertyValue<'a>> {
        self.iter().find(|p| p.id == id).map(|p| &p.value)
    }

    fn get_byte(&self, id: u8) -> Option<u8> {
        match self.find(id) {
            Some(PropertyValue::Byte(v)) => Some(*v),
            _ => None,
        }
    }

    fn get_word(&self, id: u8) -> Option<u16> {
        match self.find(id) {
            Some(PropertyValue::Word(v)) => Some(*v),
            _ => None,
        }
    }

    fn get_dword(&self, id: u8) -> Option<u32> {
        match self.find(id) {
            Some(PropertyValue::Dword(v)) => Some(*v),
            _ => None,
        }
    }

    fn get_varint(&self, id: u8) -> Option<u32> {
        match self.find(id) {
            Some(PropertyValue::VarInt(v)) => Some(*v),
            _ => None,
        }
    }

    fn get_utf8(&self, id: u8) -> Option<&'a str> {
        match self.find(id) {
            Some(PropertyValue::Utf8(v)) => Some(v),
            _ => None,
        }
    }

    fn get_binary(&self, id: u8) -> Option<&'a [u8]> {
        match self.find(id) {
            Some(PropertyValue::Binary(v)) => Some(v),
            _ => None,
        }
    }

    fn user_properties(&self) -> impl Iterator<Item = (&'a str, &'a str)> {
        self.iter().filter_map(|p| match p.value {
            PropertyValue::Utf8Pair(k, v) => Some((k, v)),
            _ => None,
        })
    }
}

/// Legal property ids inside a CONNECT packet's connect-properties.
pub fn allowed_in_connect(id: u8) -> bool {
    use ids::*;
    matches!(
        id,
        SESSION_EXPIRY_INTERVAL
            | RECEIVE_MAXIMUM
            | MAXIMUM_PACKET_SIZE
            | TOPIC_ALIAS_MAXIMUM
            | REQUEST_RESPONSE_INFORMATION
            | REQUEST_PROBLEM_INFORMATION
            | USER_PROPERTY
            | AUTHENTICATION_METHOD
            | AUTHENTICATION_DATA
    )
}

/// Legal property ids inside a CONNECT packet's will-properties.
pub fn allowed_in_will(id: u8) -> bool {
    use ids::*;
    matches!(
        id,
        WILL_DELAY_INTERVAL
            | PAYLOAD_FORMAT_INDICATOR
            | MESSAGE_EXPIRY_INTERVAL
            | CONTENT_TYPE
            | RESPONSE_TOPIC
            | CORRELATION_DATA
            | USER_PROPERTY
    )
}

/// Legal property ids inside CONNACK.
pub fn allowed_in_connack(id: u8) -> bool {
    use ids::*;
    matches!(
        id,
        SESSION_EXPIRY_INTERVAL
            | RECEIVE_MAXIMUM
            | MAXIMUM_QOS
            | RETAIN_AVAILABLE
            | MAXIMUM_PACKET_SIZE
            | ASSIGNED_CLIENT_IDENTIFIER
            | TOPIC_ALIAS_MAXIMUM
            | REASON_STRING
            | USER_PROPERTY
            | WILDCARD_SUBSCRIPTION_AVAILABLE
            | SUBSCRIPTION_IDENTIFIER_AVAILABLE
            | SHARED_SUBSCRIPTION_AVAILABLE
            | SERVER_KEEP_ALIVE
            | RESPONSE_INFORMATION
            | SERVER_REFERENCE
            | AUTHENTICATION_METHOD
            | AUTHENTICATION_DATA
    )
}

/// Legal property ids inside PUBLISH.
pub fn allowed_in_publish(id: u8) -> bool {
    use ids::*;
    matches!(
        id,
        PAYLOAD_FORMAT_INDICATOR
            | MESSAGE_EXPIRY_INTERVAL
            | TOPIC_ALIAS
            | RESPONSE_TOPIC
            | CORRELATION_DATA
            | USER_PROPERTY
            | SUBSCRIPTION_IDENTIFIER
            | CONTENT_TYPE
    )
}

/// Legal property ids inside PUBACK/PUBREC/PUBREL/PUBCOMP/UNSUBACK.
pub fn allowed_in_ack(id: u8) -> bool {
    use ids::*;
    matches!(id, REASON_STRING | USER_PROPERTY)
}

/// Legal property ids inside SUBSCRIBE.
pub fn allowed_in_subscribe(id: u8) -> bool {
    use ids::*;
    matches!(id, SUBSCRIPTION_IDENTIFIER | USER_PROPERTY)
}

/// Legal property ids inside SUBACK.
pub fn allowed_in_suback(id: u8) -> bool {
    use ids::*;
    matches!(id, REASON_STRING | USER_PROPERTY)
}

/// Legal property ids inside UNSUBSCRIBE.
pub fn allowed_in_unsubscribe(id: u8) -> bool {
    use ids::*;
    matches!(id, USER_PROPERTY)
}

/// Legal property ids inside DISCONNECT.
pub fn allowed_in_disconnect(id: u8) -> bool {
    use ids::*;
    matches!(
        id,
        SESSION_EXPIRY_INTERVAL | REASON_STRING | USER_PROPERTY | SERVER_REFERENCE
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_mixed_property_list() {
        let props: PropertyList = {
            let mut v = PropertyList::new();
            v.push(Property {
                id: ids::SESSION_EXPIRY_INTERVAL,
                value: PropertyValue::Dword(3600),
            })
            .unwrap();
            v.push(Property {
                id: ids::USER_PROPERTY,
                value: PropertyValue::Utf8Pair("k", "v"),
            })
            .unwrap();
            v
        };

        let mut buf = [0u8; 64];
        let mut cursor = 0;
        pack_property_list(&mut cursor, &mut buf, &props).unwrap();

        let mut read_cursor = 0;
        let decoded = unpack_property_list(&mut read_cursor, &buf, allowed_in_connect).unwrap();
        assert_eq!(decoded.get_dword(ids::SESSION_EXPIRY_INTERVAL), Some(3600));
        assert_eq!(
            decoded.user_properties().next(),
            Some(("k", "v"))
        );
        assert_eq!(read_cursor, cursor);
    }

    #[test]
    fn empty_property_list_round_trips() {
        let props = PropertyList::new();
        let mut buf = [0u8; 4];
        let mut cursor = 0;
        pack_property_list(&mut cursor, &mut buf, &props).unwrap();
        assert_eq!(cursor, 1);
        assert_eq!(buf[0], 0);
    }

    #[test]
    fn rejects_unknown_identifier() {
        let mut buf = [0u8; 8];
        let mut cursor = 0;
        // id 0x00 is not a valid MQTT 5 property identifier.
        codec::pack_varint(&mut cursor, &mut buf, 2).unwrap();
        codec::pack_byte(&mut cursor, &mut buf, 0x00).unwrap();
        codec::pack_byte(&mut cursor, &mut buf, 0x01).unwrap();

        let mut read_cursor = 0;
        let result = unpack_property_list(&mut read_cursor, &buf, allowed_in_connect);
        assert!(matches!(
            result,
            Err(MqttError::Protocol(ProtocolError::UnknownIdentifier))
        ));
    }

    #[test]
    fn rejects_declared_length_shorter_than_property() {
        // Declare a 1-byte property list, but the first property (a dword
        // field) needs 5 bytes. checked_sub must catch this without wrapping.
        let mut buf = [0u8; 8];
        let mut cursor = 0;
        codec::pack_varint(&mut cursor, &mut buf, 1).unwrap();
        codec::pack_byte(&mut cursor, &mut buf, ids::SESSION_EXPIRY_INTERVAL).unwrap();
        codec::pack_dword(&mut cursor, &mut buf, 99).unwrap();

        let mut read_cursor = 0;
        let result = unpack_property_list(&mut read_cursor, &buf, allowed_in_connect);
        assert!(matches!(
            result,
            Err(MqttError::Protocol(ProtocolError::MalformedPacket))
        ));
    }
}
