//! # Session Engine
//!
//! `Client` drives one MQTT 5.0 session over an injected [`MqttTransport`]:
//! connect/disconnect, publish at any QoS, subscribe/unsubscribe, the
//! explicit QoS 1/2 handshake operations, and the packet processor that
//! decodes inbound bytes and advances the in-flight table.
//!
//! QoS acknowledgement is automatic on the receiving side — exactly as the
//! reference implementation's `process_publish` calls `mqtt_puback`/
//! `mqtt_pubrec` inline — so a caller never has to remember to ack an
//! inbound PUBLISH. The explicit `puback`/`pubrec`/`pubrel`/`pubcomp`
//! methods exist because `process_packet` itself calls them internally when
//! it completes each handshake hop; they are `pub` so a caller building a
//! custom retry/redelivery path can drive them directly too.

use crate::error::{ConnectReasonCode, ErrorPlaceHolder, MqttError, ProtocolError};
use crate::inflight::InFlightTable;
use crate::packet::{
    self, Ack, Connect, Disconnect, EncodePacket, MqttPacket, PacketType, PingReq, PingResp,
    PubAck, PubComp, PubRec, PubRel, Publish, QoS, Subscribe, Unsubscribe, MAX_SUBSCRIBE_ENTRIES,
};
use crate::transport::{BlockingMqttTransport, IoStatus, MqttTransport};
use heapless::String;

/// Capacity of a received PUBLISH's correlation-data buffer (spec §6.4):
/// larger values are silently dropped by the decoder, but the packet still
/// parses — the broker is not told anything went wrong.
pub const CORRELATION_DATA_MAXIMUM: usize = 64;

/// A PUBLISH delivered to this client, valid until the next
/// [`Client::process_packet`] call overwrites it.
#[derive(Debug, Default)]
pub struct ReceivedPublish<const TOPIC: usize, const RESP: usize, const CT: usize> {
    pub topic: String<TOPIC>,
    pub response_topic: String<RESP>,
    pub content_type: String<CT>,
    pub correlation_data: heapless::Vec<u8, CORRELATION_DATA_MAXIMUM>,
    pub packet_id: u16,
    pub message_expiry_interval: Option<u32>,
    pub subscription_identifier: Option<u32>,
    pub topic_alias: Option<u16>,
    pub qos: u8,
    pub payload_format_indicator: bool,
    pub dup: bool,
    pub retain: bool,
}

/// Caller overrides for session events. Every method has a no-op default,
/// matching the original's weak-symbol callback surface (spec §6.3) —
/// implement only what you need.
pub trait MqttEventHandler {
    fn on_connected(&mut self) {}
    fn on_received_disconnect(&mut self, _reason_code: u8) {}
    fn on_received_publish(&mut self) {}
    fn on_subscription_granted(&mut self, _packet_id: u16, _index: usize, _qos: QoS) {}
    fn on_subscription_declined(&mut self, _packet_id: u16, _index: usize, _reason: u8) {}
    fn on_publish_acknowledged(&mut self, _packet_id: u16, _reason: u8) {}
    fn on_publish_completed(&mut self, _packet_id: u16, _reason: u8) {}
    fn on_ping_received(&mut self) {}
    fn on_user_property(&mut self, _origin: PacketType, _key: &str, _value: &str) {}
}

/// A no-op handler, for callers that don't need any events — the library
/// equivalent of the original's unpatched weak symbols.
pub struct NoopEventHandler;
impl MqttEventHandler for NoopEventHandler {}

type ClientResult<T, E> = Result<T, MqttError<E>>;

/// Broker capabilities as negotiated by CONNACK (spec §4.3). Installed with
/// protocol defaults (max QoS 2, everything else available) before the
/// CONNACK's own properties are applied, so a broker that omits a property
/// is assumed to support the default.
#[derive(Debug, Clone, Copy)]
struct BrokerCapabilities {
    max_qos: u8,
    retain_available: bool,
    wildcard_subscription_available: bool,
    shared_subscription_available: bool,
    subscription_identifiers_available: bool,
    server_keep_alive: u16,
    maximum_packet_size: u32,
}

impl BrokerCapabilities {
    fn defaults(client_keep_alive: u16, client_max_packet_size: u32) -> Self {
        Self {
            max_qos: 2,
            retain_available: true,
            wildcard_subscription_available: true,
            shared_subscription_available: true,
            subscription_identifiers_available: true,
            server_keep_alive: client_keep_alive,
            maximum_packet_size: client_max_packet_size,
        }
    }

    fn apply_connack(&mut self, connack: &packet::ConnAck) {
        if let Some(v) = connack.maximum_qos {
            self.max_qos = v;
        }
        if let Some(v) = connack.retain_available {
            self.retain_available = v;
        }
        if let Some(v) = connack.wildcard_subscription_available {
            self.wildcard_subscription_available = v;
        }
        if let Some(v) = connack.shared_subscription_available {
            self.shared_subscription_available = v;
        }
        if let Some(v) = connack.subscription_identifiers_available {
            self.subscription_identifiers_available = v;
        }
        if let Some(v) = connack.server_keep_alive {
            self.server_keep_alive = v;
        }
        if let Some(v) = connack.maximum_packet_size {
            self.maximum_packet_size = v;
        }
    }
}

/// One MQTT 5.0 session bound to transport `T`.
///
/// `IN_FLIGHT` bounds concurrent unacknowledged exchanges (ordinarily
/// `MQTT_RECEIVE_MAXIMUM`); `TOPIC`/`RESP`/`CT` bound the owned strings kept
/// for the most recently received PUBLISH.
pub struct Client<T, const IN_FLIGHT: usize, const TOPIC: usize = 128, const RESP: usize = 64, const CT: usize = 32>
where
    T: MqttTransport,
{
    transport: T,
    connected: bool,
    expected_ptypes: u16,
    inflight: InFlightTable<IN_FLIGHT>,
    broker_addr: String<16>,
    keep_alive: u16,
    capabilities: BrokerCapabilities,
    pub received_publish: ReceivedPublish<TOPIC, RESP, CT>,
    /// Reason codes from the most recently received UNSUBACK, one per
    /// original unsubscribe entry — kept for inspection since, unlike
    /// SUBACK, there is no per-entry granted/declined callback (spec §4.3:
    /// "like SUBACK, reason codes stored for inspection").
    pub last_unsuback_reasons: heapless::Vec<u8, MAX_SUBSCRIBE_ENTRIES>,
}

/// Maximum packet size this client advertises to the broker (spec §4.3's
/// CONNACK capability default before any override); also the size of every
/// stack-allocated send buffer below.
const DEFAULT_MAX_PACKET_SIZE: u32 = 512;

impl<T, const IN_FLIGHT: usize, const TOPIC: usize, const RESP: usize, const CT: usize>
    Client<T, IN_FLIGHT, TOPIC, RESP, CT>
where
    T: MqttTransport,
{
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            connected: false,
            // PINGREQ is always legal — a broker may use it as a health
            // probe at any time. PINGRESP is only expected while a ping()
            // is outstanding; ping() sets the bit, receiving PINGRESP clears it.
            expected_ptypes: PacketType::PingReq.bit(),
            inflight: InFlightTable::new(),
            broker_addr: String::new(),
            keep_alive: 0,
            capabilities: BrokerCapabilities::defaults(0, DEFAULT_MAX_PACKET_SIZE),
            received_publish: ReceivedPublish::default(),
            last_unsuback_reasons: heapless::Vec::new(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Maximum QoS the broker will accept, as negotiated by CONNACK (2 until
    /// a CONNACK says otherwise).
    pub fn broker_max_qos(&self) -> u8 {
        self.capabilities.max_qos
    }

    /// Whether the broker accepts retained messages.
    pub fn broker_retain_available(&self) -> bool {
        self.capabilities.retain_available
    }

    /// Whether the broker honors subscription identifiers (spec §4.2
    /// `SUBSCRIPTION_IDENTIFIER` property) — callers may skip sending one
    /// when this is `false`, since the broker would just ignore it.
    pub fn broker_subscription_identifiers_available(&self) -> bool {
        self.capabilities.subscription_identifiers_available
    }

    /// The broker's requested keep-alive, overriding the client's own
    /// request (spec §4.3 CONNACK `Server Keep Alive`); equal to the
    /// client's requested keep-alive until CONNACK overrides it.
    pub fn server_keep_alive(&self) -> u16 {
        self.capabilities.server_keep_alive
    }

    /// The keep-alive this client requested in CONNECT. The core never
    /// schedules PINGREQ itself (spec §1 non-goal) — a caller driving its
    /// own keep-alive timer reads this (or, once connected,
    /// [`Self::server_keep_alive`]) to know the interval.
    pub fn keep_alive(&self) -> u16 {
        self.keep_alive
    }

    /// Largest packet size the broker will accept.
    pub fn broker_maximum_packet_size(&self) -> u32 {
        self.capabilities.maximum_packet_size
    }

    fn cast<U>(err: MqttError<ErrorPlaceHolder>) -> MqttError<U> {
        MqttError::cast_protocol_error(err)
    }

    async fn send_packet(&mut self, buf: &mut [u8], len: usize) -> ClientResult<(), T::Error> {
        self.transport
            .send(&buf[..len])
            .await
            .map_err(MqttError::Transport)
    }

    /// Opens the transport and sends CONNECT. `broker_addr` is stored in a
    /// fixed-capacity string, not a heap allocation — there is no manual
    /// free path to get wrong on disconnect.
    ///
    /// `session_expiry_interval` of `0` omits the property entirely (no
    /// requested session persistence); per spec §4.3, the broker may only
    /// keep session state when `clean_start` is `false` or this is nonzero.
    pub async fn connect(
        &mut self,
        broker_addr: &str,
        client_id: &str,
        keep_alive: u16,
        clean_start: bool,
        session_expiry_interval: u32,
    ) -> ClientResult<(), T::Error> {
        self.broker_addr = String::try_from(broker_addr)
            .map_err(|_| MqttError::Protocol(ProtocolError::OutOfMemory))?;
        self.keep_alive = keep_alive;
        self.capabilities = BrokerCapabilities::defaults(keep_alive, DEFAULT_MAX_PACKET_SIZE);

        let mut connect = Connect::new(client_id, keep_alive, clean_start);
        if session_expiry_interval > 0 {
            connect.session_expiry_interval = Some(session_expiry_interval);
        }
        connect.maximum_packet_size = Some(DEFAULT_MAX_PACKET_SIZE);
        connect.receive_maximum = Some(IN_FLIGHT as u16);
        let mut buf = [0u8; 512];
        let len = connect.encode(&mut buf).map_err(Self::cast)?;

        self.send_packet(&mut buf, len).await?;
        self.expected_ptypes |= PacketType::ConnAck.bit();
        Ok(())
    }

    pub async fn disconnect(&mut self, reason_code: u8) -> ClientResult<(), T::Error> {
        let disconnect = Disconnect::new(reason_code);
        let mut buf = [0u8; 64];
        let len = disconnect.encode(&mut buf).map_err(Self::cast)?;

        // Errors during the final send do not abort the close.
        let _ = self.send_packet(&mut buf, len).await;
        self.connected = false;
        self.expected_ptypes = PacketType::PingReq.bit();
        Ok(())
    }

    pub async fn ping(&mut self) -> ClientResult<(), T::Error> {
        let mut buf = [0u8; 2];
        let len = PingReq.encode(&mut buf).map_err(Self::cast)?;
        self.send_packet(&mut buf, len).await?;
        self.expected_ptypes |= PacketType::PingResp.bit();
        Ok(())
    }

    /// Publishes at QoS 0, 1, or 2. Returns the packet id assigned for
    /// QoS > 0 (`None` at QoS 0, which has no handshake to track).
    pub async fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retain: bool,
    ) -> ClientResult<Option<u16>, T::Error> {
        if !self.connected {
            return Err(MqttError::NotConnected);
        }
        if topic.contains(['+', '#']) {
            return Err(MqttError::Protocol(ProtocolError::InvalidTopic));
        }
        if (qos as u8) > self.capabilities.max_qos {
            return Err(MqttError::Protocol(ProtocolError::QoSNotSupported));
        }
        if retain && !self.capabilities.retain_available {
            return Err(MqttError::Protocol(ProtocolError::RetainNotSupported));
        }

        let packet_id = match qos {
            QoS::AtMostOnce => None,
            QoS::AtLeastOnce => {
                let id = self
                    .inflight
                    .reserve_for_answer(PacketType::PubAck)
                    .map_err(Self::cast)?;
                self.expected_ptypes |= PacketType::PubAck.bit();
                Some(id)
            }
            QoS::ExactlyOnce => {
                let id = self
                    .inflight
                    .reserve_for_answer(PacketType::PubRec)
                    .map_err(Self::cast)?;
                self.expected_ptypes |= PacketType::PubRec.bit();
                Some(id)
            }
        };

        let publish = Publish {
            topic,
            qos,
            dup: false,
            retain,
            payload,
            packet_id,
            payload_format_indicator: false,
            message_expiry_interval: None,
            topic_alias: None,
            response_topic: None,
            correlation_data: None,
            subscription_identifier: None,
            content_type: None,
        };

        let mut buf = [0u8; 512];
        let len = publish.encode(&mut buf).map_err(Self::cast)?;
        self.send_packet(&mut buf, len).await?;
        Ok(packet_id)
    }

    pub async fn subscribe(&mut self, topic: &str, qos: QoS) -> ClientResult<u16, T::Error> {
        if !self.connected {
            return Err(MqttError::NotConnected);
        }
        if topic.starts_with("$share/") && !self.capabilities.shared_subscription_available {
            return Err(MqttError::Protocol(ProtocolError::Unsupported));
        }
        if topic.contains(['+', '#']) && !self.capabilities.wildcard_subscription_available {
            return Err(MqttError::Protocol(ProtocolError::Unsupported));
        }
        let packet_id = self
            .inflight
            .reserve_for_answer(PacketType::SubAck)
            .map_err(Self::cast)?;
        self.expected_ptypes |= PacketType::SubAck.bit();

        let subscribe = Subscribe::single(packet_id, topic, qos);
        let mut buf = [0u8; 256];
        let len = subscribe.encode(&mut buf).map_err(Self::cast)?;
        self.send_packet(&mut buf, len).await?;
        Ok(packet_id)
    }

    pub async fn unsubscribe(&mut self, topic: &str) -> ClientResult<u16, T::Error> {
        if !self.connected {
            return Err(MqttError::NotConnected);
        }
        let packet_id = self
            .inflight
            .reserve_for_answer(PacketType::UnsubAck)
            .map_err(Self::cast)?;
        self.expected_ptypes |= PacketType::UnsubAck.bit();

        let unsubscribe = Unsubscribe::single(packet_id, topic);
        let mut buf = [0u8; 256];
        let len = unsubscribe.encode(&mut buf).map_err(Self::cast)?;
        self.send_packet(&mut buf, len).await?;
        Ok(packet_id)
    }

    /// Sends PUBACK, completing the QoS 1 receiver handshake for `packet_id`.
    /// Idempotent: safe to call again for a duplicate delivery even after
    /// the matching work has already been acknowledged once.
    pub async fn puback(&mut self, packet_id: u16) -> ClientResult<(), T::Error> {
        let ack = PubAck(Ack {
            packet_id,
            reason_code: 0,
            reason_string: None,
            user_properties: heapless::Vec::new(),
        });
        let mut buf = [0u8; 32];
        let len = ack.encode(&mut buf).map_err(Self::cast)?;
        self.send_packet(&mut buf, len).await
    }

    /// Sends PUBREC, the first hop of the QoS 2 receiver handshake, and
    /// records that this packet id now awaits the broker's PUBREL.
    pub async fn pubrec(&mut self, packet_id: u16) -> ClientResult<(), T::Error> {
        self.inflight
            .reserve_for_request(packet_id, PacketType::PubRel)
            .map_err(Self::cast)?;
        self.expected_ptypes |= PacketType::PubRel.bit();

        let ack = PubRec(Ack {
            packet_id,
            reason_code: 0,
            reason_string: None,
            user_properties: heapless::Vec::new(),
        });
        let mut buf = [0u8; 32];
        let len = ack.encode(&mut buf).map_err(Self::cast)?;
        self.send_packet(&mut buf, len).await
    }

    /// Sends PUBREL, either as the sender completing its own QoS 2 publish
    /// (after receiving PUBREC) or — per spec's duplicate-delivery note —
    /// safe to call even if the matching slot was already freed.
    pub async fn pubrel(&mut self, packet_id: u16) -> ClientResult<(), T::Error> {
        let ack = PubRel(Ack {
            packet_id,
            reason_code: 0,
            reason_string: None,
            user_properties: heapless::Vec::new(),
        });
        let mut buf = [0u8; 32];
        let len = ack.encode(&mut buf).map_err(Self::cast)?;
        self.send_packet(&mut buf, len).await
    }

    /// Sends PUBCOMP, completing the QoS 2 receiver handshake for
    /// `packet_id`.
    pub async fn pubcomp(&mut self, packet_id: u16) -> ClientResult<(), T::Error> {
        let ack = PubComp(Ack {
            packet_id,
            reason_code: 0,
            reason_string: None,
            user_properties: heapless::Vec::new(),
        });
        let mut buf = [0u8; 32];
        let len = ack.encode(&mut buf).map_err(Self::cast)?;
        self.send_packet(&mut buf, len).await
    }

    fn store_received_publish(&mut self, publish: &Publish) {
        self.received_publish.topic = String::try_from(publish.topic).unwrap_or_default();
        self.received_publish.response_topic =
            String::try_from(publish.response_topic.unwrap_or("")).unwrap_or_default();
        self.received_publish.content_type =
            String::try_from(publish.content_type.unwrap_or("")).unwrap_or_default();
        self.received_publish.correlation_data.clear();
        if let Some(data) = publish.correlation_data {
            // Larger-than-capacity correlation data is silently dropped;
            // the packet has already parsed successfully regardless.
            let _ = self.received_publish.correlation_data.extend_from_slice(
                &data[..data.len().min(CORRELATION_DATA_MAXIMUM)],
            );
        }
        self.received_publish.packet_id = publish.packet_id.unwrap_or(0);
        self.received_publish.message_expiry_interval = publish.message_expiry_interval;
        self.received_publish.subscription_identifier = publish.subscription_identifier;
        self.received_publish.topic_alias = publish.topic_alias;
        self.received_publish.qos = publish.qos as u8;
        self.received_publish.payload_format_indicator = publish.payload_format_indicator;
        self.received_publish.dup = publish.dup;
        self.received_publish.retain = publish.retain;
    }

    /// Decodes one complete packet from `buf` and advances session state,
    /// invoking `handler`'s callbacks as appropriate. Acknowledgement of
    /// inbound QoS 1/2 PUBLISH is automatic.
    pub async fn process_packet<H: MqttEventHandler>(
        &mut self,
        buf: &[u8],
        handler: &mut H,
    ) -> ClientResult<(), T::Error> {
        let packet_type = PacketType::from_u8(buf.first().copied().unwrap_or(0) >> 4).map_err(Self::cast)?;
        if self.expected_ptypes & packet_type.bit() == 0 {
            return Err(MqttError::Protocol(ProtocolError::UnexpectedPacketType));
        }

        let decoded = packet::decode(buf).map_err(Self::cast)?;
        match decoded {
            MqttPacket::ConnAck(connack) => {
                self.expected_ptypes &= !PacketType::ConnAck.bit();
                // Protocol defaults are already installed (see `connect`);
                // the CONNACK's own properties override them.
                self.capabilities.apply_connack(&connack);
                let reason: ConnectReasonCode = connack.reason_code.into();
                if reason.is_success() {
                    self.connected = true;
                    self.expected_ptypes |= PacketType::Publish.bit() | PacketType::Disconnect.bit();
                    handler.on_connected();
                } else {
                    return Err(MqttError::ConnectionRefused(reason));
                }
            }
            MqttPacket::Publish(publish) => {
                self.store_received_publish(&publish);
                match publish.qos {
                    QoS::AtLeastOnce => {
                        let id = publish.packet_id.ok_or(MqttError::Protocol(ProtocolError::InvalidPacketId))?;
                        self.puback(id).await?;
                    }
                    QoS::ExactlyOnce => {
                        let id = publish.packet_id.ok_or(MqttError::Protocol(ProtocolError::InvalidPacketId))?;
                        self.pubrec(id).await?;
                    }
                    QoS::AtMostOnce => {}
                }
                handler.on_received_publish();
            }
            MqttPacket::PubAck(ack) => {
                self.inflight.free_slot(ack.0.packet_id).ok();
                if !self.inflight.expects_any(PacketType::PubAck) {
                    self.expected_ptypes &= !PacketType::PubAck.bit();
                }
                for (key, value) in &ack.0.user_properties {
                    handler.on_user_property(PacketType::PubAck, key, value);
                }
                handler.on_publish_acknowledged(ack.0.packet_id, ack.0.reason_code);
            }
            MqttPacket::PubRec(ack) => {
                let expected = self.inflight.expected_answer(ack.0.packet_id);
                if expected != Some(PacketType::PubRec) {
                    return Err(MqttError::Protocol(ProtocolError::UnexpectedPacketType));
                }
                self.inflight
                    .transition_slot(ack.0.packet_id, PacketType::PubComp)
                    .map_err(Self::cast)?;
                if !self.inflight.expects_any(PacketType::PubRec) {
                    self.expected_ptypes &= !PacketType::PubRec.bit();
                }
                self.expected_ptypes |= PacketType::PubComp.bit();
                for (key, value) in &ack.0.user_properties {
                    handler.on_user_property(PacketType::PubRec, key, value);
                }
                self.pubrel(ack.0.packet_id).await?;
            }
            MqttPacket::PubRel(ack) => {
                let expected = self.inflight.expected_answer(ack.0.packet_id);
                if expected != Some(PacketType::PubRel) {
                    return Err(MqttError::Protocol(ProtocolError::UnexpectedPacketType));
                }
                self.inflight.free_slot(ack.0.packet_id).ok();
                if !self.inflight.expects_any(PacketType::PubRel) {
                    self.expected_ptypes &= !PacketType::PubRel.bit();
                }
                for (key, value) in &ack.0.user_properties {
                    handler.on_user_property(PacketType::PubRel, key, value);
                }
                self.pubcomp(ack.0.packet_id).await?;
            }
            MqttPacket::PubComp(ack) => {
                self.inflight.free_slot(ack.0.packet_id).ok();
                if !self.inflight.expects_any(PacketType::PubComp) {
                    self.expected_ptypes &= !PacketType::PubComp.bit();
                }
                for (key, value) in &ack.0.user_properties {
                    handler.on_user_property(PacketType::PubComp, key, value);
                }
                handler.on_publish_completed(ack.0.packet_id, ack.0.reason_code);
            }
            MqttPacket::SubAck(suback) => {
                self.inflight.free_slot(suback.packet_id).ok();
                if !self.inflight.expects_any(PacketType::SubAck) {
                    self.expected_ptypes &= !PacketType::SubAck.bit();
                }
                for (index, &reason) in suback.reason_codes.iter().enumerate() {
                    if reason < 0x80 {
                        let qos = QoS::from_u8(reason.min(2)).unwrap_or(QoS::AtMostOnce);
                        handler.on_subscription_granted(suback.packet_id, index, qos);
                    } else {
                        handler.on_subscription_declined(suback.packet_id, index, reason);
                    }
                }
            }
            MqttPacket::UnsubAck(unsuback) => {
                self.inflight.free_slot(unsuback.packet_id).ok();
                if !self.inflight.expects_any(PacketType::UnsubAck) {
                    self.expected_ptypes &= !PacketType::UnsubAck.bit();
                }
                self.last_unsuback_reasons.clear();
                let _ = self
                    .last_unsuback_reasons
                    .extend_from_slice(&unsuback.reason_codes);
            }
            MqttPacket::PingResp => {
                self.expected_ptypes &= !PacketType::PingResp.bit();
                handler.on_ping_received();
            }
            MqttPacket::PingReq => {
                let mut buf = [0u8; 2];
                let len = PingResp.encode(&mut buf).map_err(Self::cast)?;
                self.send_packet(&mut buf, len).await?;
            }
            MqttPacket::Disconnect(disconnect) => {
                self.connected = false;
                self.expected_ptypes = PacketType::PingReq.bit();
                handler.on_received_disconnect(disconnect.reason_code);
            }
            MqttPacket::Connect(_) | MqttPacket::Subscribe(_) | MqttPacket::Unsubscribe(_) => {
                // This client never receives packets it only ever sends.
                return Err(MqttError::Protocol(ProtocolError::UnexpectedPacketType));
            }
        }

        Ok(())
    }

    /// Polls the transport once for inbound bytes and, if any arrived,
    /// processes them. Returns `Ok(false)` when nothing was available.
    pub async fn poll<H: MqttEventHandler>(&mut self, buf: &mut [u8], handler: &mut H) -> ClientResult<bool, T::Error> {
        let n = self.transport.recv(buf).await.map_err(MqttError::Transport)?;
        if n == 0 {
            return Ok(false);
        }
        self.process_packet(&buf[..n], handler).await?;
        Ok(true)
    }
}

/// One MQTT 5.0 session bound to a poll-driven [`BlockingMqttTransport`].
///
/// Mirrors [`Client`]'s session engine exactly, but every operation is
/// synchronous: `send`/`recv` never block, reporting [`IoStatus::Pending`]
/// instead. A CONNECT sent while the transport's own channel is not yet up
/// is held rather than dropped (spec §4.4 "mark the connect packet
/// deferred"); `service_deferred_connect` flushes it once
/// `T::is_connected()` turns true, grounded on the original's lwIP adapter
/// (`mqtt_lwip.c`'s `tcp_client_connected` callback resending `outp` from
/// `connect.deferred`) — `poll` here plays the role that callback played
/// there, since this trait has no connection-established notification of
/// its own to hook.
pub struct BlockingClient<
    T,
    const IN_FLIGHT: usize,
    const TOPIC: usize = 128,
    const RESP: usize = 64,
    const CT: usize = 32,
> where
    T: BlockingMqttTransport,
{
    transport: T,
    connected: bool,
    expected_ptypes: u16,
    inflight: InFlightTable<IN_FLIGHT>,
    keep_alive: u16,
    capabilities: BrokerCapabilities,
    pub received_publish: ReceivedPublish<TOPIC, RESP, CT>,
    pub last_unsuback_reasons: heapless::Vec<u8, MAX_SUBSCRIBE_ENTRIES>,
    deferred_connect: Option<heapless::Vec<u8, 512>>,
}

impl<T, const IN_FLIGHT: usize, const TOPIC: usize, const RESP: usize, const CT: usize>
    BlockingClient<T, IN_FLIGHT, TOPIC, RESP, CT>
where
    T: BlockingMqttTransport,
{
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            connected: false,
            expected_ptypes: PacketType::PingReq.bit(),
            inflight: InFlightTable::new(),
            keep_alive: 0,
            capabilities: BrokerCapabilities::defaults(0, DEFAULT_MAX_PACKET_SIZE),
            received_publish: ReceivedPublish::default(),
            last_unsuback_reasons: heapless::Vec::new(),
            deferred_connect: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn keep_alive(&self) -> u16 {
        self.keep_alive
    }

    fn cast<U>(err: MqttError<ErrorPlaceHolder>) -> MqttError<U> {
        MqttError::cast_protocol_error(err)
    }

    /// Allocates, sends, and releases a send buffer for one already-encoded
    /// packet. Not used by `connect` itself, which has to keep the buffer
    /// alive across a `Pending` result for the deferred-connect path.
    fn send_packet(&mut self, buf: &[u8]) -> ClientResult<(), T::Error> {
        self.transport
            .alloc_send_buf(buf.len())
            .map_err(MqttError::Transport)?;
        let status = self.transport.send(buf).map_err(MqttError::Transport)?;
        self.transport.free_send_buf();
        match status {
            IoStatus::Done(_) => Ok(()),
            IoStatus::Pending => Err(MqttError::NotConnected),
        }
    }

    /// Opens the transport and sends CONNECT. If the transport's own
    /// channel is not up yet, the encoded CONNECT is held rather than lost;
    /// call `service_deferred_connect` (or `poll`, which does so itself) to
    /// flush it once the channel comes up.
    pub fn connect(
        &mut self,
        broker_addr: &str,
        client_id: &str,
        keep_alive: u16,
        clean_start: bool,
        session_expiry_interval: u32,
    ) -> ClientResult<(), T::Error> {
        self.keep_alive = keep_alive;
        self.capabilities = BrokerCapabilities::defaults(keep_alive, DEFAULT_MAX_PACKET_SIZE);

        let mut connect = Connect::new(client_id, keep_alive, clean_start);
        if session_expiry_interval > 0 {
            connect.session_expiry_interval = Some(session_expiry_interval);
        }
        connect.maximum_packet_size = Some(DEFAULT_MAX_PACKET_SIZE);
        connect.receive_maximum = Some(IN_FLIGHT as u16);
        let mut buf = [0u8; 512];
        let len = connect.encode(&mut buf).map_err(Self::cast)?;

        self.transport
            .open_conn(broker_addr)
            .map_err(MqttError::Transport)?;

        self.transport
            .alloc_send_buf(len)
            .map_err(MqttError::Transport)?;
        let status = self
            .transport
            .send(&buf[..len])
            .map_err(MqttError::Transport)?;
        match status {
            IoStatus::Done(_) => {
                self.transport.free_send_buf();
                self.expected_ptypes |= PacketType::ConnAck.bit();
            }
            IoStatus::Pending => {
                // Held verbatim; the transport's send buffer is not freed
                // here because these exact bytes still need to go out.
                let mut held = heapless::Vec::new();
                held.extend_from_slice(&buf[..len])
                    .map_err(|_| MqttError::Protocol(ProtocolError::OutOfMemory))?;
                self.deferred_connect = Some(held);
            }
        }
        Ok(())
    }

    /// Flushes a held CONNECT once the transport's channel has come up.
    /// A no-op when nothing is deferred; `poll` calls this on every tick.
    pub fn service_deferred_connect(&mut self) -> ClientResult<(), T::Error> {
        if !self.transport.is_connected() {
            return Ok(());
        }
        let Some(held) = self.deferred_connect.take() else {
            return Ok(());
        };
        let status = self.transport.send(&held).map_err(MqttError::Transport)?;
        match status {
            IoStatus::Done(_) => {
                self.transport.free_send_buf();
                self.expected_ptypes |= PacketType::ConnAck.bit();
                Ok(())
            }
            IoStatus::Pending => {
                // Still not actually on the wire (e.g. underlying send
                // buffer briefly full) — try again on the next poll.
                self.deferred_connect = Some(held);
                Ok(())
            }
        }
    }

    pub fn disconnect(&mut self, reason_code: u8) -> ClientResult<(), T::Error> {
        let disconnect = Disconnect::new(reason_code);
        let mut buf = [0u8; 64];
        let len = disconnect.encode(&mut buf).map_err(Self::cast)?;

        // Errors during the final send do not abort the close.
        let _ = self.send_packet(&buf[..len]);
        self.connected = false;
        self.expected_ptypes = PacketType::PingReq.bit();
        self.deferred_connect = None;
        let _ = self.transport.close_conn();
        Ok(())
    }

    pub fn ping(&mut self) -> ClientResult<(), T::Error> {
        let mut buf = [0u8; 2];
        let len = PingReq.encode(&mut buf).map_err(Self::cast)?;
        self.send_packet(&buf[..len])?;
        self.expected_ptypes |= PacketType::PingResp.bit();
        Ok(())
    }

    /// Publishes at QoS 0, 1, or 2. Returns the packet id assigned for
    /// QoS > 0 (`None` at QoS 0, which has no handshake to track).
    pub fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retain: bool,
    ) -> ClientResult<Option<u16>, T::Error> {
        if !self.connected {
            return Err(MqttError::NotConnected);
        }
        if topic.contains(['+', '#']) {
            return Err(MqttError::Protocol(ProtocolError::InvalidTopic));
        }
        if (qos as u8) > self.capabilities.max_qos {
            return Err(MqttError::Protocol(ProtocolError::QoSNotSupported));
        }
        if retain && !self.capabilities.retain_available {
            return Err(MqttError::Protocol(ProtocolError::RetainNotSupported));
        }

        let packet_id = match qos {
            QoS::AtMostOnce => None,
            QoS::AtLeastOnce => {
                let id = self
                    .inflight
                    .reserve_for_answer(PacketType::PubAck)
                    .map_err(Self::cast)?;
                self.expected_ptypes |= PacketType::PubAck.bit();
                Some(id)
            }
            QoS::ExactlyOnce => {
                let id = self
                    .inflight
                    .reserve_for_answer(PacketType::PubRec)
                    .map_err(Self::cast)?;
                self.expected_ptypes |= PacketType::PubRec.bit();
                Some(id)
            }
        };

        let publish = Publish {
            topic,
            qos,
            dup: false,
            retain,
            payload,
            packet_id,
            payload_format_indicator: false,
            message_expiry_interval: None,
            topic_alias: None,
            response_topic: None,
            correlation_data: None,
            subscription_identifier: None,
            content_type: None,
        };

        let mut buf = [0u8; 512];
        let len = publish.encode(&mut buf).map_err(Self::cast)?;
        self.send_packet(&buf[..len])?;
        Ok(packet_id)
    }

    pub fn subscribe(&mut self, topic: &str, qos: QoS) -> ClientResult<u16, T::Error> {
        if !self.connected {
            return Err(MqttError::NotConnected);
        }
        if topic.starts_with("$share/") && !self.capabilities.shared_subscription_available {
            return Err(MqttError::Protocol(ProtocolError::Unsupported));
        }
        if topic.contains(['+', '#']) && !self.capabilities.wildcard_subscription_available {
            return Err(MqttError::Protocol(ProtocolError::Unsupported));
        }
        let packet_id = self
            .inflight
            .reserve_for_answer(PacketType::SubAck)
            .map_err(Self::cast)?;
        self.expected_ptypes |= PacketType::SubAck.bit();

        let subscribe = Subscribe::single(packet_id, topic, qos);
        let mut buf = [0u8; 256];
        let len = subscribe.encode(&mut buf).map_err(Self::cast)?;
        self.send_packet(&buf[..len])?;
        Ok(packet_id)
    }

    pub fn unsubscribe(&mut self, topic: &str) -> ClientResult<u16, T::Error> {
        if !self.connected {
            return Err(MqttError::NotConnected);
        }
        let packet_id = self
            .inflight
            .reserve_for_answer(PacketType::UnsubAck)
            .map_err(Self::cast)?;
        self.expected_ptypes |= PacketType::UnsubAck.bit();

        let unsubscribe = Unsubscribe::single(packet_id, topic);
        let mut buf = [0u8; 256];
        let len = unsubscribe.encode(&mut buf).map_err(Self::cast)?;
        self.send_packet(&buf[..len])?;
        Ok(packet_id)
    }

    pub fn puback(&mut self, packet_id: u16) -> ClientResult<(), T::Error> {
        let ack = PubAck(Ack {
            packet_id,
            reason_code: 0,
            reason_string: None,
            user_properties: heapless::Vec::new(),
        });
        let mut buf = [0u8; 32];
        let len = ack.encode(&mut buf).map_err(Self::cast)?;
        self.send_packet(&buf[..len])
    }

    pub fn pubrec(&mut self, packet_id: u16) -> ClientResult<(), T::Error> {
        self.inflight
            .reserve_for_request(packet_id, PacketType::PubRel)
            .map_err(Self::cast)?;
        self.expected_ptypes |= PacketType::PubRel.bit();

        let ack = PubRec(Ack {
            packet_id,
            reason_code: 0,
            reason_string: None,
            user_properties: heapless::Vec::new(),
        });
        let mut buf = [0u8; 32];
        let len = ack.encode(&mut buf).map_err(Self::cast)?;
        self.send_packet(&buf[..len])
    }

    pub fn pubrel(&mut self, packet_id: u16) -> ClientResult<(), T::Error> {
        let ack = PubRel(Ack {
            packet_id,
            reason_code: 0,
            reason_string: None,
            user_properties: heapless::Vec::new(),
        });
        let mut buf = [0u8; 32];
        let len = ack.encode(&mut buf).map_err(Self::cast)?;
        self.send_packet(&buf[..len])
    }

    pub fn pubcomp(&mut self, packet_id: u16) -> ClientResult<(), T::Error> {
        let ack = PubComp(Ack {
            packet_id,
            reason_code: 0,
            reason_string: None,
            user_properties: heapless::Vec::new(),
        });
        let mut buf = [0u8; 32];
        let len = ack.encode(&mut buf).map_err(Self::cast)?;
        self.send_packet(&buf[..len])
    }

    fn store_received_publish(&mut self, publish: &Publish) {
        self.received_publish.topic = String::try_from(publish.topic).unwrap_or_default();
        self.received_publish.response_topic =
            String::try_from(publish.response_topic.unwrap_or("")).unwrap_or_default();
        self.received_publish.content_type =
            String::try_from(publish.content_type.unwrap_or("")).unwrap_or_default();
        self.received_publish.correlation_data.clear();
        if let Some(data) = publish.correlation_data {
            let _ = self
                .received_publish
                .correlation_data
                .extend_from_slice(&data[..data.len().min(CORRELATION_DATA_MAXIMUM)]);
        }
        self.received_publish.packet_id = publish.packet_id.unwrap_or(0);
        self.received_publish.message_expiry_interval = publish.message_expiry_interval;
        self.received_publish.subscription_identifier = publish.subscription_identifier;
        self.received_publish.topic_alias = publish.topic_alias;
        self.received_publish.qos = publish.qos as u8;
        self.received_publish.payload_format_indicator = publish.payload_format_indicator;
        self.received_publish.dup = publish.dup;
        self.received_publish.retain = publish.retain;
    }

    /// Decodes one complete packet from `buf` and advances session state,
    /// invoking `handler`'s callbacks as appropriate. Identical dispatch to
    /// [`Client::process_packet`], just synchronous.
    pub fn process_packet<H: MqttEventHandler>(
        &mut self,
        buf: &[u8],
        handler: &mut H,
    ) -> ClientResult<(), T::Error> {
        let packet_type =
            PacketType::from_u8(buf.first().copied().unwrap_or(0) >> 4).map_err(Self::cast)?;
        if self.expected_ptypes & packet_type.bit() == 0 {
            return Err(MqttError::Protocol(ProtocolError::UnexpectedPacketType));
        }

        let decoded = packet::decode(buf).map_err(Self::cast)?;
        match decoded {
            MqttPacket::ConnAck(connack) => {
                self.expected_ptypes &= !PacketType::ConnAck.bit();
                self.capabilities.apply_connack(&connack);
                let reason: ConnectReasonCode = connack.reason_code.into();
                if reason.is_success() {
                    self.connected = true;
                    self.expected_ptypes |= PacketType::Publish.bit() | PacketType::Disconnect.bit();
                    handler.on_connected();
                } else {
                    return Err(MqttError::ConnectionRefused(reason));
                }
            }
            MqttPacket::Publish(publish) => {
                self.store_received_publish(&publish);
                match publish.qos {
                    QoS::AtLeastOnce => {
                        let id = publish
                            .packet_id
                            .ok_or(MqttError::Protocol(ProtocolError::InvalidPacketId))?;
                        self.puback(id)?;
                    }
                    QoS::ExactlyOnce => {
                        let id = publish
                            .packet_id
                            .ok_or(MqttError::Protocol(ProtocolError::InvalidPacketId))?;
                        self.pubrec(id)?;
                    }
                    QoS::AtMostOnce => {}
                }
                handler.on_received_publish();
            }
            MqttPacket::PubAck(ack) => {
                self.inflight.free_slot(ack.0.packet_id).ok();
                if !self.inflight.expects_any(PacketType::PubAck) {
                    self.expected_ptypes &= !PacketType::PubAck.bit();
                }
                for (key, value) in &ack.0.user_properties {
                    handler.on_user_property(PacketType::PubAck, key, value);
                }
                handler.on_publish_acknowledged(ack.0.packet_id, ack.0.reason_code);
            }
            MqttPacket::PubRec(ack) => {
                let expected = self.inflight.expected_answer(ack.0.packet_id);
                if expected != Some(PacketType::PubRec) {
                    return Err(MqttError::Protocol(ProtocolError::UnexpectedPacketType));
                }
                self.inflight
                    .transition_slot(ack.0.packet_id, PacketType::PubComp)
                    .map_err(Self::cast)?;
                if !self.inflight.expects_any(PacketType::PubRec) {
                    self.expected_ptypes &= !PacketType::PubRec.bit();
                }
                self.expected_ptypes |= PacketType::PubComp.bit();
                for (key, value) in &ack.0.user_properties {
                    handler.on_user_property(PacketType::PubRec, key, value);
                }
                self.pubrel(ack.0.packet_id)?;
            }
            MqttPacket::PubRel(ack) => {
                let expected = self.inflight.expected_answer(ack.0.packet_id);
                if expected != Some(PacketType::PubRel) {
                    return Err(MqttError::Protocol(ProtocolError::UnexpectedPacketType));
                }
                self.inflight.free_slot(ack.0.packet_id).ok();
                if !self.inflight.expects_any(PacketType::PubRel) {
                    self.expected_ptypes &= !PacketType::PubRel.bit();
                }
                for (key, value) in &ack.0.user_properties {
                    handler.on_user_property(PacketType::PubRel, key, value);
                }
                self.pubcomp(ack.0.packet_id)?;
            }
            MqttPacket::PubComp(ack) => {
                self.inflight.free_slot(ack.0.packet_id).ok();
                if !self.inflight.expects_any(PacketType::PubComp) {
                    self.expected_ptypes &= !PacketType::PubComp.bit();
                }
                for (key, value) in &ack.0.user_properties {
                    handler.on_user_property(PacketType::PubComp, key, value);
                }
                handler.on_publish_completed(ack.0.packet_id, ack.0.reason_code);
            }
            MqttPacket::SubAck(suback) => {
                self.inflight.free_slot(suback.packet_id).ok();
                if !self.inflight.expects_any(PacketType::SubAck) {
                    self.expected_ptypes &= !PacketType::SubAck.bit();
                }
                for (index, &reason) in suback.reason_codes.iter().enumerate() {
                    if reason < 0x80 {
                        let qos = QoS::from_u8(reason.min(2)).unwrap_or(QoS::AtMostOnce);
                        handler.on_subscription_granted(suback.packet_id, index, qos);
                    } else {
                        handler.on_subscription_declined(suback.packet_id, index, reason);
                    }
                }
            }
            MqttPacket::UnsubAck(unsuback) => {
                self.inflight.free_slot(unsuback.packet_id).ok();
                if !self.inflight.expects_any(PacketType::UnsubAck) {
                    self.expected_ptypes &= !PacketType::UnsubAck.bit();
                }
                self.last_unsuback_reasons.clear();
                let _ = self
                    .last_unsuback_reasons
                    .extend_from_slice(&unsuback.reason_codes);
            }
            MqttPacket::PingResp => {
                self.expected_ptypes &= !PacketType::PingResp.bit();
                handler.on_ping_received();
            }
            MqttPacket::PingReq => {
                let mut buf = [0u8; 2];
                let len = PingResp.encode(&mut buf).map_err(Self::cast)?;
                self.send_packet(&buf[..len])?;
            }
            MqttPacket::Disconnect(disconnect) => {
                self.connected = false;
                self.expected_ptypes = PacketType::PingReq.bit();
                handler.on_received_disconnect(disconnect.reason_code);
            }
            MqttPacket::Connect(_) | MqttPacket::Subscribe(_) | MqttPacket::Unsubscribe(_) => {
                return Err(MqttError::Protocol(ProtocolError::UnexpectedPacketType));
            }
        }

        Ok(())
    }

    /// Services any deferred CONNECT, then polls the transport once for
    /// inbound bytes and, if any arrived, processes them. Returns
    /// `Ok(false)` when nothing was available.
    pub fn poll<H: MqttEventHandler>(
        &mut self,
        buf: &mut [u8],
        handler: &mut H,
    ) -> ClientResult<bool, T::Error> {
        self.service_deferred_connect()?;

        self.transport
            .alloc_recv_buf(buf.len())
            .map_err(MqttError::Transport)?;
        let status = self.transport.recv(buf).map_err(MqttError::Transport)?;
        self.transport.free_recv_buf();

        match status {
            IoStatus::Pending => Ok(false),
            IoStatus::Done(0) => Ok(false),
            IoStatus::Done(n) => {
                self.process_packet(&buf[..n], handler)?;
                Ok(true)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::DecodePacket;
    use core::cell::RefCell;

    struct MockTransport {
        inbox: RefCell<heapless::Deque<heapless::Vec<u8, 256>, 8>>,
        outbox: RefCell<heapless::Vec<heapless::Vec<u8, 256>, 8>>,
    }

    impl MockTransport {
        fn new() -> Self {
            Self {
                inbox: RefCell::new(heapless::Deque::new()),
                outbox: RefCell::new(heapless::Vec::new()),
            }
        }

        fn push_inbound(&self, bytes: &[u8]) {
            let mut v = heapless::Vec::new();
            v.extend_from_slice(bytes).unwrap();
            self.inbox.borrow_mut().push_back(v).unwrap();
        }
    }

    impl MqttTransport for MockTransport {
        type Error = ErrorPlaceHolder;

        async fn send(&mut self, buf: &[u8]) -> Result<(), Self::Error> {
            let mut v = heapless::Vec::new();
            v.extend_from_slice(buf).ok();
            self.outbox.borrow_mut().push(v).ok();
            Ok(())
        }

        async fn recv(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
            match self.inbox.borrow_mut().pop_front() {
                Some(bytes) => {
                    buf[..bytes.len()].copy_from_slice(&bytes);
                    Ok(bytes.len())
                }
                None => Ok(0),
            }
        }
    }

    fn block_on<F: core::future::Future>(mut fut: F) -> F::Output {
        use core::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};
        fn noop(_: *const ()) {}
        fn clone(_: *const ()) -> RawWaker {
            RawWaker::new(core::ptr::null(), &VTABLE)
        }
        static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, noop, noop, noop);
        let waker = unsafe { Waker::from_raw(RawWaker::new(core::ptr::null(), &VTABLE)) };
        let mut cx = Context::from_waker(&waker);
        let mut fut = core::pin::pin!(fut);
        loop {
            if let Poll::Ready(val) = fut.as_mut().poll(&mut cx) {
                return val;
            }
        }
    }

    struct MockBlockingTransport {
        conn_connected: bool,
        outbox: heapless::Vec<heapless::Vec<u8, 256>, 8>,
        inbox: heapless::Deque<heapless::Vec<u8, 256>, 8>,
    }

    impl MockBlockingTransport {
        fn new() -> Self {
            Self {
                conn_connected: false,
                outbox: heapless::Vec::new(),
                inbox: heapless::Deque::new(),
            }
        }
    }

    impl BlockingMqttTransport for MockBlockingTransport {
        type Error = ErrorPlaceHolder;

        fn is_connected(&self) -> bool {
            self.conn_connected
        }

        fn open_conn(&mut self, _addr: &str) -> Result<(), Self::Error> {
            Ok(())
        }

        fn close_conn(&mut self) -> Result<(), Self::Error> {
            Ok(())
        }

        fn alloc_send_buf(&mut self, _len: usize) -> Result<(), Self::Error> {
            Ok(())
        }

        fn free_send_buf(&mut self) {}

        fn alloc_recv_buf(&mut self, _cap: usize) -> Result<(), Self::Error> {
            Ok(())
        }

        fn free_recv_buf(&mut self) {}

        fn send(&mut self, buf: &[u8]) -> Result<IoStatus, Self::Error> {
            if !self.conn_connected {
                return Ok(IoStatus::Pending);
            }
            let mut v = heapless::Vec::new();
            v.extend_from_slice(buf).ok();
            self.outbox.push(v).ok();
            Ok(IoStatus::Done(buf.len()))
        }

        fn recv(&mut self, buf: &mut [u8]) -> Result<IoStatus, Self::Error> {
            match self.inbox.pop_front() {
                Some(bytes) => {
                    buf[..bytes.len()].copy_from_slice(&bytes);
                    Ok(IoStatus::Done(bytes.len()))
                }
                None => Ok(IoStatus::Done(0)),
            }
        }
    }

    #[test]
    fn blocking_client_connect_succeeds_when_transport_already_connected() {
        let mut transport = MockBlockingTransport::new();
        transport.conn_connected = true;
        let mut client: BlockingClient<_, 4> = BlockingClient::new(transport);

        client
            .connect("broker.local", "dev-1", 60, true, 0)
            .unwrap();

        assert!(client.deferred_connect.is_none());
        assert_eq!(
            client.expected_ptypes & PacketType::ConnAck.bit(),
            PacketType::ConnAck.bit()
        );
        assert_eq!(client.transport.outbox.len(), 1);
    }

    #[test]
    fn blocking_client_defers_connect_until_transport_channel_is_up() {
        let transport = MockBlockingTransport::new();
        let mut client: BlockingClient<_, 4> = BlockingClient::new(transport);

        client
            .connect("broker.local", "dev-1", 60, true, 0)
            .unwrap();

        assert!(client.deferred_connect.is_some());
        assert_eq!(client.transport.outbox.len(), 0);
        assert_eq!(client.expected_ptypes & PacketType::ConnAck.bit(), 0);

        client.transport.conn_connected = true;
        let mut buf = [0u8; 64];
        let mut handler = NoopEventHandler;
        client.poll(&mut buf, &mut handler).unwrap();

        assert!(client.deferred_connect.is_none());
        assert_eq!(client.transport.outbox.len(), 1);
        assert_eq!(
            client.expected_ptypes & PacketType::ConnAck.bit(),
            PacketType::ConnAck.bit()
        );
    }

    #[test]
    fn connect_then_connack_sets_connected_flag() {
        let transport = MockTransport::new();
        let mut client: Client<_, 4> = Client::new(transport);

        block_on(client.connect("broker.local", "dev-1", 60, true, 0)).unwrap();
        assert!(!client.is_connected());

        let connack = [0x20, 0x03, 0x00, 0x00, 0x00];
        let mut handler = NoopEventHandler;
        block_on(client.process_packet(&connack, &mut handler)).unwrap();
        assert!(client.is_connected());
        assert_eq!(
            client.expected_ptypes & (PacketType::Publish.bit() | PacketType::Disconnect.bit()),
            PacketType::Publish.bit() | PacketType::Disconnect.bit()
        );
    }

    #[test]
    fn connect_advertises_receive_maximum_and_max_packet_size() {
        let transport = MockTransport::new();
        let mut client: Client<_, 4> = Client::new(transport);

        block_on(client.connect("broker.local", "dev-1", 60, true, 0)).unwrap();

        let outbox = client.transport.outbox.borrow();
        let sent = &outbox[0];
        let decoded = crate::packet::Connect::decode(sent.as_slice()).unwrap();
        assert_eq!(decoded.receive_maximum, Some(4));
        assert_eq!(decoded.maximum_packet_size, Some(DEFAULT_MAX_PACKET_SIZE));
    }

    #[test]
    fn qos1_publish_round_trip_frees_slot_on_puback() {
        let transport = MockTransport::new();
        let mut client: Client<_, 4> = Client::new(transport);
        client.connected = true;

        let packet_id = block_on(client.publish("a/b", b"hi", QoS::AtLeastOnce, false))
            .unwrap()
            .unwrap();
        assert_eq!(client.inflight.expected_answer(packet_id), Some(PacketType::PubAck));

        let mut puback_buf = [0u8; 4];
        puback_buf[0] = 0x40;
        puback_buf[1] = 0x02;
        puback_buf[2..4].copy_from_slice(&packet_id.to_be_bytes());

        let mut handler = NoopEventHandler;
        block_on(client.process_packet(&puback_buf, &mut handler)).unwrap();
        assert_eq!(client.inflight.expected_answer(packet_id), None);
    }

    #[test]
    fn qos2_publish_completes_full_handshake() {
        let transport = MockTransport::new();
        let mut client: Client<_, 4> = Client::new(transport);
        client.connected = true;

        let packet_id = block_on(client.publish("t", b"y", QoS::ExactlyOnce, false))
            .unwrap()
            .unwrap();
        assert_eq!(client.inflight.expected_answer(packet_id), Some(PacketType::PubRec));

        let mut pubrec_buf = [0u8; 4];
        pubrec_buf[0] = 0x50;
        pubrec_buf[1] = 0x02;
        pubrec_buf[2..4].copy_from_slice(&packet_id.to_be_bytes());

        let mut handler = NoopEventHandler;
        block_on(client.process_packet(&pubrec_buf, &mut handler)).unwrap();
        assert_eq!(client.inflight.expected_answer(packet_id), Some(PacketType::PubComp));

        let outbox = client.transport.outbox.borrow();
        let pubrel = outbox.last().unwrap();
        assert_eq!(&pubrel[..2], &[0x62, 0x02]);
        drop(outbox);

        let mut pubcomp_buf = [0u8; 4];
        pubcomp_buf[0] = 0x70;
        pubcomp_buf[1] = 0x02;
        pubcomp_buf[2..4].copy_from_slice(&packet_id.to_be_bytes());

        block_on(client.process_packet(&pubcomp_buf, &mut handler)).unwrap();
        assert_eq!(client.inflight.expected_answer(packet_id), None);
    }

    #[test]
    fn inflight_table_exhaustion_yields_out_of_resource() {
        let transport = MockTransport::new();
        let mut client: Client<_, 2> = Client::new(transport);
        client.connected = true;

        block_on(client.publish("a", b"1", QoS::AtLeastOnce, false)).unwrap();
        block_on(client.publish("b", b"2", QoS::AtLeastOnce, false)).unwrap();
        let result = block_on(client.publish("c", b"3", QoS::AtLeastOnce, false));
        assert!(matches!(
            result,
            Err(MqttError::Protocol(ProtocolError::OutOfResource))
        ));
    }

    #[test]
    fn publish_rejects_wildcard_topic_before_reserving_a_slot() {
        let transport = MockTransport::new();
        let mut client: Client<_, 4> = Client::new(transport);
        client.connected = true;

        let result = block_on(client.publish("a/+", b"x", QoS::AtLeastOnce, false));
        assert!(matches!(
            result,
            Err(MqttError::Protocol(ProtocolError::InvalidTopic))
        ));
        assert_eq!(client.inflight.len(), 0);
    }

    #[test]
    fn publish_rejects_qos_above_broker_maximum() {
        let transport = MockTransport::new();
        let mut client: Client<_, 4> = Client::new(transport);
        client.connected = true;
        client.capabilities.max_qos = 0;

        let result = block_on(client.publish("a/b", b"x", QoS::AtLeastOnce, false));
        assert!(matches!(
            result,
            Err(MqttError::Protocol(ProtocolError::QoSNotSupported))
        ));
    }

    #[test]
    fn publish_rejects_retain_when_broker_does_not_support_it() {
        let transport = MockTransport::new();
        let mut client: Client<_, 4> = Client::new(transport);
        client.connected = true;
        client.capabilities.retain_available = false;

        let result = block_on(client.publish("a/b", b"x", QoS::AtMostOnce, true));
        assert!(matches!(
            result,
            Err(MqttError::Protocol(ProtocolError::RetainNotSupported))
        ));
    }

    #[test]
    fn subscribe_rejects_wildcard_when_broker_does_not_support_it() {
        let transport = MockTransport::new();
        let mut client: Client<_, 4> = Client::new(transport);
        client.connected = true;
        client.capabilities.wildcard_subscription_available = false;

        let result = block_on(client.subscribe("a/+", QoS::AtMostOnce));
        assert!(matches!(
            result,
            Err(MqttError::Protocol(ProtocolError::Unsupported))
        ));
    }

    #[test]
    fn connack_properties_override_capability_defaults() {
        let transport = MockTransport::new();
        let mut client: Client<_, 4> = Client::new(transport);

        block_on(client.connect("broker.local", "dev-1", 60, true, 0)).unwrap();
        assert_eq!(client.capabilities.max_qos, 2);

        // CONNACK: reason 0, properties = { maximum_qos(0x24) = 1 }.
        let connack = [0x20, 0x05, 0x00, 0x00, 0x02, 0x24, 0x01];
        let mut handler = NoopEventHandler;
        block_on(client.process_packet(&connack, &mut handler)).unwrap();
        assert_eq!(client.capabilities.max_qos, 1);
    }

    #[test]
    fn received_disconnect_resets_expected_mask_to_pingreq_only() {
        let transport = MockTransport::new();
        let mut client: Client<_, 4> = Client::new(transport);
        client.connected = true;
        client.expected_ptypes |= PacketType::SubAck.bit();

        let disconnect_buf = [0xE0, 0x01, 0x00];
        let mut handler = NoopEventHandler;
        block_on(client.process_packet(&disconnect_buf, &mut handler)).unwrap();

        assert!(!client.is_connected());
        assert_eq!(client.expected_ptypes, PacketType::PingReq.bit());
    }

    #[test]
    fn unsolicited_pingresp_is_rejected_without_an_outstanding_ping() {
        let transport = MockTransport::new();
        let mut client: Client<_, 4> = Client::new(transport);

        let pingresp_buf = [0xD0, 0x00];
        let mut handler = NoopEventHandler;
        let result = block_on(client.process_packet(&pingresp_buf, &mut handler));
        assert!(matches!(
            result,
            Err(MqttError::Protocol(ProtocolError::UnexpectedPacketType))
        ));
    }

    #[test]
    fn ping_then_pingresp_clears_outstanding_bit() {
        let transport = MockTransport::new();
        let mut client: Client<_, 4> = Client::new(transport);

        block_on(client.ping()).unwrap();
        assert_eq!(
            client.expected_ptypes & PacketType::PingResp.bit(),
            PacketType::PingResp.bit()
        );

        let pingresp_buf = [0xD0, 0x00];
        let mut handler = NoopEventHandler;
        block_on(client.process_packet(&pingresp_buf, &mut handler)).unwrap();
        assert_eq!(client.expected_ptypes & PacketType::PingResp.bit(), 0);
    }

    #[test]
    fn unsuback_reason_codes_are_stored_for_inspection() {
        let transport = MockTransport::new();
        let mut client: Client<_, 4> = Client::new(transport);
        client.connected = true;
        client.expected_ptypes |= PacketType::UnsubAck.bit();
        client
            .inflight
            .reserve_for_request(1, PacketType::UnsubAck)
            .unwrap();

        // UNSUBACK: packet-id 1, no properties, one reason code (0x11 = "no subscription existed").
        let unsuback_buf = [0xB0, 0x04, 0x00, 0x01, 0x00, 0x11];
        let mut handler = NoopEventHandler;
        block_on(client.process_packet(&unsuback_buf, &mut handler)).unwrap();

        assert_eq!(client.last_unsuback_reasons.as_slice(), &[0x11]);
    }

    #[test]
    fn received_pingreq_is_answered_with_pingresp() {
        let transport = MockTransport::new();
        let mut client: Client<_, 4> = Client::new(transport);

        let pingreq_buf = [0xC0, 0x00];
        let mut handler = NoopEventHandler;
        block_on(client.process_packet(&pingreq_buf, &mut handler)).unwrap();

        let outbox = client.transport.outbox.borrow();
        assert_eq!(outbox.len(), 1);
        assert_eq!(outbox[0].as_slice(), &[0xD0, 0x00]);
    }

    #[test]
    fn poll_processes_one_queued_packet_per_call() {
        let transport = MockTransport::new();
        transport.push_inbound(&[0x20, 0x03, 0x00, 0x00, 0x00]); // CONNACK, reason 0
        let mut client: Client<_, 4> = Client::new(transport);
        block_on(client.connect("broker.local", "dev-1", 60, true, 0)).unwrap();

        let mut buf = [0u8; 64];
        let mut handler = NoopEventHandler;
        let got_one = block_on(client.poll(&mut buf, &mut handler)).unwrap();
        assert!(got_one);
        assert!(client.is_connected());

        let got_another = block_on(client.poll(&mut buf, &mut handler)).unwrap();
        assert!(!got_another);
    }

    #[test]
    fn unexpected_packet_type_is_rejected() {
        let transport = MockTransport::new();
        let mut client: Client<_, 4> = Client::new(transport);
        let mut handler = NoopEventHandler;

        // PUBACK arrives with nothing in flight awaiting it.
        let puback_buf = [0x40, 0x02, 0x00, 0x01];
        let result = block_on(client.process_packet(&puback_buf, &mut handler));
        assert!(result.is_err());
    }
}
