//! Machinery shared by both roles: handshake message reassembly, transcript
//! bookkeeping, key installation, alerts and the post-handshake phase.
//!
//! 两种角色共享的机制：握手消息重组、握手记录维护、密钥安装、告警以及握手后阶段。

use crate::crypto::key_schedule::{TrafficSecret, update_traffic_secret};
use crate::crypto::suite::CipherSuite;
use crate::error::{HandshakeError, Result};
use crate::protocol::alert::{Alert, AlertDescription, AlertLevel};
use crate::protocol::message::{
    HANDSHAKE_HEADER_LEN, HandshakeMessage, HandshakeType, KeyUpdateRequest, Message,
    handshake_type_name,
};
use crate::protocol::extension::{self, Extension};
use crate::protocol::transcript::Transcript;
use crate::record::{ContentType, RecordKeys, RecordLayer};
use tracing::{debug, trace, warn};

/// Upper bound on a reassembled handshake message.
const MAX_HANDSHAKE_MESSAGE_LEN: usize = 1 << 18;

/// One inbound message. For handshake messages absorbed into the transcript,
/// `transcript_before` is the hash of everything preceding it (absent while the
/// hash algorithm is still unknown).
#[derive(Debug)]
pub(crate) struct Incoming {
    pub message: Message,
    pub transcript_before: Option<Vec<u8>>,
}

/// State common to the client and server contexts.
#[derive(Debug)]
pub(crate) struct ConnectionCore {
    pub record: RecordLayer,
    pub transcript: Transcript,
    handshake_buffer: Vec<u8>,
    in_handshake: bool,
    suite: Option<CipherSuite>,
    read_secret: Option<TrafficSecret>,
    write_secret: Option<TrafficSecret>,
    alert: Option<AlertDescription>,
    alert_record: Option<Vec<u8>>,
}

impl ConnectionCore {
    pub fn new(record_padding: usize) -> Self {
        Self {
            record: RecordLayer::new(record_padding),
            transcript: Transcript::new(),
            handshake_buffer: Vec::new(),
            in_handshake: true,
            suite: None,
            read_secret: None,
            write_secret: None,
            alert: None,
            alert_record: None,
        }
    }

    pub fn set_suite(&mut self, suite: CipherSuite) {
        self.suite = Some(suite);
    }

    fn suite(&self) -> Result<CipherSuite> {
        self.suite.ok_or(HandshakeError::InvalidState)
    }

    /// Pulls the next complete message, reading further records as needed.
    ///
    /// The type byte is checked against `accepts` first, so a misplaced message
    /// is `unexpected_message` whatever its body holds. Framing is validated
    /// before the message bytes enter the transcript; the body is decoded
    /// afterwards.
    ///
    /// 取出下一条完整消息，必要时继续读取记录。先用 `accepts` 检查类型字节；
    /// 消息字节先通过帧校验再进入握手记录，之后才解码消息体。
    pub fn next_incoming(
        &mut self,
        state: &'static str,
        accepts: &[HandshakeType],
    ) -> Result<Option<Incoming>> {
        loop {
            if let Some(raw) = self.take_handshake_frame()? {
                let typ = HandshakeType::from_u8(raw[0]);
                if !typ.is_some_and(|typ| accepts.contains(&typ)) {
                    return Err(HandshakeError::UnexpectedMessage {
                        message: typ.map_or("unknown handshake type", handshake_type_name),
                        state,
                    });
                }
                let transcript_before = if self.in_handshake {
                    let before = self.transcript.current_hash().ok();
                    self.transcript.update(&raw);
                    before
                } else {
                    None
                };
                let message = HandshakeMessage::decode(&raw).map_err(|err| match err {
                    HandshakeError::UnexpectedMessage { message, .. } => {
                        HandshakeError::UnexpectedMessage { message, state }
                    }
                    other => other,
                })?;
                trace!(message = message.name(), state, "handshake message received");
                return Ok(Some(Incoming {
                    message: Message::Handshake(message),
                    transcript_before,
                }));
            }

            let Some(record) = self.record.next_record()? else {
                return Ok(None);
            };
            if record.content_type != ContentType::Handshake && !self.handshake_buffer.is_empty() {
                return Err(HandshakeError::UnexpectedMessage {
                    message: "record interleaved with a fragmented handshake message",
                    state,
                });
            }
            let message = match record.content_type {
                ContentType::Handshake => {
                    self.handshake_buffer.extend_from_slice(&record.payload);
                    continue;
                }
                ContentType::Alert => Message::Alert(Alert::decode(&record.payload)?),
                ContentType::ApplicationData => Message::ApplicationData(record.payload),
                ContentType::ChangeCipherSpec => Message::ChangeCipherSpec,
            };
            return Ok(Some(Incoming {
                message,
                transcript_before: None,
            }));
        }
    }

    fn take_handshake_frame(&mut self) -> Result<Option<Vec<u8>>> {
        if self.handshake_buffer.len() < HANDSHAKE_HEADER_LEN {
            return Ok(None);
        }
        let b = &self.handshake_buffer;
        let len = ((b[1] as usize) << 16) | ((b[2] as usize) << 8) | b[3] as usize;
        if len > MAX_HANDSHAKE_MESSAGE_LEN {
            return Err(HandshakeError::Decode("handshake message too large"));
        }
        if b.len() < HANDSHAKE_HEADER_LEN + len {
            return Ok(None);
        }
        Ok(Some(self.handshake_buffer.drain(..HANDSHAKE_HEADER_LEN + len).collect()))
    }

    /// Encodes, records in the transcript (during the handshake) and queues a
    /// handshake message under the current write keys.
    pub fn send_handshake(&mut self, message: &HandshakeMessage) -> Result<()> {
        let raw = message.encode();
        if self.in_handshake {
            self.transcript.update(&raw);
        }
        trace!(message = message.name(), len = raw.len(), "handshake message queued");
        self.record.write(ContentType::Handshake, &raw)
    }

    /// Switches inbound protection. A handshake message may not span the change.
    pub fn install_read_keys(&mut self, secret: &TrafficSecret, state: &'static str) -> Result<()> {
        if !self.handshake_buffer.is_empty() {
            return Err(HandshakeError::UnexpectedMessage {
                message: "handshake data spanning a key change",
                state,
            });
        }
        let keys = RecordKeys::from_traffic_secret(self.suite()?, secret)?;
        self.record.set_read_keys(keys);
        Ok(())
    }

    pub fn install_write_keys(&mut self, secret: &TrafficSecret) -> Result<()> {
        let keys = RecordKeys::from_traffic_secret(self.suite()?, secret)?;
        self.record.set_write_keys(keys);
        Ok(())
    }

    /// Installs the application traffic secrets and leaves the handshake phase.
    pub fn enter_application_phase(
        &mut self,
        read: TrafficSecret,
        write: TrafficSecret,
        state: &'static str,
    ) -> Result<()> {
        self.install_read_keys(&read, state)?;
        self.install_write_keys(&write)?;
        self.read_secret = Some(read);
        self.write_secret = Some(write);
        self.in_handshake = false;
        self.record.handshake_complete();
        Ok(())
    }

    /// Returns `true` when the alert closes the connection.
    ///
    /// `user_canceled` is tolerated; any other alert is fatal.
    pub fn handle_alert(&mut self, alert: Alert) -> Result<bool> {
        match alert.description {
            AlertDescription::CloseNotify => {
                debug!("peer sent close_notify");
                Ok(true)
            }
            AlertDescription::UserCanceled if alert.level == AlertLevel::Warning => {
                debug!("peer sent user_canceled; ignoring");
                Ok(false)
            }
            description => {
                warn!(alert = %description, "peer sent fatal alert");
                Err(HandshakeError::PeerAlert(description))
            }
        }
    }

    /// Applies a peer KeyUpdate to the read direction, answering it if asked.
    pub fn key_update_received(&mut self, request: KeyUpdateRequest, state: &'static str) -> Result<()> {
        let current = self.read_secret.as_ref().ok_or(HandshakeError::InvalidState)?;
        let next = update_traffic_secret(current)?;
        self.install_read_keys(&next, state)?;
        debug!(generation = next.generation(), "read keys updated by peer");
        self.read_secret = Some(next);
        if request == KeyUpdateRequest::Requested {
            self.send_key_update(false)?;
        }
        Ok(())
    }

    /// Sends KeyUpdate under the current write keys, then ratchets them.
    pub fn send_key_update(&mut self, request_peer: bool) -> Result<()> {
        let request = if request_peer {
            KeyUpdateRequest::Requested
        } else {
            KeyUpdateRequest::NotRequested
        };
        self.send_handshake(&HandshakeMessage::KeyUpdate(request))?;
        let current = self.write_secret.as_ref().ok_or(HandshakeError::InvalidState)?;
        let next = update_traffic_secret(current)?;
        self.install_write_keys(&next)?;
        debug!(generation = next.generation(), "write keys updated");
        self.write_secret = Some(next);
        Ok(())
    }

    pub fn send_application_data(&mut self, data: &[u8]) -> Result<()> {
        self.record.write(ContentType::ApplicationData, data)
    }

    /// Queues close_notify and drops all keys.
    pub fn close(&mut self) -> Result<Vec<u8>> {
        self.record
            .write(ContentType::Alert, &Alert::close_notify().encode())?;
        let out = self.record.take_output();
        self.discard_keys();
        Ok(out)
    }

    pub fn take_output(&mut self) -> Vec<u8> {
        self.record.take_output()
    }

    /// Records a fatal error: queues the matching alert (protected if write keys
    /// exist), captures the alert code and destroys all key material.
    ///
    /// 记录致命错误：排队对应的告警（若有写密钥则加密），保存告警码并销毁全部密钥材料。
    pub fn fail(&mut self, err: HandshakeError) -> HandshakeError {
        match err.alert() {
            Some(description) => {
                warn!(error = %err, alert = %description, "connection failed");
                let _ = self.record.take_output();
                if self
                    .record
                    .write(ContentType::Alert, &Alert::fatal(description).encode())
                    .is_ok()
                {
                    self.alert_record = Some(self.record.take_output());
                }
                self.alert = Some(description);
            }
            None => {
                debug!(error = %err, "connection failed without local alert");
                if let HandshakeError::PeerAlert(description) = err {
                    self.alert = Some(description);
                }
            }
        }
        self.discard_keys();
        err
    }

    /// Drops both directions' keys and secrets along with any buffered data.
    pub fn discard_keys(&mut self) {
        self.record.clear();
        self.handshake_buffer.clear();
        self.read_secret = None;
        self.write_secret = None;
    }

    /// The error every call returns once the connection has failed.
    pub fn failed_error(&self) -> HandshakeError {
        HandshakeError::ConnectionFailed(self.alert.unwrap_or(AlertDescription::InternalError))
    }

    pub fn alert(&self) -> Option<AlertDescription> {
        self.alert
    }

    pub fn take_alert_record(&mut self) -> Option<Vec<u8>> {
        self.alert_record.take()
    }
}

/// Rejects a message the current state does not accept.
pub(crate) fn unexpected(message: &Message, state: &'static str) -> HandshakeError {
    HandshakeError::UnexpectedMessage {
        message: message.name(),
        state,
    }
}

pub(crate) fn unexpected_handshake(message: &HandshakeMessage, state: &'static str) -> HandshakeError {
    HandshakeError::UnexpectedMessage {
        message: message.name(),
        state,
    }
}

/// Extensions we understand but that are not allowed in the message carrying
/// them decode as `Unknown`; those are rejected, truly unknown ones ignored.
pub(crate) fn reject_misplaced_extensions(extensions: &[Extension]) -> Result<()> {
    const KNOWN: [u16; 6] = [
        extension::SERVER_NAME,
        extension::SUPPORTED_GROUPS,
        extension::SIGNATURE_ALGORITHMS,
        extension::ALPN,
        extension::SUPPORTED_VERSIONS,
        extension::KEY_SHARE,
    ];
    for ext in extensions {
        if let Extension::Unknown { typ, .. } = ext {
            if KNOWN.contains(typ) {
                return Err(HandshakeError::IllegalParameter("extension not allowed in this message"));
            }
        }
    }
    Ok(())
}
