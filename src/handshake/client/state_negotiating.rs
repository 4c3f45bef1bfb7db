use super::HandshakeClient;
use crate::crypto::key_schedule::KeySchedule;
use crate::error::{HandshakeError, Result};
use crate::handshake::common::{reject_misplaced_extensions, unexpected_handshake};
use crate::protocol::extension::{Extension, TLS13};
use crate::protocol::message::HandshakeMessage;
use crate::protocol::state::ClientState;
use tracing::debug;

impl HandshakeClient {
    /// Processes the ServerHello: checks what the server selected, completes
    /// the key exchange and switches both directions to handshake keys.
    ///
    /// 处理 ServerHello：检查服务器的选择，完成密钥交换，并将两个方向切换到握手密钥。
    pub(super) fn on_server_hello(&mut self, message: HandshakeMessage) -> Result<()> {
        let state = self.state.name();
        let hello = match message {
            HandshakeMessage::ServerHello(hello) => hello,
            other => return Err(unexpected_handshake(&other, state)),
        };
        if hello.is_hello_retry_request() {
            return Err(HandshakeError::HandshakeFailure(
                "HelloRetryRequest is not supported",
            ));
        }
        if hello.legacy_session_id_echo != self.legacy_session_id {
            return Err(HandshakeError::IllegalParameter("legacy_session_id_echo mismatch"));
        }
        let cipher_suite = hello.cipher_suite;
        if !self.config.suite().cipher_suites().contains(&cipher_suite) {
            return Err(HandshakeError::IllegalParameter("server selected a cipher suite we did not offer"));
        }
        reject_misplaced_extensions(&hello.extensions)?;

        let mut selected_version = None;
        let mut server_share = None;
        for extension in hello.extensions {
            match extension {
                Extension::SelectedVersion(version) => selected_version = Some(version),
                Extension::KeyShare(entry) => server_share = Some(entry),
                _ => {}
            }
        }
        match selected_version {
            None => return Err(HandshakeError::ProtocolVersion),
            Some(TLS13) => {}
            Some(_) => {
                return Err(HandshakeError::IllegalParameter("server selected a version we did not offer"));
            }
        }
        let server_share = server_share.ok_or(HandshakeError::MissingExtension("key_share"))?;

        let index = self
            .key_shares
            .iter()
            .position(|share| share.group() == server_share.group)
            .ok_or(HandshakeError::IllegalParameter("server selected a group we did not offer"))?;
        let share = self.key_shares.swap_remove(index);
        self.key_shares.clear();
        let shared_secret = share.complete(&server_share.key_exchange)?;

        let hash = cipher_suite.hash()?;
        self.core.transcript.start_hash(hash)?;
        self.core.set_suite(cipher_suite);

        let mut key_schedule = KeySchedule::new(hash);
        key_schedule.input_shared_secret(&shared_secret)?;
        let transcript_hash = self.core.transcript.current_hash()?;
        let (client_secret, server_secret) = key_schedule.handshake_traffic_secrets(&transcript_hash)?;
        self.core.install_read_keys(&server_secret, state)?;
        self.core.install_write_keys(&client_secret)?;

        debug!(
            ?cipher_suite,
            group = ?server_share.group,
            secret_len = shared_secret.len(),
            "handshake keys installed"
        );
        self.cipher_suite = Some(cipher_suite);
        self.group = Some(server_share.group);
        self.shared_secret_len = Some(shared_secret.len());
        self.key_schedule = Some(key_schedule);
        self.client_handshake_secret = Some(client_secret);
        self.server_handshake_secret = Some(server_secret);
        self.transition(ClientState::WaitEncryptedExtensions);
        Ok(())
    }

    /// Processes EncryptedExtensions: the ALPN choice and the SNI acknowledgement.
    pub(super) fn on_encrypted_extensions(&mut self, message: HandshakeMessage) -> Result<()> {
        let extensions = match message {
            HandshakeMessage::EncryptedExtensions(extensions) => extensions,
            other => return Err(unexpected_handshake(&other, self.state.name())),
        };
        reject_misplaced_extensions(&extensions)?;
        for extension in extensions {
            match extension {
                Extension::Alpn(mut protocols) => {
                    let protocol = protocols
                        .pop()
                        .ok_or(HandshakeError::Decode("empty alpn list"))?;
                    if !self.config.alpn_protocols().contains(&protocol) {
                        return Err(HandshakeError::IllegalParameter(
                            "server selected an application protocol we did not offer",
                        ));
                    }
                    self.alpn_protocol = Some(protocol);
                }
                Extension::ServerNameAck if self.server_name.is_none() => {
                    return Err(HandshakeError::IllegalParameter("unsolicited server_name"));
                }
                _ => {}
            }
        }
        debug!(alpn = ?self.alpn_protocol.as_deref().map(String::from_utf8_lossy), "encrypted extensions accepted");
        self.transition(ClientState::WaitCertificateRequest);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::crypto::signature::PeerPublicKey;
    use crate::crypto::suite::{CipherSuite, NamedGroup};
    use crate::protocol::alert::AlertDescription;
    use crate::protocol::extension::KeyShareEntry;
    use crate::protocol::message::{HELLO_RETRY_REQUEST_RANDOM, ServerHello};
    use crate::verify::{CertificateVerdict, CertificateVerifier};
    use std::sync::Arc;
    use std::time::SystemTime;

    struct RejectAll;

    impl CertificateVerifier for RejectAll {
        fn verify(
            &self,
            _chain: &[Vec<u8>],
            _server_name: Option<&str>,
            _now: SystemTime,
        ) -> std::result::Result<PeerPublicKey, CertificateVerdict> {
            Err(CertificateVerdict::Untrusted)
        }
    }

    fn started_client() -> (HandshakeClient, Vec<u8>) {
        let config = ClientConfig::builder()
            .verifier(Arc::new(RejectAll))
            .build()
            .unwrap();
        let mut client = HandshakeClient::builder()
            .config(Arc::new(config))
            .server_name("localhost")
            .build()
            .unwrap();
        client.start().unwrap();
        let session_id = client.legacy_session_id.clone();
        (client, session_id)
    }

    fn plaintext_record(message: &HandshakeMessage) -> Vec<u8> {
        let body = message.encode();
        let mut record = vec![22, 3, 3];
        record.extend_from_slice(&(body.len() as u16).to_be_bytes());
        record.extend_from_slice(&body);
        record
    }

    fn server_hello(session_id: Vec<u8>, random: [u8; 32], extensions: Vec<Extension>) -> Vec<u8> {
        plaintext_record(&HandshakeMessage::ServerHello(ServerHello {
            random,
            legacy_session_id_echo: session_id,
            cipher_suite: CipherSuite::TlsAes128GcmSha256,
            extensions,
        }))
    }

    fn x25519_share() -> Extension {
        Extension::KeyShare(KeyShareEntry {
            group: NamedGroup::X25519,
            key_exchange: vec![9; 32],
        })
    }

    #[test]
    fn hello_retry_request_is_refused() {
        let (mut client, session_id) = started_client();
        let record = server_hello(
            session_id,
            HELLO_RETRY_REQUEST_RANDOM,
            vec![Extension::SelectedVersion(TLS13)],
        );
        assert!(matches!(
            client.process(&record),
            Err(HandshakeError::HandshakeFailure(_))
        ));
        assert_eq!(client.alert(), Some(AlertDescription::HandshakeFailure));
        assert!(client.is_error());
    }

    #[test]
    fn session_id_must_be_echoed() {
        let (mut client, _) = started_client();
        let record = server_hello(
            vec![0; 32],
            [7; 32],
            vec![Extension::SelectedVersion(TLS13), x25519_share()],
        );
        assert!(matches!(
            client.process(&record),
            Err(HandshakeError::IllegalParameter(_))
        ));
    }

    #[test]
    fn missing_supported_versions_is_a_version_error() {
        let (mut client, session_id) = started_client();
        let record = server_hello(session_id, [7; 32], vec![x25519_share()]);
        assert!(matches!(
            client.process(&record),
            Err(HandshakeError::ProtocolVersion)
        ));
        assert_eq!(client.alert(), Some(AlertDescription::ProtocolVersion));
    }

    #[test]
    fn missing_key_share_is_reported() {
        let (mut client, session_id) = started_client();
        let record = server_hello(session_id, [7; 32], vec![Extension::SelectedVersion(TLS13)]);
        assert!(matches!(
            client.process(&record),
            Err(HandshakeError::MissingExtension("key_share"))
        ));
    }

    #[test]
    fn alert_record_is_plaintext_before_keys() {
        let (mut client, session_id) = started_client();
        let record = server_hello(session_id, HELLO_RETRY_REQUEST_RANDOM, Vec::new());
        let _ = client.process(&record);
        assert_eq!(client.take_alert_record(), Some(vec![21, 3, 3, 0, 2, 2, 40]));
        assert!(client.take_alert_record().is_none());
    }
}
