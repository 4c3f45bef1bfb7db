use super::HandshakeServer;
use crate::crypto::key_schedule::verify_finished;
use crate::error::{HandshakeError, Result};
use crate::handshake::Progress;
use crate::handshake::common::{unexpected, unexpected_handshake};
use crate::protocol::message::{HandshakeMessage, Message};
use crate::protocol::state::ServerState;
use tracing::debug;

impl HandshakeServer {
    /// Verifies the client Finished and only then derives and installs the
    /// application traffic keys.
    ///
    /// 验证客户端 Finished，之后才派生并安装应用流量密钥。
    pub(super) fn on_client_finished(
        &mut self,
        message: HandshakeMessage,
        transcript_before: Option<Vec<u8>>,
    ) -> Result<()> {
        let state = self.state.name();
        let verify_data = match message {
            HandshakeMessage::Finished { verify_data } => verify_data,
            other => return Err(unexpected_handshake(&other, state)),
        };
        let transcript_hash = transcript_before.ok_or(HandshakeError::InvalidState)?;
        let client_secret = self
            .client_handshake_secret
            .take()
            .ok_or(HandshakeError::InvalidState)?;
        verify_finished(&client_secret, &transcript_hash, &verify_data)?;

        let mut key_schedule = self.key_schedule.take().ok_or(HandshakeError::InvalidState)?;
        key_schedule.advance_to_master()?;
        let server_finished_hash = self
            .server_finished_hash
            .take()
            .ok_or(HandshakeError::InvalidState)?;
        let (client_app, server_app) = key_schedule.application_traffic_secrets(&server_finished_hash)?;
        drop(key_schedule);
        self.core.enter_application_phase(client_app, server_app, state)?;

        debug!(
            suite = ?self.cipher_suite,
            group = ?self.group,
            client_cert_received = self.client_cert_received,
            client_cert_verified = self.client_cert_verified,
            "server handshake complete"
        );
        self.transition(ServerState::Connected);
        Ok(())
    }

    pub(super) fn on_record_while_connected(
        &mut self,
        message: Message,
        progress: &mut Progress,
    ) -> Result<()> {
        match message {
            Message::ApplicationData(data) => {
                progress.application_data.push(data);
                Ok(())
            }
            other => Err(unexpected(&other, self.state.name())),
        }
    }

    /// Only KeyUpdate is acceptable once connected.
    pub(super) fn on_post_handshake_message(&mut self, message: HandshakeMessage) -> Result<()> {
        match message {
            HandshakeMessage::KeyUpdate(request) => {
                self.core.key_update_received(request, self.state.name())
            }
            other => Err(unexpected_handshake(&other, self.state.name())),
        }
    }

    fn ensure_connected(&self) -> Result<()> {
        self.ensure_usable()?;
        if self.state != ServerState::Connected {
            return Err(HandshakeError::InvalidState);
        }
        Ok(())
    }

    /// Encrypts application data into one or more records.
    ///
    /// 将应用数据加密为一条或多条记录。
    pub fn send_application_data(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        self.ensure_connected()?;
        match self.core.send_application_data(data) {
            Ok(()) => Ok(self.core.take_output()),
            Err(err) => Err(self.abort(err)),
        }
    }

    /// Sends a KeyUpdate and ratchets our write direction.
    pub fn send_key_update(&mut self, request_peer: bool) -> Result<Vec<u8>> {
        self.ensure_connected()?;
        match self.core.send_key_update(request_peer) {
            Ok(()) => Ok(self.core.take_output()),
            Err(err) => Err(self.abort(err)),
        }
    }

    /// Sends close_notify and moves to `Closed`.
    ///
    /// 发送 close_notify 并进入 `Closed` 状态。
    pub fn close(&mut self) -> Result<Vec<u8>> {
        self.ensure_usable()?;
        let out = self.core.close();
        self.shut_down();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CertifiedKey, ClientConfig, ServerConfig};
    use crate::handshake::client::HandshakeClient;
    use crate::protocol::alert::AlertDescription;
    use crate::record::{ContentType, RecordKeys, decrypt, encrypt};
    use crate::verify::TrustAnchorVerifier;
    use rcgen::{BasicConstraints, Certificate, CertificateParams, IsCa, PKCS_ED25519};
    use std::sync::Arc;

    fn pair() -> (HandshakeClient, HandshakeServer) {
        let mut ca_params = CertificateParams::new(Vec::<String>::new());
        ca_params.alg = &PKCS_ED25519;
        ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        let ca = Certificate::from_params(ca_params).unwrap();
        let mut leaf_params = CertificateParams::new(vec!["localhost".to_string()]);
        leaf_params.alg = &PKCS_ED25519;
        let leaf = Certificate::from_params(leaf_params).unwrap();

        let certified = CertifiedKey::from_der(
            vec![leaf.serialize_der_with_signer(&ca).unwrap()],
            &leaf.serialize_private_key_der(),
        )
        .unwrap();
        let server_config = ServerConfig::builder().certificate(certified).build().unwrap();
        let verifier = TrustAnchorVerifier::new(vec![ca.serialize_der().unwrap()]).unwrap();
        let client_config = ClientConfig::builder()
            .verifier(Arc::new(verifier))
            .build()
            .unwrap();

        let client = HandshakeClient::builder()
            .config(Arc::new(client_config))
            .server_name("localhost")
            .build()
            .unwrap();
        let server = HandshakeServer::builder()
            .config(Arc::new(server_config))
            .build()
            .unwrap();
        (client, server)
    }

    #[test]
    fn forged_client_finished_is_rejected() {
        let (mut client, mut server) = pair();
        let flight = server.process(&client.start().unwrap()).unwrap();
        let client_flight = client.process(&flight.to_send).unwrap().to_send;

        // Re-seal a Finished whose verify_data is off by one bit, so only the
        // Finished check can catch it.
        let suite = server.cipher_suite.unwrap();
        let secret = server.client_handshake_secret.as_ref().unwrap();
        let mut rx = RecordKeys::from_traffic_secret(suite, secret).unwrap();
        let mut tx = RecordKeys::from_traffic_secret(suite, secret).unwrap();
        let (mut finished, content_type) = decrypt(&client_flight, &mut rx).unwrap();
        assert_eq!(content_type, ContentType::Handshake);
        *finished.last_mut().unwrap() ^= 0x01;
        let forged = encrypt(&finished, ContentType::Handshake, &mut tx).unwrap();

        let err = server.process(&forged).unwrap_err();
        assert!(matches!(err, HandshakeError::FinishedMismatch));
        assert_eq!(server.alert(), Some(AlertDescription::DecryptError));
        assert!(server.key_schedule.is_none());
        assert!(server.client_handshake_secret.is_none());
        assert!(!server.core.record.has_read_keys());
        assert!(!server.core.record.has_write_keys());
    }

    #[test]
    fn application_data_waits_for_client_finished() {
        let (mut client, mut server) = pair();
        server.process(&client.start().unwrap()).unwrap();
        assert_eq!(server.state(), ServerState::WaitClientFinished);
        assert!(matches!(
            server.send_application_data(b"0.5-RTT"),
            Err(HandshakeError::InvalidState)
        ));
        assert!(!server.is_error());
    }
}
