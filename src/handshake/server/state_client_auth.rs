use super::HandshakeServer;
use crate::config::ClientAuthMode;
use crate::crypto::signature::verify_certificate_verify;
use crate::error::{HandshakeError, Result};
use crate::handshake::common::unexpected_handshake;
use crate::protocol::message::HandshakeMessage;
use crate::protocol::state::ServerState;
use std::time::SystemTime;
use tracing::debug;

impl HandshakeServer {
    /// Handles the client's Certificate according to the configured auth mode.
    ///
    /// An empty list is accepted only in `Optional` mode; the handshake then
    /// goes straight to Finished without a CertificateVerify.
    ///
    /// 根据配置的认证模式处理客户端证书。只有 `Optional` 模式接受空列表，
    /// 此时握手直接进入 Finished，不再需要 CertificateVerify。
    pub(super) fn on_client_certificate(&mut self, message: HandshakeMessage) -> Result<()> {
        let (context, entries) = match message {
            HandshakeMessage::Certificate { context, entries } => (context, entries),
            other => return Err(unexpected_handshake(&other, self.state.name())),
        };
        if !context.is_empty() {
            return Err(HandshakeError::IllegalParameter("certificate_request_context mismatch"));
        }

        if entries.is_empty() {
            return match self.config.client_auth() {
                ClientAuthMode::Required => Err(HandshakeError::CertificateRequired),
                _ => {
                    debug!("client declined to send a certificate");
                    self.transition(ServerState::WaitClientFinished);
                    Ok(())
                }
            };
        }

        self.client_cert_received = true;
        let chain: Vec<Vec<u8>> = entries.into_iter().map(|entry| entry.cert_data).collect();
        let verifier = self
            .config
            .client_verifier()
            .ok_or(HandshakeError::InvalidState)?;
        let client_key = verifier
            .verify(&chain, None, SystemTime::now())
            .map_err(HandshakeError::Certificate)?;
        debug!(chain_len = chain.len(), key_type = ?client_key.key_type, "client certificate accepted");
        self.client_key = Some(client_key);
        self.peer_certificates = chain;
        self.transition(ServerState::WaitClientCertificateVerify);
        Ok(())
    }

    /// Checks the client's proof of possession for its certificate key.
    pub(super) fn on_client_certificate_verify(
        &mut self,
        message: HandshakeMessage,
        transcript_before: Option<Vec<u8>>,
    ) -> Result<()> {
        let (scheme, signature) = match message {
            HandshakeMessage::CertificateVerify { scheme, signature } => (scheme, signature),
            other => return Err(unexpected_handshake(&other, self.state.name())),
        };
        if !self.config.suite().signature_schemes().contains(&scheme) {
            return Err(HandshakeError::IllegalParameter("signature scheme was not requested"));
        }
        let client_key = self.client_key.as_ref().ok_or(HandshakeError::InvalidState)?;
        let transcript_hash = transcript_before.ok_or(HandshakeError::InvalidState)?;
        verify_certificate_verify(client_key, scheme, false, &transcript_hash, &signature)?;
        self.client_cert_verified = true;
        self.transition(ServerState::WaitClientFinished);
        Ok(())
    }
}
