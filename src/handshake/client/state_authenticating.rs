use super::{CertificateRequestInfo, HandshakeClient};
use crate::crypto::key_schedule::{compute_finished_verify_data, verify_finished};
use crate::crypto::signature::{sign_certificate_verify, verify_certificate_verify};
use crate::error::{HandshakeError, Result};
use crate::handshake::common::unexpected_handshake;
use crate::protocol::message::{CertificateEntry, HandshakeMessage};
use crate::protocol::state::ClientState;
use std::time::SystemTime;
use tracing::debug;

impl HandshakeClient {
    /// Either an optional CertificateRequest or the server's Certificate.
    pub(super) fn on_certificate_request_or_certificate(
        &mut self,
        message: HandshakeMessage,
    ) -> Result<()> {
        match message {
            HandshakeMessage::CertificateRequest {
                context,
                signature_algorithms,
            } => {
                debug!(
                    schemes = ?signature_algorithms,
                    "server requested a client certificate"
                );
                self.certificate_request = Some(CertificateRequestInfo {
                    context,
                    signature_algorithms,
                });
                self.transition(ClientState::WaitCertificate);
                Ok(())
            }
            other => self.on_certificate(other),
        }
    }

    /// Verifies the server's chain with the configured verifier.
    ///
    /// 使用配置的验证器验证服务器证书链。
    pub(super) fn on_certificate(&mut self, message: HandshakeMessage) -> Result<()> {
        let (context, entries) = match message {
            HandshakeMessage::Certificate { context, entries } => (context, entries),
            other => return Err(unexpected_handshake(&other, self.state.name())),
        };
        if !context.is_empty() {
            return Err(HandshakeError::IllegalParameter("server certificate_request_context must be empty"));
        }
        if entries.is_empty() {
            return Err(HandshakeError::Decode("server sent an empty certificate list"));
        }
        let chain: Vec<Vec<u8>> = entries.into_iter().map(|entry| entry.cert_data).collect();
        let server_key = self
            .config
            .verifier()
            .verify(&chain, self.server_name.as_deref(), SystemTime::now())
            .map_err(HandshakeError::Certificate)?;
        debug!(chain_len = chain.len(), key_type = ?server_key.key_type, "server certificate accepted");
        self.server_key = Some(server_key);
        self.peer_certificates = chain;
        self.transition(ClientState::WaitCertificateVerify);
        Ok(())
    }

    /// Checks the server's signature over the transcript up to its Certificate.
    pub(super) fn on_certificate_verify(
        &mut self,
        message: HandshakeMessage,
        transcript_before: Option<Vec<u8>>,
    ) -> Result<()> {
        let (scheme, signature) = match message {
            HandshakeMessage::CertificateVerify { scheme, signature } => (scheme, signature),
            other => return Err(unexpected_handshake(&other, self.state.name())),
        };
        if !self.config.suite().signature_schemes().contains(&scheme) {
            return Err(HandshakeError::IllegalParameter("signature scheme was not offered"));
        }
        let server_key = self.server_key.as_ref().ok_or(HandshakeError::InvalidState)?;
        let transcript_hash = transcript_before.ok_or(HandshakeError::InvalidState)?;
        verify_certificate_verify(server_key, scheme, true, &transcript_hash, &signature)?;
        self.transition(ClientState::WaitServerFinished);
        Ok(())
    }

    /// Verifies the server Finished, derives the application secrets, and
    /// sends our own flight: [Certificate, CertificateVerify,] Finished.
    ///
    /// 验证服务器 Finished，派生应用流量密钥，并发送本端消息：
    /// [Certificate, CertificateVerify,] Finished。
    pub(super) fn on_server_finished(
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
        let server_secret = self
            .server_handshake_secret
            .take()
            .ok_or(HandshakeError::InvalidState)?;
        verify_finished(&server_secret, &transcript_hash, &verify_data)?;

        // Application secrets bind the transcript through the server Finished.
        let mut key_schedule = self.key_schedule.take().ok_or(HandshakeError::InvalidState)?;
        key_schedule.advance_to_master()?;
        let server_finished_hash = self.core.transcript.current_hash()?;
        let (client_app, server_app) = key_schedule.application_traffic_secrets(&server_finished_hash)?;
        drop(key_schedule);

        if let Some(request) = self.certificate_request.take() {
            self.send_client_certificate(request)?;
        }

        let client_secret = self
            .client_handshake_secret
            .take()
            .ok_or(HandshakeError::InvalidState)?;
        let transcript_hash = self.core.transcript.current_hash()?;
        let verify_data = compute_finished_verify_data(&client_secret, &transcript_hash)?;
        self.core.send_handshake(&HandshakeMessage::Finished { verify_data })?;

        self.core.enter_application_phase(server_app, client_app, state)?;
        debug!(
            suite = ?self.cipher_suite,
            group = ?self.group,
            alpn = ?self.alpn_protocol,
            "client handshake complete"
        );
        self.transition(ClientState::Connected);
        Ok(())
    }

    /// Sends our certificate if one fits the request, or an empty Certificate.
    fn send_client_certificate(&mut self, request: CertificateRequestInfo) -> Result<()> {
        let certified = self
            .config
            .client_certificate()
            .filter(|c| request.signature_algorithms.contains(&c.key().scheme()));

        let entries = certified
            .map(|c| {
                c.chain()
                    .iter()
                    .map(|der| CertificateEntry {
                        cert_data: der.clone(),
                        extensions: Vec::new(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        self.core.send_handshake(&HandshakeMessage::Certificate {
            context: request.context,
            entries,
        })?;

        let Some(certified) = certified else {
            debug!("no suitable client certificate; sent an empty Certificate");
            return Ok(());
        };
        let transcript_hash = self.core.transcript.current_hash()?;
        let signature = sign_certificate_verify(certified.key(), false, &transcript_hash);
        self.core.send_handshake(&HandshakeMessage::CertificateVerify {
            scheme: certified.key().scheme(),
            signature,
        })?;
        debug!("client certificate and CertificateVerify sent");
        Ok(())
    }
}
