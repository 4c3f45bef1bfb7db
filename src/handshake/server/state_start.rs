use super::{HandshakeServer, HandshakeServerBuilder};
use crate::config::{ClientAuthMode, Missing};
use crate::crypto::key_exchange::KeyShare;
use crate::crypto::key_schedule::{KeySchedule, TrafficSecret, compute_finished_verify_data};
use crate::crypto::signature::sign_certificate_verify;
use crate::crypto::suite::{CipherSuite, NamedGroup, SignatureScheme};
use crate::error::{HandshakeError, Result};
use crate::handshake::common::{reject_misplaced_extensions, unexpected_handshake};
use crate::protocol::extension::{Extension, KeyShareEntry, TLS13};
use crate::protocol::message::{CertificateEntry, ClientHello, HandshakeMessage, ServerHello};
use crate::protocol::state::ServerState;
use rand::RngCore;
use rand::rngs::OsRng;
use tracing::debug;

/// What the server took from a ClientHello.
struct Negotiated {
    cipher_suite: CipherSuite,
    client_share: KeyShareEntry,
    server_name: Option<String>,
    alpn_protocol: Option<Vec<u8>>,
}

/// Picks the share to answer: a hybrid group both sides support wins,
/// otherwise the first mutually supported share in client order.
///
/// 选择要应答的密钥共享：双方都支持的混合组优先，否则按客户端顺序选择第一个共同支持的共享。
pub(crate) fn select_key_share<'a>(
    server_groups: &[NamedGroup],
    client_shares: &'a [KeyShareEntry],
) -> Option<&'a KeyShareEntry> {
    let supported = |entry: &&KeyShareEntry| server_groups.contains(&entry.group);
    client_shares
        .iter()
        .filter(supported)
        .find(|entry| entry.group.is_hybrid())
        .or_else(|| client_shares.iter().find(supported))
}

impl HandshakeServer {
    /// Creates a new `HandshakeServerBuilder` to construct a `HandshakeServer`.
    ///
    /// 创建一个用于构造 `HandshakeServer` 的构建器。
    pub fn builder() -> HandshakeServerBuilder<Missing> {
        HandshakeServerBuilder::new()
    }

    /// Processes a ClientHello and queues the whole server flight:
    /// ServerHello, EncryptedExtensions, [CertificateRequest,] Certificate,
    /// CertificateVerify, Finished.
    ///
    /// 处理 ClientHello 并排队整组服务器消息：ServerHello、EncryptedExtensions、
    /// [CertificateRequest、]Certificate、CertificateVerify、Finished。
    pub(super) fn on_client_hello(&mut self, message: HandshakeMessage) -> Result<()> {
        let hello = match message {
            HandshakeMessage::ClientHello(hello) => hello,
            other => return Err(unexpected_handshake(&other, self.state.name())),
        };
        self.transition(ServerState::ReceivedClientHello);
        let negotiated = self.negotiate(&hello)?;
        let server_secret = self.send_server_hello(hello.legacy_session_id, &negotiated)?;
        self.send_server_flight(negotiated, server_secret)
    }

    fn negotiate(&self, hello: &ClientHello) -> Result<Negotiated> {
        let suite = self.config.suite();
        if hello.compression_methods != [0] {
            return Err(HandshakeError::IllegalParameter("compression methods must be exactly [null]"));
        }
        reject_misplaced_extensions(&hello.extensions)?;

        let mut versions = None;
        let mut groups = None;
        let mut schemes = None;
        let mut shares = None;
        let mut server_name = None;
        let mut alpn = None;
        for extension in &hello.extensions {
            match extension {
                Extension::SupportedVersions(list) => versions = Some(list),
                Extension::SupportedGroups(list) => groups = Some(list),
                Extension::SignatureAlgorithms(list) => schemes = Some(list),
                Extension::KeyShares(list) => shares = Some(list),
                Extension::ServerName(name) => server_name = Some(name.clone()),
                Extension::Alpn(list) => alpn = Some(list),
                _ => {}
            }
        }

        if !versions.is_some_and(|v| v.contains(&TLS13)) {
            return Err(HandshakeError::ProtocolVersion);
        }
        let cipher_suite = hello
            .cipher_suites
            .iter()
            .copied()
            .find(|cs| suite.cipher_suites().contains(cs))
            .ok_or(HandshakeError::HandshakeFailure("no cipher suite in common"))?;
        let shares = shares.ok_or(HandshakeError::MissingExtension("key_share"))?;
        let groups = groups.ok_or(HandshakeError::MissingExtension("supported_groups"))?;
        let schemes: &Vec<SignatureScheme> =
            schemes.ok_or(HandshakeError::MissingExtension("signature_algorithms"))?;
        if shares.iter().any(|share| !groups.contains(&share.group)) {
            return Err(HandshakeError::IllegalParameter("key share for a group not in supported_groups"));
        }
        let client_share = select_key_share(suite.groups(), shares)
            .ok_or(HandshakeError::HandshakeFailure("no key share in common"))?
            .clone();
        if !schemes.contains(&self.config.certificate().key().scheme()) {
            return Err(HandshakeError::HandshakeFailure(
                "client does not accept the certificate's signature scheme",
            ));
        }

        let alpn_protocol = match alpn {
            Some(offered) if !self.config.alpn_protocols().is_empty() => Some(
                self.config
                    .alpn_protocols()
                    .iter()
                    .find(|p| offered.contains(p))
                    .cloned()
                    .ok_or(HandshakeError::NoApplicationProtocol)?,
            ),
            _ => None,
        };

        debug!(
            ?cipher_suite,
            group = ?client_share.group,
            offered_groups = ?groups,
            ?server_name,
            "ClientHello accepted"
        );
        Ok(Negotiated {
            cipher_suite,
            client_share,
            server_name,
            alpn_protocol,
        })
    }

    /// Answers the key share, sends ServerHello in the clear and switches both
    /// directions to handshake keys. Returns the server handshake secret, which
    /// only our Finished still needs.
    fn send_server_hello(
        &mut self,
        session_id: Vec<u8>,
        negotiated: &Negotiated,
    ) -> Result<TrafficSecret> {
        let state = self.state.name();
        let group = negotiated.client_share.group;
        let (public, shared_secret) = KeyShare::respond(group, &negotiated.client_share.key_exchange)?;

        let mut random = [0u8; 32];
        OsRng.fill_bytes(&mut random);
        let hello = HandshakeMessage::ServerHello(ServerHello {
            random,
            legacy_session_id_echo: session_id,
            cipher_suite: negotiated.cipher_suite,
            extensions: vec![
                Extension::SelectedVersion(TLS13),
                Extension::KeyShare(KeyShareEntry {
                    group,
                    key_exchange: public,
                }),
            ],
        });

        let hash = negotiated.cipher_suite.hash()?;
        self.core.transcript.start_hash(hash)?;
        self.core.set_suite(negotiated.cipher_suite);
        self.core.send_handshake(&hello)?;

        let mut key_schedule = KeySchedule::new(hash);
        key_schedule.input_shared_secret(&shared_secret)?;
        let transcript_hash = self.core.transcript.current_hash()?;
        let (client_secret, server_secret) = key_schedule.handshake_traffic_secrets(&transcript_hash)?;
        self.core.install_read_keys(&client_secret, state)?;
        self.core.install_write_keys(&server_secret)?;

        self.cipher_suite = Some(negotiated.cipher_suite);
        self.group = Some(group);
        self.shared_secret_len = Some(shared_secret.len());
        self.key_schedule = Some(key_schedule);
        self.client_handshake_secret = Some(client_secret);
        Ok(server_secret)
    }

    /// EncryptedExtensions through Finished, all under handshake keys.
    fn send_server_flight(
        &mut self,
        negotiated: Negotiated,
        server_secret: TrafficSecret,
    ) -> Result<()> {
        let mut extensions = Vec::new();
        if let Some(protocol) = &negotiated.alpn_protocol {
            extensions.push(Extension::Alpn(vec![protocol.clone()]));
        }
        if negotiated.server_name.is_some() {
            extensions.push(Extension::ServerNameAck);
        }
        self.core
            .send_handshake(&HandshakeMessage::EncryptedExtensions(extensions))?;

        let client_auth = self.config.client_auth();
        if client_auth != ClientAuthMode::None {
            self.core.send_handshake(&HandshakeMessage::CertificateRequest {
                context: Vec::new(),
                signature_algorithms: self.config.suite().signature_schemes().to_vec(),
            })?;
        }

        let certified = self.config.certificate();
        let entries = certified
            .chain()
            .iter()
            .map(|der| CertificateEntry {
                cert_data: der.clone(),
                extensions: Vec::new(),
            })
            .collect();
        self.core.send_handshake(&HandshakeMessage::Certificate {
            context: Vec::new(),
            entries,
        })?;

        let transcript_hash = self.core.transcript.current_hash()?;
        let signature = sign_certificate_verify(certified.key(), true, &transcript_hash);
        self.core.send_handshake(&HandshakeMessage::CertificateVerify {
            scheme: certified.key().scheme(),
            signature,
        })?;

        let transcript_hash = self.core.transcript.current_hash()?;
        let verify_data = compute_finished_verify_data(&server_secret, &transcript_hash)?;
        self.core.send_handshake(&HandshakeMessage::Finished { verify_data })?;
        drop(server_secret);

        self.server_finished_hash = Some(self.core.transcript.current_hash()?);
        self.server_name = negotiated.server_name;
        self.alpn_protocol = negotiated.alpn_protocol;
        self.transition(match client_auth {
            ClientAuthMode::None => ServerState::WaitClientFinished,
            ClientAuthMode::Optional | ClientAuthMode::Required => ServerState::WaitClientCertificate,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn share(group: NamedGroup) -> KeyShareEntry {
        KeyShareEntry {
            group,
            key_exchange: vec![0; 4],
        }
    }

    #[test]
    fn hybrid_share_wins_regardless_of_client_order() {
        let shares = [share(NamedGroup::X25519), share(NamedGroup::X25519MlKem768)];
        let both = [NamedGroup::X25519, NamedGroup::X25519MlKem768];
        assert_eq!(
            select_key_share(&both, &shares).map(|s| s.group),
            Some(NamedGroup::X25519MlKem768)
        );
        assert_eq!(
            select_key_share(&[NamedGroup::X25519], &shares).map(|s| s.group),
            Some(NamedGroup::X25519)
        );
    }

    #[test]
    fn unknown_groups_are_skipped() {
        let shares = [share(NamedGroup::Unknown(0x1234)), share(NamedGroup::X25519)];
        assert_eq!(
            select_key_share(&[NamedGroup::X25519], &shares).map(|s| s.group),
            Some(NamedGroup::X25519)
        );
        assert!(select_key_share(&[NamedGroup::X25519MlKem768], &shares).is_none());
    }
}
