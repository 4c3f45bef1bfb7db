//! The TLS 1.3 key schedule (RFC 8446 §7.1).
//!
//! The free functions are pure and deterministic. [`KeySchedule`] strings them
//! together and enforces that secrets are only ever derived downstream:
//! Early → Handshake → Master.
//!
//! ```text
//!              0
//!              |
//!    PSK ->  HKDF-Extract = Early Secret
//!              |
//!        Derive-Secret(., "derived", "")
//!              |
//! (EC)DHE -> HKDF-Extract = Handshake Secret --> c/s hs traffic
//!              |
//!        Derive-Secret(., "derived", "")
//!              |
//!    0 ->  HKDF-Extract = Master Secret --> c/s ap traffic
//! ```
//!
//! TLS 1.3 密钥调度。自由函数是纯函数且确定；[`KeySchedule`] 把它们串联起来，
//! 并保证密钥只会向下游派生：Early → Handshake → Master。

use crate::crypto::hash::HashAlgorithm;
use crate::error::{HandshakeError, Result};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

const LABEL_PREFIX: &[u8] = b"tls13 ";
const MAX_LABEL_LEN: usize = 255;

/// A secret in the schedule, tagged with the hash it belongs to.
///
/// 密钥调度中的一个密钥，附带其所属的哈希算法。
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct Secret {
    #[zeroize(skip)]
    hash: HashAlgorithm,
    bytes: Vec<u8>,
}

impl Secret {
    pub fn new(hash: HashAlgorithm, bytes: &[u8]) -> Self {
        Self {
            hash,
            bytes: bytes.to_vec(),
        }
    }

    pub fn hash(&self) -> HashAlgorithm {
        self.hash
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secret")
            .field("hash", &self.hash)
            .field("len", &self.bytes.len())
            .finish_non_exhaustive()
    }
}

/// Which traffic secret a [`TrafficSecret`] is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrafficLabel {
    ClientHandshake,
    ServerHandshake,
    ClientApplication,
    ServerApplication,
}

impl TrafficLabel {
    pub fn as_bytes(self) -> &'static [u8] {
        match self {
            TrafficLabel::ClientHandshake => b"c hs traffic",
            TrafficLabel::ServerHandshake => b"s hs traffic",
            TrafficLabel::ClientApplication => b"c ap traffic",
            TrafficLabel::ServerApplication => b"s ap traffic",
        }
    }
}

/// A per-direction traffic secret together with its derivation label, the
/// transcript hash it was derived from, and its ratchet generation.
///
/// 单方向的流量密钥，连同派生标签、派生时的握手记录哈希与更新代数。
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct TrafficSecret {
    #[zeroize(skip)]
    hash: HashAlgorithm,
    #[zeroize(skip)]
    label: TrafficLabel,
    #[zeroize(skip)]
    generation: u64,
    transcript_hash: Vec<u8>,
    bytes: Vec<u8>,
}

impl TrafficSecret {
    pub fn hash(&self) -> HashAlgorithm {
        self.hash
    }

    pub fn label(&self) -> TrafficLabel {
        self.label
    }

    /// Number of KeyUpdate ratchets applied since derivation.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn transcript_hash(&self) -> &[u8] {
        &self.transcript_hash
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl std::fmt::Debug for TrafficSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrafficSecret")
            .field("label", &self.label)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

/// HKDF-Expand-Label(secret, label, context, out_len).
///
/// ```text
/// struct {
///     uint16 length = out_len;
///     opaque label<7..255> = "tls13 " + label;
///     opaque context<0..255> = context;
/// } HkdfLabel;
/// ```
pub fn hkdf_expand_label(
    hash: HashAlgorithm,
    secret: &[u8],
    label: &[u8],
    context: &[u8],
    out_len: usize,
) -> Result<Zeroizing<Vec<u8>>> {
    if out_len > 255 * hash.output_len() || out_len > u16::MAX as usize {
        return Err(HandshakeError::InvalidLength(out_len));
    }
    let full_label_len = LABEL_PREFIX.len() + label.len();
    if full_label_len > MAX_LABEL_LEN {
        return Err(HandshakeError::InvalidLength(full_label_len));
    }
    if context.len() > 255 {
        return Err(HandshakeError::InvalidLength(context.len()));
    }

    let mut info = Zeroizing::new(Vec::with_capacity(4 + full_label_len + context.len()));
    info.extend_from_slice(&(out_len as u16).to_be_bytes());
    info.push(full_label_len as u8);
    info.extend_from_slice(LABEL_PREFIX);
    info.extend_from_slice(label);
    info.push(context.len() as u8);
    info.extend_from_slice(context);

    hash.hkdf_expand(secret, &info, out_len)
}

/// Derive-Secret(secret, label, transcript_hash): an expansion to the hash
/// length with the transcript hash as context.
pub fn derive_secret(secret: &Secret, label: &[u8], transcript_hash: &[u8]) -> Result<Secret> {
    let hash = secret.hash;
    let out = hkdf_expand_label(hash, &secret.bytes, label, transcript_hash, hash.output_len())?;
    Ok(Secret::new(hash, &out))
}

/// Early Secret = HKDF-Extract(0, PSK or 0^hash_len).
pub fn derive_early_secret(hash: HashAlgorithm, psk: Option<&[u8]>) -> Secret {
    let zeros = vec![0u8; hash.output_len()];
    let ikm = psk.unwrap_or(&zeros);
    let prk = hash.hkdf_extract(&zeros, ikm);
    Secret::new(hash, &prk)
}

/// Handshake Secret = HKDF-Extract(Derive-Secret(early, "derived", ""), shared_secret).
///
/// `shared_secret` is the (EC)DHE secret or the hybrid concatenation.
pub fn derive_handshake_secret(early_secret: &Secret, shared_secret: &[u8]) -> Result<Secret> {
    let hash = early_secret.hash;
    let salt = derive_secret(early_secret, b"derived", &hash.digest(b""))?;
    let prk = hash.hkdf_extract(&salt.bytes, shared_secret);
    Ok(Secret::new(hash, &prk))
}

/// Master Secret = HKDF-Extract(Derive-Secret(handshake, "derived", ""), 0^hash_len).
pub fn derive_master_secret(handshake_secret: &Secret) -> Result<Secret> {
    let hash = handshake_secret.hash;
    let salt = derive_secret(handshake_secret, b"derived", &hash.digest(b""))?;
    let zeros = Zeroizing::new(vec![0u8; hash.output_len()]);
    let prk = hash.hkdf_extract(&salt.bytes, &zeros);
    Ok(Secret::new(hash, &prk))
}

/// Derives one of the four traffic secrets from the handshake or master secret.
pub fn derive_traffic_secret(
    secret: &Secret,
    label: TrafficLabel,
    transcript_hash: &[u8],
) -> Result<TrafficSecret> {
    let derived = derive_secret(secret, label.as_bytes(), transcript_hash)?;
    Ok(TrafficSecret {
        hash: secret.hash,
        label,
        generation: 0,
        transcript_hash: transcript_hash.to_vec(),
        bytes: derived.bytes.clone(),
    })
}

/// Record protection key and IV for `traffic_secret`.
pub fn derive_traffic_keys(
    traffic_secret: &TrafficSecret,
    key_len: usize,
) -> Result<(Zeroizing<Vec<u8>>, [u8; 12])> {
    let hash = traffic_secret.hash;
    let key = hkdf_expand_label(hash, &traffic_secret.bytes, b"key", b"", key_len)?;
    let iv_bytes = hkdf_expand_label(hash, &traffic_secret.bytes, b"iv", b"", 12)?;
    let mut iv = [0u8; 12];
    iv.copy_from_slice(&iv_bytes);
    Ok((key, iv))
}

/// finished_key = HKDF-Expand-Label(traffic_secret, "finished", "", hash_len).
pub fn derive_finished_key(traffic_secret: &TrafficSecret) -> Result<Secret> {
    let hash = traffic_secret.hash;
    let key = hkdf_expand_label(hash, &traffic_secret.bytes, b"finished", b"", hash.output_len())?;
    Ok(Secret::new(hash, &key))
}

/// verify_data = HMAC(finished_key, transcript_hash).
pub fn compute_finished_verify_data(
    traffic_secret: &TrafficSecret,
    transcript_hash: &[u8],
) -> Result<Vec<u8>> {
    let finished_key = derive_finished_key(traffic_secret)?;
    traffic_secret.hash.hmac(&finished_key.bytes, transcript_hash)
}

/// Checks a peer's Finished in constant time.
pub fn verify_finished(
    traffic_secret: &TrafficSecret,
    transcript_hash: &[u8],
    verify_data: &[u8],
) -> Result<()> {
    let expected = Zeroizing::new(compute_finished_verify_data(traffic_secret, transcript_hash)?);
    // ct_eq is false on a length mismatch.
    if bool::from(expected.as_slice().ct_eq(verify_data)) {
        Ok(())
    } else {
        Err(HandshakeError::FinishedMismatch)
    }
}

/// application_traffic_secret_N+1 = HKDF-Expand-Label(secret_N, "traffic upd", "", hash_len).
pub fn update_traffic_secret(old: &TrafficSecret) -> Result<TrafficSecret> {
    let hash = old.hash;
    let next = hkdf_expand_label(hash, &old.bytes, b"traffic upd", b"", hash.output_len())?;
    Ok(TrafficSecret {
        hash,
        label: old.label,
        generation: old.generation + 1,
        transcript_hash: old.transcript_hash.clone(),
        bytes: next.to_vec(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyScheduleStage {
    Early,
    Handshake,
    Master,
}

/// Stateful wrapper over the pure derivations.
///
/// Holds exactly one secret at a time; advancing to the next stage drops
/// (and zeroizes) the previous one.
///
/// 纯派生函数之上的有状态封装。任一时刻只持有一个密钥；
/// 进入下一阶段时会丢弃（并清零）前一个密钥。
#[derive(Debug)]
pub struct KeySchedule {
    stage: KeyScheduleStage,
    current: Secret,
}

impl KeySchedule {
    /// Starts a PSK-less schedule.
    pub fn new(hash: HashAlgorithm) -> Self {
        Self {
            stage: KeyScheduleStage::Early,
            current: derive_early_secret(hash, None),
        }
    }

    pub fn stage(&self) -> KeyScheduleStage {
        self.stage
    }

    pub fn hash(&self) -> HashAlgorithm {
        self.current.hash
    }

    pub fn current_secret(&self) -> &Secret {
        &self.current
    }

    /// Mixes in the key-exchange secret: Early → Handshake.
    pub fn input_shared_secret(&mut self, shared_secret: &[u8]) -> Result<()> {
        if self.stage != KeyScheduleStage::Early {
            return Err(HandshakeError::InvalidState);
        }
        self.current = derive_handshake_secret(&self.current, shared_secret)?;
        self.stage = KeyScheduleStage::Handshake;
        Ok(())
    }

    /// (client_handshake_traffic_secret, server_handshake_traffic_secret).
    pub fn handshake_traffic_secrets(
        &self,
        transcript_hash: &[u8],
    ) -> Result<(TrafficSecret, TrafficSecret)> {
        if self.stage != KeyScheduleStage::Handshake {
            return Err(HandshakeError::InvalidState);
        }
        Ok((
            derive_traffic_secret(&self.current, TrafficLabel::ClientHandshake, transcript_hash)?,
            derive_traffic_secret(&self.current, TrafficLabel::ServerHandshake, transcript_hash)?,
        ))
    }

    /// Handshake → Master.
    pub fn advance_to_master(&mut self) -> Result<()> {
        if self.stage != KeyScheduleStage::Handshake {
            return Err(HandshakeError::InvalidState);
        }
        self.current = derive_master_secret(&self.current)?;
        self.stage = KeyScheduleStage::Master;
        Ok(())
    }

    /// (client_application_traffic_secret_0, server_application_traffic_secret_0).
    pub fn application_traffic_secrets(
        &self,
        transcript_hash: &[u8],
    ) -> Result<(TrafficSecret, TrafficSecret)> {
        if self.stage != KeyScheduleStage::Master {
            return Err(HandshakeError::InvalidState);
        }
        Ok((
            derive_traffic_secret(&self.current, TrafficLabel::ClientApplication, transcript_hash)?,
            derive_traffic_secret(&self.current, TrafficLabel::ServerApplication, transcript_hash)?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex(s: &str) -> Vec<u8> {
        (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
            .collect()
    }

    // RFC 8448 §3, "Simple 1-RTT Handshake", TLS_AES_128_GCM_SHA256.
    const ECDHE: &str = "8bd4054fb55b9d63fdfbacf9f04b9f0d35e6d63f537563efd46272900f89492d";
    const HASH_CH_SH: &str = "860c06edc07858ee8e78f0e7428c58edd6b43f2ca3e6e95f02ed063cf0e1cad8";
    const HASH_CH_SF: &str = "9608102a0f1ccc6db6250b7b7e417b1a000eaada3daae4777a7686c9ff83df13";

    #[test]
    fn rfc8448_secret_tree() {
        let early = derive_early_secret(HashAlgorithm::Sha256, None);
        assert_eq!(
            early.as_bytes(),
            hex("33ad0a1c607ec03b09e6cd9893680ce210adf300aa1f2660e1b22e10f170f92a")
        );

        let handshake = derive_handshake_secret(&early, &hex(ECDHE)).unwrap();
        assert_eq!(
            handshake.as_bytes(),
            hex("1dc826e93606aa6fdc0aadc12f741b01046aa6b99f691ed221a9f0ca043fbeac")
        );

        let c_hs = derive_traffic_secret(&handshake, TrafficLabel::ClientHandshake, &hex(HASH_CH_SH))
            .unwrap();
        let s_hs = derive_traffic_secret(&handshake, TrafficLabel::ServerHandshake, &hex(HASH_CH_SH))
            .unwrap();
        assert_eq!(
            c_hs.as_bytes(),
            hex("b3eddb126e067f35a780b3abf45e2d8f3b1a950738f52e9600746a0e27a55a21")
        );
        assert_eq!(
            s_hs.as_bytes(),
            hex("b67b7d690cc16c4e75e54213cb2d37b4e9c912bcded9105d42befd59d391ad38")
        );

        let master = derive_master_secret(&handshake).unwrap();
        assert_eq!(
            master.as_bytes(),
            hex("18df06843d13a08bf2a449844c5f8a478001bc4d4c627984d5a41da8d0402919")
        );

        let c_ap = derive_traffic_secret(&master, TrafficLabel::ClientApplication, &hex(HASH_CH_SF))
            .unwrap();
        let s_ap = derive_traffic_secret(&master, TrafficLabel::ServerApplication, &hex(HASH_CH_SF))
            .unwrap();
        assert_eq!(
            c_ap.as_bytes(),
            hex("9e40646ce79a7f9dc05af8889bce6552875afa0b06df0087f792ebb7c17504a5")
        );
        assert_eq!(
            s_ap.as_bytes(),
            hex("a11af9f05531f856ad47116b45a950328204b4f44bfb6b3a4b4f1f3fcb631643")
        );
    }

    #[test]
    fn rfc8448_traffic_keys() {
        let early = derive_early_secret(HashAlgorithm::Sha256, None);
        let handshake = derive_handshake_secret(&early, &hex(ECDHE)).unwrap();
        let s_hs = derive_traffic_secret(&handshake, TrafficLabel::ServerHandshake, &hex(HASH_CH_SH))
            .unwrap();
        let (key, iv) = derive_traffic_keys(&s_hs, 16).unwrap();
        assert_eq!(*key, hex("3fce516009c21727d0f2e4e86ee403bc"));
        assert_eq!(iv.to_vec(), hex("5d313eb2671276ee13000b30"));

        let c_hs = derive_traffic_secret(&handshake, TrafficLabel::ClientHandshake, &hex(HASH_CH_SH))
            .unwrap();
        let (key, iv) = derive_traffic_keys(&c_hs, 16).unwrap();
        assert_eq!(*key, hex("dbfaa693d1762c5b666af5d950258d01"));
        assert_eq!(iv.to_vec(), hex("5bd3c71b836e0b76bb73265f"));

        let master = derive_master_secret(&handshake).unwrap();
        let s_ap = derive_traffic_secret(&master, TrafficLabel::ServerApplication, &hex(HASH_CH_SF))
            .unwrap();
        let (key, iv) = derive_traffic_keys(&s_ap, 16).unwrap();
        assert_eq!(*key, hex("9f02283b6c9c07efc26bb9f2ac92e356"));
        assert_eq!(iv.to_vec(), hex("cf782b88dd83549aadf1e984"));

        let c_ap = derive_traffic_secret(&master, TrafficLabel::ClientApplication, &hex(HASH_CH_SF))
            .unwrap();
        let (key, iv) = derive_traffic_keys(&c_ap, 16).unwrap();
        assert_eq!(*key, hex("17422dda596ed5d9acd890e3c63f5051"));
        assert_eq!(iv.to_vec(), hex("5b78923dee08579033e523d9"));
    }

    #[test]
    fn stage_wrapper_matches_free_functions() {
        let mut ks = KeySchedule::new(HashAlgorithm::Sha256);
        assert!(ks.handshake_traffic_secrets(&hex(HASH_CH_SH)).is_err());
        assert!(ks.advance_to_master().is_err());

        ks.input_shared_secret(&hex(ECDHE)).unwrap();
        assert!(ks.input_shared_secret(&hex(ECDHE)).is_err());
        let (_, s_hs) = ks.handshake_traffic_secrets(&hex(HASH_CH_SH)).unwrap();
        assert_eq!(s_hs.transcript_hash(), hex(HASH_CH_SH).as_slice());

        assert!(ks.application_traffic_secrets(&hex(HASH_CH_SF)).is_err());
        ks.advance_to_master().unwrap();
        assert_eq!(ks.stage(), KeyScheduleStage::Master);
        let (c_ap, _) = ks.application_traffic_secrets(&hex(HASH_CH_SF)).unwrap();
        assert_eq!(
            c_ap.as_bytes(),
            hex("9e40646ce79a7f9dc05af8889bce6552875afa0b06df0087f792ebb7c17504a5")
        );
    }

    #[test]
    fn finished_round_trip_and_mismatch() {
        let early = derive_early_secret(HashAlgorithm::Sha256, None);
        let handshake = derive_handshake_secret(&early, &hex(ECDHE)).unwrap();
        let s_hs = derive_traffic_secret(&handshake, TrafficLabel::ServerHandshake, &hex(HASH_CH_SH))
            .unwrap();
        let transcript = HashAlgorithm::Sha256.digest(b"transcript");
        let mut verify_data = compute_finished_verify_data(&s_hs, &transcript).unwrap();
        assert_eq!(verify_data.len(), 32);
        verify_finished(&s_hs, &transcript, &verify_data).unwrap();

        // Truncated and extended forms must fail too.
        let mut extended = verify_data.clone();
        extended.push(0);
        for bad in [verify_data[..31].to_vec(), extended, Vec::new()] {
            assert!(matches!(
                verify_finished(&s_hs, &transcript, &bad),
                Err(HandshakeError::FinishedMismatch)
            ));
        }

        verify_data[0] ^= 1;
        assert!(matches!(
            verify_finished(&s_hs, &transcript, &verify_data),
            Err(HandshakeError::FinishedMismatch)
        ));
    }

    #[test]
    fn traffic_update_ratchets_forward() {
        let secret = TrafficSecret {
            hash: HashAlgorithm::Sha384,
            label: TrafficLabel::ServerApplication,
            generation: 0,
            transcript_hash: vec![],
            bytes: vec![0x42; 48],
        };
        let next = update_traffic_secret(&secret).unwrap();
        assert_eq!(next.generation(), 1);
        assert_eq!(next.as_bytes().len(), 48);
        assert_ne!(next.as_bytes(), secret.as_bytes());
        let again = update_traffic_secret(&secret).unwrap();
        assert_eq!(again.as_bytes(), next.as_bytes());
    }

    #[test]
    fn expand_label_rejects_oversized_requests() {
        let secret = [0u8; 32];
        assert!(hkdf_expand_label(HashAlgorithm::Sha256, &secret, b"key", b"", 255 * 32 + 1).is_err());
        assert!(hkdf_expand_label(HashAlgorithm::Sha256, &secret, &[b'a'; 250], b"", 16).is_err());
        assert!(hkdf_expand_label(HashAlgorithm::Sha256, &secret, b"key", &[0; 256], 16).is_err());
    }
}
