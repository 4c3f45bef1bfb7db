//! Ephemeral key exchange for the supported groups.
//!
//! `X25519` is a plain Diffie-Hellman. `X25519MlKem768` combines an ML-KEM-768
//! encapsulation with an X25519 exchange:
//!
//! ```text
//! client share  = ML-KEM-768 public key (1184) || X25519 public key (32)
//! server share  = ML-KEM-768 ciphertext (1088) || X25519 public key (32)
//! shared secret = ML-KEM shared secret (32)    || X25519 shared secret (32)
//! ```
//!
//! 支持的密钥交换组的临时密钥交换。

use crate::crypto::suite::NamedGroup;
use crate::error::{HandshakeError, Result};
use pqcrypto_mlkem::mlkem768;
use pqcrypto_traits::kem::{Ciphertext as _, PublicKey as _, SecretKey as _, SharedSecret as _};
use rand::rngs::OsRng;
use std::fmt;
use x25519_dalek::{EphemeralSecret, PublicKey};
use zeroize::Zeroizing;

pub const X25519_KEY_LEN: usize = 32;
pub const MLKEM768_PUBLIC_KEY_LEN: usize = 1184;
pub const MLKEM768_CIPHERTEXT_LEN: usize = 1088;

enum PrivateShare {
    X25519(EphemeralSecret),
    Hybrid {
        mlkem_secret: Zeroizing<Vec<u8>>,
        x25519: EphemeralSecret,
    },
}

/// One offered key share: the public half goes into the ClientHello, the
/// private half is consumed by [`KeyShare::complete`].
///
/// 一个已提供的密钥共享：公开部分写入 ClientHello，私有部分由
/// [`KeyShare::complete`] 消耗。
pub struct KeyShare {
    group: NamedGroup,
    public: Vec<u8>,
    private: PrivateShare,
}

impl KeyShare {
    /// Generates a fresh key pair for `group`.
    pub fn generate(group: NamedGroup) -> Result<Self> {
        match group {
            NamedGroup::X25519 => {
                let secret = EphemeralSecret::random_from_rng(OsRng);
                let public = PublicKey::from(&secret).as_bytes().to_vec();
                Ok(Self {
                    group,
                    public,
                    private: PrivateShare::X25519(secret),
                })
            }
            NamedGroup::X25519MlKem768 => {
                let (mlkem_public, mlkem_secret) = mlkem768::keypair();
                let x25519 = EphemeralSecret::random_from_rng(OsRng);
                let mut public = Vec::with_capacity(MLKEM768_PUBLIC_KEY_LEN + X25519_KEY_LEN);
                public.extend_from_slice(mlkem_public.as_bytes());
                public.extend_from_slice(PublicKey::from(&x25519).as_bytes());
                Ok(Self {
                    group,
                    public,
                    private: PrivateShare::Hybrid {
                        mlkem_secret: Zeroizing::new(mlkem_secret.as_bytes().to_vec()),
                        x25519,
                    },
                })
            }
            NamedGroup::Unknown(_) => Err(HandshakeError::Config("unsupported key exchange group")),
        }
    }

    pub fn group(&self) -> NamedGroup {
        self.group
    }

    pub fn public_key(&self) -> &[u8] {
        &self.public
    }

    /// Client side: combines our private share with the server's share.
    ///
    /// Consumes `self` so the private scalars are gone once the secret exists.
    ///
    /// 客户端：将本方私有共享与服务器的共享结合。消耗 `self`，
    /// 共享密钥产生后私有标量即被丢弃。
    pub fn complete(self, server_share: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        match self.private {
            PrivateShare::X25519(secret) => x25519_agree(secret, server_share),
            PrivateShare::Hybrid {
                mlkem_secret,
                x25519,
            } => {
                if server_share.len() != MLKEM768_CIPHERTEXT_LEN + X25519_KEY_LEN {
                    return Err(HandshakeError::IllegalParameter("hybrid key share length"));
                }
                let (ciphertext, x25519_share) = server_share.split_at(MLKEM768_CIPHERTEXT_LEN);
                let ciphertext = mlkem768::Ciphertext::from_bytes(ciphertext)
                    .map_err(|_| HandshakeError::IllegalParameter("ML-KEM ciphertext"))?;
                let secret_key = mlkem768::SecretKey::from_bytes(&mlkem_secret)
                    .map_err(|_| HandshakeError::Crypto("ML-KEM secret key"))?;
                let kem_secret = mlkem768::decapsulate(&ciphertext, &secret_key);
                let dh_secret = x25519_agree(x25519, x25519_share)?;

                let mut shared = Zeroizing::new(Vec::with_capacity(64));
                shared.extend_from_slice(kem_secret.as_bytes());
                shared.extend_from_slice(&dh_secret);
                Ok(shared)
            }
        }
    }

    /// Server side: answers a client share, returning our share for the
    /// ServerHello and the shared secret. No private material outlives the call.
    ///
    /// 服务器端：应答客户端共享，返回写入 ServerHello 的共享与共享密钥。
    /// 私有材料不会在调用结束后保留。
    pub fn respond(group: NamedGroup, client_share: &[u8]) -> Result<(Vec<u8>, Zeroizing<Vec<u8>>)> {
        match group {
            NamedGroup::X25519 => {
                let secret = EphemeralSecret::random_from_rng(OsRng);
                let public = PublicKey::from(&secret).as_bytes().to_vec();
                let shared = x25519_agree(secret, client_share)?;
                Ok((public, shared))
            }
            NamedGroup::X25519MlKem768 => {
                if client_share.len() != MLKEM768_PUBLIC_KEY_LEN + X25519_KEY_LEN {
                    return Err(HandshakeError::IllegalParameter("hybrid key share length"));
                }
                let (mlkem_public, x25519_share) = client_share.split_at(MLKEM768_PUBLIC_KEY_LEN);
                let mlkem_public = mlkem768::PublicKey::from_bytes(mlkem_public)
                    .map_err(|_| HandshakeError::IllegalParameter("ML-KEM public key"))?;
                let (kem_secret, ciphertext) = mlkem768::encapsulate(&mlkem_public);

                let secret = EphemeralSecret::random_from_rng(OsRng);
                let x25519_public = PublicKey::from(&secret);
                let dh_secret = x25519_agree(secret, x25519_share)?;

                let mut public = Vec::with_capacity(MLKEM768_CIPHERTEXT_LEN + X25519_KEY_LEN);
                public.extend_from_slice(ciphertext.as_bytes());
                public.extend_from_slice(x25519_public.as_bytes());

                let mut shared = Zeroizing::new(Vec::with_capacity(64));
                shared.extend_from_slice(kem_secret.as_bytes());
                shared.extend_from_slice(&dh_secret);
                Ok((public, shared))
            }
            NamedGroup::Unknown(_) => Err(HandshakeError::HandshakeFailure("unsupported group")),
        }
    }
}

fn x25519_agree(secret: EphemeralSecret, peer: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    let peer: [u8; X25519_KEY_LEN] = peer
        .try_into()
        .map_err(|_| HandshakeError::IllegalParameter("X25519 key share length"))?;
    let shared = secret.diffie_hellman(&PublicKey::from(peer));
    // An all-zero output means the peer sent a small-order point.
    if !shared.was_contributory() {
        return Err(HandshakeError::IllegalParameter("non-contributory X25519 share"));
    }
    Ok(Zeroizing::new(shared.as_bytes().to_vec()))
}

impl fmt::Debug for KeyShare {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyShare")
            .field("group", &self.group)
            .field("public_len", &self.public.len())
            .finish_non_exhaustive()
    }
}
