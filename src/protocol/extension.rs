//! Hello and EncryptedExtensions extensions.
//!
//! The meaning of an extension body depends on the message carrying it
//! (`key_share` is a list in ClientHello and a single entry in ServerHello),
//! so parsing always takes an [`ExtensionContext`].
//!
//! 握手扩展。扩展内容的含义取决于承载它的消息，因此解析时总是需要 [`ExtensionContext`]。

use crate::crypto::suite::{NamedGroup, SignatureScheme};
use crate::error::{HandshakeError, Result};
use crate::protocol::codec::{Reader, put_u16, with_u8_length, with_u16_length};

pub const SERVER_NAME: u16 = 0;
pub const SUPPORTED_GROUPS: u16 = 10;
pub const SIGNATURE_ALGORITHMS: u16 = 13;
pub const ALPN: u16 = 16;
pub const SUPPORTED_VERSIONS: u16 = 43;
pub const KEY_SHARE: u16 = 51;

pub const TLS13: u16 = 0x0304;

/// The message an extension block belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtensionContext {
    ClientHello,
    ServerHello,
    /// Extensions of a HelloRetryRequest are kept opaque; the request itself
    /// is refused.
    HelloRetryRequest,
    EncryptedExtensions,
    CertificateRequest,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyShareEntry {
    pub group: NamedGroup,
    pub key_exchange: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extension {
    /// SNI host name offered by the client.
    ServerName(String),
    /// Empty `server_name` in EncryptedExtensions: the server used the SNI.
    ServerNameAck,
    SupportedGroups(Vec<NamedGroup>),
    SignatureAlgorithms(Vec<SignatureScheme>),
    /// ALPN protocol list; exactly one entry when sent by the server.
    Alpn(Vec<Vec<u8>>),
    SupportedVersions(Vec<u16>),
    SelectedVersion(u16),
    KeyShares(Vec<KeyShareEntry>),
    KeyShare(KeyShareEntry),
    Unknown { typ: u16, data: Vec<u8> },
}

impl Extension {
    pub fn typ(&self) -> u16 {
        match self {
            Extension::ServerName(_) | Extension::ServerNameAck => SERVER_NAME,
            Extension::SupportedGroups(_) => SUPPORTED_GROUPS,
            Extension::SignatureAlgorithms(_) => SIGNATURE_ALGORITHMS,
            Extension::Alpn(_) => ALPN,
            Extension::SupportedVersions(_) | Extension::SelectedVersion(_) => SUPPORTED_VERSIONS,
            Extension::KeyShares(_) | Extension::KeyShare(_) => KEY_SHARE,
            Extension::Unknown { typ, .. } => *typ,
        }
    }

    fn encode(&self, out: &mut Vec<u8>) {
        put_u16(out, self.typ());
        with_u16_length(out, |out| match self {
            Extension::ServerName(name) => with_u16_length(out, |out| {
                out.push(0);
                with_u16_length(out, |out| out.extend_from_slice(name.as_bytes()));
            }),
            Extension::ServerNameAck => {}
            Extension::SupportedGroups(groups) => with_u16_length(out, |out| {
                for group in groups {
                    put_u16(out, group.to_u16());
                }
            }),
            Extension::SignatureAlgorithms(schemes) => with_u16_length(out, |out| {
                for scheme in schemes {
                    put_u16(out, scheme.to_u16());
                }
            }),
            Extension::Alpn(protocols) => with_u16_length(out, |out| {
                for protocol in protocols {
                    with_u8_length(out, |out| out.extend_from_slice(protocol));
                }
            }),
            Extension::SupportedVersions(versions) => with_u8_length(out, |out| {
                for version in versions {
                    put_u16(out, *version);
                }
            }),
            Extension::SelectedVersion(version) => put_u16(out, *version),
            Extension::KeyShares(entries) => with_u16_length(out, |out| {
                for entry in entries {
                    encode_key_share(out, entry);
                }
            }),
            Extension::KeyShare(entry) => encode_key_share(out, entry),
            Extension::Unknown { data, .. } => out.extend_from_slice(data),
        });
    }

    fn decode(typ: u16, data: &[u8], context: ExtensionContext) -> Result<Self> {
        use ExtensionContext as Ctx;
        let mut r = Reader::new(data);
        let extension = match (typ, context) {
            (_, Ctx::HelloRetryRequest) => {
                return Ok(Extension::Unknown {
                    typ,
                    data: data.to_vec(),
                });
            }
            (SERVER_NAME, Ctx::ClientHello) => {
                let mut list = r.sub_u16("server_name list")?;
                let mut host = None;
                while !list.is_empty() {
                    let name_type = list.u8("server_name type")?;
                    let name = list.vec_u16("server_name")?;
                    if name_type == 0 && host.is_none() {
                        host = Some(name);
                    }
                }
                let host = host.ok_or(HandshakeError::Decode("server_name without host_name"))?;
                if host.is_empty() || !host.is_ascii() {
                    return Err(HandshakeError::Decode("server_name is not an ASCII host name"));
                }
                let host = String::from_utf8(host.to_vec())
                    .map_err(|_| HandshakeError::Decode("server_name"))?;
                Extension::ServerName(host)
            }
            (SERVER_NAME, Ctx::EncryptedExtensions) => Extension::ServerNameAck,
            (SUPPORTED_GROUPS, Ctx::ClientHello | Ctx::EncryptedExtensions) => {
                let mut list = r.sub_u16("supported_groups")?;
                let mut groups = Vec::new();
                while !list.is_empty() {
                    groups.push(NamedGroup::from_u16(list.u16("supported_groups")?));
                }
                Extension::SupportedGroups(groups)
            }
            (SIGNATURE_ALGORITHMS, Ctx::ClientHello | Ctx::CertificateRequest) => {
                let mut list = r.sub_u16("signature_algorithms")?;
                let mut schemes = Vec::new();
                while !list.is_empty() {
                    schemes.push(SignatureScheme::from_u16(list.u16("signature_algorithms")?));
                }
                if schemes.is_empty() {
                    return Err(HandshakeError::Decode("empty signature_algorithms"));
                }
                Extension::SignatureAlgorithms(schemes)
            }
            (ALPN, Ctx::ClientHello | Ctx::EncryptedExtensions) => {
                let mut list = r.sub_u16("alpn list")?;
                let mut protocols = Vec::new();
                while !list.is_empty() {
                    let protocol = list.vec_u8("alpn protocol")?;
                    if protocol.is_empty() {
                        return Err(HandshakeError::Decode("empty alpn protocol"));
                    }
                    protocols.push(protocol.to_vec());
                }
                if protocols.is_empty() {
                    return Err(HandshakeError::Decode("empty alpn list"));
                }
                if context == Ctx::EncryptedExtensions && protocols.len() != 1 {
                    return Err(HandshakeError::Decode("server selected more than one protocol"));
                }
                Extension::Alpn(protocols)
            }
            (SUPPORTED_VERSIONS, Ctx::ClientHello) => {
                let mut list = Reader::new(r.vec_u8("supported_versions")?);
                let mut versions = Vec::new();
                while !list.is_empty() {
                    versions.push(list.u16("supported_versions")?);
                }
                Extension::SupportedVersions(versions)
            }
            (SUPPORTED_VERSIONS, Ctx::ServerHello) => {
                Extension::SelectedVersion(r.u16("supported_versions")?)
            }
            (KEY_SHARE, Ctx::ClientHello) => {
                let mut list = r.sub_u16("key_share list")?;
                let mut entries: Vec<KeyShareEntry> = Vec::new();
                while !list.is_empty() {
                    let entry = decode_key_share(&mut list)?;
                    if entries.iter().any(|e| e.group == entry.group) {
                        return Err(HandshakeError::IllegalParameter("duplicate key share group"));
                    }
                    entries.push(entry);
                }
                Extension::KeyShares(entries)
            }
            (KEY_SHARE, Ctx::ServerHello) => Extension::KeyShare(decode_key_share(&mut r)?),
            _ => {
                return Ok(Extension::Unknown {
                    typ,
                    data: data.to_vec(),
                });
            }
        };
        r.finish("trailing bytes in extension")?;
        Ok(extension)
    }
}

fn encode_key_share(out: &mut Vec<u8>, entry: &KeyShareEntry) {
    put_u16(out, entry.group.to_u16());
    with_u16_length(out, |out| out.extend_from_slice(&entry.key_exchange));
}

fn decode_key_share(r: &mut Reader<'_>) -> Result<KeyShareEntry> {
    let group = NamedGroup::from_u16(r.u16("key_share group")?);
    let key_exchange = r.vec_u16("key_share key_exchange")?;
    if key_exchange.is_empty() {
        return Err(HandshakeError::Decode("empty key_exchange"));
    }
    Ok(KeyShareEntry {
        group,
        key_exchange: key_exchange.to_vec(),
    })
}

/// Writes a `u16`-length-prefixed extension block.
pub fn encode_extensions(out: &mut Vec<u8>, extensions: &[Extension]) {
    with_u16_length(out, |out| {
        for extension in extensions {
            extension.encode(out);
        }
    });
}

/// Reads a `u16`-length-prefixed extension block.
///
/// A repeated extension type is an `illegal_parameter`.
///
/// 读取带 `u16` 长度前缀的扩展块。重复的扩展类型视为 `illegal_parameter`。
pub fn decode_extensions(r: &mut Reader<'_>, context: ExtensionContext) -> Result<Vec<Extension>> {
    let mut block = r.sub_u16("extensions")?;
    let mut seen: Vec<u16> = Vec::new();
    let mut extensions = Vec::new();
    while !block.is_empty() {
        let typ = block.u16("extension type")?;
        let data = block.vec_u16("extension data")?;
        if seen.contains(&typ) {
            return Err(HandshakeError::IllegalParameter("duplicate extension"));
        }
        seen.push(typ);
        extensions.push(Extension::decode(typ, data, context)?);
    }
    Ok(extensions)
}
