//! An encoder for the NTLM AUTHENTICATE message.
//!
//! The AUTHENTICATE message is the third message in the NTLMSSP handshake; it carries the
//! challenge responses and identity fields from the client to the server, e.g. inside an
//! SMB2 session setup exchange. This crate produces the byte-exact wire representation of
//! that message; computing the challenge responses, deriving keys and talking to the
//! network are the business of the surrounding authentication session.
//!
//! Sample usage:
//! ```
//! use ntlmauth::{AuthenticateMessage, Flags, NtlmConfig};
//!
//! fn encode_authenticate(
//!     lm_response: &[u8],
//!     nt_response: &[u8],
//!     session_key: &[u8],
//! ) -> Result<Vec<u8>, ntlmauth::BuildError> {
//!     let config = NtlmConfig {
//!         workstation_name: "WORKSTATION".to_owned(),
//!         integrity: true,
//!         ..NtlmConfig::default()
//!     };
//!     let flags
//!         = Flags::NEGOTIATE_UNICODE
//!         | Flags::NEGOTIATE_NTLM
//!         | Flags::NEGOTIATE_KEY_EXCHANGE
//!         ;
//!     let message = AuthenticateMessage::new(
//!         Some(lm_response),
//!         Some(nt_response),
//!         Some("CONTOSO"),
//!         Some("jdoe"),
//!         Some(config.workstation_name.as_str()),
//!         Some(session_key),
//!         flags,
//!         &config,
//!     )?;
//!
//!     // first pass: the MIC field is a zero placeholder; the session layer hashes
//!     // these bytes together with the earlier handshake messages
//!     let unsigned_bytes = message.to_bytes();
//!     let mic = compute_mic_elsewhere(&unsigned_bytes);
//!
//!     // second pass: same message with the MIC filled in
//!     let message = message.with_mic(mic)?;
//!     Ok(message.to_bytes())
//! }
//!
//! # fn compute_mic_elsewhere(_bytes: &[u8]) -> [u8; 16] { [0; 16] }
//! # let out = encode_authenticate(&[0; 24], &[0; 24], &[0; 16]).unwrap();
//! # assert_eq!(&out[0..8], b"NTLMSSP\0");
//! ```


pub mod buffer;
pub mod secbuf;


use std::fmt;

use bitflags::bitflags;

pub use crate::buffer::Buffer;
pub use crate::secbuf::{FieldLayout, SecurityBuffer};


/// The magic value at the start of every NTLMSSP data packet.
const NTLMSSP_MAGIC: [u8; 8] = *b"NTLMSSP\0";

/// The message type number of the AUTHENTICATE message.
const AUTHENTICATE_MESSAGE_TYPE: u32 = 0x0000_0003;

/// The size of the AUTHENTICATE message's fixed header: magic, message type, six security
/// buffers and the negotiate flags.
const BASE_MESSAGE_SIZE: u32 = 64;

/// The size of the message integrity code field.
const MIC_SIZE: usize = 16;

/// The size of the version field.
const VERSION_SIZE: usize = 8;


bitflags! {
    /// NTLM operation flags.
    #[derive(Clone, Copy, Debug, Default, Hash, Eq, Ord, PartialEq, PartialOrd)]
    pub struct Flags: u32 {
        const NEGOTIATE_UNICODE = 0x0000_0001;
        const NEGOTIATE_OEM = 0x0000_0002;
        const REQUEST_TARGET = 0x0000_0004;
        const UNKNOWN_8 = 0x0000_0008;
        const NEGOTIATE_SIGN = 0x0000_0010;
        const NEGOTIATE_SEAL = 0x0000_0020;
        const NEGOTIATE_DATAGRAM = 0x0000_0040;
        const NEGOTIATE_LANMAN_KEY = 0x0000_0080;
        const NEGOTIATE_NETWARE = 0x0000_0100;
        const NEGOTIATE_NTLM = 0x0000_0200;
        const UNKNOWN_400 = 0x0000_0400;
        const NEGOTIATE_ANONYMOUS = 0x0000_0800;
        const NEGOTIATE_DOMAIN_SUPPLIED = 0x0000_1000;
        const NEGOTIATE_WORKSTATION_SUPPLIED = 0x0000_2000;
        const NEGOTIATE_LOCAL_CALL = 0x0000_4000;
        const NEGOTIATE_ALWAYS_SIGN = 0x0000_8000;
        const TARGET_TYPE_DOMAIN = 0x0001_0000;
        const TARGET_TYPE_SERVER = 0x0002_0000;
        const TARGET_TYPE_SHARE = 0x0004_0000;
        const NEGOTIATE_NTLM2_KEY = 0x0008_0000;
        const REQUEST_INIT_RESPONSE = 0x0010_0000;
        const REQUEST_ACCEPT_RESPONSE = 0x0020_0000;
        const REQUEST_NON_NT_SESSION_KEY = 0x0040_0000;
        const NEGOTIATE_TARGET_INFO = 0x0080_0000;
        const UNKNOWN_1000000 = 0x0100_0000;
        const NEGOTIATE_VERSION = 0x0200_0000;
        const UNKNOWN_4000000 = 0x0400_0000;
        const UNKNOWN_8000000 = 0x0800_0000;
        const UNKNOWN_10000000 = 0x1000_0000;
        const NEGOTIATE_128BIT = 0x2000_0000;
        const NEGOTIATE_KEY_EXCHANGE = 0x4000_0000;
        const NEGOTIATE_56BIT = 0x8000_0000;
    }
}


/// An error that may occur while constructing an AUTHENTICATE message.
///
/// Encoding itself cannot fail; everything that would make encoding impossible is
/// rejected here instead.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum BuildError {
    /// A required payload field was not supplied.
    ///
    /// Callers holding no data for a field pass an empty blob or string, not `None`.
    MissingField { field: &'static str },

    /// A payload field is too long for the 16-bit length of its security buffer.
    FieldTooLong { field: &'static str, length: usize },

    /// A message integrity code has already been set on this message.
    MicAlreadySet,
}
impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingField { field }
                => write!(f, "required field {:?} is missing (pass an empty value instead)", field),
            Self::FieldTooLong { field, length }
                => write!(f, "field {:?} is {} bytes long, more than a security buffer can describe", field, length),
            Self::MicAlreadySet
                => write!(f, "the message integrity code has already been set"),
        }
    }
}
impl std::error::Error for BuildError {
}


/// A structure representing the version of an operating system as well as the NTLM
/// revision used.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct OsVersion {
    pub major_version: u8,
    pub minor_version: u8,
    pub build_number: u16,
    pub ntlm_revision: u8,
}
impl OsVersion {
    /// Serializes the OS version structure into bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Buffer::with_capacity(8);
        buf.put_u8(self.major_version);
        buf.put_u8(self.minor_version);
        buf.put_u16(self.build_number);
        buf.put_reserved(3);
        buf.put_u8(self.ntlm_revision);
        buf.into_bytes()
    }
}


/// Configuration supplied by the surrounding authentication session.
///
/// `os_version` is currently not consulted by the encoder: the version block written
/// into the AUTHENTICATE message is a protocol-fixed constant (see
/// [`AuthenticateMessage::to_bytes`]).
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct NtlmConfig {
    /// The NT hostname of the client.
    pub workstation_name: String,

    /// Whether a message integrity code field is reserved in the AUTHENTICATE message.
    pub integrity: bool,

    /// Whether the zeroed version field is left out when no version was negotiated.
    ///
    /// Some servers reject messages carrying the version field.
    pub omit_version: bool,

    /// Version information about the client's operating system.
    pub os_version: OsVersion,
}


/// The contents of an NTLM AUTHENTICATE message.
///
/// The payload fields are stored in their wire encoding (strings as UTF-16 in
/// little-endian byte order) and emitted in the protocol-mandated order: LM response,
/// NT response, domain name, user name, workstation, session key. Fields without data
/// are kept as empty blobs; their security buffers are emitted all the same, with a
/// zero length and the running offset of the moment.
///
/// The message starts out unsigned. Once the surrounding session has computed the keyed
/// hash over the handshake, [`AuthenticateMessage::with_mic`] turns it into its signed
/// counterpart; encoding works in both states.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct AuthenticateMessage {
    lm_response: Vec<u8>,
    nt_response: Vec<u8>,
    domain_name: Vec<u8>,
    user_name: Vec<u8>,
    workstation: Vec<u8>,
    session_key: Vec<u8>,
    flags: Flags,
    mic: Option<[u8; MIC_SIZE]>,
    integrity_enabled: bool,
    omit_version: bool,
}

impl AuthenticateMessage {
    /// Constructs an AUTHENTICATE message from its payload fields.
    ///
    /// `integrity` and `omit_version` are taken from `config`; its version selector is
    /// ignored. Every field is required: callers normalize data they do not have to an
    /// empty blob or string before construction, a `None` is a
    /// [`BuildError::MissingField`]. Fields longer than a security buffer can describe
    /// are a [`BuildError::FieldTooLong`].
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        lm_response: Option<&[u8]>,
        nt_response: Option<&[u8]>,
        domain_name: Option<&str>,
        user_name: Option<&str>,
        workstation: Option<&str>,
        session_key: Option<&[u8]>,
        flags: Flags,
        config: &NtlmConfig,
    ) -> Result<Self, BuildError> {
        let lm_response = required_blob("lm_response", lm_response)?;
        let nt_response = required_blob("nt_response", nt_response)?;
        let domain_name = required_string("domain_name", domain_name)?;
        let user_name = required_string("user_name", user_name)?;
        let workstation = required_string("workstation", workstation)?;
        let session_key = required_blob("session_key", session_key)?;

        Ok(Self {
            lm_response,
            nt_response,
            domain_name,
            user_name,
            workstation,
            session_key,
            flags,
            mic: None,
            integrity_enabled: config.integrity,
            omit_version: config.omit_version,
        })
    }

    /// Returns the negotiate flags carried by this message.
    pub fn flags(&self) -> Flags {
        self.flags
    }

    /// Returns the message integrity code, if one has been set.
    pub fn mic(&self) -> Option<&[u8; MIC_SIZE]> {
        self.mic.as_ref()
    }

    /// Transitions the message from unsigned to signed by filling in the message
    /// integrity code.
    ///
    /// The code can be set exactly once; a second attempt is a
    /// [`BuildError::MicAlreadySet`]. There is no in-place patching: after the
    /// transition, callers re-encode with [`AuthenticateMessage::to_bytes`] to obtain
    /// the final bytes.
    pub fn with_mic(self, mic: [u8; MIC_SIZE]) -> Result<Self, BuildError> {
        if self.mic.is_some() {
            return Err(BuildError::MicAlreadySet);
        }
        Ok(Self {
            mic: Some(mic),
            ..self
        })
    }

    /// Returns the number of bytes preceding the payload according to the message
    /// configuration.
    ///
    /// This value seeds the security-buffer offsets, so it must equal the number of
    /// bytes actually written before the first payload byte. When `omit_version` is set
    /// together with [`Flags::NEGOTIATE_VERSION`] it does not (see
    /// [`AuthenticateMessage::to_bytes`]).
    pub fn prefix_size(&self) -> u32 {
        let mut size = BASE_MESSAGE_SIZE;
        if self.integrity_enabled {
            size += MIC_SIZE as u32;
        }
        if !self.omit_version {
            size += VERSION_SIZE as u32;
        }
        size
    }

    /// Serializes the AUTHENTICATE message into bytes.
    ///
    /// Deterministic and infallible; encoding the same message twice produces identical
    /// bytes.
    ///
    /// Note: when `omit_version` is set but [`Flags::NEGOTIATE_VERSION`] was negotiated,
    /// the version block is written even though [`AuthenticateMessage::prefix_size`]
    /// does not account for it, shifting the actual payload 8 bytes past the offsets in
    /// the security buffers. This reproduces the behavior of the original
    /// implementation; callers should set at most one of the two knobs.
    pub fn to_bytes(&self) -> Vec<u8> {
        let prefix_size = self.prefix_size();
        let session_key = self.wire_session_key();
        let payload_size
            = self.lm_response.len()
            + self.nt_response.len()
            + self.domain_name.len()
            + self.user_name.len()
            + self.workstation.len()
            + session_key.len()
            ;

        let mut buf = Buffer::with_capacity(prefix_size as usize + payload_size);
        buf.put_raw_bytes(&NTLMSSP_MAGIC);
        buf.put_u32(AUTHENTICATE_MESSAGE_TYPE);

        let mut layout = FieldLayout::starting_at(prefix_size);
        layout.put_field(&mut buf, &self.lm_response);
        layout.put_field(&mut buf, &self.nt_response);
        layout.put_field(&mut buf, &self.domain_name);
        layout.put_field(&mut buf, &self.user_name);
        layout.put_field(&mut buf, &self.workstation);
        layout.put_field(&mut buf, session_key);

        buf.put_u32(self.flags.bits());

        // version (8 bytes); skipped when omitted, as some servers don't like it
        if self.flags.contains(Flags::NEGOTIATE_VERSION) {
            put_version_block(&mut buf);
        } else if !self.omit_version {
            buf.put_reserved(VERSION_SIZE);
        }

        // MIC (16 bytes); zeros reserve the space until the session computes the hash
        if let Some(mic) = &self.mic {
            buf.put_raw_bytes(mic);
        } else if self.integrity_enabled {
            buf.put_reserved(MIC_SIZE);
        }

        buf.put_raw_bytes(&self.lm_response);
        buf.put_raw_bytes(&self.nt_response);
        buf.put_raw_bytes(&self.domain_name);
        buf.put_raw_bytes(&self.user_name);
        buf.put_raw_bytes(&self.workstation);
        buf.put_raw_bytes(session_key);

        buf.into_bytes()
    }

    /// Returns the session key as it appears on the wire.
    ///
    /// Without the key-exchange flag the field is forced to an empty blob, both for its
    /// security buffer and for the payload.
    fn wire_session_key(&self) -> &[u8] {
        if self.flags.contains(Flags::NEGOTIATE_KEY_EXCHANGE) {
            &self.session_key
        } else {
            &[]
        }
    }
}

impl fmt::Display for AuthenticateMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AuthenticateMessage {{ mic: {}, lm_response: {} bytes, nt_response: {} bytes, domain_name: {} bytes, user_name: {} bytes, workstation: {} bytes, session_key: [<secret>] }}",
            if self.mic.is_some() { "set" } else { "unset" },
            self.lm_response.len(),
            self.nt_response.len(),
            self.domain_name.len(),
            self.user_name.len(),
            self.workstation.len(),
        )
    }
}


/// Writes the version block of the AUTHENTICATE message.
///
/// The content is a protocol-fixed constant (major 6, minor 1, build 7600, NTLM revision
/// 15), not derived from any configured OS version.
fn put_version_block(buffer: &mut Buffer) {
    buffer.put_u8(0x06);
    buffer.put_u8(0x01);
    buffer.put_u16(7600);
    buffer.put_reserved(3);
    buffer.put_u8(0x0F);
}

/// Checks a required binary field, copying it into an owned blob.
fn required_blob(field: &'static str, value: Option<&[u8]>) -> Result<Vec<u8>, BuildError> {
    let value = value
        .ok_or(BuildError::MissingField { field })?;
    check_field_length(field, value.len())?;
    Ok(Vec::from(value))
}

/// Checks a required string field, encoding it as UTF-16 in little-endian byte order.
fn required_string(field: &'static str, value: Option<&str>) -> Result<Vec<u8>, BuildError> {
    let value = value
        .ok_or(BuildError::MissingField { field })?;
    let mut buf = Buffer::new();
    buf.put_utf16_string(value);
    check_field_length(field, buf.len())?;
    Ok(buf.into_bytes())
}

fn check_field_length(field: &'static str, length: usize) -> Result<(), BuildError> {
    if length > usize::from(u16::MAX) {
        return Err(BuildError::FieldTooLong { field, length });
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> NtlmConfig {
        NtlmConfig {
            workstation_name: "WS01".to_owned(),
            ..NtlmConfig::default()
        }
    }

    fn test_message(flags: Flags, config: &NtlmConfig) -> AuthenticateMessage {
        AuthenticateMessage::new(
            Some(&[0xAA; 24]),
            Some(&[0xBB; 48]),
            Some("CONTOSO"),
            Some("jdoe"),
            Some(config.workstation_name.as_str()),
            Some(&[0xCC; 16]),
            flags,
            config,
        ).unwrap()
    }

    #[test]
    fn missing_field_is_rejected_at_construction() {
        let config = test_config();
        let result = AuthenticateMessage::new(
            Some(&[]),
            None,
            Some(""),
            Some(""),
            Some(""),
            Some(&[]),
            Flags::NEGOTIATE_UNICODE,
            &config,
        );
        assert_eq!(result.unwrap_err(), BuildError::MissingField { field: "nt_response" });
    }

    #[test]
    fn oversized_field_is_rejected_at_construction() {
        let config = test_config();
        let huge = vec![0x11; usize::from(u16::MAX) + 1];
        let result = AuthenticateMessage::new(
            Some(&[]),
            Some(&huge),
            Some(""),
            Some(""),
            Some(""),
            Some(&[]),
            Flags::NEGOTIATE_UNICODE,
            &config,
        );
        assert_eq!(
            result.unwrap_err(),
            BuildError::FieldTooLong { field: "nt_response", length: huge.len() },
        );
    }

    #[test]
    fn empty_fields_still_produce_full_header() {
        let config = test_config();
        let message = AuthenticateMessage::new(
            Some(&[]),
            Some(&[]),
            Some(""),
            Some(""),
            Some(""),
            Some(&[]),
            Flags::NEGOTIATE_UNICODE,
            &config,
        ).unwrap();
        let bytes = message.to_bytes();
        // fixed header plus the zeroed version field, no payload
        assert_eq!(bytes.len(), 72);
    }

    #[test]
    fn mic_can_be_set_exactly_once() {
        let config = test_config();
        let message = test_message(Flags::NEGOTIATE_UNICODE, &config);
        assert_eq!(message.mic(), None);

        let message = message.with_mic([0x42; 16]).unwrap();
        assert_eq!(message.mic(), Some(&[0x42; 16]));

        assert_eq!(message.with_mic([0x43; 16]).unwrap_err(), BuildError::MicAlreadySet);
    }

    #[test]
    fn encoding_is_idempotent() {
        let config = NtlmConfig {
            integrity: true,
            ..test_config()
        };
        let message = test_message(
            Flags::NEGOTIATE_UNICODE | Flags::NEGOTIATE_VERSION | Flags::NEGOTIATE_KEY_EXCHANGE,
            &config,
        );
        assert_eq!(message.to_bytes(), message.to_bytes());

        let signed = message.with_mic([0x5A; 16]).unwrap();
        assert_eq!(signed.to_bytes(), signed.to_bytes());
    }

    #[test]
    fn session_key_is_forced_empty_without_key_exchange() {
        let config = test_config();
        let message = test_message(Flags::NEGOTIATE_UNICODE, &config);
        let bytes = message.to_bytes();

        // session key security buffer sits at offset 52
        let length = u16::from_le_bytes(bytes[52..54].try_into().unwrap());
        assert_eq!(length, 0);

        // and the key bytes must not appear in the payload either
        assert!(!bytes.windows(16).any(|w| w == [0xCC; 16]));
    }

    #[test]
    fn session_key_is_written_with_key_exchange() {
        let config = test_config();
        let message = test_message(
            Flags::NEGOTIATE_UNICODE | Flags::NEGOTIATE_KEY_EXCHANGE,
            &config,
        );
        let bytes = message.to_bytes();

        let length = u16::from_le_bytes(bytes[52..54].try_into().unwrap());
        assert_eq!(length, 16);
        assert_eq!(&bytes[bytes.len() - 16..], &[0xCC; 16]);
    }

    #[test]
    fn strings_are_encoded_utf16_le() {
        let config = test_config();
        let message = AuthenticateMessage::new(
            Some(&[]),
            Some(&[]),
            Some("AB"),
            Some(""),
            Some(""),
            Some(&[]),
            Flags::NEGOTIATE_UNICODE,
            &config,
        ).unwrap();
        let bytes = message.to_bytes();
        // the only payload field with data is the domain name, right after the prefix
        assert_eq!(&bytes[72..], &[0x41, 0x00, 0x42, 0x00]);
    }

    #[test]
    fn os_version_serializes_to_wire_layout() {
        let version = OsVersion {
            major_version: 10,
            minor_version: 0,
            build_number: 19041,
            ntlm_revision: 0x0F,
        };
        assert_eq!(
            version.to_bytes(),
            vec![0x0A, 0x00, 0x61, 0x4A, 0x00, 0x00, 0x00, 0x0F],
        );
    }
}
