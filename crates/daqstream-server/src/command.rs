use bytes::{BufMut, Bytes, BytesMut};
use daqstream_frame::{decode_elements, FrameError};

/// Wire protocol version carried in the first byte of every command frame
/// and announced in the configuration frame.
pub const PROTOCOL_VERSION: u8 = 2;

pub const TAG_STREAM: f64 = 0.0;
pub const TAG_SAVE: f64 = 1.0;
pub const TAG_SPECTRUM: f64 = 2.0;
pub const TAG_RECONFIGURE: f64 = 3.0;

/// A client request.
///
/// Payload layout: `[PROTOCOL_VERSION: u8][tag: f64][args: f64..]`, all
/// little-endian.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    /// Read one block; reply with the time array and the data array.
    Stream,
    /// Record to the server-side file; no reply.
    Save,
    /// Read one block; reply with frequencies and per-channel densities.
    Spectrum,
    /// Change rate and block size, then reply like `Stream`.
    Reconfigure { sample_rate: f64, block_size: usize },
    /// Any other tag. Logged and ignored by the server.
    Unknown(f64),
}

impl Command {
    pub fn tag(&self) -> f64 {
        match self {
            Command::Stream => TAG_STREAM,
            Command::Save => TAG_SAVE,
            Command::Spectrum => TAG_SPECTRUM,
            Command::Reconfigure { .. } => TAG_RECONFIGURE,
            Command::Unknown(tag) => *tag,
        }
    }

    /// Whether the server answers this command with two frames.
    pub fn expects_reply(&self) -> bool {
        matches!(
            self,
            Command::Stream | Command::Spectrum | Command::Reconfigure { .. }
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::Stream => "stream",
            Command::Save => "save",
            Command::Spectrum => "spectrum",
            Command::Reconfigure { .. } => "reconfigure",
            Command::Unknown(_) => "unknown",
        }
    }

    /// Encode as a command frame payload.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(1 + 3 * 8);
        buf.put_u8(PROTOCOL_VERSION);
        buf.put_f64_le(self.tag());
        if let Command::Reconfigure {
            sample_rate,
            block_size,
        } = self
        {
            buf.put_f64_le(*sample_rate);
            buf.put_f64_le(*block_size as f64);
        }
        buf.freeze()
    }

    /// Decode a command frame payload.
    ///
    /// A wrong version byte, a ragged payload, a missing tag or missing
    /// `Reconfigure` arguments are protocol errors. A block size that is not
    /// a non-negative integer decodes as `0`, which the engine rejects.
    pub fn decode(payload: &[u8]) -> Result<Self, FrameError> {
        let (&version, body) = payload
            .split_first()
            .ok_or_else(|| FrameError::ProtocolMismatch("empty command frame".to_string()))?;
        if version != PROTOCOL_VERSION {
            return Err(FrameError::ProtocolMismatch(format!(
                "unsupported protocol version {version} (expected {PROTOCOL_VERSION})"
            )));
        }

        let elements = decode_elements::<f64>(body)?;
        let (&tag, args) = elements
            .split_first()
            .ok_or_else(|| FrameError::ProtocolMismatch("missing command tag".to_string()))?;

        let command = if tag == TAG_STREAM {
            Command::Stream
        } else if tag == TAG_SAVE {
            Command::Save
        } else if tag == TAG_SPECTRUM {
            Command::Spectrum
        } else if tag == TAG_RECONFIGURE {
            match args {
                [rate, block, ..] => Command::Reconfigure {
                    sample_rate: *rate,
                    block_size: to_block_size(*block),
                },
                _ => {
                    return Err(FrameError::ProtocolMismatch(format!(
                        "reconfigure needs rate and block size ({} argument(s) given)",
                        args.len()
                    )))
                }
            }
        } else {
            Command::Unknown(tag)
        };
        Ok(command)
    }
}

fn to_block_size(value: f64) -> usize {
    if value.is_finite() && value >= 0.0 && value.fract() == 0.0 && value <= u32::MAX as f64 {
        value as usize
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(version: u8, elements: &[f64]) -> Vec<u8> {
        let mut payload = vec![version];
        for value in elements {
            payload.extend_from_slice(&value.to_le_bytes());
        }
        payload
    }

    #[test]
    fn decodes_known_tags() {
        assert_eq!(Command::decode(&raw(2, &[0.0])).unwrap(), Command::Stream);
        assert_eq!(Command::decode(&raw(2, &[1.0])).unwrap(), Command::Save);
        assert_eq!(Command::decode(&raw(2, &[2.0])).unwrap(), Command::Spectrum);
        assert_eq!(
            Command::decode(&raw(2, &[3.0, 2000.0, 512.0])).unwrap(),
            Command::Reconfigure {
                sample_rate: 2000.0,
                block_size: 512
            }
        );
    }

    #[test]
    fn encode_matches_wire_layout() {
        let payload = Command::Reconfigure {
            sample_rate: 100.0,
            block_size: 50,
        }
        .encode();
        assert_eq!(payload.as_ref(), raw(2, &[3.0, 100.0, 50.0]).as_slice());
        assert_eq!(Command::Save.encode().len(), 9);
    }

    #[test]
    fn unknown_tag_is_not_an_error() {
        assert_eq!(Command::decode(&raw(2, &[7.0])).unwrap(), Command::Unknown(7.0));
        assert!(!Command::Unknown(7.0).expects_reply());
    }

    #[test]
    fn wrong_version_is_rejected() {
        let err = Command::decode(&raw(1, &[0.0])).unwrap_err();
        assert!(matches!(err, FrameError::ProtocolMismatch(_)));
        assert!(err.is_protocol_fatal());
    }

    #[test]
    fn ragged_or_empty_payload_is_rejected() {
        let mut ragged = raw(2, &[0.0]);
        ragged.push(0xff);
        assert!(matches!(
            Command::decode(&ragged),
            Err(FrameError::ProtocolMismatch(_))
        ));
        assert!(Command::decode(&[]).is_err());
        assert!(Command::decode(&[PROTOCOL_VERSION]).is_err());
    }

    #[test]
    fn reconfigure_without_arguments_is_rejected() {
        let err = Command::decode(&raw(2, &[3.0, 2000.0])).unwrap_err();
        assert!(matches!(err, FrameError::ProtocolMismatch(_)));
    }

    #[test]
    fn odd_block_sizes_decode_to_zero() {
        for block in [-4.0, 12.5, f64::NAN] {
            let command = Command::decode(&raw(2, &[3.0, 1000.0, block])).unwrap();
            assert_eq!(
                command,
                Command::Reconfigure {
                    sample_rate: 1000.0,
                    block_size: 0
                }
            );
        }
    }
}
