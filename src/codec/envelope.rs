//! Text-safe envelope for binary payloads
//!
//! The broker path only carries text reliably, so every binary payload travels
//! as standard base64 with padding.

use super::CodecError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

pub fn to_transport_envelope(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Surrounding whitespace (a trailing newline from some firmware builds) is ignored.
pub fn from_transport_envelope(text: &str) -> Result<Vec<u8>, CodecError> {
    Ok(STANDARD.decode(text.trim())?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_round_trips_arbitrary_bytes() {
        let samples: [&[u8]; 4] = [b"", b"dev-A", &[0, 255, 10, 13, 0x80], &[0x42; 97]];
        for bytes in samples {
            let text = to_transport_envelope(bytes);
            assert_eq!(from_transport_envelope(&text).unwrap(), bytes);
        }
    }

    #[test]
    fn fetch_request_payload_is_plain_id_bytes() {
        assert_eq!(to_transport_envelope(b"dev-A"), "ZGV2LUE=");
    }

    #[test]
    fn trailing_newline_is_tolerated() {
        assert_eq!(from_transport_envelope("ZGV2LUE=\n").unwrap(), b"dev-A");
    }

    #[test]
    fn invalid_base64_is_an_envelope_error() {
        let err = from_transport_envelope("not*base64!").unwrap_err();
        assert!(matches!(err, CodecError::Envelope(_)));
    }
}
