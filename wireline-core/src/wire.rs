//! Wire format: one tagged enum, serialized through a single entry point,
//! instead of ad-hoc inspection of a `type` string.
//!
//! `PlaintextMessage` covers the three control datagrams that travel
//! unencrypted (`presence`, `ping`, `pong`); `CipherPayload` covers the two
//! that travel inside a [`crate::crypto::Session`] box (`message`,
//! `receipt`). A raw datagram is classified by attempting to decode it as
//! `PlaintextMessage` JSON first; anything that fails to parse is treated
//! as ciphertext.

use serde::{Deserialize, Serialize};

/// Plaintext control datagrams, tagged on the wire by `type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlaintextMessage {
    Presence {
        user_id: String,
        username: String,
        status: PresenceStatus,
        pubkey: String,
    },
    Ping {
        user_id: String,
    },
    Pong,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceStatus {
    Online,
    Offline,
}

/// Payloads carried inside an encrypted frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CipherPayload {
    Message {
        message_id: String,
        from_user_id: String,
        from_username: String,
        to_user_id: String,
        to_username: String,
        content: String,
        timestamp: i64,
    },
    Receipt {
        message_id: String,
        status: ReceiptStatus,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptStatus {
    Delivered,
}

/// Maximum size allowed for a plaintext control datagram.
pub const MAX_CONTROL_DATAGRAM: usize = 4096;

/// What an inbound datagram turned out to be, once classified.
pub enum Classified {
    Plaintext(PlaintextMessage),
    Ciphertext,
}

/// Attempt to decode `bytes` as a `PlaintextMessage`; if that fails, the
/// datagram is ciphertext by definition.
pub fn classify(bytes: &[u8]) -> Classified {
    match serde_json::from_slice::<PlaintextMessage>(bytes) {
        Ok(msg) => Classified::Plaintext(msg),
        Err(_) => Classified::Ciphertext,
    }
}

pub fn encode_plaintext(msg: &PlaintextMessage) -> Vec<u8> {
    serde_json::to_vec(msg).expect("PlaintextMessage always serializes")
}

pub fn encode_cipher_payload(payload: &CipherPayload) -> Vec<u8> {
    serde_json::to_vec(payload).expect("CipherPayload always serializes")
}

pub fn decode_cipher_payload(bytes: &[u8]) -> Result<CipherPayload, serde_json::Error> {
    serde_json::from_slice(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presence_round_trips_through_json() {
        let msg = PlaintextMessage::Presence {
            user_id: "abcd1234".to_string(),
            username: "alice".to_string(),
            status: PresenceStatus::Online,
            pubkey: "base64==".to_string(),
        };
        let encoded = encode_plaintext(&msg);
        match classify(&encoded) {
            Classified::Plaintext(PlaintextMessage::Presence { user_id, status, .. }) => {
                assert_eq!(user_id, "abcd1234");
                assert_eq!(status, PresenceStatus::Online);
            }
            _ => panic!("expected presence"),
        }
    }

    #[test]
    fn ping_and_pong_round_trip() {
        let ping = PlaintextMessage::Ping {
            user_id: "abcd1234".to_string(),
        };
        assert!(matches!(
            classify(&encode_plaintext(&ping)),
            Classified::Plaintext(PlaintextMessage::Ping { .. })
        ));

        let pong = PlaintextMessage::Pong;
        assert!(matches!(
            classify(&encode_plaintext(&pong)),
            Classified::Plaintext(PlaintextMessage::Pong)
        ));
    }

    #[test]
    fn non_json_bytes_classify_as_ciphertext() {
        let random_bytes = [0xDE, 0xAD, 0xBE, 0xEF, 0x00, 0x01, 0x02];
        assert!(matches!(classify(&random_bytes), Classified::Ciphertext));
    }

    #[test]
    fn cipher_payload_round_trips() {
        let payload = CipherPayload::Message {
            message_id: "m1".to_string(),
            from_user_id: "u1".to_string(),
            from_username: "alice".to_string(),
            to_user_id: "u2".to_string(),
            to_username: "bob".to_string(),
            content: "hello".to_string(),
            timestamp: 1_700_000_000,
        };
        let encoded = encode_cipher_payload(&payload);
        let decoded = decode_cipher_payload(&encoded).unwrap();
        match decoded {
            CipherPayload::Message { content, .. } => assert_eq!(content, "hello"),
            _ => panic!("expected message"),
        }
    }

    #[test]
    fn unknown_type_tag_fails_to_decode_as_plaintext() {
        let unknown = br#"{"type":"sasl_login","foo":"bar"}"#;
        assert!(matches!(classify(unknown), Classified::Ciphertext));
    }
}
