use super::*;
use crate::cipher::{zero_pad, FrameCipher, IvMode};
use crate::identity::test_keys::{alice, bob};

fn key(byte: u8) -> SymmetricKey {
    SymmetricKey::from_bytes([byte; KEY_SIZE])
}

// ===== Payload layout =====

#[test]
fn test_anonymous_init_layout() {
    let init = HandshakeInit {
        nonce: [1, 2, 3, 4],
        thumbprint: None,
        key: key(0xaa),
    };
    let bytes = init.encode();

    assert_eq!(bytes.len(), ANONYMOUS_INIT_SIZE);
    assert_eq!(bytes.len(), 38);
    assert_eq!(&bytes[..5], &[1, 2, 3, 4, 0]);
    assert_eq!(&bytes[5..37], &[0xaa; 32]);
    assert_eq!(bytes[37], 1);

    assert_eq!(HandshakeInit::decode(&bytes).unwrap(), init);
}

#[test]
fn test_thumbprinted_init_layout() {
    let thumbprint = "ab".repeat(32);
    let init = HandshakeInit {
        nonce: [9, 8, 7, 6],
        thumbprint: Some(thumbprint.clone()),
        key: key(0x55),
    };
    let bytes = init.encode();

    assert_eq!(bytes.len(), 38 + 64 + 1);
    assert_eq!(&bytes[5..69], thumbprint.as_bytes());
    assert_eq!(bytes[69], 0);
    assert_eq!(&bytes[70..102], &[0x55; 32]);
    assert_eq!(bytes[102], 1);

    let decoded = HandshakeInit::decode(&bytes).unwrap();
    assert_eq!(decoded.thumbprint.as_deref(), Some(thumbprint.as_str()));
    assert_eq!(decoded.key, key(0x55));
}

#[test]
fn test_empty_thumbprint_is_anonymous() {
    let init = HandshakeInit {
        nonce: [0; 4],
        thumbprint: Some(String::new()),
        key: key(1),
    };
    let decoded = HandshakeInit::decode(&init.encode()).unwrap();
    assert_eq!(decoded.thumbprint, None);
}

#[test]
fn test_init_stage_violation() {
    let mut bytes = HandshakeInit {
        nonce: [0; 4],
        thumbprint: None,
        key: key(1),
    }
    .encode();
    bytes[4] = 2;
    assert!(matches!(
        HandshakeInit::decode(&bytes),
        Err(HandshakeError::ProtocolViolation(2))
    ));
}

#[test]
fn test_init_malformed() {
    assert!(matches!(
        HandshakeInit::decode(&[1, 2, 3]),
        Err(HandshakeError::Malformed(_))
    ));
    assert!(matches!(
        HandshakeInit::decode(&[0u8; 37]),
        Err(HandshakeError::Malformed(_))
    ));

    // Thumbprint region without terminator
    let mut bytes = vec![1, 2, 3, 4, 0];
    bytes.extend_from_slice(b"abc");
    bytes.extend_from_slice(&[7u8; 32]);
    bytes.push(1);
    assert!(matches!(
        HandshakeInit::decode(&bytes),
        Err(HandshakeError::Malformed(_))
    ));

    // Interior zero inside the thumbprint
    let mut bytes = vec![1, 2, 3, 4, 0];
    bytes.extend_from_slice(b"ab\0c\0");
    bytes.extend_from_slice(&[7u8; 32]);
    bytes.push(1);
    assert!(matches!(
        HandshakeInit::decode(&bytes),
        Err(HandshakeError::Malformed(_))
    ));

    // Lone terminator: one byte longer than anonymous
    let mut bytes = vec![1, 2, 3, 4, 0, 0];
    bytes.extend_from_slice(&[7u8; 32]);
    bytes.push(1);
    assert!(matches!(
        HandshakeInit::decode(&bytes),
        Err(HandshakeError::Malformed(_))
    ));
}

#[test]
fn test_confirm_payload_bytes() {
    let confirm = HandshakeConfirm {
        nonce: [0x04, 0x03, 0x02, 0x01],
        session_id: SessionId::new(7),
    };
    let bytes = confirm.encode();
    assert_eq!(bytes, [0x04, 0x03, 0x02, 0x01, 0x01, 0x07, 0x00]);

    let padded = zero_pad(&bytes);
    let mut expected = vec![0x04, 0x03, 0x02, 0x01, 0x01, 0x07, 0x00];
    expected.resize(16, 0);
    assert_eq!(padded, expected);

    assert_eq!(HandshakeConfirm::decode(&padded), Some(confirm));
}

#[test]
fn test_confirm_datagram_decrypts_to_padded_payload() {
    let cipher = FrameCipher::new(key(0x11), IvMode::KeyDerived);
    let datagram = confirm_datagram(&cipher, [0x04, 0x03, 0x02, 0x01], SessionId::new(7)).unwrap();
    assert_eq!(datagram.len(), 16);

    let plaintext = cipher.decrypt(&datagram).unwrap();
    let mut expected = vec![0x04, 0x03, 0x02, 0x01, 0x01, 0x07, 0x00];
    expected.resize(16, 0);
    assert_eq!(plaintext, expected);
}

#[test]
fn test_confirm_decode_rejects_other_kinds() {
    assert_eq!(HandshakeConfirm::decode(&[1, 2, 3, 4, 1, 7]), None);
    assert_eq!(HandshakeConfirm::decode(&[1, 2, 3, 4, 0, 7, 0]), None);
    assert_eq!(HandshakeConfirm::decode(&[1, 2, 3, 4, 2, 7, 0]), None);
}

// ===== End to end =====

#[test]
fn test_full_handshake() {
    for iv_mode in [IvMode::Random, IvMode::KeyDerived] {
        let server = alice();
        let client_id = bob();

        let client = ClientHandshake::new(Some(client_id.thumbprint().to_string()), iv_mode);
        assert!(!client.is_anonymous());
        let init = client.init_datagram(server.peer_key()).unwrap();

        let proposal = accept_init(&server, &init).unwrap();
        assert_eq!(proposal.nonce, client.nonce());
        assert_eq!(proposal.thumbprint.as_deref(), Some(client_id.thumbprint()));

        let server_cipher = FrameCipher::new(proposal.key.clone(), iv_mode);
        let confirm = confirm_datagram(&server_cipher, proposal.nonce, SessionId::new(42)).unwrap();

        assert_eq!(client.accept_confirm(&confirm), Some(SessionId::new(42)));

        // Both sides now share the session key
        let client_cipher = client.into_cipher();
        let ciphertext = client_cipher.encrypt(b"hello").unwrap();
        assert_eq!(&server_cipher.decrypt(&ciphertext).unwrap()[..5], b"hello");
    }
}

#[test]
fn test_anonymous_handshake() {
    let server = alice();
    let client = ClientHandshake::new(None, IvMode::Random);
    assert!(client.is_anonymous());

    let init = client.init_datagram(server.peer_key()).unwrap();
    let proposal = accept_init(&server, &init).unwrap();
    assert_eq!(proposal.thumbprint, None);
}

#[test]
fn test_init_for_other_server_fails_decryption() {
    let client = ClientHandshake::new(None, IvMode::Random);
    let init = client.init_datagram(alice().peer_key()).unwrap();
    assert!(matches!(
        accept_init(&bob(), &init),
        Err(HandshakeError::Decryption)
    ));
    assert!(matches!(
        accept_init(&bob(), b"cleartext noise"),
        Err(HandshakeError::Decryption)
    ));
}

#[test]
fn test_client_ignores_noise_and_wrong_nonce() {
    let client = ClientHandshake::with_parts([1, 2, 3, 4], key(0x22), None, IvMode::KeyDerived);
    let cipher = FrameCipher::new(key(0x22), IvMode::KeyDerived);

    let wrong_nonce = confirm_datagram(&cipher, [4, 3, 2, 1], SessionId::new(5)).unwrap();
    assert_eq!(client.accept_confirm(&wrong_nonce), None);

    let wrong_key = FrameCipher::new(key(0x33), IvMode::KeyDerived);
    let forged = confirm_datagram(&wrong_key, [1, 2, 3, 4], SessionId::new(5)).unwrap();
    assert_eq!(client.accept_confirm(&forged), None);

    assert_eq!(client.accept_confirm(&[0u8; 15]), None);

    let good = confirm_datagram(&cipher, [1, 2, 3, 4], SessionId::new(5)).unwrap();
    assert_eq!(client.accept_confirm(&good), Some(SessionId::new(5)));
}
