//! Record protection across all cipher suites.
//! 覆盖全部密码套件的记录保护测试。

use proptest::prelude::*;
use tls13_handshake::crypto::aead::TAG_LEN;
use tls13_handshake::record::{
    ContentType, HEADER_LEN, MAX_PLAINTEXT_LENGTH, RecordKeys, RecordLayer, build_nonce, decrypt,
    encrypt,
};
use tls13_handshake::{CipherSuite, HandshakeError, Result};

const LENGTHS: [usize; 14] = [0, 1, 15, 16, 17, 63, 64, 65, 127, 128, 255, 256, 1000, 16384];

fn key_pair(suite: CipherSuite, seed: u8) -> Result<(RecordKeys, RecordKeys)> {
    let key = vec![seed; suite.aead()?.key_len()];
    let iv = [seed.wrapping_add(1); 12];
    Ok((RecordKeys::new(suite, &key, iv)?, RecordKeys::new(suite, &key, iv)?))
}

#[test]
fn test_protect_and_open_every_length() -> Result<()> {
    for suite in CipherSuite::ALL {
        let (mut tx, mut rx) = key_pair(suite, 0x42)?;
        for (expected_seq, len) in LENGTHS.into_iter().enumerate() {
            assert_eq!(tx.sequence_number(), expected_seq as u64);
            let plaintext: Vec<u8> = (0..len).map(|i| i as u8).collect();
            let record = encrypt(&plaintext, ContentType::ApplicationData, &mut tx)?;
            assert_eq!(record.len(), HEADER_LEN + len + 1 + TAG_LEN);
            assert_eq!(&record[..3], &[23, 3, 3]);

            let (opened, content_type) = decrypt(&record, &mut rx)?;
            assert_eq!(opened, plaintext);
            assert_eq!(content_type, ContentType::ApplicationData);
        }
        assert_eq!(rx.sequence_number(), LENGTHS.len() as u64);
        println!("{suite:?}: {} records ok", LENGTHS.len());
    }
    Ok(())
}

#[test]
fn test_inner_content_type_is_hidden() -> Result<()> {
    let (mut tx, mut rx) = key_pair(CipherSuite::TlsAes128GcmSha256, 7)?;
    let record = encrypt(b"\x16", ContentType::Handshake, &mut tx)?;
    // The outer header always claims application_data.
    assert_eq!(record[0], 23);
    let (opened, content_type) = decrypt(&record, &mut rx)?;
    assert_eq!(content_type, ContentType::Handshake);
    assert_eq!(opened, b"\x16");
    Ok(())
}

#[test]
fn test_any_flipped_byte_fails_authentication() -> Result<()> {
    for suite in CipherSuite::ALL {
        let (mut tx, _) = key_pair(suite, 9)?;
        let record = encrypt(b"attack at dawn", ContentType::ApplicationData, &mut tx)?;
        // Flipping the length bytes changes framing; everything else is authenticated.
        for index in (0..record.len()).filter(|i| *i != 3 && *i != 4) {
            let (_, mut rx) = key_pair(suite, 9)?;
            let mut tampered = record.clone();
            tampered[index] ^= 0x80;
            let err = decrypt(&tampered, &mut rx).unwrap_err();
            assert!(
                matches!(
                    err,
                    HandshakeError::BadRecordMac | HandshakeError::Decode(_)
                ),
                "byte {index}: {err:?}"
            );
            assert_eq!(rx.sequence_number(), 0);
        }
    }
    Ok(())
}

#[test]
fn test_wrong_key_or_sequence_fails() -> Result<()> {
    let suite = CipherSuite::TlsChaCha20Poly1305Sha256;
    let (mut tx, _) = key_pair(suite, 1)?;
    let (_, mut other) = key_pair(suite, 2)?;
    let record = encrypt(b"payload", ContentType::ApplicationData, &mut tx)?;
    assert!(matches!(decrypt(&record, &mut other), Err(HandshakeError::BadRecordMac)));

    // A replayed or reordered record no longer matches the receiver's sequence.
    let (mut tx, mut rx) = key_pair(suite, 3)?;
    let first = encrypt(b"one", ContentType::ApplicationData, &mut tx)?;
    let second = encrypt(b"two", ContentType::ApplicationData, &mut tx)?;
    assert!(matches!(decrypt(&second, &mut rx), Err(HandshakeError::BadRecordMac)));
    assert_eq!(decrypt(&first, &mut rx)?.0, b"one");
    assert!(matches!(decrypt(&first, &mut rx), Err(HandshakeError::BadRecordMac)));
    Ok(())
}

#[test]
fn test_layer_fragments_large_writes() -> Result<()> {
    let suite = CipherSuite::TlsAes256GcmSha384;
    let (tx, rx) = key_pair(suite, 5)?;
    let mut sender = RecordLayer::new(0);
    sender.set_write_keys(tx);
    let mut receiver = RecordLayer::new(0);
    receiver.set_read_keys(rx);

    let data = vec![0xab; MAX_PLAINTEXT_LENGTH * 2 + 10];
    sender.write(ContentType::ApplicationData, &data)?;
    receiver.feed(&sender.take_output());

    let mut reassembled = Vec::new();
    let mut records = 0;
    while let Some(record) = receiver.next_record()? {
        assert_eq!(record.content_type, ContentType::ApplicationData);
        assert!(record.payload.len() <= MAX_PLAINTEXT_LENGTH);
        reassembled.extend(record.payload);
        records += 1;
    }
    assert_eq!(records, 3);
    assert_eq!(reassembled, data);
    Ok(())
}

proptest! {
    #[test]
    fn nonce_xor_is_self_inverse(iv in any::<[u8; 12]>(), seq in any::<u64>()) {
        let nonce = build_nonce(&iv, seq);
        prop_assert_eq!(&nonce[..4], &iv[..4]);
        let back = build_nonce(&nonce, seq);
        prop_assert_eq!(back, iv);
    }

    #[test]
    fn small_sequences_only_touch_the_last_byte(iv in any::<[u8; 12]>(), seq in 0u64..256) {
        let nonce = build_nonce(&iv, seq);
        prop_assert_eq!(&nonce[..11], &iv[..11]);
        prop_assert_eq!(nonce[11], iv[11] ^ seq as u8);
    }

    #[test]
    fn distinct_sequences_give_distinct_nonces(iv in any::<[u8; 12]>(), a in any::<u64>(), b in any::<u64>()) {
        prop_assume!(a != b);
        prop_assert_ne!(build_nonce(&iv, a), build_nonce(&iv, b));
    }

    #[test]
    fn open_inverts_protect(data in proptest::collection::vec(any::<u8>(), 0..2048)) {
        let (mut tx, mut rx) = key_pair(CipherSuite::TlsAes128GcmSha256, 0x5a).unwrap();
        let record = encrypt(&data, ContentType::ApplicationData, &mut tx).unwrap();
        let (opened, _) = decrypt(&record, &mut rx).unwrap();
        prop_assert_eq!(opened, data);
    }
}
