use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use dws_core::crypto::{CryptoBox, CryptoError};

#[test]
fn tampering_in_the_middle_third_is_detected() {
    let crypto = CryptoBox::new([42u8; 32]);
    let sealed = crypto.seal("hello").unwrap();
    let bytes = STANDARD.decode(&sealed).unwrap();

    let third = bytes.len() / 3;
    for i in third..2 * third {
        let mut tampered = bytes.clone();
        tampered[i] ^= 0x01;
        assert_eq!(
            crypto.open(&STANDARD.encode(&tampered)),
            Err(CryptoError::CorruptCiphertext),
            "flip at byte {i} went unnoticed"
        );
    }
    assert_eq!(crypto.open(&sealed).unwrap(), "hello");
}

#[test]
fn empty_maps_to_empty() {
    let crypto = CryptoBox::new([42u8; 32]);
    assert_eq!(crypto.seal("").unwrap(), "");
    assert_eq!(crypto.open("").unwrap(), "");
}

#[test]
fn nonces_are_fresh() {
    let crypto = CryptoBox::new([42u8; 32]);
    assert_ne!(crypto.seal("same").unwrap(), crypto.seal("same").unwrap());
}

#[test]
fn regenerated_key_cannot_open_old_values() {
    let before = CryptoBox::ephemeral();
    let after = CryptoBox::ephemeral();
    let sealed = before.seal("smtp-password").unwrap();
    assert_eq!(after.open(&sealed), Err(CryptoError::CorruptCiphertext));
}
