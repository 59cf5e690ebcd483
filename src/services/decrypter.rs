//! PGP decryption engine.
//!
//! Consumes an encrypted (optionally ASCII-armored) packet stream and
//! produces cleartext. Key material is loaded once at startup and the
//! engine is injected wherever decryption happens; there is no global
//! provider state.

use pgp::composed::{Deserializable, Message, SignedSecretKey};
use std::fs;
use std::io::{self, Cursor};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecryptError {
    /// None of the message's encrypted-data entries matched a key in
    /// the ring.
    #[error("no private key in the ring matches the message")]
    KeyNotFound,
    /// The decrypted message was not a literal-data packet (detached
    /// signatures and other structures are not handled here).
    #[error("decrypted message is not literal data")]
    UnsupportedMessageType,
    /// The literal-data packet carried zero bytes.
    #[error("decrypted payload is empty")]
    EmptyPlaintext,
    #[error("malformed packet stream: {0}")]
    Malformed(pgp::errors::Error),
    #[error("pgp failure: {0}")]
    Pgp(pgp::errors::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Decrypting context: one private key plus its passphrase.
#[derive(Clone)]
pub struct Decrypter {
    key: SignedSecretKey,
    passphrase: String,
}

impl Decrypter {
    /// Load the private key from disk. Armored material is tried
    /// first, binary as a fallback.
    pub fn from_key_file(path: &Path, passphrase: impl Into<String>) -> Result<Self, DecryptError> {
        let material = fs::read(path)?;
        let key = match SignedSecretKey::from_armor_single(Cursor::new(&material)) {
            Ok((key, _)) => key,
            Err(_) => SignedSecretKey::from_bytes(Cursor::new(&material))
                .map_err(DecryptError::Malformed)?,
        };
        Ok(Self {
            key,
            passphrase: passphrase.into(),
        })
    }

    pub fn new(key: SignedSecretKey, passphrase: impl Into<String>) -> Self {
        Self {
            key,
            passphrase: passphrase.into(),
        }
    }

    /// Decrypt one message to its literal-data content.
    pub fn decrypt_bytes(&self, input: &[u8]) -> Result<Vec<u8>, DecryptError> {
        let message = match Message::from_armor_single(Cursor::new(input)) {
            Ok((message, _)) => message,
            Err(_) => Message::from_bytes(Cursor::new(input)).map_err(DecryptError::Malformed)?,
        };

        let (mut inner, _key_ids) = message
            .decrypt(|| self.passphrase.clone(), &[&self.key])
            .map_err(|err| match err {
                pgp::errors::Error::MissingKey => DecryptError::KeyNotFound,
                other => DecryptError::Pgp(other),
            })?;
        let decrypted = inner
            .next()
            .ok_or(DecryptError::EmptyPlaintext)?
            .map_err(DecryptError::Pgp)?;

        // One level of decompression, then the payload must be literal.
        let decrypted = match decrypted {
            compressed @ Message::Compressed(_) => {
                compressed.decompress().map_err(DecryptError::Pgp)?
            }
            other => other,
        };

        match decrypted {
            Message::Literal(literal) => {
                let content = literal.data().to_vec();
                if content.is_empty() {
                    Err(DecryptError::EmptyPlaintext)
                } else {
                    Ok(content)
                }
            }
            _ => Err(DecryptError::UnsupportedMessageType),
        }
    }

    /// Decrypt `src` into `dst`, returning the cleartext size.
    ///
    /// Partially written output is removed on every failure path.
    pub fn decrypt_file(&self, src: &Path, dst: &Path) -> Result<u64, DecryptError> {
        let input = fs::read(src)?;
        let cleartext = match self.decrypt_bytes(&input) {
            Ok(bytes) => bytes,
            Err(err) => {
                let _ = fs::remove_file(dst);
                return Err(err);
            }
        };
        if let Err(err) = fs::write(dst, &cleartext) {
            let _ = fs::remove_file(dst);
            return Err(DecryptError::Io(err));
        }
        Ok(cleartext.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgp::composed::{KeyType, SecretKeyParamsBuilder, SignedPublicKey};
    use pgp::crypto::sym::SymmetricKeyAlgorithm;
    use pgp::types::{CompressionAlgorithm, SecretKeyTrait};

    const PASSPHRASE: &str = "test-passphrase";

    fn generate_keypair() -> (SignedSecretKey, SignedPublicKey) {
        let params = SecretKeyParamsBuilder::default()
            .key_type(KeyType::Rsa(2048))
            .can_encrypt(true)
            .primary_user_id("decrypter-tests <tests@example.org>".into())
            .build()
            .unwrap();
        let secret_key = params.generate().unwrap();
        let signed_secret_key = secret_key.sign(|| PASSPHRASE.into()).unwrap();
        let public_key = signed_secret_key.public_key();
        let signed_public_key = public_key
            .sign(&signed_secret_key, || PASSPHRASE.into())
            .unwrap();
        (signed_secret_key, signed_public_key)
    }

    fn encrypt(plaintext: &[u8], public_key: &SignedPublicKey) -> Vec<u8> {
        let message = Message::new_literal_bytes("payload", plaintext);
        let encrypted = message
            .encrypt_to_keys(
                &mut rand::thread_rng(),
                SymmetricKeyAlgorithm::AES256,
                &[public_key],
            )
            .unwrap();
        encrypted.to_armored_bytes(None).unwrap()
    }

    #[test]
    fn round_trips_arbitrary_bytes() {
        let (secret_key, public_key) = generate_keypair();
        let plaintext = b"sender;00;2022-05-03;2022-05-03;3;1500;978".to_vec();
        let armored = encrypt(&plaintext, &public_key);

        let decrypter = Decrypter::new(secret_key, PASSPHRASE);
        let cleartext = decrypter.decrypt_bytes(&armored).unwrap();
        assert_eq!(cleartext, plaintext);
    }

    #[test]
    fn wrong_key_is_key_not_found() {
        let (_, public_key) = generate_keypair();
        let (other_secret, _) = generate_keypair();
        let armored = encrypt(b"payload", &public_key);

        let decrypter = Decrypter::new(other_secret, PASSPHRASE);
        assert!(matches!(
            decrypter.decrypt_bytes(&armored),
            Err(DecryptError::KeyNotFound)
        ));
    }

    #[test]
    fn empty_literal_is_empty_plaintext() {
        let (secret_key, public_key) = generate_keypair();
        let armored = encrypt(b"", &public_key);

        let decrypter = Decrypter::new(secret_key, PASSPHRASE);
        assert!(matches!(
            decrypter.decrypt_bytes(&armored),
            Err(DecryptError::EmptyPlaintext)
        ));
    }

    #[test]
    fn non_literal_payload_is_unsupported() {
        let (secret_key, public_key) = generate_keypair();
        // Two compression layers: one gets unwrapped, the remaining
        // inner message is still not literal data.
        let message = Message::new_literal_bytes("payload", b"data")
            .compress(CompressionAlgorithm::ZLIB)
            .unwrap()
            .compress(CompressionAlgorithm::ZLIB)
            .unwrap();
        let armored = message
            .encrypt_to_keys(
                &mut rand::thread_rng(),
                SymmetricKeyAlgorithm::AES256,
                &[&public_key],
            )
            .unwrap()
            .to_armored_bytes(None)
            .unwrap();

        let decrypter = Decrypter::new(secret_key, PASSPHRASE);
        assert!(matches!(
            decrypter.decrypt_bytes(&armored),
            Err(DecryptError::UnsupportedMessageType)
        ));
    }

    #[test]
    fn garbage_input_is_malformed() {
        let (secret_key, _) = generate_keypair();
        let decrypter = Decrypter::new(secret_key, PASSPHRASE);
        assert!(matches!(
            decrypter.decrypt_bytes(b"not a pgp message"),
            Err(DecryptError::Malformed(_))
        ));
    }

    #[test]
    fn decrypt_file_cleans_partial_output() {
        let (secret_key, _) = generate_keypair();
        let decrypter = Decrypter::new(secret_key, PASSPHRASE);
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("payload.pgp");
        let dst = dir.path().join("payload.decrypted");
        fs::write(&src, b"definitely not pgp").unwrap();

        assert!(decrypter.decrypt_file(&src, &dst).is_err());
        assert!(!dst.exists());
    }
}
