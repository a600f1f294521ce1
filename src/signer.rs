//! Device signing capability.
//!
//! The license protocol needs two private-key operations: RSASSA-PSS (SHA-1)
//! over the license request and RSA-OAEP (SHA-1) to unwrap the session key.
//! A local device performs them with its own RSA key; a device without key
//! material can be handed any other [`Signer`], e.g. a hardware-backed one.

use std::fmt;

use rsa::rand_core::OsRng;
use rsa::{Oaep, Pss, RsaPrivateKey};
use sha1::{Digest, Sha1};

use crate::error::Result;

/// Private-key operations used by the license protocol.
pub trait Signer: fmt::Debug + Send + Sync {
    /// RSASSA-PSS signature with SHA-1 over `message`.
    fn sign(&self, message: &[u8]) -> Result<Vec<u8>>;

    /// RSA-OAEP (SHA-1) decryption of `ciphertext`.
    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>>;
}

impl Signer for RsaPrivateKey {
    fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        let hash = Sha1::digest(message);
        Ok(self.sign_with_rng(&mut OsRng, Pss::new::<Sha1>(), &hash)?)
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        Ok(RsaPrivateKey::decrypt(self, Oaep::new::<Sha1>(), ciphertext)?)
    }
}

#[cfg(test)]
mod tests {
    use rsa::rand_core::OsRng;
    use rsa::{Oaep, Pss};
    use sha1::{Digest, Sha1};

    use super::Signer;
    use crate::test_support::{private_key, public_key};

    #[test]
    fn pss_signature_verifies() {
        let message = b"license request bytes";
        let signature = Signer::sign(private_key(), message).expect("sign");
        public_key()
            .verify(Pss::new::<Sha1>(), &Sha1::digest(message), &signature)
            .expect("verify");
    }

    #[test]
    fn oaep_unwraps_session_key() {
        let session_key = [0x42u8; 16];
        let wrapped = public_key()
            .encrypt(&mut OsRng, Oaep::new::<Sha1>(), &session_key)
            .expect("encrypt");
        let unwrapped = Signer::decrypt(private_key(), &wrapped).expect("decrypt");
        assert_eq!(unwrapped, session_key);
    }
}
