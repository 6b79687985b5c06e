//! Signing keypair management
//!
//! A 2048-bit RSA keypair is generated once per installation: the private
//! key as unencrypted PKCS#8 PEM in `key`, the public key OpenSSH-encoded
//! in `key.pub`. Requests are signed with RSA-PSS (MGF1/SHA-256, maximum
//! salt length). PSS salts are randomized, so two signatures over the same
//! payload differ; verifiers must use PSS verification, not byte equality.

use std::{fs, path::Path};

use rand::rngs::OsRng;
use rsa::{
    pkcs8::{DecodePrivateKey, EncodePrivateKey, LineEnding},
    traits::PublicKeyParts,
    Pss, RsaPrivateKey, RsaPublicKey,
};
use sha2::{Digest, Sha256};
use ssh_key::public::KeyData;
use tracing::info;

use crate::{
    error::{Error, Result},
    paths::Paths,
};

const KEY_BITS: usize = 2048;

/// The installation's signing identity, loaded from `key` / `key.pub`.
pub struct KeyPair {
    private: RsaPrivateKey,
    public_openssh: String,
}

/// Generate and persist the keypair unless any `key*` file already exists.
///
/// Either both files are written or neither; a partial write is cleaned up
/// before the error propagates.
pub fn ensure_keypair(paths: &Paths) -> Result<()> {
    if has_key_files(paths.root())? {
        return Ok(());
    }
    fs::create_dir_all(paths.root())?;

    info!("generating signing keypair");
    let private = RsaPrivateKey::new(&mut OsRng, KEY_BITS)
        .map_err(|e| Error::Crypto(format!("key generation failed: {e}")))?;
    let pem = private
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| Error::Crypto(format!("private key encoding failed: {e}")))?;
    let openssh = encode_openssh(&private.to_public_key())?;

    let key_path = paths.private_key_file();
    let pub_path = paths.public_key_file();
    let cleanup = scopeguard::guard((), |()| {
        let _ = fs::remove_file(&key_path);
        let _ = fs::remove_file(&pub_path);
    });
    fs::write(&key_path, pem.as_bytes())?;
    fs::write(&pub_path, openssh.as_bytes())?;
    scopeguard::ScopeGuard::into_inner(cleanup);
    Ok(())
}

fn has_key_files(root: &Path) -> Result<bool> {
    if !root.exists() {
        return Ok(false);
    }
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        if entry.file_name().to_string_lossy().starts_with("key") {
            return Ok(true);
        }
    }
    Ok(false)
}

fn encode_openssh(public: &RsaPublicKey) -> Result<String> {
    let key_data = ssh_key::public::RsaPublicKey::try_from(public)
        .map_err(|e| Error::Crypto(format!("public key encoding failed: {e}")))?;
    ssh_key::PublicKey::new(KeyData::Rsa(key_data), "")
        .to_openssh()
        .map_err(|e| Error::Crypto(format!("public key encoding failed: {e}")))
}

impl KeyPair {
    /// Load the persisted keypair. Both key files must exist; run
    /// [`ensure_keypair`] first.
    pub fn load(paths: &Paths) -> Result<Self> {
        let key_path = paths.private_key_file();
        let pub_path = paths.public_key_file();
        if !key_path.exists() || !pub_path.exists() {
            return Err(Error::Configuration(
                "signing keypair not found; `quiver plugins install` or `publish` generates it on first use"
                    .into(),
            ));
        }
        let pem = fs::read_to_string(&key_path)?;
        let private = RsaPrivateKey::from_pkcs8_pem(&pem)
            .map_err(|e| Error::Crypto(format!("invalid private key: {e}")))?;
        let public_openssh = fs::read_to_string(&pub_path)?.trim_end().to_string();
        Ok(Self {
            private,
            public_openssh,
        })
    }

    /// OpenSSH-encoded public key line, used verbatim as the identity header.
    pub fn public_key(&self) -> &str {
        &self.public_openssh
    }

    /// RSA-PSS signature over `payload`.
    pub fn sign(&self, payload: &[u8]) -> Result<Vec<u8>> {
        let digest = Sha256::digest(payload);
        self.private
            .sign_with_rng(&mut OsRng, self.pss(), &digest)
            .map_err(|e| Error::Crypto(format!("signing failed: {e}")))
    }

    /// PSS verification against the keypair's public half.
    pub fn verify(&self, payload: &[u8], signature: &[u8]) -> Result<()> {
        let digest = Sha256::digest(payload);
        self.private
            .to_public_key()
            .verify(self.pss(), &digest, signature)
            .map_err(|e| Error::Crypto(format!("signature verification failed: {e}")))
    }

    // Maximum salt length: emLen - hLen - 2.
    fn pss(&self) -> Pss {
        let salt_len = self.private.size() - Sha256::output_size() - 2;
        Pss::new_with_salt::<Sha256>(salt_len)
    }
}
