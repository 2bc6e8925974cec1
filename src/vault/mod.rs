//! Authenticated encryption for credential payloads
//!
//! Tokens never reach a [`CredentialStore`](crate::store::CredentialStore) in
//! plaintext. [`TokenVault`] derives a 256-bit key from a password with
//! PBKDF2-HMAC-SHA256 (100,000 rounds, fresh 16-byte salt) and seals the
//! payload with AES-256-GCM (fresh 96-bit nonce, 128-bit tag). A tag mismatch
//! on open is always an error; it never degrades to an empty value.
//!
//! # Module Layout
//!
//! - this module -- [`EncryptedPayload`], [`encrypt`]/[`decrypt`], password
//!   derivation, constant-time comparison and hashing
//! - [`credentials`] -- [`CredentialVault`], encrypted OAuth token storage

pub mod credentials;

pub use credentials::CredentialVault;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::Engine as _;
use rand::RngCore as _;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::error::{McpGateError, Result};

/// PBKDF2 round count
pub const PBKDF2_ITERATIONS: u32 = 100_000;

/// Salt length in bytes
pub const SALT_LEN: usize = 16;

/// AES-GCM nonce length in bytes (96 bits)
pub const NONCE_LEN: usize = 12;

/// Environment variable holding the server-side vault secret
pub const SECRET_ENV_VAR: &str = "MCPGATE_ENCRYPTION_SECRET";

/// A sealed credential. All fields are standard base64.
///
/// # Examples
///
/// ```
/// use mcpgate::vault::EncryptedPayload;
///
/// let json = r#"{"encryptedData":"AA==","iv":"AA==","salt":"AA=="}"#;
/// let payload: EncryptedPayload = serde_json::from_str(json).unwrap();
/// assert_eq!(payload.iv, "AA==");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedPayload {
    /// Ciphertext with the 16-byte authentication tag appended
    pub encrypted_data: String,
    /// 12-byte nonce
    pub iv: String,
    /// 16-byte KDF salt
    pub salt: String,
}

fn derive_key(password: &str, salt: &[u8]) -> [u8; 32] {
    let mut key = [0u8; 32];
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, PBKDF2_ITERATIONS, &mut key);
    key
}

fn cipher_for(password: &str, salt: &[u8]) -> Result<Aes256Gcm> {
    let key = derive_key(password, salt);
    Aes256Gcm::new_from_slice(&key)
        .map_err(|e| McpGateError::Decryption(format!("invalid key length: {e}")).into())
}

/// Seal `plaintext` under `password`
///
/// Salt and nonce are drawn fresh for every call, so encrypting the same
/// plaintext twice yields different payloads.
///
/// # Examples
///
/// ```
/// use mcpgate::vault::{decrypt, encrypt};
///
/// let sealed = encrypt("token-123", "hunter2").unwrap();
/// assert_eq!(decrypt(&sealed, "hunter2").unwrap(), "token-123");
/// assert!(decrypt(&sealed, "wrong").is_err());
/// ```
pub fn encrypt(plaintext: &str, password: &str) -> Result<EncryptedPayload> {
    let mut salt = [0u8; SALT_LEN];
    let mut iv = [0u8; NONCE_LEN];
    let mut rng = rand::rng();
    rng.fill_bytes(&mut salt);
    rng.fill_bytes(&mut iv);

    let cipher = cipher_for(password, &salt)?;
    let sealed = cipher
        .encrypt(Nonce::from_slice(&iv), plaintext.as_bytes())
        .map_err(|_| McpGateError::Decryption("encryption failed".to_string()))?;

    let b64 = base64::engine::general_purpose::STANDARD;
    Ok(EncryptedPayload {
        encrypted_data: b64.encode(sealed),
        iv: b64.encode(iv),
        salt: b64.encode(salt),
    })
}

/// Open `payload` with `password`
///
/// # Errors
///
/// Returns `McpGateError::Decryption` on malformed base64, a wrong-length
/// nonce, a tag mismatch (wrong password or tampering) or non-UTF-8 output.
pub fn decrypt(payload: &EncryptedPayload, password: &str) -> Result<String> {
    let b64 = base64::engine::general_purpose::STANDARD;
    let decode = |field: &str, value: &str| {
        b64.decode(value)
            .map_err(|e| McpGateError::Decryption(format!("{field} is not valid base64: {e}")))
    };

    let data = decode("encryptedData", &payload.encrypted_data)?;
    let iv = decode("iv", &payload.iv)?;
    let salt = decode("salt", &payload.salt)?;

    if iv.len() != NONCE_LEN {
        return Err(McpGateError::Decryption(format!(
            "iv must be {NONCE_LEN} bytes, got {}",
            iv.len()
        ))
        .into());
    }

    let cipher = cipher_for(password, &salt)?;
    let plaintext = cipher
        .decrypt(Nonce::from_slice(&iv), data.as_slice())
        .map_err(|_| {
            McpGateError::Decryption("authentication tag mismatch".to_string())
        })?;

    String::from_utf8(plaintext)
        .map_err(|_| McpGateError::Decryption("plaintext is not UTF-8".to_string()).into())
}

/// Compare two byte strings in constant time
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}

/// Lowercase hex SHA-256 digest of `data`
///
/// # Examples
///
/// ```
/// use mcpgate::vault::sha256_hex;
///
/// assert_eq!(
///     sha256_hex(b"abc"),
///     "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
/// );
/// ```
pub fn sha256_hex(data: &[u8]) -> String {
    Sha256::digest(data)
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Identity credentials are sealed for in this process: `$USER`, then
/// `$USERNAME`
pub fn local_identity() -> Option<String> {
    ["USER", "USERNAME"]
        .into_iter()
        .filter_map(|var| std::env::var(var).ok())
        .find(|value| !value.trim().is_empty())
}

/// Where vault passwords come from.
#[derive(Clone)]
enum KeySource {
    /// Externally supplied server secret
    Server(String),
    /// Client-side; ephemeral key used when no identity is known
    Client(String),
}

/// Password derivation and sealing front-end.
///
/// Server-side vaults require an external secret. Client-side vaults derive a
/// deterministic per-identity key when an identity is known and otherwise fall
/// back to an ephemeral per-process key.
///
/// The per-identity client key is derived from the identity alone, so anyone
/// who knows the username can recompute it. It keeps tokens out of plain
/// sight in the store and nothing more; set [`SECRET_ENV_VAR`] for real
/// protection at rest.
#[derive(Clone)]
pub struct TokenVault {
    source: KeySource,
}

impl std::fmt::Debug for TokenVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mode = match self.source {
            KeySource::Server(_) => "server",
            KeySource::Client(_) => "client",
        };
        f.debug_struct("TokenVault").field("mode", &mode).finish()
    }
}

impl TokenVault {
    /// Server-side vault keyed by `secret`
    ///
    /// # Errors
    ///
    /// Returns `McpGateError::Config` when `secret` is empty.
    pub fn with_secret(secret: impl Into<String>) -> Result<Self> {
        let secret = secret.into();
        if secret.trim().is_empty() {
            return Err(McpGateError::Config("encryption secret is empty".to_string()).into());
        }
        Ok(Self {
            source: KeySource::Server(secret),
        })
    }

    /// Server-side vault keyed by `MCPGATE_ENCRYPTION_SECRET`
    ///
    /// # Errors
    ///
    /// Returns `McpGateError::Config` when the variable is unset or empty;
    /// callers treat this as fatal at startup.
    pub fn from_env() -> Result<Self> {
        let secret = std::env::var(SECRET_ENV_VAR).map_err(|_| {
            McpGateError::Config(format!(
                "{SECRET_ENV_VAR} must be set to run the credential vault"
            ))
        })?;
        Self::with_secret(secret)
    }

    /// Server-keyed vault when [`SECRET_ENV_VAR`] is set, client-side
    /// otherwise.
    ///
    /// Processes sharing a secret and a durable store can read each other's
    /// tokens.
    pub fn from_env_or_client() -> Self {
        match Self::from_env() {
            Ok(vault) => vault,
            Err(_) => {
                tracing::debug!("{} not set, using a client-side vault", SECRET_ENV_VAR);
                Self::client()
            }
        }
    }

    /// Client-side vault with a fresh ephemeral session key
    pub fn client() -> Self {
        let mut bytes = [0u8; 32];
        rand::rng().fill_bytes(&mut bytes);
        Self {
            source: KeySource::Client(base64::engine::general_purpose::STANDARD.encode(bytes)),
        }
    }

    /// Whether this vault is keyed by a server secret
    pub fn is_server(&self) -> bool {
        matches!(self.source, KeySource::Server(_))
    }

    /// Derive the password used to seal credentials for `username`
    ///
    /// Server vaults hash the secret with the username. Client vaults with
    /// a username hash a fixed prefix with it, which guards against casual
    /// disclosure only; without a username the ephemeral session key is
    /// used.
    ///
    /// # Examples
    ///
    /// ```
    /// use mcpgate::vault::TokenVault;
    ///
    /// let vault = TokenVault::with_secret("s3cret").unwrap();
    /// assert_eq!(vault.derive_password(Some("ada")), vault.derive_password(Some("ada")));
    /// assert_ne!(vault.derive_password(Some("ada")), vault.derive_password(Some("bob")));
    /// ```
    pub fn derive_password(&self, username: Option<&str>) -> String {
        match (&self.source, username) {
            (KeySource::Server(secret), user) => {
                sha256_hex(format!("{}:{}", secret, user.unwrap_or("")).as_bytes())
            }
            (KeySource::Client(_), Some(user)) => {
                sha256_hex(format!("mcpgate-client:{}", user).as_bytes())
            }
            (KeySource::Client(session), None) => {
                tracing::warn!(
                    "No identity available; sealing credentials with an ephemeral session key (weaker, lost on restart)"
                );
                session.clone()
            }
        }
    }

    /// Seal `plaintext` for `username`
    pub fn seal(&self, plaintext: &str, username: Option<&str>) -> Result<EncryptedPayload> {
        encrypt(plaintext, &self.derive_password(username))
    }

    /// Open `payload` for `username`
    pub fn open(&self, payload: &EncryptedPayload, username: Option<&str>) -> Result<String> {
        decrypt(payload, &self.derive_password(username))
    }
}
