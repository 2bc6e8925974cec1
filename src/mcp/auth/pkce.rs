//! PKCE S256 verifier/challenge pairs (RFC 7636)
//!
//! The verifier is 32 random bytes, base64url without padding (always 43
//! characters). The challenge is `BASE64URL(SHA256(ASCII(verifier)))`, also
//! unpadded. The verifier is persisted until the redirect comes back and is
//! then sent to the token endpoint; the challenge goes on the authorization URL.
//!
//! # References
//!
//! - RFC 7636 <https://www.rfc-editor.org/rfc/rfc7636>

use base64::Engine as _;
use rand::RngCore as _;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// The only challenge method this client emits.
pub const S256: &str = "S256";

/// A PKCE verifier and its S256 challenge.
///
/// # Examples
///
/// ```
/// use mcpgate::mcp::auth::pkce::{generate, s256_challenge};
///
/// let pkce = generate();
/// assert_eq!(pkce.verifier.len(), 43);
/// assert_eq!(pkce.challenge, s256_challenge(&pkce.verifier));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PkceChallenge {
    /// Secret sent to the token endpoint as `code_verifier`.
    pub verifier: String,
    /// Sent to the authorization endpoint as `code_challenge`.
    pub challenge: String,
    /// Always [`S256`].
    pub method: String,
}

/// Generate a fresh verifier/challenge pair.
pub fn generate() -> PkceChallenge {
    let mut random_bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut random_bytes);

    let verifier = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(random_bytes);
    let challenge = s256_challenge(&verifier);

    PkceChallenge {
        verifier,
        challenge,
        method: S256.to_string(),
    }
}

/// Compute the S256 challenge for `verifier`.
pub fn s256_challenge(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(digest.as_slice())
}
