//! Signing keys resolved from a provider's JWKS.

use std::fmt;

use jsonwebtoken::jwk::{AlgorithmParameters, Jwk, JwkSet, KeyAlgorithm, PublicKeyUse};
use jsonwebtoken::{Algorithm, DecodingKey};

/// A public key usable for signature verification.
#[derive(Clone)]
pub struct SigningKey {
    /// Key id (`kid`) as published.
    pub kid: Option<String>,
    /// Algorithm the key is restricted to, when the JWK declares one.
    pub algorithm: Option<Algorithm>,
    /// The verification key.
    pub key: DecodingKey,
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

impl SigningKey {
    /// Returns `true` if this key may verify a token signed with `alg`.
    pub fn accepts(&self, alg: Algorithm) -> bool {
        self.algorithm.is_none_or(|a| a == alg)
    }
}

/// The usable signing keys of one provider.
///
/// Built from a complete JWKS document; a refresh replaces the whole set.
/// Encryption keys, symmetric keys and keys declaring a non-signature
/// algorithm are dropped.
#[derive(Clone, Default)]
pub struct KeySet {
    keys: Vec<SigningKey>,
}

impl fmt::Debug for KeySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.keys.iter().map(|k| &k.kid))
            .finish()
    }
}

impl KeySet {
    /// Converts a JWKS document, keeping only asymmetric signing keys.
    pub fn from_jwks(jwks: &JwkSet) -> Self {
        let keys: Vec<SigningKey> = jwks
            .keys
            .iter()
            .filter(|jwk| !matches!(jwk.common.public_key_use, Some(PublicKeyUse::Encryption)))
            .filter(|jwk| !matches!(jwk.algorithm, AlgorithmParameters::OctetKey(_)))
            .filter_map(|jwk| {
                let algorithm = match jwk_algorithm(jwk) {
                    Ok(algorithm) => algorithm,
                    Err(declared) => {
                        tracing::debug!(
                            kid = ?jwk.common.key_id,
                            alg = ?declared,
                            "Skipping JWK with a non-signature algorithm"
                        );
                        return None;
                    }
                };
                match DecodingKey::from_jwk(jwk) {
                    Ok(key) => Some(SigningKey {
                        kid: jwk.common.key_id.clone(),
                        algorithm,
                        key,
                    }),
                    Err(e) => {
                        tracing::debug!(
                            kid = ?jwk.common.key_id,
                            error = %e,
                            "Skipping unusable JWK"
                        );
                        None
                    }
                }
            })
            .collect();

        if keys.len() < jwks.keys.len() {
            tracing::debug!(
                published = jwks.keys.len(),
                usable = keys.len(),
                "Filtered provider JWKS"
            );
        }

        Self { keys }
    }

    /// Finds the key with this key id.
    pub fn get(&self, kid: &str) -> Option<&SigningKey> {
        self.keys.iter().find(|k| k.kid.as_deref() == Some(kid))
    }

    /// Returns every key that accepts `alg`.
    pub fn candidates(&self, alg: Algorithm) -> impl Iterator<Item = &SigningKey> {
        self.keys.iter().filter(move |k| k.accepts(alg))
    }

    /// Returns the number of usable keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns `true` if no usable key was published.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Returns `true` for public-key signature algorithms.
pub fn is_asymmetric(alg: Algorithm) -> bool {
    !matches!(alg, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512)
}

/// Extracts the signature algorithm a JWK declares.
///
/// `Ok(None)` when the JWK declares none. A declared algorithm that is not an
/// asymmetric signature algorithm is returned as the error.
fn jwk_algorithm(jwk: &Jwk) -> Result<Option<Algorithm>, KeyAlgorithm> {
    let Some(alg) = jwk.common.key_algorithm else {
        return Ok(None);
    };
    let algorithm = match alg {
        KeyAlgorithm::RS256 => Algorithm::RS256,
        KeyAlgorithm::RS384 => Algorithm::RS384,
        KeyAlgorithm::RS512 => Algorithm::RS512,
        KeyAlgorithm::ES256 => Algorithm::ES256,
        KeyAlgorithm::ES384 => Algorithm::ES384,
        KeyAlgorithm::PS256 => Algorithm::PS256,
        KeyAlgorithm::PS384 => Algorithm::PS384,
        KeyAlgorithm::PS512 => Algorithm::PS512,
        KeyAlgorithm::EdDSA => Algorithm::EdDSA,
        other => return Err(other),
    };
    Ok(Some(algorithm))
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
    use serde_json::json;

    fn jwks() -> JwkSet {
        let n = URL_SAFE_NO_PAD.encode([0xC3u8; 256]);
        serde_json::from_value(json!({
            "keys": [
                {"kty": "RSA", "kid": "sig-1", "use": "sig", "alg": "RS256", "n": n, "e": "AQAB"},
                {"kty": "RSA", "kid": "enc-1", "use": "enc", "n": n, "e": "AQAB"},
                {"kty": "oct", "kid": "hmac-1", "k": "c2VjcmV0LWtleS1tYXRlcmlhbA"},
                {"kty": "RSA", "kid": "sig-2", "n": n, "e": "AQAB"}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_from_jwks_drops_enc_and_symmetric() {
        let set = KeySet::from_jwks(&jwks());
        assert_eq!(set.len(), 2);
        assert!(set.get("sig-1").is_some());
        assert!(set.get("sig-2").is_some());
        assert!(set.get("enc-1").is_none());
        assert!(set.get("hmac-1").is_none());
    }

    #[test]
    fn test_algorithm_restriction() {
        let set = KeySet::from_jwks(&jwks());
        let restricted = set.get("sig-1").unwrap();
        assert_eq!(restricted.algorithm, Some(Algorithm::RS256));
        assert!(restricted.accepts(Algorithm::RS256));
        assert!(!restricted.accepts(Algorithm::PS256));

        let open = set.get("sig-2").unwrap();
        assert!(open.accepts(Algorithm::PS256));
        assert_eq!(set.candidates(Algorithm::PS256).count(), 1);
    }

    #[test]
    fn test_declared_non_signature_algorithm_is_dropped() {
        let n = URL_SAFE_NO_PAD.encode([0xC3u8; 256]);
        let jwks: JwkSet = serde_json::from_value(json!({
            "keys": [
                {"kty": "RSA", "kid": "wrap-1", "alg": "RSA-OAEP", "n": n, "e": "AQAB"},
                {"kty": "RSA", "kid": "sig-1", "alg": "PS256", "n": n, "e": "AQAB"}
            ]
        }))
        .unwrap();

        let set = KeySet::from_jwks(&jwks);
        assert_eq!(set.len(), 1);
        assert!(set.get("wrap-1").is_none());
        assert_eq!(set.candidates(Algorithm::RS256).count(), 0);
        assert_eq!(set.candidates(Algorithm::PS256).count(), 1);
    }

    #[test]
    fn test_is_asymmetric() {
        assert!(is_asymmetric(Algorithm::RS256));
        assert!(is_asymmetric(Algorithm::ES384));
        assert!(!is_asymmetric(Algorithm::HS256));
    }
}
