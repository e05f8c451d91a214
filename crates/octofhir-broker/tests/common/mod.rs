//! Mock identity provider shared by the integration tests.

#![allow(dead_code)]

use std::sync::{Arc, LazyLock};
use std::time::{SystemTime, UNIX_EPOCH};

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use octofhir_broker::{AuthBroker, BrokerConfig, ProviderConfig, ProviderRegistry};
use p384::SecretKey as EcSecretKey;
use p384::ecdsa::SigningKey as EcSigningKey;
use p384::pkcs8::EncodePrivateKey as EcEncodePrivateKey;
use rand::rngs::OsRng;
use rsa::RsaPrivateKey;
use rsa::pkcs8::{EncodePrivateKey, LineEnding};
use rsa::traits::PublicKeyParts;
use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const CLIENT_ID: &str = "console";
pub const CLIENT_SECRET: &str = "console-secret";

/// Primary RSA signing key.
pub static RSA_KEY: LazyLock<TestKey> = LazyLock::new(TestKey::rsa);

/// Second RSA key, used for rotation and forged signatures.
pub static OTHER_RSA_KEY: LazyLock<TestKey> = LazyLock::new(TestKey::rsa);

/// P-384 signing key.
pub static EC_KEY: LazyLock<TestKey> = LazyLock::new(TestKey::ec);

/// A private key plus the public JWK parameters a provider would publish.
pub struct TestKey {
    algorithm: Algorithm,
    encoding_key: EncodingKey,
    public_jwk: Value,
}

impl TestKey {
    fn rsa() -> Self {
        let private_key = RsaPrivateKey::new(&mut OsRng, 2048).unwrap();
        let public_key = private_key.to_public_key();
        let private_pem = private_key.to_pkcs8_pem(LineEnding::LF).unwrap();

        Self {
            algorithm: Algorithm::RS256,
            encoding_key: EncodingKey::from_rsa_pem(private_pem.as_bytes()).unwrap(),
            public_jwk: json!({
                "kty": "RSA",
                "use": "sig",
                "alg": "RS256",
                "n": URL_SAFE_NO_PAD.encode(public_key.n().to_bytes_be()),
                "e": URL_SAFE_NO_PAD.encode(public_key.e().to_bytes_be()),
            }),
        }
    }

    fn ec() -> Self {
        let secret_key = EcSecretKey::random(&mut OsRng);
        let signing_key = EcSigningKey::from(&secret_key);
        let point = signing_key.verifying_key().to_encoded_point(false);
        let private_pem = secret_key.to_pkcs8_pem(LineEnding::LF).unwrap();

        Self {
            algorithm: Algorithm::ES384,
            encoding_key: EncodingKey::from_ec_pem(private_pem.as_bytes()).unwrap(),
            public_jwk: json!({
                "kty": "EC",
                "use": "sig",
                "alg": "ES384",
                "crv": "P-384",
                "x": URL_SAFE_NO_PAD.encode(point.x().unwrap().as_slice()),
                "y": URL_SAFE_NO_PAD.encode(point.y().unwrap().as_slice()),
            }),
        }
    }

    /// Public JWK published under `kid`.
    pub fn jwk(&self, kid: &str) -> Value {
        let mut jwk = self.public_jwk.clone();
        jwk["kid"] = json!(kid);
        jwk
    }

    /// Signs `claims` with a header naming `kid`.
    pub fn sign(&self, kid: &str, claims: &Value) -> String {
        let mut header = Header::new(self.algorithm);
        header.kid = Some(kid.to_string());
        encode(&header, claims, &self.encoding_key).unwrap()
    }

    /// Signs `claims` without a key id.
    pub fn sign_without_kid(&self, claims: &Value) -> String {
        encode(&Header::new(self.algorithm), claims, &self.encoding_key).unwrap()
    }
}

pub fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

/// A wiremock server impersonating an OIDC provider.
pub struct MockIdp {
    pub server: MockServer,
}

impl MockIdp {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    pub fn issuer(&self) -> String {
        self.server.uri()
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.server.uri())
    }

    pub fn discovery_document(&self) -> Value {
        json!({
            "issuer": self.issuer(),
            "authorization_endpoint": self.url("/authorize"),
            "token_endpoint": self.url("/token"),
            "userinfo_endpoint": self.url("/userinfo"),
            "jwks_uri": self.url("/jwks"),
            "response_types_supported": ["code"],
            "grant_types_supported": ["authorization_code", "refresh_token", "password"],
            "id_token_signing_alg_values_supported": ["RS256", "ES384"]
        })
    }

    /// Serves the discovery document, expecting exactly `expected` fetches.
    pub async fn mount_discovery(&self, expected: u64) {
        self.mount_discovery_document(self.discovery_document(), expected)
            .await;
    }

    pub async fn mount_discovery_document(&self, document: Value, expected: u64) {
        Mock::given(method("GET"))
            .and(path("/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(document))
            .expect(expected)
            .mount(&self.server)
            .await;
    }

    /// Serves a JWKS containing `keys`, expecting exactly `expected` fetches.
    pub async fn mount_jwks(&self, keys: Vec<Value>, expected: u64) {
        Mock::given(method("GET"))
            .and(path("/jwks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "keys": keys })))
            .expect(expected)
            .mount(&self.server)
            .await;
    }

    /// Standard valid ID token claims for `sub`.
    pub fn claims(&self, sub: &str) -> Value {
        let now = now();
        json!({
            "iss": self.issuer(),
            "aud": CLIENT_ID,
            "sub": sub,
            "iat": now,
            "nbf": now,
            "exp": now + 300,
        })
    }

    /// OIDC provider configuration pointing at this server.
    pub fn oidc_provider(&self, id: &str, extra: Value) -> ProviderConfig {
        let mut config = json!({
            "providerType": "oidc",
            "id": id,
            "issuer": self.issuer(),
            "clientId": CLIENT_ID,
            "clientSecret": CLIENT_SECRET,
            "scopes": ["openid", "profile"],
        });
        merge(&mut config, extra);
        serde_json::from_value(config).unwrap()
    }

    /// OAuth2 provider configuration pointing at this server.
    pub fn oauth2_provider(&self, id: &str, extra: Value) -> ProviderConfig {
        let mut config = json!({
            "providerType": "oauth2",
            "id": id,
            "issuer": "github",
            "authorizationUrl": self.url("/login/oauth/authorize"),
            "tokenUrl": self.url("/login/oauth/access_token"),
            "userinfoUrl": self.url("/user"),
            "clientId": CLIENT_ID,
            "clientSecret": CLIENT_SECRET,
            "scopes": ["read:user"],
            "usernameClaim": "login",
        });
        merge(&mut config, extra);
        serde_json::from_value(config).unwrap()
    }
}

fn merge(base: &mut Value, extra: Value) {
    if let (Some(base), Value::Object(extra)) = (base.as_object_mut(), extra) {
        base.extend(extra);
    }
}

/// Broker configuration that permits the mock server's plain HTTP.
pub fn test_config() -> BrokerConfig {
    BrokerConfig::default().with_allow_http(true)
}

/// Builds a broker over `providers`.
pub fn broker(providers: Vec<ProviderConfig>) -> Arc<AuthBroker> {
    let registry = ProviderRegistry::new(true);
    for provider in providers {
        registry.register(provider).unwrap();
    }
    Arc::new(AuthBroker::new(test_config(), Arc::new(registry)).unwrap())
}
