//! Integration tests exercising the provider stack against mock issuers.

mod caching;
mod discovery;

pub const JWKS_PATH: &str = "/.well-known/jwks.json";

/// Single-key JWKS document identified by `kid`.
pub fn jwks_body(kid: &str) -> String {
	format!(
		r#"{{
    "keys": [
        {{
            "kty": "RSA",
            "alg": "RS256",
            "use": "sig",
            "kid": "{kid}",
            "n": "AQIDBAUGBwgJCgsMDQ4PEBESExQVFhcYGRobHB0eHyAhIiMkJSYnKCkqKywtLi8wMTIzNDU2Nzg5Ojs8PT4_QEFCQ0RFRkdISUpLTE1OT1BRUlNUVVZXWFlaW1xdXl9gYWJjZGVmZ2hpamtsbW5vcHFyc3R1dnd4eXp7fH1-f4A",
            "e": "AQAB"
        }}
    ]
}}"#
	)
}

/// Key ids carried by a key set, in document order.
pub fn kids(jwks: &jsonwebtoken::jwk::JwkSet) -> Vec<String> {
	jwks.keys.iter().filter_map(|key| key.common.key_id.clone()).collect()
}
