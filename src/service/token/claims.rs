use base64::Engine;
use sha2::{Digest, Sha256};

use crate::models::{RawToken, TokenClaims, TokenRecord};

const PLACEHOLDER_TOKENS: [&str; 1] = ["N/A"];
const PREVIEW_CHARS: usize = 12;

// Reads the claims segment of a JWT-shaped token. The signature is NOT
// checked, so nothing decoded here may be used for authorization or routing.
pub fn decode_unverified_claims(token: &str) -> Option<TokenClaims> {
    let mut parts = token.split('.');
    let (_, payload, _) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }
    let trimmed = payload.trim_end_matches('=');
    let decoded = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(trimmed)
        .ok()?;
    serde_json::from_slice(&decoded).ok()
}

pub fn region_from_claims(claims: Option<&TokenClaims>, default_region: &str) -> String {
    claims
        .and_then(|c| {
            c.lock_region
                .as_deref()
                .filter(|r| !r.trim().is_empty())
                .or_else(|| c.noti_region.as_deref().filter(|r| !r.trim().is_empty()))
        })
        .unwrap_or(default_region)
        .trim()
        .to_ascii_uppercase()
}

pub fn build_record(raw: RawToken, default_region: &str) -> Option<TokenRecord> {
    let token = raw.token.trim().to_string();
    if token.is_empty() || PLACEHOLDER_TOKENS.contains(&token.as_str()) {
        return None;
    }
    let claims = decode_unverified_claims(&token);
    let region = region_from_claims(claims.as_ref(), default_region);
    let (account_id, nickname) = match claims {
        Some(c) => (c.account_id, c.nickname.map(|n| n.chars().take(20).collect())),
        None => (None, None),
    };
    Some(TokenRecord {
        token,
        region,
        account_id,
        nickname,
        claims_verified: false,
    })
}

pub fn token_preview(token: &str) -> String {
    let head: String = token.chars().take(PREVIEW_CHARS).collect();
    if token.chars().count() > PREVIEW_CHARS {
        format!("{}...", head)
    } else {
        head
    }
}

pub fn token_fingerprint(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    hex::encode(&digest[..8])
}

#[cfg(test)]
pub(crate) fn make_test_jwt(claims: serde_json::Value) -> String {
    let engine = base64::engine::general_purpose::URL_SAFE_NO_PAD;
    format!(
        "{}.{}.{}",
        engine.encode(br#"{"alg":"HS256","typ":"JWT"}"#),
        engine.encode(claims.to_string().as_bytes()),
        engine.encode(b"signature")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn claims_are_read_from_middle_segment() {
        let token = make_test_jwt(json!({
            "lock_region": "ind",
            "account_id": 99,
            "nickname": "player"
        }));
        let claims = decode_unverified_claims(&token).expect("claims");
        assert_eq!(claims.lock_region.as_deref(), Some("ind"));
        assert_eq!(claims.account_id.as_deref(), Some("99"));
    }

    #[test]
    fn padded_payload_is_tolerated() {
        let engine = base64::engine::general_purpose::URL_SAFE;
        let token = format!(
            "h.{}.s",
            engine.encode(json!({"noti_region": "eu"}).to_string().as_bytes())
        );
        let claims = decode_unverified_claims(&token).expect("claims");
        assert_eq!(claims.noti_region.as_deref(), Some("eu"));
    }

    #[test]
    fn malformed_tokens_have_no_claims() {
        assert!(decode_unverified_claims("opaque-token").is_none());
        assert!(decode_unverified_claims("a.b").is_none());
        assert!(decode_unverified_claims("a.!!!.c").is_none());
        assert!(decode_unverified_claims("a.b.c.d").is_none());
    }

    #[test]
    fn region_prefers_lock_then_noti_then_default() {
        let both = TokenClaims {
            lock_region: Some("sg".into()),
            noti_region: Some("br".into()),
            ..Default::default()
        };
        assert_eq!(region_from_claims(Some(&both), "x"), "SG");

        let noti_only = TokenClaims {
            lock_region: Some("".into()),
            noti_region: Some("br".into()),
            ..Default::default()
        };
        assert_eq!(region_from_claims(Some(&noti_only), "x"), "BR");
        assert_eq!(region_from_claims(None, "unknown"), "UNKNOWN");
    }

    #[test]
    fn placeholder_and_empty_entries_are_dropped() {
        assert!(build_record(RawToken { token: "".into() }, "X").is_none());
        assert!(build_record(RawToken { token: "N/A".into() }, "X").is_none());
        let record = build_record(RawToken { token: "opaque".into() }, "X").expect("record");
        assert_eq!(record.region, "X");
        assert!(!record.claims_verified);
    }

    #[test]
    fn nickname_is_truncated() {
        let token = make_test_jwt(json!({"nickname": "a".repeat(40)}));
        let record = build_record(RawToken { token }, "X").expect("record");
        assert_eq!(record.nickname.map(|n| n.len()), Some(20));
    }

    #[test]
    fn preview_and_fingerprint_hide_the_secret() {
        let token = "abcdefghijklmnopqrstuvwxyz";
        assert_eq!(token_preview(token), "abcdefghijkl...");
        assert_eq!(token_preview("short"), "short");
        let fp = token_fingerprint(token);
        assert_eq!(fp.len(), 16);
        assert_eq!(fp, token_fingerprint(token));
    }
}
