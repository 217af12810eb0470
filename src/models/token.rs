use serde::{Deserialize, Serialize};

// One entry of the remote token list. Only `token` is read; other fields
// the list may carry are ignored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RawToken {
    #[serde(default)]
    pub token: String,
}

// Claims read from the middle JWT segment without any signature check.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenClaims {
    #[serde(default)]
    pub lock_region: Option<String>,
    #[serde(default)]
    pub noti_region: Option<String>,
    #[serde(default, deserialize_with = "deserialize_opt_id")]
    pub account_id: Option<String>,
    #[serde(default)]
    pub nickname: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TokenRecord {
    #[serde(skip_serializing)]
    pub token: String,
    pub region: String,
    pub account_id: Option<String>,
    pub nickname: Option<String>,
    // Always false: claims are decoded, never verified.
    pub claims_verified: bool,
}

// `account_id` shows up as either a JSON number or a string.
fn deserialize_opt_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumOrString {
        Num(u64),
        Str(String),
    }

    Ok(match Option::<NumOrString>::deserialize(deserializer)? {
        Some(NumOrString::Num(n)) => Some(n.to_string()),
        Some(NumOrString::Str(s)) if !s.trim().is_empty() => Some(s),
        _ => None,
    })
}
