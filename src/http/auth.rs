//! Authentication header computation.
//!
//! Basic and bearer are plain header encodings. Digest implements the
//! RFC 7616 challenge-response (MD5, `qop=auth` preferred, one retry).
//! AWS requests are signed with Signature Version 4 over the canonical
//! request of host + x-amz-date.

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use md5::Md5;
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// `Basic` authorization header value.
pub fn basic_authorization(username: &str, password: &str) -> String {
    format!("Basic {}", BASE64.encode(format!("{username}:{password}")))
}

/// `Bearer` authorization header value.
pub fn bearer_authorization(token: &str) -> String {
    format!("Bearer {token}")
}

// ---------------------------------------------------------------------
// Digest
// ---------------------------------------------------------------------

/// Parses the key=value pairs of a `WWW-Authenticate: Digest …` header.
/// Returns `None` when the challenge is not a digest challenge.
pub fn parse_digest_challenge(header: &str) -> Option<HashMap<String, String>> {
    let rest = header.trim().strip_prefix("Digest")?.trim();
    let mut params = HashMap::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut pairs: Vec<String> = Vec::new();
    for c in rest.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            ',' if !in_quotes => pairs.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    pairs.push(current);
    for pair in pairs {
        if let Some((key, value)) = pair.split_once('=') {
            params.insert(
                key.trim().to_ascii_lowercase(),
                value.trim().trim_matches('"').to_string(),
            );
        }
    }
    Some(params)
}

fn md5_hex(input: &str) -> String {
    hex::encode(Md5::digest(input.as_bytes()))
}

/// Computes the `Authorization: Digest …` response header for a parsed
/// challenge. `cnonce` is injected so tests can pin it; callers pass a
/// random one. Returns `None` when the challenge lacks realm or nonce.
pub fn digest_authorization(
    challenge: &HashMap<String, String>,
    method: &str,
    uri: &str,
    username: &str,
    password: &str,
    cnonce: &str,
) -> Option<String> {
    let realm = challenge.get("realm")?;
    let nonce = challenge.get("nonce")?;
    let qop = challenge.get("qop").map(|q| {
        // Prefer `auth` when the server offers a list.
        if q.split(',').any(|t| t.trim() == "auth") {
            "auth".to_string()
        } else {
            q.trim().to_string()
        }
    });

    let ha1 = md5_hex(&format!("{username}:{realm}:{password}"));
    let ha2 = md5_hex(&format!("{method}:{uri}"));
    const NC: &str = "00000001";
    let response = match &qop {
        Some(qop) => md5_hex(&format!("{ha1}:{nonce}:{NC}:{cnonce}:{qop}:{ha2}")),
        None => md5_hex(&format!("{ha1}:{nonce}:{ha2}")),
    };

    let mut header = format!(
        "Digest username=\"{username}\", realm=\"{realm}\", nonce=\"{nonce}\", uri=\"{uri}\", response=\"{response}\""
    );
    if let Some(qop) = &qop {
        header.push_str(&format!(", qop={qop}, nc={NC}, cnonce=\"{cnonce}\""));
    }
    if let Some(opaque) = challenge.get("opaque") {
        header.push_str(&format!(", opaque=\"{opaque}\""));
    }
    if let Some(algorithm) = challenge.get("algorithm") {
        header.push_str(&format!(", algorithm={algorithm}"));
    }
    Some(header)
}

// ---------------------------------------------------------------------
// AWS Signature Version 4
// ---------------------------------------------------------------------

/// Headers to add for an AWS SigV4 signed request: `host`,
/// `x-amz-date`, `x-amz-content-sha256`, and `authorization`.
///
/// The canonical request covers the method, the URI path, the
/// lex-sorted query string, and the host + x-amz-date headers.
#[allow(clippy::too_many_arguments)]
pub fn sign_aws_v4(
    method: &str,
    url: &url::Url,
    body: &[u8],
    access_key: &str,
    secret_key: &str,
    region: &str,
    service: &str,
    now: DateTime<Utc>,
) -> Vec<(String, String)> {
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let date = now.format("%Y%m%d").to_string();
    let host = url.host_str().unwrap_or_default().to_string();
    let payload_hash = hex::encode(Sha256::digest(body));

    let mut query: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    query.sort();
    let canonical_query: Vec<String> = query
        .iter()
        .map(|(k, v)| {
            format!(
                "{}={}",
                urlencoding::encode(k),
                urlencoding::encode(v)
            )
        })
        .collect();

    let canonical_headers = format!("host:{host}\nx-amz-date:{amz_date}\n");
    let signed_headers = "host;x-amz-date";
    let canonical_request = format!(
        "{method}\n{path}\n{query}\n{canonical_headers}\n{signed_headers}\n{payload_hash}",
        path = url.path(),
        query = canonical_query.join("&"),
    );

    let scope = format!("{date}/{region}/{service}/aws4_request");
    let string_to_sign = format!(
        "AWS4-HMAC-SHA256\n{amz_date}\n{scope}\n{}",
        hex::encode(Sha256::digest(canonical_request.as_bytes()))
    );

    let signing_key = {
        let k_date = hmac_sha256(format!("AWS4{secret_key}").as_bytes(), date.as_bytes());
        let k_region = hmac_sha256(&k_date, region.as_bytes());
        let k_service = hmac_sha256(&k_region, service.as_bytes());
        hmac_sha256(&k_service, b"aws4_request")
    };
    let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes()));

    let authorization = format!(
        "AWS4-HMAC-SHA256 Credential={access_key}/{scope}, SignedHeaders={signed_headers}, Signature={signature}"
    );

    vec![
        ("host".to_string(), host),
        ("x-amz-date".to_string(), amz_date),
        ("x-amz-content-sha256".to_string(), payload_hash),
        ("authorization".to_string(), authorization),
    ]
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}
