//! Export request signing
//!
//! The export API authenticates requests with an MD5 signature computed
//! over the sorted, URL-encoded query parameters plus the shared secret,
//! alongside an `expire` timestamp bounding the request's validity.

use chrono::Utc;
use md5::{Digest, Md5};
use std::collections::BTreeMap;

/// How long a signed request stays valid
const EXPIRE_SECONDS: i64 = 30;

/// Compute the signature over already-sorted params.
///
/// Concatenates `key=urlencoded(value)` for every present parameter in
/// key order, appends the secret, and hex-encodes the MD5 digest.
pub fn signature(params: &BTreeMap<String, String>, api_secret: &str) -> String {
    let mut payload = String::new();
    for (key, value) in params {
        payload.push_str(key);
        payload.push('=');
        payload.push_str(&urlencoding::encode(value));
    }
    payload.push_str(api_secret);

    hex::encode(Md5::digest(payload.as_bytes()))
}

/// Add `expire` and `sig` to a parameter set, returning the final query
/// pairs in sorted order
pub fn sign_params(
    params: &BTreeMap<String, String>,
    api_secret: &str,
) -> Vec<(String, String)> {
    let mut signed = params.clone();
    signed
        .entry("expire".to_string())
        .or_insert_with(|| (Utc::now().timestamp() + EXPIRE_SECONDS).to_string());

    let sig = signature(&signed, api_secret);
    signed.insert("sig".to_string(), sig);

    signed.into_iter().collect()
}
