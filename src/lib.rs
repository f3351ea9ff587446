//! # Elephants (club website admin backend)
//!
//! `elephants` authenticates the single site administrator and keeps
//! brute-force attempts against the login endpoint in check.
//!
//! ## Sessions
//!
//! There is no server-side session store. A successful login mints a signed
//! token `base64url(payload).base64url(hmac_sha256(payload))` that the browser
//! keeps in the `elephants_session` cookie. Every privileged request verifies
//! the signature and the embedded expiry, nothing more.
//!
//! ## Login throttling
//!
//! Failed logins are counted per client IP. Reaching the configured threshold
//! blocks the address for a fixed window; attempts during the window are
//! refused with `429 Too Many Requests` before credentials are checked. The
//! counters live either in process memory or in a JSON file guarded by an
//! advisory lock, so several worker processes can share them.

pub mod api;
pub mod cli;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};
