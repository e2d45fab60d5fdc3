//! # IAM (Identity and Access Management)
//!
//! `iam` authenticates users with local passwords, issues server-side sessions,
//! answers role checks, runs one-time MFA challenges and keeps an append-only
//! audit trail of authentication events.
//!
//! ## Sessions
//!
//! A login returns a random 32-byte token (URL-safe base64) both as the
//! `iam_session` cookie and in the JSON body. The database keys the session by
//! the SHA-256 of that token, so a leaked table cannot be replayed. Sessions
//! are checked on every request: an ended, expired or disabled-account session
//! is rejected immediately even though its row is untouched.
//!
//! ## Storage
//!
//! All persistence goes through [`store::IamStore`]. Production uses
//! PostgreSQL (`sql/schema.sql`); `--dsn memory://` and the test suite use an
//! in-process store with the same atomicity guarantees.
//!
//! ## Audit
//!
//! Every login attempt, logout, MFA issue and MFA verification appends one
//! row to `iam_auth_log`. A failing audit write is logged and never fails the
//! operation that produced it.

pub mod api;
pub mod cli;
pub mod identity;
pub mod store;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(
            GIT_COMMIT_HASH.len() >= 7,
            "GIT_COMMIT_HASH should be at least 7 characters long, got: {GIT_COMMIT_HASH}"
        );
    }
}
