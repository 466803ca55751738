//! # Tessera (identity and session backbone)
//!
//! `tessera` authenticates donor, beneficiary and staff accounts that share a
//! single identity table. Users log in with either their email or their phone
//! number and receive a short-lived access token plus a longer-lived refresh
//! token.
//!
//! ## Sessions
//!
//! Tokens are stateless signed claim sets. The server keeps only two kinds of
//! records in the revocation store:
//!
//! - **Blacklist entries** for tokens revoked before their natural expiry,
//!   kept exactly as long as the token would otherwise stay valid.
//! - **User token index entries** naming the refresh tokens that are the live
//!   session tokens of a user. Deleting them is how "log out everywhere"
//!   and password resets invalidate every session at once.
//!
//! Refresh tokens rotate on every use; the previous refresh token is claimed
//! atomically so a replayed token is rejected.
//!
//! ## Account state
//!
//! A session is only issued to an active account, and non-staff accounts must
//! also be verified through a one-time code delivered by email or SMS. Staff
//! accounts skip verification but may be asked to complete their staff profile.

pub mod api;
pub mod auth;
pub mod cli;
pub mod storage;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

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
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
