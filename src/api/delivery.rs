//! Out-of-band delivery of one-time codes.
//!
//! The service hands the plaintext code to a [`CodeSender`] right after the
//! challenge row is written; only its hash is stored. The default sender for
//! local dev is [`LogCodeSender`], which logs and returns `Ok(())`.

use anyhow::Result;
use tracing::debug;

use crate::identity::models::{MfaMethodType, UserId};

#[derive(Clone, Debug)]
pub struct CodeDelivery {
    pub user_id: UserId,
    pub email: String,
    pub method_type: MfaMethodType,
    pub challenge_id: i64,
    pub code: String,
}

/// Delivery channel abstraction used by the MFA handlers.
pub trait CodeSender: Send + Sync {
    /// Deliver a code or return an error so the caller can report it.
    fn send(&self, delivery: &CodeDelivery) -> Result<()>;
}

/// Local dev sender that logs the code instead of delivering it.
#[derive(Clone, Debug)]
pub struct LogCodeSender;

impl CodeSender for LogCodeSender {
    fn send(&self, delivery: &CodeDelivery) -> Result<()> {
        debug!(
            user_id = delivery.user_id,
            to = %delivery.email,
            method = delivery.method_type.as_str(),
            challenge_id = delivery.challenge_id,
            code = %delivery.code,
            "mfa code send stub"
        );
        Ok(())
    }
}
