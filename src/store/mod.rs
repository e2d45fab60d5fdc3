//! Storage seam for the IAM data model.
//!
//! `IamStore` is the only way the service touches persistent state. Two
//! implementations exist: [`postgres::PgStore`] for production and
//! [`memory::MemoryStore`] for tests and `memory://` local runs. Both must
//! give the same atomicity on the two conditional updates (session end and
//! challenge consumption) so exactly one concurrent caller wins.
//!
//! Timestamps are supplied by the caller, never read from the database clock,
//! so expiry checks behave the same on both backends.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::identity::{
    IamResult,
    models::{
        AccountStatus, ActiveSession, AuthLog, AuthSession, MfaChallenge, MfaMethod, NewAuthLog,
        NewMfaChallenge, NewMfaMethod, NewSession, NewUser, Role, RoleSummary, User, UserId,
        UserWithRoles,
    },
};

pub mod memory;
pub mod postgres;

pub const DEFAULT_PAGE_SIZE: i64 = 50;
pub const MAX_PAGE_SIZE: i64 = 100;
pub const DEFAULT_AUDIT_LIMIT: i64 = 100;
pub const MAX_AUDIT_LIMIT: i64 = 500;
pub const MAX_ACTIVE_SESSIONS: i64 = 500;

/// One-based page request, already clamped to valid bounds.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Pagination {
    page: i64,
    per_page: i64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: DEFAULT_PAGE_SIZE,
        }
    }
}

impl Pagination {
    /// `page` below 1 becomes 1; `per_page` is clamped to `1..=100`.
    #[must_use]
    pub fn clamped(page: Option<i64>, per_page: Option<i64>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            per_page: per_page
                .unwrap_or(DEFAULT_PAGE_SIZE)
                .clamp(1, MAX_PAGE_SIZE),
        }
    }

    #[must_use]
    pub const fn page(&self) -> i64 {
        self.page
    }

    #[must_use]
    pub const fn per_page(&self) -> i64 {
        self.per_page
    }

    #[must_use]
    pub const fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.per_page)
    }
}

/// Clamp an audit `limit` to `1..=500`, defaulting to 100.
#[must_use]
pub fn audit_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_AUDIT_LIMIT).clamp(1, MAX_AUDIT_LIMIT)
}

#[derive(Clone, Debug)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub pages: i64,
}

impl<T> Page<T> {
    #[must_use]
    pub fn new(items: Vec<T>, total: i64, request: Pagination) -> Self {
        let per_page = request.per_page();
        let pages = if total <= 0 {
            0
        } else {
            (total + per_page - 1) / per_page
        };
        Self {
            items,
            total,
            page: request.page(),
            per_page,
            pages,
        }
    }
}

#[async_trait]
pub trait IamStore: Send + Sync {
    /// Round-trip to the backend; used by `/healthz` and `check-db`.
    async fn ping(&self) -> IamResult<()>;

    // users
    async fn create_user(&self, new_user: NewUser) -> IamResult<User>;
    async fn user_by_id(&self, user_id: UserId) -> IamResult<Option<User>>;
    async fn user_by_username(&self, username: &str) -> IamResult<Option<User>>;
    async fn account_status(&self, user_id: UserId) -> IamResult<Option<AccountStatus>>;
    /// Returns false when the user does not exist.
    async fn set_account_status(
        &self,
        user_id: UserId,
        status: AccountStatus,
        updated_by: Option<&str>,
    ) -> IamResult<bool>;
    async fn delete_user(&self, user_id: UserId) -> IamResult<bool>;
    async fn list_users(&self, pagination: Pagination) -> IamResult<Page<UserWithRoles>>;

    // roles
    async fn create_role(&self, role_name: &str, description: Option<&str>) -> IamResult<Role>;
    async fn list_roles(&self) -> IamResult<Vec<RoleSummary>>;
    /// Sorted role names held by the user.
    async fn role_names(&self, user_id: UserId) -> IamResult<Vec<String>>;
    /// Idempotent; `NotFound` for an unknown user or role.
    async fn assign_role(
        &self,
        user_id: UserId,
        role_name: &str,
        assigned_by: Option<&str>,
        at: DateTime<Utc>,
    ) -> IamResult<()>;
    async fn revoke_role(&self, user_id: UserId, role_name: &str) -> IamResult<bool>;

    // sessions
    /// Insert the session and stamp the owner's `last_login_at` with its
    /// `login_time`; both writes commit together or not at all.
    async fn insert_session(&self, session: NewSession) -> IamResult<AuthSession>;
    async fn session(&self, session_id: &str) -> IamResult<Option<AuthSession>>;
    /// Set `logout_time` only if still open; returns the owner when a row changed.
    async fn end_session(&self, session_id: &str, at: DateTime<Utc>) -> IamResult<Option<UserId>>;
    /// Open sessions, newest first, at most `limit`.
    async fn active_sessions(&self, limit: i64) -> IamResult<Vec<ActiveSession>>;

    // mfa
    /// Insert a method; when primary, clear other primaries of the user atomically.
    async fn insert_mfa_method(
        &self,
        method: NewMfaMethod,
        at: DateTime<Utc>,
    ) -> IamResult<MfaMethod>;
    async fn mfa_methods(&self, user_id: UserId) -> IamResult<Vec<MfaMethod>>;
    async fn active_mfa_count(&self, user_id: UserId) -> IamResult<i64>;
    async fn insert_challenge(&self, challenge: NewMfaChallenge) -> IamResult<MfaChallenge>;
    async fn challenge(&self, challenge_id: i64) -> IamResult<Option<MfaChallenge>>;
    /// Compare-and-set on `consumed_at IS NULL AND expires_at > at`.
    async fn consume_challenge(&self, challenge_id: i64, at: DateTime<Utc>) -> IamResult<bool>;

    // audit
    async fn append_auth_log(&self, entry: NewAuthLog) -> IamResult<()>;
    /// Newest first, at most `limit`.
    async fn recent_auth_logs(&self, limit: i64) -> IamResult<Vec<AuthLog>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_defaults_and_clamps() {
        assert_eq!(Pagination::clamped(None, None), Pagination::default());
        let p = Pagination::clamped(Some(0), Some(1000));
        assert_eq!((p.page(), p.per_page()), (1, 100));
        let p = Pagination::clamped(Some(-4), Some(0));
        assert_eq!((p.page(), p.per_page()), (1, 1));
        let p = Pagination::clamped(Some(3), Some(20));
        assert_eq!(p.offset(), 40);
    }

    #[test]
    fn page_count_rounds_up() {
        let request = Pagination::clamped(Some(1), Some(10));
        assert_eq!(Page::<()>::new(Vec::new(), 0, request).pages, 0);
        assert_eq!(Page::<()>::new(Vec::new(), 10, request).pages, 1);
        assert_eq!(Page::<()>::new(Vec::new(), 11, request).pages, 2);
    }

    #[test]
    fn audit_limit_bounds() {
        assert_eq!(audit_limit(None), 100);
        assert_eq!(audit_limit(Some(0)), 1);
        assert_eq!(audit_limit(Some(9999)), 500);
        assert_eq!(audit_limit(Some(25)), 25);
    }
}
