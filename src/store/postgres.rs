//! PostgreSQL `IamStore` on a shared `sqlx::PgPool`.
//!
//! Every statement runs inside a `db.query` span. Connection-level failures
//! (pool timeout, I/O, TLS, SQLSTATE class 08, cancellation, admin shutdown)
//! are reported as `StoreUnavailable`; the HTTP layer turns that into 503.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    Connection, PgPool, Row,
    postgres::{PgConnectOptions, PgPoolOptions, PgRow},
};
use std::{str::FromStr, time::Duration};
use tracing::{Instrument, Span, info_span};

use super::{IamStore, Page, Pagination};
use crate::identity::{
    IamError, IamResult,
    models::{
        AccountStatus, ActiveSession, AuthEventType, AuthLog, AuthProvider, AuthSession,
        ChallengePurpose, MfaChallenge, MfaMethod, MfaMethodType, NewAuthLog, NewMfaChallenge,
        NewMfaMethod, NewSession, NewUser, Role, RoleSummary, User, UserId, UserWithRoles,
    },
};

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";
const CHECK_VIOLATION: &str = "23514";

/// Pool sizing and timeouts.
#[derive(Clone, Copy, Debug)]
pub struct PoolSettings {
    pub max_connections: u32,
    pub timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 5,
            timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect and bound both pool acquisition and server-side statement time.
    ///
    /// # Errors
    /// Returns an error if the DSN is invalid or the first connection fails.
    pub async fn connect(dsn: &str, settings: PoolSettings) -> anyhow::Result<Self> {
        let timeout_ms = settings.timeout.as_millis();
        let options = PgConnectOptions::from_str(dsn)
            .context("Invalid database connection string")?
            .options([("statement_timeout", format!("{timeout_ms}"))]);

        let pool = PgPoolOptions::new()
            .min_connections(1)
            .max_connections(settings.max_connections)
            .acquire_timeout(settings.timeout)
            .max_lifetime(Duration::from_secs(60 * 2))
            .test_before_acquire(true)
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;

        Ok(Self { pool })
    }

    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn db_span(operation: &'static str, statement: &'static str) -> Span {
    info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

fn sqlstate(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().map(|code| code.to_string()),
        _ => None,
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    sqlstate(err).is_some_and(|code| code == UNIQUE_VIOLATION)
}

fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    sqlstate(err).is_some_and(|code| code == FOREIGN_KEY_VIOLATION)
}

fn is_unavailable_sqlstate(code: &str) -> bool {
    code.starts_with("08") || matches!(code, "57014" | "57P01" | "57P02" | "57P03")
}

/// Map a driver error onto the domain taxonomy.
pub(crate) fn classify(err: sqlx::Error) -> IamError {
    match &err {
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::WorkerCrashed => IamError::StoreUnavailable(err.to_string()),
        sqlx::Error::Database(db_err) => {
            let code = db_err.code().map(|code| code.to_string()).unwrap_or_default();
            if is_unavailable_sqlstate(&code) {
                IamError::StoreUnavailable(err.to_string())
            } else if code == CHECK_VIOLATION {
                IamError::validation("Local accounts require a password")
            } else {
                IamError::internal(&err)
            }
        }
        _ => IamError::internal(&err),
    }
}

impl From<sqlx::Error> for IamError {
    fn from(err: sqlx::Error) -> Self {
        classify(err)
    }
}

fn label<T>(value: &str, parse: fn(&str) -> Option<T>, column: &str) -> IamResult<T> {
    parse(value).ok_or_else(|| IamError::internal(format!("unexpected {column} value: {value}")))
}

fn user_from_row(row: &PgRow) -> IamResult<User> {
    let provider: String = row.try_get("auth_provider")?;
    Ok(User {
        user_id: row.try_get("user_id")?,
        parent_id: row.try_get("parent_id")?,
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        phone_number: row.try_get("phone_number")?,
        display_name: row.try_get("display_name")?,
        auth_provider: label(&provider, AuthProvider::parse, "auth_provider")?,
        password_hash: row.try_get("password_hash")?,
        is_active: row.try_get("is_active")?,
        is_locked: row.try_get("is_locked")?,
        last_login_at: row.try_get("last_login_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        created_by: row.try_get("created_by")?,
        updated_by: row.try_get("updated_by")?,
    })
}

fn role_from_row(row: &PgRow) -> IamResult<Role> {
    Ok(Role {
        role_id: row.try_get("role_id")?,
        role_name: row.try_get("role_name")?,
        role_description: row.try_get("role_description")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn session_from_row(row: &PgRow) -> IamResult<AuthSession> {
    Ok(AuthSession {
        session_id: row.try_get("session_id")?,
        user_id: row.try_get("user_id")?,
        login_time: row.try_get("login_time")?,
        logout_time: row.try_get("logout_time")?,
        ip_address: row.try_get("ip_address")?,
        user_agent: row.try_get("user_agent")?,
        sso_idp_session_ref: row.try_get("sso_idp_session_ref")?,
        created_at: row.try_get("created_at")?,
    })
}

fn method_from_row(row: &PgRow) -> IamResult<MfaMethod> {
    let method_type: String = row.try_get("method_type")?;
    Ok(MfaMethod {
        mfa_id: row.try_get("mfa_id")?,
        user_id: row.try_get("user_id")?,
        method_type: label(&method_type, MfaMethodType::parse, "method_type")?,
        secret_ciphertext: row.try_get("secret_ciphertext")?,
        is_primary: row.try_get("is_primary")?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn challenge_from_row(row: &PgRow) -> IamResult<MfaChallenge> {
    let method_type: String = row.try_get("method_type")?;
    let purpose: String = row.try_get("purpose")?;
    Ok(MfaChallenge {
        challenge_id: row.try_get("challenge_id")?,
        user_id: row.try_get("user_id")?,
        method_type: label(&method_type, MfaMethodType::parse, "method_type")?,
        otp_code_hash: row.try_get("otp_code_hash")?,
        issued_at: row.try_get("issued_at")?,
        expires_at: row.try_get("expires_at")?,
        consumed_at: row.try_get("consumed_at")?,
        ip_address: row.try_get("ip_address")?,
        purpose: label(&purpose, ChallengePurpose::parse, "purpose")?,
    })
}

#[async_trait]
impl IamStore for PgStore {
    async fn ping(&self) -> IamResult<()> {
        let acquire_span = info_span!(
            "db.acquire",
            db.system = "postgresql",
            db.operation = "ACQUIRE"
        );
        let mut conn = self.pool.acquire().instrument(acquire_span).await?;
        let ping_span = info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
        conn.ping().instrument(ping_span).await?;
        Ok(())
    }

    async fn create_user(&self, new_user: NewUser) -> IamResult<User> {
        let query = r"
            INSERT INTO iam_user_account
                (parent_id, username, email, phone_number, display_name,
                 auth_provider, password_hash, created_by, updated_by)
            VALUES ($1, $2, $3, $4, $5, $6::auth_provider_enum, $7, $8, $8)
            RETURNING user_id, parent_id, username, email, phone_number, display_name,
                auth_provider::text AS auth_provider, password_hash, is_active, is_locked,
                last_login_at, created_at, updated_at, created_by, updated_by
        ";
        let password_hash = if new_user.auth_provider == AuthProvider::Local {
            new_user.password_hash
        } else {
            None
        };
        let row = sqlx::query(query)
            .bind(new_user.parent_id)
            .bind(&new_user.username)
            .bind(&new_user.email)
            .bind(&new_user.phone_number)
            .bind(&new_user.display_name)
            .bind(new_user.auth_provider.as_str())
            .bind(password_hash)
            .bind(&new_user.created_by)
            .fetch_one(&self.pool)
            .instrument(db_span("INSERT", query))
            .await
            .map_err(|err| {
                if is_unique_violation(&err) {
                    IamError::conflict("User")
                } else {
                    classify(err)
                }
            })?;
        user_from_row(&row)
    }

    async fn user_by_id(&self, user_id: UserId) -> IamResult<Option<User>> {
        let query = r"
            SELECT user_id, parent_id, username, email, phone_number, display_name,
                auth_provider::text AS auth_provider, password_hash, is_active, is_locked,
                last_login_at, created_at, updated_at, created_by, updated_by
            FROM iam_user_account
            WHERE user_id = $1
        ";
        let row = sqlx::query(query)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", query))
            .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn user_by_username(&self, username: &str) -> IamResult<Option<User>> {
        let query = r"
            SELECT user_id, parent_id, username, email, phone_number, display_name,
                auth_provider::text AS auth_provider, password_hash, is_active, is_locked,
                last_login_at, created_at, updated_at, created_by, updated_by
            FROM iam_user_account
            WHERE username = $1
        ";
        let row = sqlx::query(query)
            .bind(username)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", query))
            .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn account_status(&self, user_id: UserId) -> IamResult<Option<AccountStatus>> {
        let query = "SELECT is_active, is_locked FROM iam_user_account WHERE user_id = $1";
        let row = sqlx::query(query)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", query))
            .await?;
        row.map(|row| {
            Ok(AccountStatus {
                is_active: row.try_get("is_active")?,
                is_locked: row.try_get("is_locked")?,
            })
        })
        .transpose()
    }

    async fn set_account_status(
        &self,
        user_id: UserId,
        status: AccountStatus,
        updated_by: Option<&str>,
    ) -> IamResult<bool> {
        let query = r"
            UPDATE iam_user_account
            SET is_active = $2, is_locked = $3, updated_by = $4, updated_at = $5
            WHERE user_id = $1
        ";
        let result = sqlx::query(query)
            .bind(user_id)
            .bind(status.is_active)
            .bind(status.is_locked)
            .bind(updated_by)
            .bind(Utc::now())
            .execute(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_user(&self, user_id: UserId) -> IamResult<bool> {
        let query = "DELETE FROM iam_user_account WHERE user_id = $1";
        let result = sqlx::query(query)
            .bind(user_id)
            .execute(&self.pool)
            .instrument(db_span("DELETE", query))
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_users(&self, pagination: Pagination) -> IamResult<Page<UserWithRoles>> {
        let count_query = "SELECT COUNT(*) AS total FROM iam_user_account";
        let total: i64 = sqlx::query(count_query)
            .fetch_one(&self.pool)
            .instrument(db_span("SELECT", count_query))
            .await?
            .try_get("total")?;

        let query = r"
            SELECT u.user_id, u.parent_id, u.username, u.email, u.phone_number, u.display_name,
                u.auth_provider::text AS auth_provider, u.password_hash, u.is_active, u.is_locked,
                u.last_login_at, u.created_at, u.updated_at, u.created_by, u.updated_by,
                COALESCE(
                    array_agg(r.role_name::text ORDER BY r.role_name)
                        FILTER (WHERE r.role_name IS NOT NULL),
                    '{}'::text[]
                ) AS roles
            FROM iam_user_account u
            LEFT JOIN iam_user_role ur ON ur.user_id = u.user_id
            LEFT JOIN iam_role r ON r.role_id = ur.role_id
            GROUP BY u.user_id
            ORDER BY u.created_at DESC, u.user_id DESC
            LIMIT $1 OFFSET $2
        ";
        let rows = sqlx::query(query)
            .bind(pagination.per_page())
            .bind(pagination.offset())
            .fetch_all(&self.pool)
            .instrument(db_span("SELECT", query))
            .await?;

        let items = rows
            .iter()
            .map(|row| {
                Ok(UserWithRoles {
                    user: user_from_row(row)?,
                    roles: row.try_get("roles")?,
                })
            })
            .collect::<IamResult<Vec<_>>>()?;
        Ok(Page::new(items, total, pagination))
    }

    async fn create_role(&self, role_name: &str, description: Option<&str>) -> IamResult<Role> {
        let query = r"
            INSERT INTO iam_role (role_name, role_description)
            VALUES ($1, $2)
            RETURNING role_id, role_name, role_description, created_at, updated_at
        ";
        let row = sqlx::query(query)
            .bind(role_name)
            .bind(description)
            .fetch_one(&self.pool)
            .instrument(db_span("INSERT", query))
            .await
            .map_err(|err| {
                if is_unique_violation(&err) {
                    IamError::conflict("Role")
                } else {
                    classify(err)
                }
            })?;
        role_from_row(&row)
    }

    async fn list_roles(&self) -> IamResult<Vec<RoleSummary>> {
        let query = r"
            SELECT r.role_id, r.role_name, r.role_description, r.created_at, r.updated_at,
                COUNT(ur.user_id) AS user_count
            FROM iam_role r
            LEFT JOIN iam_user_role ur ON ur.role_id = r.role_id
            GROUP BY r.role_id
            ORDER BY r.role_name
        ";
        let rows = sqlx::query(query)
            .fetch_all(&self.pool)
            .instrument(db_span("SELECT", query))
            .await?;
        rows.iter()
            .map(|row| {
                Ok(RoleSummary {
                    role: role_from_row(row)?,
                    user_count: row.try_get("user_count")?,
                })
            })
            .collect()
    }

    async fn role_names(&self, user_id: UserId) -> IamResult<Vec<String>> {
        let query = r"
            SELECT r.role_name
            FROM iam_user_role ur
            JOIN iam_role r ON r.role_id = ur.role_id
            WHERE ur.user_id = $1
            ORDER BY r.role_name
        ";
        let rows = sqlx::query(query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .instrument(db_span("SELECT", query))
            .await?;
        rows.iter()
            .map(|row| row.try_get("role_name").map_err(IamError::from))
            .collect()
    }

    async fn assign_role(
        &self,
        user_id: UserId,
        role_name: &str,
        assigned_by: Option<&str>,
        at: DateTime<Utc>,
    ) -> IamResult<()> {
        let role_query = "SELECT role_id FROM iam_role WHERE role_name = $1";
        let role_id: i64 = sqlx::query(role_query)
            .bind(role_name)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", role_query))
            .await?
            .ok_or_else(|| IamError::not_found("Role"))?
            .try_get("role_id")?;

        let query = r"
            INSERT INTO iam_user_role (user_id, role_id, assigned_at, assigned_by)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, role_id) DO NOTHING
        ";
        sqlx::query(query)
            .bind(user_id)
            .bind(role_id)
            .bind(at)
            .bind(assigned_by)
            .execute(&self.pool)
            .instrument(db_span("INSERT", query))
            .await
            .map_err(|err| {
                if is_foreign_key_violation(&err) {
                    IamError::not_found("User")
                } else {
                    classify(err)
                }
            })?;
        Ok(())
    }

    async fn revoke_role(&self, user_id: UserId, role_name: &str) -> IamResult<bool> {
        let query = r"
            DELETE FROM iam_user_role ur
            USING iam_role r
            WHERE ur.role_id = r.role_id AND ur.user_id = $1 AND r.role_name = $2
        ";
        let result = sqlx::query(query)
            .bind(user_id)
            .bind(role_name)
            .execute(&self.pool)
            .instrument(db_span("DELETE", query))
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_session(&self, session: NewSession) -> IamResult<AuthSession> {
        let mut tx = self.pool.begin().await?;

        let query = r"
            INSERT INTO iam_auth_session
                (session_id, user_id, login_time, ip_address, user_agent,
                 sso_idp_session_ref, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $3)
            RETURNING session_id, user_id, login_time, logout_time, ip_address, user_agent,
                sso_idp_session_ref, created_at
        ";
        let row = sqlx::query(query)
            .bind(&session.session_id)
            .bind(session.user_id)
            .bind(session.login_time)
            .bind(&session.ip_address)
            .bind(&session.user_agent)
            .bind(&session.sso_idp_session_ref)
            .fetch_one(&mut *tx)
            .instrument(db_span("INSERT", query))
            .await
            .map_err(|err| {
                if is_unique_violation(&err) {
                    IamError::conflict("Session")
                } else if is_foreign_key_violation(&err) {
                    IamError::not_found("User")
                } else {
                    classify(err)
                }
            })?;
        let inserted = session_from_row(&row)?;

        let stamp = "UPDATE iam_user_account SET last_login_at = $2 WHERE user_id = $1";
        sqlx::query(stamp)
            .bind(session.user_id)
            .bind(session.login_time)
            .execute(&mut *tx)
            .instrument(db_span("UPDATE", stamp))
            .await?;

        tx.commit().await?;
        Ok(inserted)
    }

    async fn session(&self, session_id: &str) -> IamResult<Option<AuthSession>> {
        let query = r"
            SELECT session_id, user_id, login_time, logout_time, ip_address, user_agent,
                sso_idp_session_ref, created_at
            FROM iam_auth_session
            WHERE session_id = $1
        ";
        let row = sqlx::query(query)
            .bind(session_id)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", query))
            .await?;
        row.as_ref().map(session_from_row).transpose()
    }

    async fn end_session(&self, session_id: &str, at: DateTime<Utc>) -> IamResult<Option<UserId>> {
        let query = r"
            UPDATE iam_auth_session
            SET logout_time = $2
            WHERE session_id = $1 AND logout_time IS NULL
            RETURNING user_id
        ";
        let row = sqlx::query(query)
            .bind(session_id)
            .bind(at)
            .fetch_optional(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await?;
        row.map(|row| row.try_get("user_id").map_err(IamError::from))
            .transpose()
    }

    async fn active_sessions(&self, limit: i64) -> IamResult<Vec<ActiveSession>> {
        let query = r"
            SELECT s.session_id, s.user_id, u.username, s.login_time, s.ip_address, s.user_agent
            FROM iam_auth_session s
            JOIN iam_user_account u ON u.user_id = s.user_id
            WHERE s.logout_time IS NULL
            ORDER BY s.login_time DESC, s.session_id
            LIMIT $1
        ";
        let rows = sqlx::query(query)
            .bind(limit)
            .fetch_all(&self.pool)
            .instrument(db_span("SELECT", query))
            .await?;
        rows.iter()
            .map(|row| {
                Ok(ActiveSession {
                    session_id: row.try_get("session_id")?,
                    user_id: row.try_get("user_id")?,
                    username: row.try_get("username")?,
                    login_time: row.try_get("login_time")?,
                    ip_address: row.try_get("ip_address")?,
                    user_agent: row.try_get("user_agent")?,
                })
            })
            .collect()
    }

    async fn insert_mfa_method(
        &self,
        method: NewMfaMethod,
        at: DateTime<Utc>,
    ) -> IamResult<MfaMethod> {
        // Clearing the old primary and inserting the new row commit together.
        let mut tx = self.pool.begin().await?;

        if method.is_primary {
            let clear = r"
                UPDATE iam_mfa_method
                SET is_primary = FALSE, updated_at = $2
                WHERE user_id = $1 AND is_primary
            ";
            sqlx::query(clear)
                .bind(method.user_id)
                .bind(at)
                .execute(&mut *tx)
                .instrument(db_span("UPDATE", clear))
                .await?;
        }

        let query = r"
            INSERT INTO iam_mfa_method
                (user_id, method_type, secret_ciphertext, is_primary, is_active,
                 created_at, updated_at)
            VALUES ($1, $2::mfa_method_type_enum, $3, $4, TRUE, $5, $5)
            RETURNING mfa_id, user_id, method_type::text AS method_type, secret_ciphertext,
                is_primary, is_active, created_at, updated_at
        ";
        let row = sqlx::query(query)
            .bind(method.user_id)
            .bind(method.method_type.as_str())
            .bind(&method.secret_ciphertext)
            .bind(method.is_primary)
            .bind(at)
            .fetch_one(&mut *tx)
            .instrument(db_span("INSERT", query))
            .await
            .map_err(|err| {
                if is_foreign_key_violation(&err) {
                    IamError::not_found("User")
                } else if is_unique_violation(&err) {
                    IamError::conflict("Primary MFA method")
                } else {
                    classify(err)
                }
            })?;
        let inserted = method_from_row(&row)?;

        tx.commit().await?;
        Ok(inserted)
    }

    async fn mfa_methods(&self, user_id: UserId) -> IamResult<Vec<MfaMethod>> {
        let query = r"
            SELECT mfa_id, user_id, method_type::text AS method_type, secret_ciphertext,
                is_primary, is_active, created_at, updated_at
            FROM iam_mfa_method
            WHERE user_id = $1
            ORDER BY created_at DESC, mfa_id DESC
        ";
        let rows = sqlx::query(query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .instrument(db_span("SELECT", query))
            .await?;
        rows.iter().map(method_from_row).collect()
    }

    async fn active_mfa_count(&self, user_id: UserId) -> IamResult<i64> {
        let query =
            "SELECT COUNT(*) AS active FROM iam_mfa_method WHERE user_id = $1 AND is_active";
        let row = sqlx::query(query)
            .bind(user_id)
            .fetch_one(&self.pool)
            .instrument(db_span("SELECT", query))
            .await?;
        Ok(row.try_get("active")?)
    }

    async fn insert_challenge(&self, challenge: NewMfaChallenge) -> IamResult<MfaChallenge> {
        let query = r"
            INSERT INTO iam_mfa_challenge
                (user_id, method_type, otp_code_hash, issued_at, expires_at, ip_address, purpose)
            VALUES ($1, $2::mfa_method_type_enum, $3, $4, $5, $6, $7::mfa_purpose_enum)
            RETURNING challenge_id, user_id, method_type::text AS method_type, otp_code_hash,
                issued_at, expires_at, consumed_at, ip_address, purpose::text AS purpose
        ";
        let row = sqlx::query(query)
            .bind(challenge.user_id)
            .bind(challenge.method_type.as_str())
            .bind(&challenge.otp_code_hash)
            .bind(challenge.issued_at)
            .bind(challenge.expires_at)
            .bind(&challenge.ip_address)
            .bind(challenge.purpose.as_str())
            .fetch_one(&self.pool)
            .instrument(db_span("INSERT", query))
            .await
            .map_err(|err| {
                if is_foreign_key_violation(&err) {
                    IamError::not_found("User")
                } else {
                    classify(err)
                }
            })?;
        challenge_from_row(&row)
    }

    async fn challenge(&self, challenge_id: i64) -> IamResult<Option<MfaChallenge>> {
        let query = r"
            SELECT challenge_id, user_id, method_type::text AS method_type, otp_code_hash,
                issued_at, expires_at, consumed_at, ip_address, purpose::text AS purpose
            FROM iam_mfa_challenge
            WHERE challenge_id = $1
        ";
        let row = sqlx::query(query)
            .bind(challenge_id)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", query))
            .await?;
        row.as_ref().map(challenge_from_row).transpose()
    }

    async fn consume_challenge(&self, challenge_id: i64, at: DateTime<Utc>) -> IamResult<bool> {
        let query = r"
            UPDATE iam_mfa_challenge
            SET consumed_at = $2
            WHERE challenge_id = $1 AND consumed_at IS NULL AND expires_at > $2
        ";
        let result = sqlx::query(query)
            .bind(challenge_id)
            .bind(at)
            .execute(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn append_auth_log(&self, entry: NewAuthLog) -> IamResult<()> {
        let query = r"
            INSERT INTO iam_auth_log
                (user_id, event_type, event_time, ip_address, user_agent, details)
            VALUES ($1, $2::auth_event_type_enum, $3, $4, $5, $6)
        ";
        sqlx::query(query)
            .bind(entry.user_id)
            .bind(entry.event_type.as_str())
            .bind(entry.event_time)
            .bind(&entry.ip_address)
            .bind(&entry.user_agent)
            .bind(&entry.details)
            .execute(&self.pool)
            .instrument(db_span("INSERT", query))
            .await?;
        Ok(())
    }

    async fn recent_auth_logs(&self, limit: i64) -> IamResult<Vec<AuthLog>> {
        let query = r"
            SELECT l.log_id, l.user_id, u.username, l.event_type::text AS event_type,
                l.event_time, l.ip_address, l.user_agent, l.details
            FROM iam_auth_log l
            LEFT JOIN iam_user_account u ON u.user_id = l.user_id
            ORDER BY l.event_time DESC, l.log_id DESC
            LIMIT $1
        ";
        let rows = sqlx::query(query)
            .bind(limit)
            .fetch_all(&self.pool)
            .instrument(db_span("SELECT", query))
            .await?;
        rows.iter()
            .map(|row| {
                let event_type: String = row.try_get("event_type")?;
                Ok(AuthLog {
                    log_id: row.try_get("log_id")?,
                    user_id: row.try_get("user_id")?,
                    username: row.try_get("username")?,
                    event_type: label(&event_type, AuthEventType::parse, "event_type")?,
                    event_time: row.try_get("event_time")?,
                    ip_address: row.try_get("ip_address")?,
                    user_agent: row.try_get("user_agent")?,
                    details: row.try_get("details")?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::error::{DatabaseError, ErrorKind};
    use std::borrow::Cow;
    use std::error::Error as StdError;
    use std::fmt;

    #[derive(Debug)]
    struct TestDbError {
        code: Option<&'static str>,
    }

    impl fmt::Display for TestDbError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "test database error")
        }
    }

    impl StdError for TestDbError {}

    impl DatabaseError for TestDbError {
        fn message(&self) -> &'static str {
            "test database error"
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            self.code.map(Cow::Borrowed)
        }

        fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            ErrorKind::Other
        }
    }

    fn db_error(code: &'static str) -> sqlx::Error {
        sqlx::Error::Database(Box::new(TestDbError { code: Some(code) }))
    }

    #[test]
    fn unique_violation_matches_sqlstate() {
        assert!(is_unique_violation(&db_error("23505")));
        assert!(!is_unique_violation(&db_error("99999")));
        assert!(!is_unique_violation(&sqlx::Error::RowNotFound));
    }

    #[test]
    fn connection_failures_are_unavailable() {
        assert!(classify(sqlx::Error::PoolTimedOut).is_unavailable());
        assert!(classify(sqlx::Error::PoolClosed).is_unavailable());
        assert!(classify(db_error("08006")).is_unavailable());
        assert!(classify(db_error("57014")).is_unavailable());
        assert!(classify(db_error("57P01")).is_unavailable());
        assert!(classify(db_error("57P03")).is_unavailable());
    }

    #[test]
    fn other_failures_are_not_unavailable() {
        assert!(matches!(
            classify(sqlx::Error::RowNotFound),
            IamError::Internal(_)
        ));
        assert!(matches!(classify(db_error("42P01")), IamError::Internal(_)));
        assert!(matches!(
            classify(db_error("23514")),
            IamError::Validation(_)
        ));
    }

    #[test]
    fn pool_settings_default() {
        let settings = PoolSettings::default();
        assert_eq!(settings.max_connections, 5);
        assert_eq!(settings.timeout, Duration::from_secs(5));
    }
}
