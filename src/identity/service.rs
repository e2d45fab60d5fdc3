//! Authentication, session, RBAC and MFA orchestration over an `IamStore`.
//!
//! Flow Overview (login):
//! 1) Look up the user by exact username.
//! 2) Verify the Argon2id hash (a dummy hash runs for unknown users).
//! 3) Re-read `is_active`/`is_locked` from the store.
//! 4) Read roles and MFA enrollment.
//! 5) Create the session and stamp `last_login_at` in one store call, then
//!    audit `login_success`.
//!
//! Every attempt writes exactly one audit row. Audit writes are best effort:
//! a failing sink is logged and never changes the outcome of the operation.

use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use std::sync::{Arc, LazyLock};
use tracing::{debug, info, warn};

use super::{
    config::{AuthConfig, MfaConfig},
    error::{IamError, IamResult},
    mfa,
    models::{
        AccountStatus, ActiveSession, AuthEventType, AuthLog, AuthProvider, ChallengePurpose,
        ClientInfo, Identity, MfaMethod, MfaMethodType, NewAuthLog, NewMfaChallenge,
        NewMfaMethod, NewSession, NewUser, RoleSummary, User, UserId, UserWithRoles,
    },
    password, tokens,
};
use crate::store::{IamStore, MAX_ACTIVE_SESSIONS, Page, Pagination, audit_limit};

/// Result of a successful login.
#[derive(Clone, Debug)]
pub struct AuthOutcome {
    /// Raw token for the client; only its hash is stored.
    pub session_token: String,
    pub session_id: String,
    pub identity: Identity,
    /// Whether the user has an active second factor the caller may challenge.
    pub mfa_enrolled: bool,
}

#[derive(Clone, Debug)]
pub struct IssuedChallenge {
    pub challenge_id: i64,
    /// Plaintext code for the delivery channel. Never persisted.
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

/// Provisioning input for a new account.
#[derive(Clone, Debug)]
pub struct NewAccount {
    pub parent_id: i64,
    pub username: String,
    pub email: String,
    pub phone_number: Option<String>,
    pub display_name: String,
    pub auth_provider: AuthProvider,
    pub password: Option<String>,
    pub created_by: Option<String>,
}

pub struct IamService {
    store: Arc<dyn IamStore>,
    auth: AuthConfig,
    mfa: MfaConfig,
}

impl IamService {
    #[must_use]
    pub fn new(store: Arc<dyn IamStore>, auth: AuthConfig, mfa: MfaConfig) -> Self {
        Self { store, auth, mfa }
    }

    #[must_use]
    pub const fn auth_config(&self) -> &AuthConfig {
        &self.auth
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn IamStore> {
        &self.store
    }

    async fn audit(
        &self,
        user_id: Option<UserId>,
        event_type: AuthEventType,
        client: &ClientInfo,
        details: Option<String>,
    ) {
        let entry = NewAuthLog {
            user_id,
            event_type,
            event_time: Utc::now(),
            ip_address: client.ip_address.clone(),
            user_agent: client.user_agent.clone(),
            details,
        };
        if let Err(err) = self.store.append_auth_log(entry).await {
            warn!(
                event_type = event_type.as_str(),
                error = %err,
                "Failed to write auth log"
            );
        }
    }

    /// Check a username/password pair and open a session.
    ///
    /// # Errors
    /// `Validation` for empty input, `InvalidCredentials` for an unknown user
    /// or wrong password, `AccountDisabled` for inactive or locked accounts,
    /// and store failures as-is.
    pub async fn authenticate(
        &self,
        username: &str,
        password_input: &str,
        client: &ClientInfo,
    ) -> IamResult<AuthOutcome> {
        if username.is_empty() || password_input.is_empty() {
            return Err(IamError::validation("Username and password required"));
        }
        let pepper = self.auth.password_pepper();

        let Some(user) = self.store.user_by_username(username).await? else {
            password::burn_verification(password_input, pepper);
            self.audit(
                None,
                AuthEventType::LoginFailed,
                client,
                Some(format!("User not found: {username}")),
            )
            .await;
            debug!(username, "Login failed: unknown user");
            return Err(IamError::InvalidCredentials);
        };

        let password_ok = match user.password_hash.as_deref() {
            Some(hash) => password::verify_password(password_input, hash, pepper)?,
            None => {
                password::burn_verification(password_input, pepper);
                false
            }
        };
        if !password_ok {
            self.audit(
                Some(user.user_id),
                AuthEventType::LoginFailed,
                client,
                Some("Invalid password".to_string()),
            )
            .await;
            debug!(user_id = user.user_id, "Login failed: invalid password");
            return Err(IamError::InvalidCredentials);
        }

        let eligible = self
            .store
            .account_status(user.user_id)
            .await?
            .is_some_and(AccountStatus::is_eligible);
        if !eligible {
            self.audit(
                Some(user.user_id),
                AuthEventType::LoginFailed,
                client,
                Some("Account locked/inactive".to_string()),
            )
            .await;
            debug!(user_id = user.user_id, "Login failed: account disabled");
            return Err(IamError::AccountDisabled);
        }

        // The session insert is the last fallible step, so an error here
        // never leaves an open session behind.
        let opened = async {
            let roles = self.store.role_names(user.user_id).await?;
            let mfa_enrolled = self.store.active_mfa_count(user.user_id).await? > 0;
            let session_token = tokens::generate_session_token()?;
            let session_id = tokens::session_id_for(&session_token);
            self.store
                .insert_session(NewSession {
                    session_id: session_id.clone(),
                    user_id: user.user_id,
                    login_time: Utc::now(),
                    ip_address: client.ip_address.clone(),
                    user_agent: client.user_agent.clone(),
                    sso_idp_session_ref: None,
                })
                .await?;
            Ok::<_, IamError>((roles, mfa_enrolled, session_token, session_id))
        }
        .await;
        let (roles, mfa_enrolled, session_token, session_id) = match opened {
            Ok(opened) => opened,
            Err(err) => {
                self.audit(
                    Some(user.user_id),
                    AuthEventType::LoginFailed,
                    client,
                    Some("Session could not be created".to_string()),
                )
                .await;
                warn!(user_id = user.user_id, error = %err, "Login failed: session not created");
                return Err(err);
            }
        };
        self.audit(
            Some(user.user_id),
            AuthEventType::LoginSuccess,
            client,
            None,
        )
        .await;
        info!(user_id = user.user_id, "Login succeeded");

        Ok(AuthOutcome {
            session_token,
            session_id,
            identity: Identity::from_user(&user, roles),
            mfa_enrolled,
        })
    }

    /// Resolve a session token to the current identity.
    ///
    /// Account status and roles are read fresh on every call.
    ///
    /// # Errors
    /// `Unauthenticated` when the session is missing, ended, expired or its
    /// user is no longer eligible; store failures pass through.
    pub async fn verify(&self, session_token: &str) -> IamResult<Identity> {
        if session_token.is_empty() {
            return Err(IamError::Unauthenticated);
        }
        let session_id = tokens::session_id_for(session_token);
        let session = self
            .store
            .session(&session_id)
            .await?
            .ok_or(IamError::Unauthenticated)?;
        if !session.is_open() {
            return Err(IamError::Unauthenticated);
        }
        let expires_at = session.login_time + Duration::seconds(self.auth.session_ttl_seconds());
        if expires_at <= Utc::now() {
            return Err(IamError::Unauthenticated);
        }

        let eligible = self
            .store
            .account_status(session.user_id)
            .await?
            .is_some_and(AccountStatus::is_eligible);
        if !eligible {
            return Err(IamError::Unauthenticated);
        }
        let user = self
            .store
            .user_by_id(session.user_id)
            .await?
            .ok_or(IamError::Unauthenticated)?;
        let roles = self.store.role_names(user.user_id).await?;
        Ok(Identity::from_user(&user, roles))
    }

    /// End a session. Idempotent: returns whether this call closed it.
    ///
    /// # Errors
    /// Store failures only.
    pub async fn logout(&self, session_token: &str, client: &ClientInfo) -> IamResult<bool> {
        let session_id = tokens::session_id_for(session_token);
        match self.store.end_session(&session_id, Utc::now()).await? {
            Some(user_id) => {
                self.audit(Some(user_id), AuthEventType::Logout, client, None)
                    .await;
                info!(user_id, "Session ended");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// # Errors
    /// Store failures only.
    pub async fn has_role(&self, user_id: UserId, role_name: &str) -> IamResult<bool> {
        Ok(self
            .store
            .role_names(user_id)
            .await?
            .iter()
            .any(|name| name == role_name))
    }

    /// An empty candidate list is always false.
    ///
    /// # Errors
    /// Store failures only.
    pub async fn has_any_role(&self, user_id: UserId, role_names: &[&str]) -> IamResult<bool> {
        if role_names.is_empty() {
            return Ok(false);
        }
        let held = self.store.role_names(user_id).await?;
        Ok(held.iter().any(|name| role_names.contains(&name.as_str())))
    }

    /// # Errors
    /// `NotFound` for an unknown user or role.
    pub async fn assign_role(
        &self,
        user_id: UserId,
        role_name: &str,
        assigned_by: Option<&str>,
    ) -> IamResult<()> {
        self.store
            .assign_role(user_id, role_name, assigned_by, Utc::now())
            .await
    }

    /// # Errors
    /// Store failures only.
    pub async fn revoke_role(&self, user_id: UserId, role_name: &str) -> IamResult<bool> {
        self.store.revoke_role(user_id, role_name).await
    }

    /// # Errors
    /// `Validation` for a blank name, `Conflict` when it already exists.
    pub async fn create_role(
        &self,
        role_name: &str,
        description: Option<&str>,
    ) -> IamResult<super::models::Role> {
        let role_name = role_name.trim();
        if role_name.is_empty() {
            return Err(IamError::validation("Role name required"));
        }
        self.store.create_role(role_name, description).await
    }

    /// Create a user, hashing the password for local accounts.
    ///
    /// # Errors
    /// `Validation` for missing fields, `Conflict` on a taken username or email.
    pub async fn provision_user(&self, account: NewAccount) -> IamResult<User> {
        if account.username.trim().is_empty() || account.email.trim().is_empty() {
            return Err(IamError::validation("Username and email required"));
        }
        if !valid_email(account.email.trim()) {
            return Err(IamError::validation("Invalid email address"));
        }
        let password_hash = match (account.auth_provider, account.password.as_deref()) {
            (AuthProvider::Local, Some(secret)) if !secret.is_empty() => Some(
                password::hash_password(secret, self.auth.password_pepper())?,
            ),
            (AuthProvider::Local, _) => {
                return Err(IamError::validation("Local accounts require a password"));
            }
            _ => None,
        };
        self.store
            .create_user(NewUser {
                parent_id: account.parent_id,
                username: account.username,
                email: account.email,
                phone_number: account.phone_number,
                display_name: account.display_name,
                auth_provider: account.auth_provider,
                password_hash,
                created_by: account.created_by,
            })
            .await
    }

    /// # Errors
    /// `NotFound` for an unknown user.
    pub async fn set_account_status(
        &self,
        user_id: UserId,
        status: AccountStatus,
        updated_by: Option<&str>,
    ) -> IamResult<()> {
        if self
            .store
            .set_account_status(user_id, status, updated_by)
            .await?
        {
            Ok(())
        } else {
            Err(IamError::not_found("User"))
        }
    }

    /// Issue a one-time code for `user_id`.
    ///
    /// # Errors
    /// `NotFound` for an unknown user; store and hashing failures.
    pub async fn issue_challenge(
        &self,
        user_id: UserId,
        method_type: MfaMethodType,
        purpose: ChallengePurpose,
        client: &ClientInfo,
    ) -> IamResult<IssuedChallenge> {
        if self.store.user_by_id(user_id).await?.is_none() {
            return Err(IamError::not_found("User"));
        }
        let code = mfa::generate_otp_code();
        let otp_code_hash = mfa::hash_otp_code(&code)?;
        let issued_at = Utc::now();
        let expires_at = issued_at + Duration::seconds(self.mfa.challenge_ttl_seconds());

        let challenge = self
            .store
            .insert_challenge(NewMfaChallenge {
                user_id,
                method_type,
                otp_code_hash,
                issued_at,
                expires_at,
                ip_address: client.ip_address.clone(),
                purpose,
            })
            .await?;
        self.audit(
            Some(user_id),
            AuthEventType::MfaSent,
            client,
            Some(format!(
                "method={} purpose={}",
                method_type.as_str(),
                purpose.as_str()
            )),
        )
        .await;

        Ok(IssuedChallenge {
            challenge_id: challenge.challenge_id,
            code,
            expires_at,
        })
    }

    /// Redeem a challenge. True only for the single caller that consumed it.
    ///
    /// A wrong code leaves the challenge usable until it expires.
    ///
    /// # Errors
    /// Store failures only.
    pub async fn consume_challenge(
        &self,
        challenge_id: i64,
        supplied_code: &str,
        client: &ClientInfo,
    ) -> IamResult<bool> {
        let Some(challenge) = self.store.challenge(challenge_id).await? else {
            return Ok(false);
        };
        if !challenge.is_redeemable(Utc::now()) {
            return Ok(false);
        }
        if !mfa::verify_otp_code(supplied_code, &challenge.otp_code_hash) {
            return Ok(false);
        }
        // The conditional update re-checks expiry and consumption atomically.
        if !self
            .store
            .consume_challenge(challenge_id, Utc::now())
            .await?
        {
            return Ok(false);
        }
        self.audit(
            Some(challenge.user_id),
            AuthEventType::MfaVerified,
            client,
            Some(format!("challenge={challenge_id}")),
        )
        .await;
        Ok(true)
    }

    /// Like [`Self::consume_challenge`], but a challenge issued to another
    /// user never matches.
    ///
    /// # Errors
    /// Store failures only.
    pub async fn consume_owned_challenge(
        &self,
        user_id: UserId,
        challenge_id: i64,
        supplied_code: &str,
        client: &ClientInfo,
    ) -> IamResult<bool> {
        match self.store.challenge(challenge_id).await? {
            Some(challenge) if challenge.user_id == user_id => {
                self.consume_challenge(challenge_id, supplied_code, client)
                    .await
            }
            _ => Ok(false),
        }
    }

    /// Enroll a second factor, sealing its secret under the MFA key.
    ///
    /// # Errors
    /// `Validation` when a secret is supplied but no key is configured,
    /// `NotFound` for an unknown user.
    pub async fn enroll_method(
        &self,
        user_id: UserId,
        method_type: MfaMethodType,
        secret: Option<&[u8]>,
        make_primary: bool,
    ) -> IamResult<MfaMethod> {
        let secret_ciphertext = match secret {
            Some(plain) => {
                let key = self
                    .mfa
                    .secret_key()
                    .ok_or_else(|| IamError::validation("MFA secret key not configured"))?;
                Some(mfa::encrypt_secret(key, user_id, method_type, plain)?)
            }
            None => None,
        };
        self.store
            .insert_mfa_method(
                NewMfaMethod {
                    user_id,
                    method_type,
                    secret_ciphertext,
                    is_primary: make_primary,
                },
                Utc::now(),
            )
            .await
    }

    /// # Errors
    /// Store failures only.
    pub async fn has_active_mfa(&self, user_id: UserId) -> IamResult<bool> {
        Ok(self.store.active_mfa_count(user_id).await? > 0)
    }

    /// # Errors
    /// Store failures only.
    pub async fn mfa_methods(&self, user_id: UserId) -> IamResult<Vec<MfaMethod>> {
        self.store.mfa_methods(user_id).await
    }

    /// Decrypt a method secret owned by `user_id`; `None` when it has none.
    ///
    /// # Errors
    /// `NotFound` when the method does not belong to the user, `Internal`
    /// when the ciphertext cannot be opened.
    pub async fn reveal_method_secret(
        &self,
        user_id: UserId,
        mfa_id: i64,
    ) -> IamResult<Option<Vec<u8>>> {
        let method = self
            .store
            .mfa_methods(user_id)
            .await?
            .into_iter()
            .find(|method| method.mfa_id == mfa_id)
            .ok_or_else(|| IamError::not_found("MFA method"))?;
        let Some(sealed) = method.secret_ciphertext else {
            return Ok(None);
        };
        let key = self
            .mfa
            .secret_key()
            .ok_or_else(|| IamError::internal("MFA secret key not configured"))?;
        mfa::decrypt_secret(key, user_id, method.method_type, &sealed).map(Some)
    }

    /// # Errors
    /// Store failures only.
    pub async fn list_users(&self, pagination: Pagination) -> IamResult<Page<UserWithRoles>> {
        self.store.list_users(pagination).await
    }

    /// # Errors
    /// `NotFound` for an unknown user.
    pub async fn user_detail(&self, user_id: UserId) -> IamResult<UserWithRoles> {
        let user = self
            .store
            .user_by_id(user_id)
            .await?
            .ok_or_else(|| IamError::not_found("User"))?;
        let roles = self.store.role_names(user_id).await?;
        Ok(UserWithRoles { user, roles })
    }

    /// # Errors
    /// Store failures only.
    pub async fn list_roles(&self) -> IamResult<Vec<RoleSummary>> {
        self.store.list_roles().await
    }

    /// # Errors
    /// Store failures only.
    pub async fn recent_auth_logs(&self, limit: Option<i64>) -> IamResult<Vec<AuthLog>> {
        self.store.recent_auth_logs(audit_limit(limit)).await
    }

    /// # Errors
    /// Store failures only.
    pub async fn active_sessions(&self) -> IamResult<Vec<ActiveSession>> {
        self.store.active_sessions(MAX_ACTIVE_SESSIONS).await
    }

    /// # Errors
    /// Returns the store error when it cannot be reached.
    pub async fn ping(&self) -> IamResult<()> {
        self.store.ping().await
    }
}

static EMAIL_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").ok());

fn valid_email(email: &str) -> bool {
    EMAIL_RE.as_ref().is_some_and(|regex| regex.is_match(email))
}
