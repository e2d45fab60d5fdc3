//! In-process `IamStore` used by tests and `--dsn memory://`.
//!
//! All state sits behind one `tokio::sync::Mutex`, so every trait method is a
//! single critical section. That gives the conditional updates the same
//! one-winner semantics the PostgreSQL `UPDATE ... WHERE` provides.
//!
//! Switches inject failures for tests: [`MemoryStore::set_unavailable`]
//! makes every call fail as `StoreUnavailable`,
//! [`MemoryStore::set_audit_failure`] breaks only the audit sink and
//! [`MemoryStore::set_session_write_failure`] breaks only session inserts.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

use super::{IamStore, Page, Pagination};
use crate::identity::{
    IamError, IamResult,
    models::{
        AccountStatus, ActiveSession, AuthLog, AuthProvider, AuthSession, MfaChallenge, MfaMethod,
        NewAuthLog, NewMfaChallenge, NewMfaMethod, NewSession, NewUser, Role, RoleSummary, User,
        UserId, UserWithRoles,
    },
};

#[derive(Default)]
struct State {
    next_id: i64,
    users: BTreeMap<UserId, User>,
    roles: BTreeMap<i64, Role>,
    assignments: BTreeSet<(UserId, i64)>,
    sessions: HashMap<String, AuthSession>,
    methods: BTreeMap<i64, MfaMethod>,
    challenges: BTreeMap<i64, MfaChallenge>,
    logs: Vec<AuthLog>,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn role_id(&self, role_name: &str) -> Option<i64> {
        self.roles
            .values()
            .find(|role| role.role_name == role_name)
            .map(|role| role.role_id)
    }

    fn role_names(&self, user_id: UserId) -> Vec<String> {
        let mut names: Vec<String> = self
            .assignments
            .iter()
            .filter(|(uid, _)| *uid == user_id)
            .filter_map(|(_, role_id)| self.roles.get(role_id))
            .map(|role| role.role_name.clone())
            .collect();
        names.sort();
        names
    }
}

pub struct MemoryStore {
    state: Mutex<State>,
    unavailable: AtomicBool,
    audit_broken: AtomicBool,
    session_writes_broken: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Empty store seeded with the `admin` role, like `sql/schema.sql`.
    #[must_use]
    pub fn new() -> Self {
        let now = Utc::now();
        let mut state = State::default();
        let role_id = state.next_id();
        state.roles.insert(
            role_id,
            Role {
                role_id,
                role_name: "admin".to_string(),
                role_description: Some("Full administrative access".to_string()),
                created_at: now,
                updated_at: now,
            },
        );
        Self {
            state: Mutex::new(state),
            unavailable: AtomicBool::new(false),
            audit_broken: AtomicBool::new(false),
            session_writes_broken: AtomicBool::new(false),
        }
    }

    /// Make every call fail with `StoreUnavailable` until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make `append_auth_log` fail while the rest keeps working.
    pub fn set_audit_failure(&self, broken: bool) {
        self.audit_broken.store(broken, Ordering::SeqCst);
    }

    /// Make `insert_session` fail while reads keep working.
    pub fn set_session_write_failure(&self, broken: bool) {
        self.session_writes_broken.store(broken, Ordering::SeqCst);
    }

    fn check(&self) -> IamResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(IamError::StoreUnavailable("memory store offline".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl IamStore for MemoryStore {
    async fn ping(&self) -> IamResult<()> {
        self.check()
    }

    async fn create_user(&self, new_user: NewUser) -> IamResult<User> {
        self.check()?;
        if new_user.auth_provider == AuthProvider::Local && new_user.password_hash.is_none() {
            return Err(IamError::validation("Local accounts require a password"));
        }
        let mut state = self.state.lock().await;
        if state
            .users
            .values()
            .any(|user| user.username == new_user.username || user.email == new_user.email)
        {
            return Err(IamError::conflict("User"));
        }
        let now = Utc::now();
        let user_id = state.next_id();
        let password_hash = if new_user.auth_provider == AuthProvider::Local {
            new_user.password_hash
        } else {
            None
        };
        let user = User {
            user_id,
            parent_id: new_user.parent_id,
            username: new_user.username,
            email: new_user.email,
            phone_number: new_user.phone_number,
            display_name: new_user.display_name,
            auth_provider: new_user.auth_provider,
            password_hash,
            is_active: true,
            is_locked: false,
            last_login_at: None,
            created_at: now,
            updated_at: now,
            created_by: new_user.created_by.clone(),
            updated_by: new_user.created_by,
        };
        state.users.insert(user_id, user.clone());
        Ok(user)
    }

    async fn user_by_id(&self, user_id: UserId) -> IamResult<Option<User>> {
        self.check()?;
        Ok(self.state.lock().await.users.get(&user_id).cloned())
    }

    async fn user_by_username(&self, username: &str) -> IamResult<Option<User>> {
        self.check()?;
        Ok(self
            .state
            .lock()
            .await
            .users
            .values()
            .find(|user| user.username == username)
            .cloned())
    }

    async fn account_status(&self, user_id: UserId) -> IamResult<Option<AccountStatus>> {
        self.check()?;
        Ok(self
            .state
            .lock()
            .await
            .users
            .get(&user_id)
            .map(|user| AccountStatus {
                is_active: user.is_active,
                is_locked: user.is_locked,
            }))
    }

    async fn set_account_status(
        &self,
        user_id: UserId,
        status: AccountStatus,
        updated_by: Option<&str>,
    ) -> IamResult<bool> {
        self.check()?;
        let mut state = self.state.lock().await;
        let Some(user) = state.users.get_mut(&user_id) else {
            return Ok(false);
        };
        user.is_active = status.is_active;
        user.is_locked = status.is_locked;
        user.updated_at = Utc::now();
        user.updated_by = updated_by.map(str::to_string);
        Ok(true)
    }

    async fn delete_user(&self, user_id: UserId) -> IamResult<bool> {
        self.check()?;
        let mut state = self.state.lock().await;
        if state.users.remove(&user_id).is_none() {
            return Ok(false);
        }
        state.assignments.retain(|(uid, _)| *uid != user_id);
        state.sessions.retain(|_, session| session.user_id != user_id);
        state.methods.retain(|_, method| method.user_id != user_id);
        state
            .challenges
            .retain(|_, challenge| challenge.user_id != user_id);
        for log in &mut state.logs {
            if log.user_id == Some(user_id) {
                log.user_id = None;
                log.username = None;
            }
        }
        Ok(true)
    }

    async fn list_users(&self, pagination: Pagination) -> IamResult<Page<UserWithRoles>> {
        self.check()?;
        let state = self.state.lock().await;
        let mut users: Vec<&User> = state.users.values().collect();
        users.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then(b.user_id.cmp(&a.user_id))
        });
        let total = i64::try_from(users.len()).unwrap_or(i64::MAX);
        let offset = usize::try_from(pagination.offset()).unwrap_or(usize::MAX);
        let limit = usize::try_from(pagination.per_page()).unwrap_or(0);
        let items = users
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|user| UserWithRoles {
                roles: state.role_names(user.user_id),
                user: user.clone(),
            })
            .collect();
        Ok(Page::new(items, total, pagination))
    }

    async fn create_role(&self, role_name: &str, description: Option<&str>) -> IamResult<Role> {
        self.check()?;
        let mut state = self.state.lock().await;
        if state.role_id(role_name).is_some() {
            return Err(IamError::conflict("Role"));
        }
        let now = Utc::now();
        let role_id = state.next_id();
        let role = Role {
            role_id,
            role_name: role_name.to_string(),
            role_description: description.map(str::to_string),
            created_at: now,
            updated_at: now,
        };
        state.roles.insert(role_id, role.clone());
        Ok(role)
    }

    async fn list_roles(&self) -> IamResult<Vec<RoleSummary>> {
        self.check()?;
        let state = self.state.lock().await;
        let mut roles: Vec<RoleSummary> = state
            .roles
            .values()
            .map(|role| RoleSummary {
                user_count: i64::try_from(
                    state
                        .assignments
                        .iter()
                        .filter(|(_, role_id)| *role_id == role.role_id)
                        .count(),
                )
                .unwrap_or(i64::MAX),
                role: role.clone(),
            })
            .collect();
        roles.sort_by(|a, b| a.role.role_name.cmp(&b.role.role_name));
        Ok(roles)
    }

    async fn role_names(&self, user_id: UserId) -> IamResult<Vec<String>> {
        self.check()?;
        Ok(self.state.lock().await.role_names(user_id))
    }

    async fn assign_role(
        &self,
        user_id: UserId,
        role_name: &str,
        _assigned_by: Option<&str>,
        _at: DateTime<Utc>,
    ) -> IamResult<()> {
        self.check()?;
        let mut state = self.state.lock().await;
        if !state.users.contains_key(&user_id) {
            return Err(IamError::not_found("User"));
        }
        let role_id = state
            .role_id(role_name)
            .ok_or_else(|| IamError::not_found("Role"))?;
        state.assignments.insert((user_id, role_id));
        Ok(())
    }

    async fn revoke_role(&self, user_id: UserId, role_name: &str) -> IamResult<bool> {
        self.check()?;
        let mut state = self.state.lock().await;
        let Some(role_id) = state.role_id(role_name) else {
            return Ok(false);
        };
        Ok(state.assignments.remove(&(user_id, role_id)))
    }

    async fn insert_session(&self, session: NewSession) -> IamResult<AuthSession> {
        self.check()?;
        if self.session_writes_broken.load(Ordering::SeqCst) {
            return Err(IamError::StoreUnavailable(
                "memory session table offline".to_string(),
            ));
        }
        let mut state = self.state.lock().await;
        if state.sessions.contains_key(&session.session_id) {
            return Err(IamError::conflict("Session"));
        }
        let Some(user) = state.users.get_mut(&session.user_id) else {
            return Err(IamError::not_found("User"));
        };
        user.last_login_at = Some(session.login_time);
        let row = AuthSession {
            session_id: session.session_id,
            user_id: session.user_id,
            login_time: session.login_time,
            logout_time: None,
            ip_address: session.ip_address,
            user_agent: session.user_agent,
            sso_idp_session_ref: session.sso_idp_session_ref,
            created_at: session.login_time,
        };
        state.sessions.insert(row.session_id.clone(), row.clone());
        Ok(row)
    }

    async fn session(&self, session_id: &str) -> IamResult<Option<AuthSession>> {
        self.check()?;
        Ok(self.state.lock().await.sessions.get(session_id).cloned())
    }

    async fn end_session(&self, session_id: &str, at: DateTime<Utc>) -> IamResult<Option<UserId>> {
        self.check()?;
        let mut state = self.state.lock().await;
        match state.sessions.get_mut(session_id) {
            Some(session) if session.logout_time.is_none() => {
                session.logout_time = Some(at);
                Ok(Some(session.user_id))
            }
            _ => Ok(None),
        }
    }

    async fn active_sessions(&self, limit: i64) -> IamResult<Vec<ActiveSession>> {
        self.check()?;
        let state = self.state.lock().await;
        let mut open: Vec<ActiveSession> = state
            .sessions
            .values()
            .filter(|session| session.is_open())
            .filter_map(|session| {
                state.users.get(&session.user_id).map(|user| ActiveSession {
                    session_id: session.session_id.clone(),
                    user_id: session.user_id,
                    username: user.username.clone(),
                    login_time: session.login_time,
                    ip_address: session.ip_address.clone(),
                    user_agent: session.user_agent.clone(),
                })
            })
            .collect();
        open.sort_by(|a, b| {
            b.login_time
                .cmp(&a.login_time)
                .then_with(|| a.session_id.cmp(&b.session_id))
        });
        open.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(open)
    }

    async fn insert_mfa_method(
        &self,
        method: NewMfaMethod,
        at: DateTime<Utc>,
    ) -> IamResult<MfaMethod> {
        self.check()?;
        let mut state = self.state.lock().await;
        if !state.users.contains_key(&method.user_id) {
            return Err(IamError::not_found("User"));
        }
        if method.is_primary {
            for existing in state.methods.values_mut() {
                if existing.user_id == method.user_id && existing.is_primary {
                    existing.is_primary = false;
                    existing.updated_at = at;
                }
            }
        }
        let mfa_id = state.next_id();
        let row = MfaMethod {
            mfa_id,
            user_id: method.user_id,
            method_type: method.method_type,
            secret_ciphertext: method.secret_ciphertext,
            is_primary: method.is_primary,
            is_active: true,
            created_at: at,
            updated_at: at,
        };
        state.methods.insert(mfa_id, row.clone());
        Ok(row)
    }

    async fn mfa_methods(&self, user_id: UserId) -> IamResult<Vec<MfaMethod>> {
        self.check()?;
        let mut methods: Vec<MfaMethod> = self
            .state
            .lock()
            .await
            .methods
            .values()
            .filter(|method| method.user_id == user_id)
            .cloned()
            .collect();
        methods.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.mfa_id.cmp(&a.mfa_id)));
        Ok(methods)
    }

    async fn active_mfa_count(&self, user_id: UserId) -> IamResult<i64> {
        self.check()?;
        let count = self
            .state
            .lock()
            .await
            .methods
            .values()
            .filter(|method| method.user_id == user_id && method.is_active)
            .count();
        Ok(i64::try_from(count).unwrap_or(i64::MAX))
    }

    async fn insert_challenge(&self, challenge: NewMfaChallenge) -> IamResult<MfaChallenge> {
        self.check()?;
        let mut state = self.state.lock().await;
        if !state.users.contains_key(&challenge.user_id) {
            return Err(IamError::not_found("User"));
        }
        let challenge_id = state.next_id();
        let row = MfaChallenge {
            challenge_id,
            user_id: challenge.user_id,
            method_type: challenge.method_type,
            otp_code_hash: challenge.otp_code_hash,
            issued_at: challenge.issued_at,
            expires_at: challenge.expires_at,
            consumed_at: None,
            ip_address: challenge.ip_address,
            purpose: challenge.purpose,
        };
        state.challenges.insert(challenge_id, row.clone());
        Ok(row)
    }

    async fn challenge(&self, challenge_id: i64) -> IamResult<Option<MfaChallenge>> {
        self.check()?;
        Ok(self.state.lock().await.challenges.get(&challenge_id).cloned())
    }

    async fn consume_challenge(&self, challenge_id: i64, at: DateTime<Utc>) -> IamResult<bool> {
        self.check()?;
        let mut state = self.state.lock().await;
        match state.challenges.get_mut(&challenge_id) {
            Some(challenge) if challenge.is_redeemable(at) => {
                challenge.consumed_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn append_auth_log(&self, entry: NewAuthLog) -> IamResult<()> {
        self.check()?;
        if self.audit_broken.load(Ordering::SeqCst) {
            return Err(IamError::StoreUnavailable("audit sink offline".to_string()));
        }
        let mut state = self.state.lock().await;
        let log_id = state.next_id();
        let username = entry
            .user_id
            .and_then(|user_id| state.users.get(&user_id))
            .map(|user| user.username.clone());
        state.logs.push(AuthLog {
            log_id,
            user_id: entry.user_id,
            username,
            event_type: entry.event_type,
            event_time: entry.event_time,
            ip_address: entry.ip_address,
            user_agent: entry.user_agent,
            details: entry.details,
        });
        Ok(())
    }

    async fn recent_auth_logs(&self, limit: i64) -> IamResult<Vec<AuthLog>> {
        self.check()?;
        let state = self.state.lock().await;
        let mut logs = state.logs.clone();
        logs.sort_by(|a, b| b.event_time.cmp(&a.event_time).then(b.log_id.cmp(&a.log_id)));
        logs.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(logs)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::identity::models::{AuthEventType, ChallengePurpose, MfaMethodType};
    use chrono::Duration;

    fn new_user(username: &str) -> NewUser {
        NewUser {
            parent_id: 0,
            username: username.to_string(),
            email: format!("{username}@example.com"),
            phone_number: None,
            display_name: username.to_string(),
            auth_provider: AuthProvider::Local,
            password_hash: Some("$argon2id$placeholder".to_string()),
            created_by: Some("test".to_string()),
        }
    }

    #[tokio::test]
    async fn unique_username_and_email() {
        let store = MemoryStore::new();
        store.create_user(new_user("alice")).await.unwrap();
        let dup = store.create_user(new_user("alice")).await;
        assert!(matches!(dup, Err(IamError::Conflict(_))));

        let mut other = new_user("bob");
        other.email = "alice@example.com".to_string();
        assert!(matches!(
            store.create_user(other).await,
            Err(IamError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn local_user_needs_password_sso_drops_it() {
        let store = MemoryStore::new();
        let mut local = new_user("carol");
        local.password_hash = None;
        assert!(matches!(
            store.create_user(local).await,
            Err(IamError::Validation(_))
        ));

        let mut sso = new_user("dave");
        sso.auth_provider = AuthProvider::Okta;
        let user = store.create_user(sso).await.unwrap();
        assert!(user.password_hash.is_none());
    }

    #[tokio::test]
    async fn end_session_changes_once() {
        let store = MemoryStore::new();
        let user = store.create_user(new_user("erin")).await.unwrap();
        let now = Utc::now();
        store
            .insert_session(NewSession {
                session_id: "s1".to_string(),
                user_id: user.user_id,
                login_time: now,
                ip_address: None,
                user_agent: None,
                sso_idp_session_ref: None,
            })
            .await
            .unwrap();
        assert_eq!(store.end_session("s1", now).await.unwrap(), Some(user.user_id));
        assert_eq!(store.end_session("s1", now).await.unwrap(), None);
        assert_eq!(store.end_session("missing", now).await.unwrap(), None);
    }

    #[tokio::test]
    async fn consume_respects_expiry_and_single_use() {
        let store = MemoryStore::new();
        let user = store.create_user(new_user("frank")).await.unwrap();
        let now = Utc::now();
        let challenge = store
            .insert_challenge(NewMfaChallenge {
                user_id: user.user_id,
                method_type: MfaMethodType::EmailOtp,
                otp_code_hash: "hash".to_string(),
                issued_at: now,
                expires_at: now + Duration::seconds(60),
                ip_address: None,
                purpose: ChallengePurpose::Login,
            })
            .await
            .unwrap();
        let late = now + Duration::seconds(61);
        assert!(!store.consume_challenge(challenge.challenge_id, late).await.unwrap());
        assert!(store.consume_challenge(challenge.challenge_id, now).await.unwrap());
        assert!(!store.consume_challenge(challenge.challenge_id, now).await.unwrap());
    }

    #[tokio::test]
    async fn delete_user_cascades_and_keeps_logs() {
        let store = MemoryStore::new();
        let user = store.create_user(new_user("gina")).await.unwrap();
        store
            .assign_role(user.user_id, "admin", None, Utc::now())
            .await
            .unwrap();
        store
            .append_auth_log(NewAuthLog {
                user_id: Some(user.user_id),
                event_type: AuthEventType::LoginSuccess,
                event_time: Utc::now(),
                ip_address: None,
                user_agent: None,
                details: None,
            })
            .await
            .unwrap();

        assert!(store.delete_user(user.user_id).await.unwrap());
        let roles = store.list_roles().await.unwrap();
        assert_eq!(roles.first().map(|r| r.user_count), Some(0));
        let logs = store.recent_auth_logs(10).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs.first().and_then(|log| log.user_id), None);
    }

    #[tokio::test]
    async fn offline_store_reports_unavailable() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        assert!(matches!(
            store.ping().await,
            Err(IamError::StoreUnavailable(_))
        ));
        store.set_unavailable(false);
        assert!(store.ping().await.is_ok());
    }
}
