//! Records persisted by the store and the values the service hands back.
//!
//! The enum `as_str`/`parse` pairs match the PostgreSQL enum labels in
//! `sql/schema.sql`; both store backends go through them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub type UserId = i64;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AuthProvider {
    Local,
    AzureAd,
    Okta,
    Saml,
    Other,
}

impl AuthProvider {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::AzureAd => "azure_ad",
            Self::Okta => "okta",
            Self::Saml => "saml",
            Self::Other => "other",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "local" => Some(Self::Local),
            "azure_ad" => Some(Self::AzureAd),
            "okta" => Some(Self::Okta),
            "saml" => Some(Self::Saml),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MfaMethodType {
    EmailOtp,
    Totp,
    Sms,
    Whatsapp,
    Webauthn,
    CustomApp,
}

impl MfaMethodType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::EmailOtp => "email_otp",
            Self::Totp => "totp",
            Self::Sms => "sms",
            Self::Whatsapp => "whatsapp",
            Self::Webauthn => "webauthn",
            Self::CustomApp => "custom_app",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "email_otp" => Some(Self::EmailOtp),
            "totp" => Some(Self::Totp),
            "sms" => Some(Self::Sms),
            "whatsapp" => Some(Self::Whatsapp),
            "webauthn" => Some(Self::Webauthn),
            "custom_app" => Some(Self::CustomApp),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ChallengePurpose {
    #[default]
    Login,
    StepUp,
    AdminAction,
    ViewConfidentialData,
}

impl ChallengePurpose {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::StepUp => "step_up",
            Self::AdminAction => "admin_action",
            Self::ViewConfidentialData => "view_confidential_data",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "login" => Some(Self::Login),
            "step_up" => Some(Self::StepUp),
            "admin_action" => Some(Self::AdminAction),
            "view_confidential_data" => Some(Self::ViewConfidentialData),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AuthEventType {
    LoginSuccess,
    LoginFailed,
    Logout,
    MfaSent,
    MfaVerified,
    SsoLogin,
    Lockout,
    PasswordReset,
}

impl AuthEventType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LoginSuccess => "login_success",
            Self::LoginFailed => "login_failed",
            Self::Logout => "logout",
            Self::MfaSent => "mfa_sent",
            Self::MfaVerified => "mfa_verified",
            Self::SsoLogin => "sso_login",
            Self::Lockout => "lockout",
            Self::PasswordReset => "password_reset",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "login_success" => Some(Self::LoginSuccess),
            "login_failed" => Some(Self::LoginFailed),
            "logout" => Some(Self::Logout),
            "mfa_sent" => Some(Self::MfaSent),
            "mfa_verified" => Some(Self::MfaVerified),
            "sso_login" => Some(Self::SsoLogin),
            "lockout" => Some(Self::Lockout),
            "password_reset" => Some(Self::PasswordReset),
            _ => None,
        }
    }
}

/// A row of `iam_user_account`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct User {
    pub user_id: UserId,
    pub parent_id: i64,
    pub username: String,
    pub email: String,
    pub phone_number: Option<String>,
    pub display_name: String,
    pub auth_provider: AuthProvider,
    pub password_hash: Option<String>,
    pub is_active: bool,
    pub is_locked: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: Option<String>,
    pub updated_by: Option<String>,
}

impl User {
    /// Eligible users may log in and keep using their sessions.
    #[must_use]
    pub const fn is_eligible(&self) -> bool {
        self.is_active && !self.is_locked
    }
}

/// Fresh status flags, read on every login and every session check.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AccountStatus {
    pub is_active: bool,
    pub is_locked: bool,
}

impl AccountStatus {
    #[must_use]
    pub const fn is_eligible(self) -> bool {
        self.is_active && !self.is_locked
    }
}

#[derive(Clone, Debug)]
pub struct NewUser {
    pub parent_id: i64,
    pub username: String,
    pub email: String,
    pub phone_number: Option<String>,
    pub display_name: String,
    pub auth_provider: AuthProvider,
    pub password_hash: Option<String>,
    pub created_by: Option<String>,
}

/// A user together with the names of its roles, sorted.
#[derive(Clone, Debug)]
pub struct UserWithRoles {
    pub user: User,
    pub roles: Vec<String>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Role {
    pub role_id: i64,
    pub role_name: String,
    pub role_description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct RoleSummary {
    pub role: Role,
    pub user_count: i64,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AuthSession {
    pub session_id: String,
    pub user_id: UserId,
    pub login_time: DateTime<Utc>,
    pub logout_time: Option<DateTime<Utc>>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub sso_idp_session_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AuthSession {
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.logout_time.is_none()
    }
}

#[derive(Clone, Debug)]
pub struct NewSession {
    pub session_id: String,
    pub user_id: UserId,
    pub login_time: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub sso_idp_session_ref: Option<String>,
}

/// Open session joined with the owner's username.
#[derive(Clone, Debug)]
pub struct ActiveSession {
    pub session_id: String,
    pub user_id: UserId,
    pub username: String,
    pub login_time: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Clone, Debug)]
pub struct MfaMethod {
    pub mfa_id: i64,
    pub user_id: UserId,
    pub method_type: MfaMethodType,
    pub secret_ciphertext: Option<Vec<u8>>,
    pub is_primary: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct NewMfaMethod {
    pub user_id: UserId,
    pub method_type: MfaMethodType,
    pub secret_ciphertext: Option<Vec<u8>>,
    pub is_primary: bool,
}

#[derive(Clone, Debug)]
pub struct MfaChallenge {
    pub challenge_id: i64,
    pub user_id: UserId,
    pub method_type: MfaMethodType,
    pub otp_code_hash: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub consumed_at: Option<DateTime<Utc>>,
    pub ip_address: Option<String>,
    pub purpose: ChallengePurpose,
}

impl MfaChallenge {
    /// A challenge can be redeemed while unconsumed and strictly before `expires_at`.
    #[must_use]
    pub fn is_redeemable(&self, now: DateTime<Utc>) -> bool {
        self.consumed_at.is_none() && self.expires_at > now
    }
}

#[derive(Clone, Debug)]
pub struct NewMfaChallenge {
    pub user_id: UserId,
    pub method_type: MfaMethodType,
    pub otp_code_hash: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub purpose: ChallengePurpose,
}

/// A row of `iam_auth_log`, joined with the username when the user still exists.
#[derive(Clone, Debug)]
pub struct AuthLog {
    pub log_id: i64,
    pub user_id: Option<UserId>,
    pub username: Option<String>,
    pub event_type: AuthEventType,
    pub event_time: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub details: Option<String>,
}

#[derive(Clone, Debug)]
pub struct NewAuthLog {
    pub user_id: Option<UserId>,
    pub event_type: AuthEventType,
    pub event_time: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub details: Option<String>,
}

/// Caller network context, passed explicitly into every audited operation.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl ClientInfo {
    #[must_use]
    pub fn new(ip_address: Option<String>, user_agent: Option<String>) -> Self {
        Self {
            ip_address,
            user_agent,
        }
    }
}

/// The authenticated view of a user.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Identity {
    pub user_id: UserId,
    pub username: String,
    pub email: String,
    pub display_name: String,
    pub roles: Vec<String>,
    pub auth_provider: AuthProvider,
}

impl Identity {
    #[must_use]
    pub fn from_user(user: &User, roles: Vec<String>) -> Self {
        Self {
            user_id: user.user_id,
            username: user.username.clone(),
            email: user.email.clone(),
            display_name: user.display_name.clone(),
            roles,
            auth_provider: user.auth_provider,
        }
    }
}
