use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// メール確認の進行状態
///
/// 旧システムはログイン状態と確認状態をひとつのstatus列で兼用していた。
/// ここでは明示的に2つの状態に分離している。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, sqlx::Type)]
#[sqlx(type_name = "verification_state", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum VerificationState {
    Pending,
    Confirmed,
}

/// ログインセッションの状態
///
/// 同時に有効なセッションは1つだけ。LOGGED_IN のままの
/// アカウントは再ログインできない。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, sqlx::Type)]
#[sqlx(type_name = "session_state", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    LoggedOut,
    LoggedIn,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip)]
    pub password_hash: String,
    pub verification_state: VerificationState,
    pub session_state: SessionState,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// OTP確認済みサインアップで作成するユーザー
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    /// argon2idでハッシュ済みのパスワード
    pub password_hash: String,
}
