use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::AppError;
use crate::handlers::validation::{
    validate_email, validate_name, validate_otp_code, validate_password, validate_username,
};
use crate::services::account::RegistrationInput;
use crate::state::AppState;

// === サインアップOTP発行 ===

#[derive(Debug, Deserialize)]
pub struct SignupOtpRequest {
    pub email: String,
    pub username: String,
}

#[derive(Debug, Serialize)]
pub struct SignupOtpResponse {
    pub message: String,
}

/// サインアップ確認用OTP発行ハンドラー
///
/// POST /api/signup/otp
///
/// 処理フロー:
/// 1. リクエストバリデーション
/// 2. メールアドレス・ユーザー名の重複チェック
/// 3. OTPを発行してメールで送信
pub async fn request_signup_otp(
    State(state): State<AppState>,
    Json(request): Json<SignupOtpRequest>,
) -> Result<Json<SignupOtpResponse>, AppError> {
    // バリデーション
    validate_email(&request.email)?;
    validate_username(&request.username)?;

    state
        .account_service
        .request_signup_otp(&request.email, &request.username)
        .await?;

    Ok(Json(SignupOtpResponse {
        message: "確認コードをメールで送信しました".to_string(),
    }))
}

// === サインアップ確定 ===

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub password: String, // SecretBox不要（Deserialize後すぐハッシュ化）
    pub otp_code: String,
}

#[derive(Debug, Serialize)]
pub struct SignupResponse {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// サインアップ確定ハンドラー
///
/// POST /api/signup
///
/// 処理フロー:
/// 1. リクエストバリデーション
/// 2. サインアップ用OTPを検証
/// 3. ユーザー作成（履歴の初期エントリとOTP失効を含む）
///
/// # Security
/// - パスワード・OTPコードはログに出力しない
/// - パスワードはサービス層で即座にハッシュ化
pub async fn signup(
    State(state): State<AppState>,
    Json(request): Json<SignupRequest>,
) -> Result<Json<SignupResponse>, AppError> {
    // バリデーション
    validate_email(&request.email)?;
    validate_username(&request.username)?;
    validate_name("first_name", &request.first_name)?;
    validate_name("last_name", &request.last_name)?;
    validate_password("password", &request.password)?;
    validate_otp_code(&request.otp_code)?;

    let user = state
        .account_service
        .register(
            RegistrationInput {
                email: request.email,
                username: request.username,
                first_name: request.first_name,
                last_name: request.last_name,
                password: request.password,
            },
            &request.otp_code,
        )
        .await?;

    Ok(Json(SignupResponse {
        id: user.id,
        email: user.email,
        username: user.username,
        created_at: user.created_at,
    }))
}
