use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::handlers::validation::{
    validate_otp_code, validate_password, validate_username_or_email,
};
use crate::state::AppState;

// === 再設定用OTP発行 ===

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordOtpRequest {
    pub username_or_email: String,
}

#[derive(Debug, Serialize)]
pub struct ForgotPasswordOtpResponse {
    pub message: String,
}

/// パスワード再設定用OTP発行ハンドラー
///
/// POST /api/password/forgot/otp
///
/// ユーザー名が渡された場合は登録済みメールアドレスに解決して送信する
pub async fn request_password_reset_otp(
    State(state): State<AppState>,
    Json(request): Json<ForgotPasswordOtpRequest>,
) -> Result<Json<ForgotPasswordOtpResponse>, AppError> {
    // バリデーション
    validate_username_or_email(&request.username_or_email)?;

    state
        .account_service
        .request_password_reset_otp(&request.username_or_email)
        .await?;

    Ok(Json(ForgotPasswordOtpResponse {
        message: "再設定用の確認コードをメールで送信しました".to_string(),
    }))
}

// === 再設定用OTP検証 ===

#[derive(Debug, Deserialize)]
pub struct VerifyResetOtpRequest {
    pub username_or_email: String,
    pub otp_code: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyResetOtpResponse {
    pub message: String,
}

/// パスワード再設定用OTP検証ハンドラー
///
/// POST /api/password/forgot/verify
///
/// 再設定フォームを表示する前の確認ステップ。
/// 検証は読み取り専用で、OTPレコードはここでは失効しない。
pub async fn verify_password_reset_otp(
    State(state): State<AppState>,
    Json(request): Json<VerifyResetOtpRequest>,
) -> Result<Json<VerifyResetOtpResponse>, AppError> {
    // バリデーション
    validate_username_or_email(&request.username_or_email)?;
    validate_otp_code(&request.otp_code)?;

    let valid = state
        .account_service
        .verify_password_reset_otp(&request.username_or_email, &request.otp_code)
        .await?;

    if !valid {
        return Err(AppError::OtpInvalid);
    }

    Ok(Json(VerifyResetOtpResponse {
        message: "確認コードを確認しました".to_string(),
    }))
}

// === パスワード再設定実行 ===

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub username_or_email: String,
    pub otp_code: String,
    pub new_password: String,
}

#[derive(Debug, Serialize)]
pub struct ResetPasswordResponse {
    pub message: String,
}

/// パスワード再設定ハンドラー
///
/// POST /api/password/reset
///
/// 処理フロー:
/// 1. リクエストバリデーション
/// 2. OTP検証・履歴チェック・ハッシュ更新・強制ログアウト・
///    OTP一括失効（サービス層で実行）
///
/// # Security
/// - otp_code, new_password はログに出力しない
pub async fn reset_password(
    State(state): State<AppState>,
    Json(request): Json<ResetPasswordRequest>,
) -> Result<Json<ResetPasswordResponse>, AppError> {
    // バリデーション
    validate_reset_password_request(&request)?;

    state
        .account_service
        .reset_password(
            &request.username_or_email,
            &request.otp_code,
            &request.new_password,
        )
        .await?;

    tracing::info!("パスワード再設定完了");

    Ok(Json(ResetPasswordResponse {
        message: "パスワードが更新されました".to_string(),
    }))
}

/// パスワード再設定リクエストのバリデーション
fn validate_reset_password_request(request: &ResetPasswordRequest) -> Result<(), AppError> {
    validate_username_or_email(&request.username_or_email)?;
    validate_otp_code(&request.otp_code)?;
    validate_password("new_password", &request.new_password)?;
    Ok(())
}
