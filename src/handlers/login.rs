use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::handlers::validation::validate_username_or_email;
use crate::state::AppState;

/// ログインリクエスト
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// ユーザー名またはメールアドレス
    pub username_or_email: String,
    /// ユーザーのパスワード
    pub password: String,
}

/// ログインレスポンス
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
}

/// ログインハンドラー
///
/// POST /api/login
///
/// 処理フロー:
/// 1. リクエストバリデーション
/// 2. 資格情報の検証（DB照合）
/// 3. LOGGED_OUT → LOGGED_IN の状態遷移（同時セッションは1つまで）
///
/// # Security
/// - パスワードはログに出力しない
/// - 存在しないユーザーとパスワード不一致は同じエラーで返す
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    // バリデーション
    validate_login_request(&request)?;

    let user = state
        .account_service
        .login(&request.username_or_email, &request.password)
        .await?;

    Ok(Json(LoginResponse {
        id: user.id,
        email: user.email,
        username: user.username,
        first_name: user.first_name,
        last_name: user.last_name,
    }))
}

/// ログインリクエストのバリデーション
fn validate_login_request(request: &LoginRequest) -> Result<(), AppError> {
    validate_username_or_email(&request.username_or_email)?;

    if request.password.is_empty() {
        return Err(AppError::validation("password", "パスワードは必須です"));
    }

    Ok(())
}
