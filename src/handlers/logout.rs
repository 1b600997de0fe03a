use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

/// ログアウトリクエスト
#[derive(Debug, Deserialize)]
pub struct LogoutRequest {
    pub user_id: Uuid,
}

/// ログアウトレスポンス
#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub message: String,
}

/// ログアウトハンドラー
///
/// POST /api/logout
///
/// LOGGED_IN のアカウントのみ LOGGED_OUT へ遷移できる
pub async fn logout(
    State(state): State<AppState>,
    Json(request): Json<LogoutRequest>,
) -> Result<Json<LogoutResponse>, AppError> {
    state.account_service.logout(request.user_id).await?;

    Ok(Json(LogoutResponse {
        message: "ログアウトしました".to_string(),
    }))
}
