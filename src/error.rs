use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::collections::BTreeMap;
use time::Duration;

/// アプリケーション全体の型付きエラー
///
/// サービス層は常にこの列挙型で失敗を返し、例外的な制御フローは
/// 公開境界を越えない。ユーザー向けの文言への変換は IntoResponse
/// でのみ行う。
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// 入力フィールドの形式エラー（ハンドラーのバリデーションで発生）
    #[error("バリデーションエラー: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    /// 30分ウィンドウ内の発行上限超過
    #[error("OTPの発行回数が上限に達しています")]
    OtpLimitExceeded { retry_after: Duration },

    /// 前回発行からのクールダウン（30秒）未経過
    #[error("OTPの再送間隔が短すぎます")]
    OtpCooldown { retry_after: Duration },

    /// 提出されたOTPが不一致・期限切れ・未発行のいずれか
    #[error("OTPが無効または期限切れです")]
    OtpInvalid,

    /// OTPメールの送信失敗。OTPレコードは保存されていない
    #[error("メール送信に失敗しました")]
    DeliveryFailed,

    /// サインアップ時のメールアドレス・ユーザー名の重複
    #[error("既に登録済みのメールアドレスまたはユーザー名です")]
    SignupConflict {
        email_taken: bool,
        username_taken: bool,
    },

    /// ユーザー名・メールアドレスに該当するアカウントがない
    #[error("ユーザーが見つかりません")]
    UserNotFound,

    /// 新パスワードが直近の履歴と一致
    #[error("新しいパスワードが直近に使用したものと同じです")]
    PasswordReused,

    /// 認証失敗（資格情報の不一致）
    #[error("認証エラー")]
    Authentication,

    /// メール確認が完了していないアカウント
    #[error("アカウントの確認が完了していません")]
    AccountNotVerified,

    /// 既にログイン中のアカウントへの再ログイン
    #[error("既にログイン中です")]
    AlreadyLoggedIn,

    /// ログインしていないアカウントへのログアウト要求
    #[error("ログインしていません")]
    NotLoggedIn,

    #[error("データベースエラー")]
    Database(#[from] sqlx::Error),

    #[error("内部エラー")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }
}

/// フィールドキー付きエラーレスポンス
///
/// 例: `{"errors": {"otp": "OTPの発行回数が上限に達しました。..."}}`
#[derive(Serialize)]
struct ErrorResponse {
    errors: BTreeMap<&'static str, String>,
}

fn single(field: &'static str, message: impl Into<String>) -> BTreeMap<&'static str, String> {
    let mut errors = BTreeMap::new();
    errors.insert(field, message.into());
    errors
}

/// 残り待ち時間を分と秒に分解する（表示用）
fn wait_parts(retry_after: Duration) -> (i64, i64) {
    let total = retry_after.whole_seconds().max(1);
    (total / 60, total % 60)
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, errors) = match &self {
            Self::Validation { field, message } => {
                (StatusCode::BAD_REQUEST, single(field, message.clone()))
            }
            Self::OtpLimitExceeded { retry_after } => {
                let (minutes, seconds) = wait_parts(*retry_after);
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    single(
                        "otp",
                        format!(
                            "OTPの発行回数が上限に達しました。あと{}分{}秒お待ちください",
                            minutes, seconds
                        ),
                    ),
                )
            }
            Self::OtpCooldown { retry_after } => {
                let (_, seconds) = wait_parts(*retry_after);
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    single(
                        "otp",
                        format!("OTPの再送まで、あと{}秒お待ちください", seconds),
                    ),
                )
            }
            Self::OtpInvalid => (
                StatusCode::BAD_REQUEST,
                single("otp", "OTPが正しくないか、期限切れです"),
            ),
            Self::DeliveryFailed => (
                StatusCode::BAD_GATEWAY,
                single(
                    "email",
                    "確認メールの送信に失敗しました。時間をおいて再試行してください",
                ),
            ),
            Self::SignupConflict {
                email_taken,
                username_taken,
            } => {
                let mut errors = BTreeMap::new();
                if *email_taken {
                    errors.insert("email", "このメールアドレスは既に登録されています".to_string());
                }
                if *username_taken {
                    errors.insert("username", "このユーザー名は既に使用されています".to_string());
                }
                (StatusCode::CONFLICT, errors)
            }
            Self::UserNotFound => (
                StatusCode::NOT_FOUND,
                single(
                    "username_or_email",
                    "該当するユーザーが見つかりません",
                ),
            ),
            Self::PasswordReused => (
                StatusCode::BAD_REQUEST,
                single(
                    "new_password",
                    "新しいパスワードは直近3回に使用したものと同じにできません",
                ),
            ),
            Self::Authentication => (
                StatusCode::UNAUTHORIZED,
                single(
                    "password",
                    "ユーザー名またはパスワードが正しくありません",
                ),
            ),
            Self::AccountNotVerified => (
                StatusCode::FORBIDDEN,
                single(
                    "username_or_email",
                    "メール確認が完了していないアカウントです",
                ),
            ),
            Self::AlreadyLoggedIn => (
                StatusCode::CONFLICT,
                single(
                    "username_or_email",
                    "このアカウントは既にログイン中です。先にログアウトしてください",
                ),
            ),
            Self::NotLoggedIn => (
                StatusCode::CONFLICT,
                single("user_id", "ログインしていないためログアウトできません"),
            ),
            Self::Database(e) => {
                tracing::error!(error = ?e, "データベースエラー");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    single("general", "内部エラーが発生しました"),
                )
            }
            Self::Internal(e) => {
                tracing::error!(error = ?e, "内部エラー");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    single("general", "内部エラーが発生しました"),
                )
            }
        };

        (status, Json(ErrorResponse { errors })).into_response()
    }
}
