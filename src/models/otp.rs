use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// OTPの用途
///
/// OTPは用途ごとに独立して発行・検証される。サインアップ確認用の
/// コードをパスワード再設定に使うことはできない。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, sqlx::Type)]
#[sqlx(type_name = "otp_purpose", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OtpPurpose {
    Signup,
    ForgotPassword,
}

/// OTPの状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, sqlx::Type)]
#[sqlx(type_name = "otp_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OtpStatus {
    Active,
    Expired,
}

/// メール所有確認用ワンタイムパスコード
///
/// レコードは監査とレート制限の集計に使うため物理削除しない。
/// 新しいOTPの発行や消費時には同じ (email, purpose) の古いレコードが
/// EXPIRED に更新される。
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Otp {
    pub id: Uuid,
    pub email: String,
    pub purpose: OtpPurpose,
    /// 6桁の数字コード。ログ・レスポンスには出さない
    #[serde(skip)]
    pub code: String,
    pub status: OtpStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

impl Otp {
    /// 指定時刻の時点で検証に使えるかどうか
    ///
    /// ステータスが ACTIVE のままでも有効期限は必ず再評価する。
    /// 期限切れレコードを能動的に掃除するバックグラウンド処理はなく、
    /// 失効は検証時に遅延評価される。
    pub fn is_verifiable_at(&self, now: OffsetDateTime) -> bool {
        self.status == OtpStatus::Active && now <= self.expires_at
    }
}

/// 保存前のOTPレコード
///
/// タイムスタンプはDBではなく注入されたクロックから与える
#[derive(Debug, Clone)]
pub struct NewOtp {
    pub email: String,
    pub purpose: OtpPurpose,
    pub code: String,
    pub created_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
}
