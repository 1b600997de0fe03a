//! ストア抽象と Postgres 実装
//!
//! サービス層はここで定義するトレイトにのみ依存する。テストでは
//! インメモリ実装を注入し、本番では sqlx ベースの実装を使う。

use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{NewOtp, NewUser, Otp, OtpPurpose, SessionState, User};

pub mod otp;
pub mod user;

pub use otp::PgOtpRepository;
pub use user::PgUserRepository;

/// OTPレコードの永続化
pub trait OtpStore: Clone + Send + Sync {
    /// 新しいOTPレコードをACTIVEで保存する
    fn insert(&self, otp: NewOtp) -> impl Future<Output = Result<Otp, AppError>> + Send;

    /// (email, purpose) の最新レコードを1件取得する（ステータス不問）
    fn latest(
        &self,
        email: &str,
        purpose: OtpPurpose,
    ) -> impl Future<Output = Result<Option<Otp>, AppError>> + Send;

    /// (email, purpose) の最新のACTIVEレコードを1件取得する
    fn latest_active(
        &self,
        email: &str,
        purpose: OtpPurpose,
    ) -> impl Future<Output = Result<Option<Otp>, AppError>> + Send;

    /// since以降に作成されたレコード数（ステータス不問）
    fn count_since(
        &self,
        email: &str,
        purpose: OtpPurpose,
        since: OffsetDateTime,
    ) -> impl Future<Output = Result<i64, AppError>> + Send;

    /// since以降に作成されたレコードを作成日時の昇順で返す（ステータス不問）
    fn all_since(
        &self,
        email: &str,
        purpose: OtpPurpose,
        since: OffsetDateTime,
    ) -> impl Future<Output = Result<Vec<Otp>, AppError>> + Send;

    /// (email, purpose) のACTIVEなレコードをすべてEXPIREDにする
    ///
    /// # Returns
    /// 更新された件数
    fn expire_all(
        &self,
        email: &str,
        purpose: OtpPurpose,
    ) -> impl Future<Output = Result<u64, AppError>> + Send;
}

/// アカウントと資格情報の永続化
pub trait UserStore: Clone + Send + Sync {
    /// ユーザー名またはメールアドレスのどちらでも検索できる
    fn find_by_username_or_email(
        &self,
        input: &str,
    ) -> impl Future<Output = Result<Option<User>, AppError>> + Send;

    fn exists_by_email(&self, email: &str) -> impl Future<Output = Result<bool, AppError>> + Send;

    fn exists_by_username(
        &self,
        username: &str,
    ) -> impl Future<Output = Result<bool, AppError>> + Send;

    /// 直近limit件のパスワードハッシュを変更日時の降順で返す
    fn recent_password_hashes(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> impl Future<Output = Result<Vec<String>, AppError>> + Send;

    /// OTP確認済みサインアップの書き込み単位
    ///
    /// ユーザー作成（CONFIRMED / LOGGED_OUT）・履歴の初期エントリ追加・
    /// サインアップ用OTPの一括失効を単一トランザクションで行う。
    fn create_confirmed(
        &self,
        user: NewUser,
        now: OffsetDateTime,
    ) -> impl Future<Output = Result<User, AppError>> + Send;

    /// パスワードリセットの書き込み単位
    ///
    /// ハッシュ更新・強制ログアウト・履歴追加・(email, purpose) の
    /// OTP一括失効を単一トランザクションで行う。途中で失敗した場合は
    /// すべてロールバックされる。
    fn apply_password_reset(
        &self,
        user_id: Uuid,
        email: &str,
        purpose: OtpPurpose,
        new_hash: &str,
        now: OffsetDateTime,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    /// セッション状態の遷移
    ///
    /// 遷移条件（LOGGED_INへは確認済みかつLOGGED_OUTから、
    /// LOGGED_OUTへはLOGGED_INから）を満たさない場合はfalseを返す。
    fn set_session_state(
        &self,
        user_id: Uuid,
        state: SessionState,
        now: OffsetDateTime,
    ) -> impl Future<Output = Result<bool, AppError>> + Send;
}
