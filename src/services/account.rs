use std::sync::Arc;

use uuid::Uuid;

use crate::clock::Clock;
use crate::config::Config;
use crate::error::AppError;
use crate::models::{NewUser, OtpPurpose, SessionState, User, VerificationState};
use crate::repositories::{OtpStore, UserStore};
use crate::services::auth::{DUMMY_HASH, hash_password, verify_password};
use crate::services::email::Notifier;
use crate::services::otp::OtpService;

/// サインアップ確定時の入力
#[derive(Debug, Clone)]
pub struct RegistrationInput {
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    /// 平文パスワード。サービス内で即座にハッシュ化する
    pub password: String,
}

/// アカウントのライフサイクルを調整するサービス
///
/// サインアップ確認・パスワードリセット・ログイン/ログアウトの
/// 各フローでOTP検証・履歴チェック・状態遷移を束ねる。
#[derive(Clone)]
pub struct AccountService<O: OtpStore, U: UserStore, N: Notifier> {
    user_store: U,
    otp_service: OtpService<O, N>,
    clock: Clock,
    config: Arc<Config>,
}

impl<O: OtpStore, U: UserStore, N: Notifier> AccountService<O, U, N> {
    pub fn new(
        user_store: U,
        otp_service: OtpService<O, N>,
        clock: Clock,
        config: Arc<Config>,
    ) -> Self {
        Self {
            user_store,
            otp_service,
            clock,
            config,
        }
    }

    /// サインアップ確認用OTPの発行
    ///
    /// 発行前にメールアドレスとユーザー名の重複を確認する。
    /// 両方が重複している場合は両方のエラーを返す。
    pub async fn request_signup_otp(&self, email: &str, username: &str) -> Result<(), AppError> {
        let email_taken = self.user_store.exists_by_email(email).await?;
        let username_taken = self.user_store.exists_by_username(username).await?;

        if email_taken || username_taken {
            tracing::info!(email = %email, "サインアップOTP発行拒否（重複）");
            return Err(AppError::SignupConflict {
                email_taken,
                username_taken,
            });
        }

        self.otp_service.issue(email, OtpPurpose::Signup).await?;

        Ok(())
    }

    /// OTP検証を経てユーザーを登録する
    ///
    /// 処理フロー:
    /// 1. サインアップ用OTPを検証
    /// 2. パスワードをハッシュ化
    /// 3. ユーザー作成・履歴の初期エントリ・OTP失効を
    ///    単一トランザクションで適用
    pub async fn register(
        &self,
        input: RegistrationInput,
        otp_code: &str,
    ) -> Result<User, AppError> {
        if !self
            .otp_service
            .verify(&input.email, OtpPurpose::Signup, otp_code)
            .await?
        {
            return Err(AppError::OtpInvalid);
        }

        let password_hash = hash_password(&input.password)?;
        let now = self.clock.now();

        let user = self
            .user_store
            .create_confirmed(
                NewUser {
                    email: input.email,
                    username: input.username,
                    first_name: input.first_name,
                    last_name: input.last_name,
                    password_hash,
                },
                now,
            )
            .await?;

        tracing::info!(email = %user.email, username = %user.username, "ユーザー登録完了");

        Ok(user)
    }

    /// パスワード再設定用OTPの発行
    ///
    /// ユーザー名が渡された場合はメールアドレスに解決してから発行する。
    /// 該当アカウントがない場合はエラーを返す（旧システムの挙動を踏襲）。
    pub async fn request_password_reset_otp(
        &self,
        username_or_email: &str,
    ) -> Result<(), AppError> {
        let Some(user) = self
            .user_store
            .find_by_username_or_email(username_or_email)
            .await?
        else {
            tracing::info!("パスワード再設定OTP発行拒否（該当ユーザーなし）");
            return Err(AppError::UserNotFound);
        };

        self.otp_service
            .issue(&user.email, OtpPurpose::ForgotPassword)
            .await?;

        Ok(())
    }

    /// パスワード再設定用OTPの検証（読み取り専用）
    ///
    /// 再設定フォームを表示する前の確認ステップで使う。
    /// レコードの失効はここでは行わない。
    pub async fn verify_password_reset_otp(
        &self,
        username_or_email: &str,
        otp_code: &str,
    ) -> Result<bool, AppError> {
        let Some(user) = self
            .user_store
            .find_by_username_or_email(username_or_email)
            .await?
        else {
            return Ok(false);
        };

        self.otp_service
            .verify(&user.email, OtpPurpose::ForgotPassword, otp_code)
            .await
    }

    /// 新しいパスワードが直近の履歴と重複していないか
    ///
    /// # Note
    /// ハッシュはソルト付きのため文字列比較では検出できない。
    /// 平文の候補を直近N件（既定3件）のハッシュそれぞれに対して
    /// 検証することで判定する。
    pub async fn is_password_reused(
        &self,
        user_id: Uuid,
        candidate: &str,
    ) -> Result<bool, AppError> {
        let recent = self
            .user_store
            .recent_password_hashes(user_id, self.config.password_history_depth)
            .await?;

        for hash in &recent {
            if verify_password(candidate, hash)? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    /// OTP検証を経てパスワードを再設定する
    ///
    /// 処理フロー:
    /// 1. ユーザー名またはメールアドレスからアカウントを解決
    /// 2. パスワード再設定用OTPを検証
    /// 3. 直近の履歴との重複をチェック
    /// 4. ハッシュ更新・強制ログアウト・履歴追加・OTP一括失効を
    ///    単一トランザクションで適用
    ///
    /// # Security
    /// 新パスワード・OTPコードはログに出力しない
    pub async fn reset_password(
        &self,
        username_or_email: &str,
        otp_code: &str,
        new_password: &str,
    ) -> Result<(), AppError> {
        let Some(user) = self
            .user_store
            .find_by_username_or_email(username_or_email)
            .await?
        else {
            return Err(AppError::UserNotFound);
        };

        if !self
            .otp_service
            .verify(&user.email, OtpPurpose::ForgotPassword, otp_code)
            .await?
        {
            return Err(AppError::OtpInvalid);
        }

        if self.is_password_reused(user.id, new_password).await? {
            tracing::info!(email = %user.email, "パスワード再設定拒否（履歴と重複）");
            return Err(AppError::PasswordReused);
        }

        let new_hash = hash_password(new_password)?;
        let now = self.clock.now();

        self.user_store
            .apply_password_reset(
                user.id,
                &user.email,
                OtpPurpose::ForgotPassword,
                &new_hash,
                now,
            )
            .await?;

        tracing::info!(email = %user.email, "パスワード再設定完了");

        Ok(())
    }

    /// ログイン
    ///
    /// 確認済みかつログアウト状態のアカウントのみ成功し、
    /// 成功時にLOGGED_INへ遷移する。同時に有効なセッションは1つだけ。
    pub async fn login(&self, username_or_email: &str, password: &str) -> Result<User, AppError> {
        let user = match self
            .user_store
            .find_by_username_or_email(username_or_email)
            .await?
        {
            Some(user) => user,
            None => {
                // タイミング攻撃対策: ユーザー不在でもダミー検証を実行
                let _ = verify_password(password, DUMMY_HASH);
                tracing::warn!("ログイン失敗（該当ユーザーなし）");
                return Err(AppError::Authentication);
            }
        };

        if !verify_password(password, &user.password_hash)? {
            tracing::warn!(username = %user.username, "ログイン失敗（パスワード不一致）");
            return Err(AppError::Authentication);
        }

        if user.verification_state != VerificationState::Confirmed {
            return Err(AppError::AccountNotVerified);
        }

        if user.session_state == SessionState::LoggedIn {
            tracing::warn!(username = %user.username, "ログイン拒否（既にログイン中）");
            return Err(AppError::AlreadyLoggedIn);
        }

        // 遷移条件付きの更新。同時ログインで競合した側は0行更新になる
        let now = self.clock.now();
        if !self
            .user_store
            .set_session_state(user.id, SessionState::LoggedIn, now)
            .await?
        {
            return Err(AppError::AlreadyLoggedIn);
        }

        tracing::info!(username = %user.username, "ログイン成功");

        let mut user = user;
        user.session_state = SessionState::LoggedIn;
        Ok(user)
    }

    /// ログアウト
    ///
    /// LOGGED_INのアカウントのみLOGGED_OUTへ遷移できる
    pub async fn logout(&self, user_id: Uuid) -> Result<(), AppError> {
        let now = self.clock.now();

        if !self
            .user_store
            .set_session_state(user_id, SessionState::LoggedOut, now)
            .await?
        {
            tracing::warn!(user_id = %user_id, "ログアウト失敗（ログイン中でない）");
            return Err(AppError::NotLoggedIn);
        }

        tracing::info!(user_id = %user_id, "ログアウト完了");

        Ok(())
    }
}
