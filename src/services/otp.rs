use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use rand::Rng;
use time::Duration;
use tokio::sync::Mutex as AsyncMutex;

use crate::clock::Clock;
use crate::config::Config;
use crate::error::AppError;
use crate::models::{NewOtp, Otp, OtpPurpose};
use crate::repositories::OtpStore;
use crate::services::email::Notifier;
use crate::services::rate_limit::{BlockReason, RateLimitDecision, RateLimiter};

/// 000000〜999999 の一様分布から6桁コードを生成する
fn generate_code() -> String {
    let mut rng = rand::rngs::OsRng;
    format!("{:06}", rng.gen_range(0..1_000_000))
}

fn subject_for(purpose: OtpPurpose) -> &'static str {
    match purpose {
        OtpPurpose::Signup => "【otpgate】メールアドレス確認コード",
        OtpPurpose::ForgotPassword => "【otpgate】パスワード再設定コード",
    }
}

/// (email, purpose) 単位で発行処理を直列化するロック
///
/// レート制限の判定と保存の間に別リクエストが割り込むと
/// 上限を超えて発行できてしまうため、同一キーの発行は直列化する。
/// 別キー同士は並行に処理される。
///
/// 発行は未認証でも到達できるため、エントリを残したままにすると
/// 任意のメールアドレスを送りつけるだけでマップが際限なく育つ。
/// 最後の保持者が `release` した時点でエントリを削除する。
#[derive(Clone, Default)]
struct IssueLocks {
    inner: Arc<StdMutex<HashMap<(String, OtpPurpose), Arc<AsyncMutex<()>>>>>,
}

impl IssueLocks {
    fn lock_for(&self, email: &str, purpose: OtpPurpose) -> Arc<AsyncMutex<()>> {
        let mut locks = self.inner.lock().expect("issue locks mutex poisoned");
        locks
            .entry((email.to_string(), purpose))
            .or_default()
            .clone()
    }

    /// 保持していたロックを返却し、他に保持者がいなければ
    /// エントリごと削除する
    fn release(&self, email: &str, purpose: OtpPurpose, lock: Arc<AsyncMutex<()>>) {
        let mut locks = self.inner.lock().expect("issue locks mutex poisoned");
        drop(lock);
        let key = (email.to_string(), purpose);
        // strong_count == 1 ならマップ内の参照だけが残っている
        if locks
            .get(&key)
            .is_some_and(|entry| Arc::strong_count(entry) == 1)
        {
            locks.remove(&key);
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.lock().expect("issue locks mutex poisoned").len()
    }
}

/// OTPの発行と検証
#[derive(Clone)]
pub struct OtpService<O: OtpStore, N: Notifier> {
    otp_store: O,
    notifier: N,
    rate_limiter: RateLimiter<O>,
    clock: Clock,
    config: Arc<Config>,
    issue_locks: IssueLocks,
}

impl<O: OtpStore, N: Notifier> OtpService<O, N> {
    pub fn new(otp_store: O, notifier: N, clock: Clock, config: Arc<Config>) -> Self {
        let rate_limiter = RateLimiter::new(otp_store.clone(), config.clone());
        Self {
            otp_store,
            notifier,
            rate_limiter,
            clock,
            config,
            issue_locks: IssueLocks::default(),
        }
    }

    /// OTPを発行してメールで送る
    ///
    /// 処理フロー:
    /// 1. レート制限を判定（ウィンドウ → クールダウンの順）
    /// 2. 6桁コードを生成
    /// 3. 先にメールを送信する。失敗した場合は保存せずに中断
    /// 4. ACTIVEなレコードとして保存。ここで失敗した場合はメールが
    ///    既に届いている可能性があるが、再送はせずエラーを返す
    ///
    /// # Security
    /// 生成したコードはログに出力しない
    pub async fn issue(&self, email: &str, purpose: OtpPurpose) -> Result<Otp, AppError> {
        // 同一 (email, purpose) の発行を直列化する
        let lock = self.issue_locks.lock_for(email, purpose);
        let result = {
            let _guard = lock.lock().await;
            self.issue_locked(email, purpose).await
        };
        self.issue_locks.release(email, purpose, lock);
        result
    }

    async fn issue_locked(&self, email: &str, purpose: OtpPurpose) -> Result<Otp, AppError> {
        let now = self.clock.now();

        if let RateLimitDecision::Blocked {
            retry_after,
            reason,
        } = self.rate_limiter.evaluate(email, purpose, now).await?
        {
            return Err(match reason {
                BlockReason::WindowExhausted => AppError::OtpLimitExceeded { retry_after },
                BlockReason::Cooldown => AppError::OtpCooldown { retry_after },
            });
        }

        let code = generate_code();
        let expires_at = now + Duration::seconds(self.config.otp_ttl_secs);

        let ttl_minutes = self.config.otp_ttl_secs / 60;
        self.notifier
            .send(
                email,
                subject_for(purpose),
                &format!(
                    "認証コード: {code}\nこのコードの有効期限は発行から{ttl_minutes}分です。"
                ),
            )
            .await?;

        let otp = self
            .otp_store
            .insert(NewOtp {
                email: email.to_string(),
                purpose,
                code,
                created_at: now,
                expires_at,
            })
            .await?;

        tracing::info!(email = %email, ?purpose, "OTPを発行");

        Ok(otp)
    }

    /// 提出されたコードを検証する（読み取り専用）
    ///
    /// 最新レコード1件とだけ照合する。ステータスがACTIVEのままでも
    /// 有効期限は必ず再評価する。レコードの失効は呼び出し側
    /// （リセット・サインアップの完了処理）の責務であり、ここでは
    /// 保存状態を一切変更しない。
    ///
    /// # Note
    /// 検証の試行回数には上限を設けていない。レート制限が掛かるのは
    /// 発行側のみ（旧システムの挙動を踏襲）。
    pub async fn verify(
        &self,
        email: &str,
        purpose: OtpPurpose,
        submitted: &str,
    ) -> Result<bool, AppError> {
        let now = self.clock.now();

        let Some(latest) = self.otp_store.latest(email, purpose).await? else {
            tracing::info!(email = %email, ?purpose, "OTP検証失敗（未発行）");
            return Ok(false);
        };

        let valid = latest.is_verifiable_at(now) && latest.code == submitted;

        if !valid {
            tracing::info!(email = %email, ?purpose, "OTP検証失敗");
        }

        Ok(valid)
    }
}
