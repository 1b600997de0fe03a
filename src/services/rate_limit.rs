use std::sync::Arc;

use time::{Duration, OffsetDateTime};

use crate::config::Config;
use crate::error::AppError;
use crate::models::OtpPurpose;
use crate::repositories::OtpStore;

/// レート制限の判定結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Blocked {
        /// 次に発行が許可されるまでの残り時間
        retry_after: Duration,
        reason: BlockReason,
    },
}

/// ブロック理由
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    /// ウィンドウ内の発行上限（既定: 30分で5回）を超過
    WindowExhausted,
    /// 前回発行からのクールダウン（既定: 30秒）が未経過
    Cooldown,
}

/// OTP発行のレート制限
///
/// 2つのルールで判定する:
/// 1. ウィンドウ: 直近30分間の発行数が5回以上なら、ウィンドウ内の
///    最古レコードが抜けるまでブロック。失効・消費済みのレコードも
///    発行枠の消費として数える。
/// 2. クールダウン: 最新のACTIVEなレコードから30秒未満ならブロック。
///
/// ウィンドウ判定をクールダウンより先に評価する。両方が同時に
/// 成立している場合はウィンドウ超過（より長い待ち時間）を返す。
#[derive(Clone)]
pub struct RateLimiter<O: OtpStore> {
    otp_store: O,
    config: Arc<Config>,
}

impl<O: OtpStore> RateLimiter<O> {
    pub fn new(otp_store: O, config: Arc<Config>) -> Self {
        Self { otp_store, config }
    }

    pub async fn evaluate(
        &self,
        email: &str,
        purpose: OtpPurpose,
        now: OffsetDateTime,
    ) -> Result<RateLimitDecision, AppError> {
        let window = Duration::seconds(self.config.otp_window_secs);
        let window_start = now - window;

        // 1. ウィンドウ判定
        let issued_in_window = self
            .otp_store
            .count_since(email, purpose, window_start)
            .await?;

        if issued_in_window >= self.config.otp_window_limit {
            // 最古レコードがウィンドウから抜けるまでの残り時間を計算
            let recent = self.otp_store.all_since(email, purpose, window_start).await?;
            let retry_after = match recent.first() {
                Some(oldest) => window - (now - oldest.created_at),
                // countとallの間にレコードが消えることはない（物理削除しないため）
                None => window,
            };

            tracing::warn!(
                email = %email,
                ?purpose,
                issued_in_window,
                "OTP発行をブロック（ウィンドウ上限超過）"
            );

            return Ok(RateLimitDecision::Blocked {
                retry_after,
                reason: BlockReason::WindowExhausted,
            });
        }

        // 2. クールダウン判定
        if let Some(last) = self.otp_store.latest_active(email, purpose).await? {
            let cooldown = Duration::seconds(self.config.otp_cooldown_secs);
            let elapsed = now - last.created_at;

            if elapsed < cooldown {
                tracing::info!(
                    email = %email,
                    ?purpose,
                    elapsed_secs = elapsed.whole_seconds(),
                    "OTP発行をブロック（クールダウン未経過）"
                );

                return Ok(RateLimitDecision::Blocked {
                    retry_after: cooldown - elapsed,
                    reason: BlockReason::Cooldown,
                });
            }
        }

        Ok(RateLimitDecision::Allowed)
    }
}
