//! OTP発行レート制限の振る舞い

mod common;

use time::Duration;

use otpgate::models::{NewOtp, OtpPurpose};
use otpgate::repositories::OtpStore;
use otpgate::services::{BlockReason, RateLimitDecision, RateLimiter};

use common::{MemoryOtpStore, base_time, test_config};

const EMAIL: &str = "taro@example.com";

/// created_at を指定してレコードを投入する
async fn insert_at(store: &MemoryOtpStore, offset: Duration) {
    let created_at = base_time() + offset;
    store
        .insert(NewOtp {
            email: EMAIL.to_string(),
            purpose: OtpPurpose::Signup,
            code: "123456".to_string(),
            created_at,
            expires_at: created_at + Duration::minutes(5),
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn test_first_issuance_is_allowed() {
    let store = MemoryOtpStore::new();
    let limiter = RateLimiter::new(store, test_config());

    let decision = limiter
        .evaluate(EMAIL, OtpPurpose::Signup, base_time())
        .await
        .unwrap();

    assert_eq!(decision, RateLimitDecision::Allowed);
}

#[tokio::test]
async fn test_sixth_issuance_in_window_is_blocked() {
    let store = MemoryOtpStore::new();
    for i in 0..5 {
        insert_at(&store, Duration::minutes(i * 2)).await;
    }
    let limiter = RateLimiter::new(store, test_config());

    // 最終投入から10分後に6回目を試みる
    let now = base_time() + Duration::minutes(18);
    let decision = limiter
        .evaluate(EMAIL, OtpPurpose::Signup, now)
        .await
        .unwrap();

    // 最古レコード（base_time）がウィンドウを抜けるのは base_time + 30分
    assert_eq!(
        decision,
        RateLimitDecision::Blocked {
            retry_after: Duration::minutes(12),
            reason: BlockReason::WindowExhausted,
        }
    );
}

#[tokio::test]
async fn test_expired_records_still_consume_window_slots() {
    let store = MemoryOtpStore::new();
    for i in 0..5 {
        insert_at(&store, Duration::minutes(i)).await;
    }
    // 全件をEXPIREDにしてもウィンドウの消費分として数える
    store.expire_all(EMAIL, OtpPurpose::Signup).await.unwrap();

    let limiter = RateLimiter::new(store, test_config());
    let decision = limiter
        .evaluate(EMAIL, OtpPurpose::Signup, base_time() + Duration::minutes(10))
        .await
        .unwrap();

    assert!(matches!(
        decision,
        RateLimitDecision::Blocked {
            reason: BlockReason::WindowExhausted,
            ..
        }
    ));
}

#[tokio::test]
async fn test_cooldown_blocks_immediate_resend() {
    let store = MemoryOtpStore::new();
    insert_at(&store, Duration::ZERO).await;
    let limiter = RateLimiter::new(store, test_config());

    let decision = limiter
        .evaluate(EMAIL, OtpPurpose::Signup, base_time() + Duration::seconds(10))
        .await
        .unwrap();

    assert_eq!(
        decision,
        RateLimitDecision::Blocked {
            retry_after: Duration::seconds(20),
            reason: BlockReason::Cooldown,
        }
    );
}

#[tokio::test]
async fn test_cooldown_expires_after_thirty_seconds() {
    let store = MemoryOtpStore::new();
    insert_at(&store, Duration::ZERO).await;
    let limiter = RateLimiter::new(store, test_config());

    let decision = limiter
        .evaluate(EMAIL, OtpPurpose::Signup, base_time() + Duration::seconds(30))
        .await
        .unwrap();

    assert_eq!(decision, RateLimitDecision::Allowed);
}

#[tokio::test]
async fn test_window_rule_wins_over_cooldown() {
    let store = MemoryOtpStore::new();
    for i in 0..5 {
        insert_at(&store, Duration::minutes(i)).await;
    }
    let limiter = RateLimiter::new(store, test_config());

    // 最終投入から5秒後: クールダウンも未経過だがウィンドウ超過が先に評価される
    let decision = limiter
        .evaluate(
            EMAIL,
            OtpPurpose::Signup,
            base_time() + Duration::minutes(4) + Duration::seconds(5),
        )
        .await
        .unwrap();

    assert!(matches!(
        decision,
        RateLimitDecision::Blocked {
            reason: BlockReason::WindowExhausted,
            ..
        }
    ));
}

#[tokio::test]
async fn test_records_outside_window_are_not_counted() {
    let store = MemoryOtpStore::new();
    for i in 0..5 {
        insert_at(&store, Duration::minutes(i)).await;
    }
    let limiter = RateLimiter::new(store, test_config());

    // 最古レコードがウィンドウを抜けた直後（base_time + 31分）。
    // ウィンドウ内は4件なので発行できる
    let decision = limiter
        .evaluate(EMAIL, OtpPurpose::Signup, base_time() + Duration::minutes(31))
        .await
        .unwrap();

    assert_eq!(decision, RateLimitDecision::Allowed);
}

#[tokio::test]
async fn test_other_purpose_does_not_consume_window() {
    let store = MemoryOtpStore::new();
    for i in 0..5 {
        insert_at(&store, Duration::minutes(i)).await;
    }
    let limiter = RateLimiter::new(store, test_config());

    // Signupで上限超過でもForgotPasswordの発行は独立に判定される
    let decision = limiter
        .evaluate(
            EMAIL,
            OtpPurpose::ForgotPassword,
            base_time() + Duration::minutes(10),
        )
        .await
        .unwrap();

    assert_eq!(decision, RateLimitDecision::Allowed);
}
