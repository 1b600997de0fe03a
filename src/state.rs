use std::sync::Arc;

use sqlx::PgPool;

use crate::clock::Clock;
use crate::config::Config;
use crate::repositories::{PgOtpRepository, PgUserRepository};
use crate::services::{AccountService, AppNotifier, OtpService};

/// アプリケーション共有状態
///
/// axum の State として全ハンドラーで共有される。
/// Clone は必須（axum が内部で clone するため）。
#[derive(Clone)]
pub struct AppState {
    /// PostgreSQL コネクションプール
    pub db_pool: PgPool,
    /// アプリケーション設定（Arc で共有）
    pub config: Arc<Config>,
    /// 現在時刻の供給源（テストでは固定時刻に差し替える）
    pub clock: Clock,
    /// OTP発行・検証サービス
    pub otp_service: OtpService<PgOtpRepository, AppNotifier>,
    /// アカウント管理サービス
    pub account_service: AccountService<PgOtpRepository, PgUserRepository, AppNotifier>,
}

impl AppState {
    /// 新しい AppState を作成
    pub fn new(db_pool: PgPool, notifier: AppNotifier, clock: Clock, config: Config) -> Self {
        let config = Arc::new(config);

        let otp_repo = PgOtpRepository::new(db_pool.clone());
        let user_repo = PgUserRepository::new(db_pool.clone());

        let otp_service = OtpService::new(otp_repo, notifier, clock.clone(), config.clone());
        let account_service = AccountService::new(
            user_repo,
            otp_service.clone(),
            clock.clone(),
            config.clone(),
        );

        Self {
            db_pool,
            config,
            clock,
            otp_service,
            account_service,
        }
    }
}
