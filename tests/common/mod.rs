//! テスト用のインメモリ実装とヘルパー
//!
//! 実DBを使わずにサービス層の振る舞いを検証するためのフェイク。
//! MemoryUserStore は MemoryOtpStore とOTPレコードの保持領域を
//! 共有するため、サインアップ・リセット完了時のOTP一括失効も
//! 本番実装と同じように観測できる。

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use time::OffsetDateTime;
use uuid::Uuid;

use otpgate::clock::Clock;
use otpgate::config::Config;
use otpgate::error::AppError;
use otpgate::models::{NewOtp, NewUser, Otp, OtpPurpose, OtpStatus, SessionState, User,
    VerificationState};
use otpgate::repositories::{OtpStore, UserStore};
use otpgate::services::{AccountService, Notifier, OtpService};

/// テストの基準時刻（2023-11-14T22:13:20Z）
pub fn base_time() -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap()
}

pub fn test_config() -> Arc<Config> {
    Arc::new(Config::for_tests())
}

pub fn fixed_clock() -> Clock {
    Clock::fixed(base_time())
}

// === インメモリOTPストア ===

#[derive(Clone, Default)]
pub struct MemoryOtpStore {
    otps: Arc<Mutex<Vec<Otp>>>,
}

impl MemoryOtpStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 保持領域への共有ハンドル（MemoryUserStore と共有するため）
    pub fn handle(&self) -> Arc<Mutex<Vec<Otp>>> {
        self.otps.clone()
    }

    pub fn all(&self) -> Vec<Otp> {
        self.otps.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.otps.lock().unwrap().len()
    }
}

impl OtpStore for MemoryOtpStore {
    async fn insert(&self, otp: NewOtp) -> Result<Otp, AppError> {
        let record = Otp {
            id: Uuid::new_v4(),
            email: otp.email,
            purpose: otp.purpose,
            code: otp.code,
            status: OtpStatus::Active,
            created_at: otp.created_at,
            expires_at: otp.expires_at,
        };
        self.otps.lock().unwrap().push(record.clone());
        Ok(record)
    }

    async fn latest(&self, email: &str, purpose: OtpPurpose) -> Result<Option<Otp>, AppError> {
        Ok(self
            .otps
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|o| o.email == email && o.purpose == purpose)
            .cloned())
    }

    async fn latest_active(
        &self,
        email: &str,
        purpose: OtpPurpose,
    ) -> Result<Option<Otp>, AppError> {
        Ok(self
            .otps
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|o| o.email == email && o.purpose == purpose && o.status == OtpStatus::Active)
            .cloned())
    }

    async fn count_since(
        &self,
        email: &str,
        purpose: OtpPurpose,
        since: OffsetDateTime,
    ) -> Result<i64, AppError> {
        Ok(self
            .otps
            .lock()
            .unwrap()
            .iter()
            .filter(|o| o.email == email && o.purpose == purpose && o.created_at >= since)
            .count() as i64)
    }

    async fn all_since(
        &self,
        email: &str,
        purpose: OtpPurpose,
        since: OffsetDateTime,
    ) -> Result<Vec<Otp>, AppError> {
        let mut records: Vec<Otp> = self
            .otps
            .lock()
            .unwrap()
            .iter()
            .filter(|o| o.email == email && o.purpose == purpose && o.created_at >= since)
            .cloned()
            .collect();
        records.sort_by_key(|o| o.created_at);
        Ok(records)
    }

    async fn expire_all(&self, email: &str, purpose: OtpPurpose) -> Result<u64, AppError> {
        let mut otps = self.otps.lock().unwrap();
        let mut updated = 0;
        for otp in otps.iter_mut() {
            if otp.email == email && otp.purpose == purpose && otp.status == OtpStatus::Active {
                otp.status = OtpStatus::Expired;
                updated += 1;
            }
        }
        Ok(updated)
    }
}

// === インメモリユーザーストア ===

#[derive(Clone)]
pub struct MemoryUserStore {
    users: Arc<Mutex<Vec<User>>>,
    history: Arc<Mutex<Vec<(Uuid, String, OffsetDateTime)>>>,
    otps: Arc<Mutex<Vec<Otp>>>,
}

impl MemoryUserStore {
    /// OTP保持領域を共有して構築する
    pub fn sharing(otp_store: &MemoryOtpStore) -> Self {
        Self {
            users: Arc::new(Mutex::new(Vec::new())),
            history: Arc::new(Mutex::new(Vec::new())),
            otps: otp_store.handle(),
        }
    }

    pub fn users(&self) -> Vec<User> {
        self.users.lock().unwrap().clone()
    }

    pub fn history_len_for(&self, user_id: Uuid) -> usize {
        self.history
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _, _)| *id == user_id)
            .count()
    }

    /// 既存ユーザーを直接投入する（サインアップを経ないテスト用）
    pub fn seed_user(
        &self,
        email: &str,
        username: &str,
        password_hash: &str,
        verification_state: VerificationState,
        session_state: SessionState,
        now: OffsetDateTime,
    ) -> User {
        let user = User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            username: username.to_string(),
            first_name: "太郎".to_string(),
            last_name: "山田".to_string(),
            password_hash: password_hash.to_string(),
            verification_state,
            session_state,
            created_at: now,
            updated_at: now,
        };
        self.users.lock().unwrap().push(user.clone());
        self.history
            .lock()
            .unwrap()
            .push((user.id, password_hash.to_string(), now));
        user
    }

    fn expire_otps(&self, email: &str, purpose: OtpPurpose) {
        let mut otps = self.otps.lock().unwrap();
        for otp in otps.iter_mut() {
            if otp.email == email && otp.purpose == purpose && otp.status == OtpStatus::Active {
                otp.status = OtpStatus::Expired;
            }
        }
    }
}

impl UserStore for MemoryUserStore {
    async fn find_by_username_or_email(&self, input: &str) -> Result<Option<User>, AppError> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.username == input || u.email == input)
            .cloned())
    }

    async fn exists_by_email(&self, email: &str) -> Result<bool, AppError> {
        Ok(self.users.lock().unwrap().iter().any(|u| u.email == email))
    }

    async fn exists_by_username(&self, username: &str) -> Result<bool, AppError> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .any(|u| u.username == username))
    }

    async fn recent_password_hashes(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<String>, AppError> {
        let mut entries: Vec<(OffsetDateTime, usize, String)> = self
            .history
            .lock()
            .unwrap()
            .iter()
            .enumerate()
            .filter(|(_, (id, _, _))| *id == user_id)
            .map(|(index, (_, hash, at))| (*at, index, hash.clone()))
            .collect();
        // 変更日時の降順。同時刻は後に追加されたものを新しいとみなす
        entries.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.cmp(&a.1)));
        Ok(entries
            .into_iter()
            .take(limit as usize)
            .map(|(_, _, hash)| hash)
            .collect())
    }

    async fn create_confirmed(&self, user: NewUser, now: OffsetDateTime) -> Result<User, AppError> {
        let email_taken = self.exists_by_email(&user.email).await?;
        let username_taken = self.exists_by_username(&user.username).await?;
        if email_taken || username_taken {
            return Err(AppError::SignupConflict {
                email_taken,
                username_taken,
            });
        }

        let record = User {
            id: Uuid::new_v4(),
            email: user.email,
            username: user.username,
            first_name: user.first_name,
            last_name: user.last_name,
            password_hash: user.password_hash,
            verification_state: VerificationState::Confirmed,
            session_state: SessionState::LoggedOut,
            created_at: now,
            updated_at: now,
        };

        self.users.lock().unwrap().push(record.clone());
        self.history
            .lock()
            .unwrap()
            .push((record.id, record.password_hash.clone(), now));
        self.expire_otps(&record.email, OtpPurpose::Signup);

        Ok(record)
    }

    async fn apply_password_reset(
        &self,
        user_id: Uuid,
        email: &str,
        purpose: OtpPurpose,
        new_hash: &str,
        now: OffsetDateTime,
    ) -> Result<(), AppError> {
        {
            let mut users = self.users.lock().unwrap();
            let user = users
                .iter_mut()
                .find(|u| u.id == user_id)
                .ok_or(AppError::UserNotFound)?;
            user.password_hash = new_hash.to_string();
            user.session_state = SessionState::LoggedOut;
            user.updated_at = now;
        }

        self.history
            .lock()
            .unwrap()
            .push((user_id, new_hash.to_string(), now));
        self.expire_otps(email, purpose);

        Ok(())
    }

    async fn set_session_state(
        &self,
        user_id: Uuid,
        state: SessionState,
        now: OffsetDateTime,
    ) -> Result<bool, AppError> {
        let mut users = self.users.lock().unwrap();
        let Some(user) = users.iter_mut().find(|u| u.id == user_id) else {
            return Ok(false);
        };

        let allowed = match state {
            SessionState::LoggedIn => {
                user.session_state == SessionState::LoggedOut
                    && user.verification_state == VerificationState::Confirmed
            }
            SessionState::LoggedOut => user.session_state == SessionState::LoggedIn,
        };

        if allowed {
            user.session_state = state;
            user.updated_at = now;
        }

        Ok(allowed)
    }
}

// === 送信内容を記録するNotifier ===

#[derive(Clone, Default)]
pub struct MemoryNotifier {
    sent: Arc<Mutex<Vec<(String, String, String)>>>,
    fail: Arc<AtomicBool>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以降のsend呼び出しを失敗させる
    pub fn fail_next_sends(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<(String, String, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    /// 最後に送った本文からOTPコードを取り出す
    pub fn last_code(&self) -> String {
        let sent = self.sent.lock().unwrap();
        let (_, _, body) = sent.last().expect("no mail sent");
        body.split("認証コード: ")
            .nth(1)
            .expect("body has no code")
            .chars()
            .take(6)
            .collect()
    }
}

impl Notifier for MemoryNotifier {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), AppError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(AppError::DeliveryFailed);
        }
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), subject.to_string(), body.to_string()));
        Ok(())
    }
}

// === サービスの組み立てヘルパー ===

pub struct TestEnv {
    pub otp_store: MemoryOtpStore,
    pub user_store: MemoryUserStore,
    pub notifier: MemoryNotifier,
    pub clock: Clock,
    pub config: Arc<Config>,
    pub otp_service: OtpService<MemoryOtpStore, MemoryNotifier>,
    pub account_service: AccountService<MemoryOtpStore, MemoryUserStore, MemoryNotifier>,
}

/// 固定クロックで一式を組み立てる
pub fn test_env() -> TestEnv {
    let otp_store = MemoryOtpStore::new();
    let user_store = MemoryUserStore::sharing(&otp_store);
    let notifier = MemoryNotifier::new();
    let clock = fixed_clock();
    let config = test_config();

    let otp_service = OtpService::new(
        otp_store.clone(),
        notifier.clone(),
        clock.clone(),
        config.clone(),
    );
    let account_service = AccountService::new(
        user_store.clone(),
        otp_service.clone(),
        clock.clone(),
        config.clone(),
    );

    TestEnv {
        otp_store,
        user_store,
        notifier,
        clock,
        config,
        otp_service,
        account_service,
    }
}
