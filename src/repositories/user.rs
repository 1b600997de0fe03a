use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{NewUser, OtpPurpose, OtpStatus, SessionState, User, VerificationState};
use crate::repositories::UserStore;

#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const USER_COLUMNS: &str = "id, email, username, first_name, last_name, password_hash, \
                            verification_state, session_state, created_at, updated_at";

/// UNIQUE制約違反をサインアップの重複エラーに変換する
fn map_unique_violation(e: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(db_err) = &e {
        match db_err.constraint() {
            Some("users_email_key") => {
                return AppError::SignupConflict {
                    email_taken: true,
                    username_taken: false,
                };
            }
            Some("users_username_key") => {
                return AppError::SignupConflict {
                    email_taken: false,
                    username_taken: true,
                };
            }
            _ => {}
        }
    }
    AppError::Database(e)
}

impl UserStore for PgUserRepository {
    async fn find_by_username_or_email(&self, input: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1 OR email = $1"
        ))
        .bind(input)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn exists_by_email(&self, email: &str) -> Result<bool, AppError> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM users WHERE email = $1)",
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn exists_by_username(&self, username: &str) -> Result<bool, AppError> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM users WHERE username = $1)",
        )
        .bind(username)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    /// 直近limit件のパスワードハッシュ（再利用チェック用）
    async fn recent_password_hashes(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<String>, AppError> {
        let hashes = sqlx::query_scalar::<_, String>(
            r#"
            SELECT password_hash
            FROM password_history
            WHERE user_id = $1
            ORDER BY changed_at DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(hashes)
    }

    /// サインアップの書き込み単位（単一トランザクション）
    ///
    /// ユーザー作成・履歴の初期エントリ・サインアップ用OTPの失効が
    /// 部分的に適用された状態は観測できない
    async fn create_confirmed(&self, user: NewUser, now: OffsetDateTime) -> Result<User, AppError> {
        let mut tx = self.pool.begin().await?;

        let created = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (email, username, first_name, last_name, password_hash,
                               verification_state, session_state, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&user.email)
        .bind(&user.username)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.password_hash)
        .bind(VerificationState::Confirmed)
        .bind(SessionState::LoggedOut)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_unique_violation)?;

        sqlx::query(
            r#"
            INSERT INTO password_history (user_id, password_hash, changed_at)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(created.id)
        .bind(&user.password_hash)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE otps
            SET status = $3
            WHERE email = $1 AND purpose = $2 AND status = $4
            "#,
        )
        .bind(&created.email)
        .bind(OtpPurpose::Signup)
        .bind(OtpStatus::Expired)
        .bind(OtpStatus::Active)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(created)
    }

    /// パスワードリセットの書き込み単位（単一トランザクション）
    async fn apply_password_reset(
        &self,
        user_id: Uuid,
        email: &str,
        purpose: OtpPurpose,
        new_hash: &str,
        now: OffsetDateTime,
    ) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        // ハッシュ更新と同時に強制ログアウトする
        sqlx::query(
            r#"
            UPDATE users
            SET password_hash = $2, session_state = $3, updated_at = $4
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .bind(new_hash)
        .bind(SessionState::LoggedOut)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO password_history (user_id, password_hash, changed_at)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(user_id)
        .bind(new_hash)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        // 消費した1件だけでなくACTIVEな同系統OTPをすべて失効する
        sqlx::query(
            r#"
            UPDATE otps
            SET status = $3
            WHERE email = $1 AND purpose = $2 AND status = $4
            "#,
        )
        .bind(email)
        .bind(purpose)
        .bind(OtpStatus::Expired)
        .bind(OtpStatus::Active)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(())
    }

    /// セッション状態の遷移
    ///
    /// 遷移条件をWHERE句で検査することで、同時ログインの競合を
    /// DB側で排除する（条件を満たさなければ0行更新でfalse）
    async fn set_session_state(
        &self,
        user_id: Uuid,
        state: SessionState,
        now: OffsetDateTime,
    ) -> Result<bool, AppError> {
        let result = match state {
            SessionState::LoggedIn => {
                sqlx::query(
                    r#"
                    UPDATE users
                    SET session_state = $2, updated_at = $3
                    WHERE id = $1 AND session_state = $4 AND verification_state = $5
                    "#,
                )
                .bind(user_id)
                .bind(SessionState::LoggedIn)
                .bind(now)
                .bind(SessionState::LoggedOut)
                .bind(VerificationState::Confirmed)
                .execute(&self.pool)
                .await?
            }
            SessionState::LoggedOut => {
                sqlx::query(
                    r#"
                    UPDATE users
                    SET session_state = $2, updated_at = $3
                    WHERE id = $1 AND session_state = $4
                    "#,
                )
                .bind(user_id)
                .bind(SessionState::LoggedOut)
                .bind(now)
                .bind(SessionState::LoggedIn)
                .execute(&self.pool)
                .await?
            }
        };

        Ok(result.rows_affected() > 0)
    }
}
