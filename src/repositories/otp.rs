use sqlx::PgPool;
use time::OffsetDateTime;

use crate::error::AppError;
use crate::models::{NewOtp, Otp, OtpPurpose, OtpStatus};
use crate::repositories::OtpStore;

#[derive(Clone)]
pub struct PgOtpRepository {
    pool: PgPool,
}

impl PgOtpRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl OtpStore for PgOtpRepository {
    /// 新しいOTPレコードを作成
    ///
    /// # Note
    /// created_at / expires_at は注入されたクロック由来の値を使うため
    /// DBのNOW()には頼らない
    async fn insert(&self, otp: NewOtp) -> Result<Otp, AppError> {
        let otp = sqlx::query_as::<_, Otp>(
            r#"
            INSERT INTO otps (email, purpose, code, status, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, email, purpose, code, status, created_at, expires_at
            "#,
        )
        .bind(&otp.email)
        .bind(otp.purpose)
        .bind(&otp.code)
        .bind(OtpStatus::Active)
        .bind(otp.created_at)
        .bind(otp.expires_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(otp)
    }

    /// 最新のOTPレコードを取得（ステータス不問）
    ///
    /// # Note
    /// 有効期限・コード照合の検証は呼び出し側で行う
    async fn latest(&self, email: &str, purpose: OtpPurpose) -> Result<Option<Otp>, AppError> {
        let otp = sqlx::query_as::<_, Otp>(
            r#"
            SELECT id, email, purpose, code, status, created_at, expires_at
            FROM otps
            WHERE email = $1 AND purpose = $2
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(email)
        .bind(purpose)
        .fetch_optional(&self.pool)
        .await?;

        Ok(otp)
    }

    /// 最新のACTIVEなOTPレコードを取得（クールダウン判定用）
    async fn latest_active(
        &self,
        email: &str,
        purpose: OtpPurpose,
    ) -> Result<Option<Otp>, AppError> {
        let otp = sqlx::query_as::<_, Otp>(
            r#"
            SELECT id, email, purpose, code, status, created_at, expires_at
            FROM otps
            WHERE email = $1 AND purpose = $2 AND status = $3
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(email)
        .bind(purpose)
        .bind(OtpStatus::Active)
        .fetch_optional(&self.pool)
        .await?;

        Ok(otp)
    }

    /// since以降に作成されたレコード数
    ///
    /// 失効済み・消費済みのレコードも発行枠の消費として数える
    async fn count_since(
        &self,
        email: &str,
        purpose: OtpPurpose,
        since: OffsetDateTime,
    ) -> Result<i64, AppError> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM otps
            WHERE email = $1 AND purpose = $2 AND created_at >= $3
            "#,
        )
        .bind(email)
        .bind(purpose)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    /// since以降のレコードを作成日時の昇順で取得
    async fn all_since(
        &self,
        email: &str,
        purpose: OtpPurpose,
        since: OffsetDateTime,
    ) -> Result<Vec<Otp>, AppError> {
        let otps = sqlx::query_as::<_, Otp>(
            r#"
            SELECT id, email, purpose, code, status, created_at, expires_at
            FROM otps
            WHERE email = $1 AND purpose = $2 AND created_at >= $3
            ORDER BY created_at ASC
            "#,
        )
        .bind(email)
        .bind(purpose)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        Ok(otps)
    }

    /// ACTIVEなOTPを一括失効
    async fn expire_all(&self, email: &str, purpose: OtpPurpose) -> Result<u64, AppError> {
        let result = sqlx::query(
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
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
