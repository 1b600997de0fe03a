use crate::error::AppError;

#[cfg(feature = "email")]
use crate::config::Config;

/// メール配送のインターフェース
///
/// 配送は失敗しうる。失敗は `AppError::DeliveryFailed` として
/// 呼び出し側に返し、内部では再試行しない。
pub trait Notifier: Clone + Send + Sync {
    fn send(
        &self,
        to: &str,
        subject: &str,
        body: &str,
    ) -> impl Future<Output = Result<(), AppError>> + Send;
}

/// 開発用: 実際には送信せずログに出すだけの実装
///
/// # Security
/// 本文にはOTPコードが含まれるためログには出さない
#[derive(Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    async fn send(&self, to: &str, subject: &str, _body: &str) -> Result<(), AppError> {
        tracing::info!(to = %to, subject = %subject, "メール送信（開発モード）");
        Ok(())
    }
}

/// lettre による SMTP 送信実装
#[cfg(feature = "email")]
#[derive(Clone)]
pub struct SmtpNotifier {
    mailer: lettre::AsyncSmtpTransport<lettre::Tokio1Executor>,
    from: lettre::message::Mailbox,
}

#[cfg(feature = "email")]
impl SmtpNotifier {
    /// SMTP設定からトランスポートを構築
    ///
    /// smtp_host / smtp_username / smtp_password / smtp_from_address が
    /// すべて設定されている必要がある
    pub fn new(config: &Config) -> Result<Self, AppError> {
        use lettre::transport::smtp::authentication::Credentials;
        use secrecy::ExposeSecret;

        let host = config
            .smtp_host
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("SMTP_HOST is not set"))?;
        let username = config
            .smtp_username
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("SMTP_USERNAME is not set"))?;
        let password = config
            .smtp_password
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("SMTP_PASSWORD is not set"))?;
        let from = config
            .smtp_from_address
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("SMTP_FROM_ADDRESS is not set"))?
            .parse::<lettre::message::Mailbox>()
            .map_err(|e| anyhow::anyhow!("invalid SMTP_FROM_ADDRESS: {}", e))?;

        let mailer = lettre::AsyncSmtpTransport::<lettre::Tokio1Executor>::relay(host)
            .map_err(|e| anyhow::anyhow!("SMTP relay setup failed: {}", e))?
            .port(config.smtp_port)
            .credentials(Credentials::new(
                username.expose_secret().clone(),
                password.expose_secret().clone(),
            ))
            .build();

        Ok(Self { mailer, from })
    }
}

#[cfg(feature = "email")]
impl Notifier for SmtpNotifier {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), AppError> {
        use lettre::AsyncTransport;

        let to = to.parse::<lettre::message::Mailbox>().map_err(|e| {
            tracing::warn!(error = ?e, "宛先アドレスのパースに失敗");
            AppError::DeliveryFailed
        })?;

        let message = lettre::Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .body(body.to_string())
            .map_err(|e| {
                tracing::error!(error = ?e, "メールの組み立てに失敗");
                AppError::DeliveryFailed
            })?;

        self.mailer.send(message).await.map_err(|e| {
            tracing::error!(error = ?e, "SMTP送信に失敗");
            AppError::DeliveryFailed
        })?;

        Ok(())
    }
}

/// 実行時に選択される通知実装
///
/// email機能が有効でSMTP設定が揃っていればSMTP送信、
/// それ以外は開発用のログ出力にフォールバックする
#[derive(Clone)]
pub enum AppNotifier {
    Log(LogNotifier),
    #[cfg(feature = "email")]
    Smtp(SmtpNotifier),
}

impl Notifier for AppNotifier {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), AppError> {
        match self {
            Self::Log(notifier) => notifier.send(to, subject, body).await,
            #[cfg(feature = "email")]
            Self::Smtp(notifier) => notifier.send(to, subject, body).await,
        }
    }
}
