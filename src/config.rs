use secrecy::SecretBox;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub database_url: SecretBox<String>,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,

    // OTP設定
    /// OTPの有効期限（秒）
    #[serde(default = "default_otp_ttl_secs")]
    pub otp_ttl_secs: i64,
    /// 再送までの最低間隔（秒）
    #[serde(default = "default_otp_cooldown_secs")]
    pub otp_cooldown_secs: i64,
    /// レート制限ウィンドウの長さ（秒）
    #[serde(default = "default_otp_window_secs")]
    pub otp_window_secs: i64,
    /// ウィンドウ内で許可する発行回数の上限
    #[serde(default = "default_otp_window_limit")]
    pub otp_window_limit: i64,

    // パスワード履歴設定
    /// 再利用チェックで参照する直近パスワードの件数
    #[serde(default = "default_password_history_depth")]
    pub password_history_depth: i64,

    // SMTP設定（オプション - email機能有効時のみ使用）
    #[serde(default)]
    pub smtp_host: Option<String>,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    pub smtp_username: Option<SecretBox<String>>,
    pub smtp_password: Option<SecretBox<String>>,
    #[serde(default)]
    pub smtp_from_address: Option<String>,
}

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_OTP_TTL_SECS: i64 = 5 * 60;
const DEFAULT_OTP_COOLDOWN_SECS: i64 = 30;
const DEFAULT_OTP_WINDOW_SECS: i64 = 30 * 60;
const DEFAULT_OTP_WINDOW_LIMIT: i64 = 5;
const DEFAULT_PASSWORD_HISTORY_DEPTH: i64 = 3;
const DEFAULT_SMTP_PORT: u16 = 587;

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_otp_ttl_secs() -> i64 {
    DEFAULT_OTP_TTL_SECS
}

fn default_otp_cooldown_secs() -> i64 {
    DEFAULT_OTP_COOLDOWN_SECS
}

fn default_otp_window_secs() -> i64 {
    DEFAULT_OTP_WINDOW_SECS
}

fn default_otp_window_limit() -> i64 {
    DEFAULT_OTP_WINDOW_LIMIT
}

fn default_password_history_depth() -> i64 {
    DEFAULT_PASSWORD_HISTORY_DEPTH
}

fn default_smtp_port() -> u16 {
    DEFAULT_SMTP_PORT
}

impl Config {
    pub fn load() -> Result<Self, envy::Error> {
        envy::from_env()
    }

    /// 既定値のみで構成された設定（テスト用）
    pub fn for_tests() -> Self {
        Self {
            database_url: SecretBox::new(Box::new(String::new())),
            host: default_host(),
            port: default_port(),
            otp_ttl_secs: default_otp_ttl_secs(),
            otp_cooldown_secs: default_otp_cooldown_secs(),
            otp_window_secs: default_otp_window_secs(),
            otp_window_limit: default_otp_window_limit(),
            password_history_depth: default_password_history_depth(),
            smtp_host: None,
            smtp_port: default_smtp_port(),
            smtp_username: None,
            smtp_password: None,
            smtp_from_address: None,
        }
    }
}
