use std::sync::{Arc, Mutex};

use time::{Duration, OffsetDateTime};

/// 注入可能なクロック
///
/// OTPの有効期限・クールダウン・レート制限ウィンドウはすべて
/// このクロック経由で現在時刻を参照する。テストでは固定クロックを
/// 注入し、`advance` で時間を進めて時間依存の振る舞いを検証する。
#[derive(Clone)]
pub struct Clock {
    fixed: Option<Arc<Mutex<OffsetDateTime>>>,
}

impl Clock {
    /// システム時計をそのまま使うクロック（本番用）
    pub fn system() -> Self {
        Self { fixed: None }
    }

    /// 指定時刻に固定されたクロック（テスト用）
    pub fn fixed(at: OffsetDateTime) -> Self {
        Self {
            fixed: Some(Arc::new(Mutex::new(at))),
        }
    }

    pub fn now(&self) -> OffsetDateTime {
        match &self.fixed {
            Some(fixed) => *fixed.lock().expect("clock mutex poisoned"),
            None => OffsetDateTime::now_utc(),
        }
    }

    /// 固定クロックを指定分だけ進める。システムクロックには効果がない。
    pub fn advance(&self, delta: Duration) {
        if let Some(fixed) = &self.fixed {
            let mut now = fixed.lock().expect("clock mutex poisoned");
            *now += delta;
        }
    }

    /// 固定クロックを指定時刻に設定する。システムクロックには効果がない。
    pub fn set(&self, at: OffsetDateTime) {
        if let Some(fixed) = &self.fixed {
            let mut now = fixed.lock().expect("clock mutex poisoned");
            *now = at;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock_advances() {
        let base = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let clock = Clock::fixed(base);
        assert_eq!(clock.now(), base);

        clock.advance(Duration::seconds(31));
        assert_eq!(clock.now(), base + Duration::seconds(31));
    }

    #[test]
    fn test_fixed_clock_shared_between_clones() {
        let base = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let clock = Clock::fixed(base);
        let clone = clock.clone();

        clock.advance(Duration::minutes(5));
        assert_eq!(clone.now(), base + Duration::minutes(5));
    }
}
