//! クライアント設定
//!
//! JS ホストから JSON で渡せるよう serde で (デ)シリアライズする。
//!
//! ```json
//! {"withCredentials": false, "streaming": true, "defaultTimeoutSecs": 30, "baseUrl": "https://..."}
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use syncfetch_proto::FetchError;
use url::Url;

/// フェッチ設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FetchOptions {
    /// リクエストが指定しない場合に資格情報を送るか
    pub with_credentials: bool,
    /// 実行コンテキストがブロッキング待機を使えるか（ストリーミング可否）
    pub streaming: bool,
    /// リクエストのタイムアウトが 0 のときに使う秒数（0 = 無制限）
    pub default_timeout_secs: f64,
    /// 相対 URL の基準
    pub base_url: Option<String>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        FetchOptions {
            with_credentials: false,
            streaming: false,
            default_timeout_secs: 0.0,
            base_url: None,
        }
    }
}

impl FetchOptions {
    /// JSON 文字列から読み込む（省略したフィールドは既定値）
    ///
    /// # エラー
    /// - `FetchError::InvalidRequest`: JSON が不正
    pub fn from_json(json: &str) -> Result<Self, FetchError> {
        serde_json::from_str(json).map_err(|e| FetchError::InvalidRequest(format!("options: {e}")))
    }

    /// # エラー
    /// - `FetchError::InvalidRequest`: 負数・NaN・表現できない大きさ
    pub fn default_timeout(&self) -> Result<Duration, FetchError> {
        Duration::try_from_secs_f64(self.default_timeout_secs).map_err(|e| {
            FetchError::InvalidRequest(format!(
                "default timeout {}: {e}",
                self.default_timeout_secs
            ))
        })
    }

    /// # エラー
    /// - `FetchError::InvalidRequest`: 絶対 URL として解釈できない
    pub fn parsed_base_url(&self) -> Result<Option<Url>, FetchError> {
        self.base_url
            .as_deref()
            .map(|raw| {
                Url::parse(raw)
                    .map_err(|e| FetchError::InvalidRequest(format!("base URL {raw:?}: {e}")))
            })
            .transpose()
    }
}
