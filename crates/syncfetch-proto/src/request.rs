//! 送信リクエスト
//!
//! `StreamingFetcher` に渡された後は変更されない。
//! エラーから参照できるよう `Arc<Request>` で共有される。

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;
use url::Url;

use crate::error::FetchError;

/// ヘッダーマップ（キーは受信したままの大文字小文字を保持）
pub type Headers = BTreeMap<String, String>;

/// HTTP リクエスト
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// HTTP メソッド（"GET" など）
    pub method: String,
    /// 絶対 URL または base URL からの相対 URL
    pub url: String,
    /// URL に追加するクエリパラメータ
    pub params: Vec<(String, String)>,
    pub headers: Headers,
    /// `None` はボディなし、`Some(vec![])` は長さ 0 のボディ
    pub body: Option<Vec<u8>>,
    /// 待機タイムアウト（`Duration::ZERO` = 無制限）
    pub timeout: Duration,
    /// 資格情報の送信指定（`None` = グローバル設定に従う）
    pub credentials: Option<bool>,
}

impl Request {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Request {
            method: method.into(),
            url: url.into(),
            params: Vec::new(),
            headers: Headers::new(),
            body: None,
            timeout: Duration::ZERO,
            credentials: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new("GET", url)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// JSON ボディを設定し Content-Type を付与する
    ///
    /// # エラー
    /// - `FetchError::InvalidRequest`: シリアライズ失敗
    pub fn with_json<T: Serialize>(self, body: &T) -> Result<Self, FetchError> {
        let bytes = serde_json::to_vec(body)
            .map_err(|e| FetchError::InvalidRequest(format!("JSON body: {e}")))?;
        Ok(self
            .with_header("Content-Type", "application/json; charset=utf-8")
            .with_body(bytes))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_credentials(mut self, include: bool) -> Self {
        self.credentials = Some(include);
        self
    }

    /// メソッド名を検証する
    ///
    /// # エラー
    /// - `FetchError::InvalidRequest`: HTTP メソッドとして不正なトークン
    pub fn validated_method(&self) -> Result<http::Method, FetchError> {
        http::Method::from_bytes(self.method.as_bytes())
            .map_err(|_| FetchError::InvalidRequest(format!("method {:?}", self.method)))
    }

    /// クエリパラメータを含む絶対 URL を組み立てる
    ///
    /// # 引数
    /// - `base`: 相対 URL を解決する基準 URL
    ///
    /// # エラー
    /// - `FetchError::InvalidRequest`: URL が不正、または相対 URL で基準 URL がない
    pub fn absolute_url(&self, base: Option<&Url>) -> Result<Url, FetchError> {
        let raw = self.url.as_str();
        let mut url = match Url::parse(raw) {
            Ok(url) => url,
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                let base = base.ok_or_else(|| {
                    FetchError::InvalidRequest(format!("relative URL {raw:?} without base URL"))
                })?;
                base.join(raw)
                    .map_err(|e| FetchError::InvalidRequest(format!("URL {raw:?}: {e}")))?
            }
            Err(e) => return Err(FetchError::InvalidRequest(format!("URL {raw:?}: {e}"))),
        };
        if !self.params.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(self.params.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        }
        Ok(url)
    }

    /// 待機に使う期限（0 は `None` = 無期限）
    pub fn wait_timeout(&self) -> Option<Duration> {
        if self.timeout.is_zero() {
            None
        } else {
            Some(self.timeout)
        }
    }
}
