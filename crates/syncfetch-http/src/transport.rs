//! 全体バッファ方式のフォールバック経路
//!
//! ブロッキング待機が使えない実行コンテキスト（ブラウザのメインスレッドなど）や、
//! 呼び出し側がストリーミングを明示的に拒否した場合に使う。
//! 実体（同期 XMLHttpRequest など）はホスト側が提供する。

use std::time::Duration;

use syncfetch_proto::{Credentials, FetchError, Headers, Request};
use syncfetch_stream::Response;
use url::Url;

/// フォールバック経路では送らないリクエストヘッダー（小文字）
///
/// 同期 XHR で `user-agent` を付けると CORS プリフライトが発生する。
pub const SKIPPED_REQUEST_HEADERS: &[&str] = &["user-agent"];

/// 検証・絶対化済みのリクエスト
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedRequest {
    pub method: http::Method,
    /// クエリパラメータを含む絶対 URL
    pub url: Url,
    pub headers: Headers,
    pub body: Option<Vec<u8>>,
    pub credentials: Credentials,
    pub timeout: Option<Duration>,
}

impl PreparedRequest {
    /// # エラー
    /// - `FetchError::InvalidRequest`: メソッドまたは URL が不正
    pub fn prepare(
        request: &Request,
        base: Option<&Url>,
        default_credentials: bool,
    ) -> Result<Self, FetchError> {
        Ok(PreparedRequest {
            method: request.validated_method()?,
            url: request.absolute_url(base)?,
            headers: request
                .headers
                .iter()
                .filter(|(name, _)| !is_skipped_header(name))
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect(),
            body: request.body.clone(),
            credentials: Credentials::from_flag(request.credentials.unwrap_or(default_credentials)),
            timeout: request.wait_timeout(),
        })
    }
}

fn is_skipped_header(name: &str) -> bool {
    SKIPPED_REQUEST_HEADERS
        .iter()
        .any(|skipped| name.eq_ignore_ascii_case(skipped))
}

/// ボディ全体を一度に受け取るトランスポート
pub trait BufferedTransport {
    /// リクエストを送り、ボディ全体を含むレスポンスを返す
    ///
    /// 2xx 以外もエラーにせずそのまま返すこと。
    fn fetch(&self, request: &PreparedRequest) -> Result<Response, FetchError>;
}

/// `getAllResponseHeaders()` 形式のヘッダーブロックを解析する
///
/// `name: value` を CRLF（または LF）区切りで並べたもの。
/// 同名ヘッダーは `", "` で連結し、コロンのない行は無視する。
pub fn parse_header_block(raw: &str) -> Headers {
    let mut headers = Headers::new();
    for line in raw.lines() {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        let value = value.trim();
        headers
            .entry(name.to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }
    headers
}
