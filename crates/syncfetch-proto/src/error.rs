//! syncfetch エラー型

use std::fmt;
use std::sync::Arc;

use crate::request::{Headers, Request};

/// タイムアウトの発生元
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutOrigin {
    /// ワーカーが slot0 に TIMEOUT を書いた
    Worker,
    /// コンシューマ側の待機が期限切れになった
    Local,
}

impl fmt::Display for TimeoutOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeoutOrigin::Worker => write!(f, "reported by worker"),
            TimeoutOrigin::Local => write!(f, "local wait expired"),
        }
    }
}

/// フェッチ・ストリーミング・エンベロープ層のエラー
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// ヘッダーまたはチャンクが期限内に届かなかった
    #[error("Timeout in streaming request to {} ({origin})", .request.url)]
    StreamingTimeout {
        request: Arc<Request>,
        origin: TimeoutOrigin,
    },

    /// ワーカーがフェッチ失敗を報告した
    #[error("Exception thrown in fetch: {message}")]
    StreamingException {
        request: Arc<Request>,
        message: String,
    },

    /// 未知のシグナルや範囲外の長さ（ワーカーとのバージョン不一致など）
    #[error("Protocol violation (signal {signal}): {detail}")]
    ProtocolViolation { signal: i32, detail: String },

    /// 2xx 以外のステータス
    #[error("HTTP Error {status} for {url}")]
    HttpStatus {
        status: u16,
        headers: Headers,
        url: String,
    },

    /// 失敗済み・クローズ済みのストリームからの読み出し
    #[error("Stream is closed after a failure or explicit close")]
    StreamClosed,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// ヘッダー JSON のデコード失敗
    #[error("Invalid response head: {0}")]
    InvalidHead(#[from] serde_json::Error),

    #[error("Fetch worker unavailable: {0}")]
    WorkerUnavailable(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FetchError {
    /// ProtocolViolation を組み立てる
    pub fn violation(signal: i32, detail: impl Into<String>) -> Self {
        FetchError::ProtocolViolation {
            signal,
            detail: detail.into(),
        }
    }

    /// ワーカー報告・ローカル待機切れのどちらかのタイムアウトか
    pub fn is_timeout(&self) -> bool {
        matches!(self, FetchError::StreamingTimeout { .. })
    }

    /// エラーに紐づく元のリクエスト（ストリーミング系のみ）
    pub fn request(&self) -> Option<&Request> {
        match self {
            FetchError::StreamingTimeout { request, .. }
            | FetchError::StreamingException { request, .. } => Some(request),
            _ => None,
        }
    }

    /// `std::io::Read` 実装から返すための変換
    ///
    /// 既に I/O エラーならそのまま、タイムアウトは `TimedOut` 種別にする。
    pub fn into_io(self) -> std::io::Error {
        use std::io::{Error, ErrorKind};
        match self {
            FetchError::Io(e) => e,
            e @ FetchError::StreamingTimeout { .. } => Error::new(ErrorKind::TimedOut, e),
            e => Error::other(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exception_message_display() {
        let err = FetchError::StreamingException {
            request: Arc::new(Request::get("https://example.test/")),
            message: "network error".to_string(),
        };
        assert_eq!(err.to_string(), "Exception thrown in fetch: network error");
        assert_eq!(err.request().unwrap().url, "https://example.test/");
    }

    #[test]
    fn test_timeout_display_includes_origin() {
        let err = FetchError::StreamingTimeout {
            request: Arc::new(Request::get("https://example.test/slow")),
            origin: TimeoutOrigin::Local,
        };
        let text = err.to_string();
        assert!(text.contains("https://example.test/slow"));
        assert!(text.contains("local wait expired"));
        assert!(err.is_timeout());
    }

    #[test]
    fn test_into_io_keeps_timeout_kind() {
        let err = FetchError::StreamingTimeout {
            request: Arc::new(Request::get("https://example.test/")),
            origin: TimeoutOrigin::Worker,
        };
        let io = err.into_io();
        assert_eq!(io.kind(), std::io::ErrorKind::TimedOut);
        let inner = io.into_inner().unwrap().downcast::<FetchError>().unwrap();
        assert!(inner.is_timeout());
    }

    #[test]
    fn test_http_status_has_no_request() {
        let err = FetchError::HttpStatus {
            status: 404,
            headers: Headers::new(),
            url: "https://example.test/missing".to_string(),
        };
        assert!(err.request().is_none());
        assert_eq!(err.to_string(), "HTTP Error 404 for https://example.test/missing");
    }
}
