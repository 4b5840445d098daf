//! レスポンスエンベロープの再構築
//!
//! 汎用の逐次 HTTP パーサが 1 本のバイト列として読めるよう、
//! ステータス行とヘッダーブロックをボディの前に連結する。
//!
//! ```text
//! HTTP/1.1 206 Partial Content\r\n
//! content-range: bytes 0-2/6\r\n
//! \r\n
//! <body: Vec<u8> またはライブの ChunkedReadStream>
//! ```
//!
//! ストリームのボディはコピーしない（`Read::chain` で後ろに繋ぐだけ）。

use std::fmt;
use std::io::{self, Cursor, Read};

use http::header::{HeaderName, HeaderValue};
use http::StatusCode;
use syncfetch_proto::{FetchError, Headers};
use syncfetch_stream::{Body, BodyReader, Response};

/// フェッチ層が既に解決済みの転送フレーミングを取り除く
///
/// - `transfer-encoding` は常に除去（chunked は既にデコード済み）
/// - `content-length` は実際のボディ長と一致しない場合に除去
///   - 全体バッファ: 値がボディ長と異なる
///   - ストリーム: `content-encoding` が identity 以外（圧縮後の長さが入っている）
///
/// 改行などを含むヘッダー行として不正な名前・値も落とす。
pub fn strip_framing_headers(headers: &Headers, body: &Body) -> Headers {
    let encoded = headers.iter().any(|(k, v)| {
        k.eq_ignore_ascii_case("content-encoding") && !v.trim().eq_ignore_ascii_case("identity")
    });

    headers
        .iter()
        .filter(|(name, value)| {
            if name.eq_ignore_ascii_case("transfer-encoding") {
                return false;
            }
            if name.eq_ignore_ascii_case("content-length") {
                let keep = match body {
                    Body::Bytes(bytes) => value.trim().parse::<usize>().ok() == Some(bytes.len()),
                    Body::Stream(_) => !encoded,
                };
                if !keep {
                    tracing::trace!(%value, "dropping stale content-length");
                }
                return keep;
            }
            let valid = HeaderName::from_bytes(name.as_bytes()).is_ok()
                && HeaderValue::from_str(value).is_ok();
            if !valid {
                tracing::warn!(header = %name, "dropping header that cannot be framed");
            }
            valid
        })
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// ステータス行（reason phrase は既知のステータスのみ）
pub fn status_line(status: u16) -> String {
    let reason = StatusCode::from_u16(status)
        .ok()
        .and_then(|code| code.canonical_reason())
        .unwrap_or("");
    format!("HTTP/1.1 {status} {reason}\r\n")
}

/// ステータス行とヘッダーブロック（空行まで）を組み立てる
pub fn encode_head(status: u16, headers: &Headers) -> Vec<u8> {
    let mut head = status_line(status).into_bytes();
    for (name, value) in headers {
        head.extend_from_slice(name.as_bytes());
        head.extend_from_slice(b": ");
        head.extend_from_slice(value.as_bytes());
        head.extend_from_slice(b"\r\n");
    }
    head.extend_from_slice(b"\r\n");
    head
}

/// ヘッダーブロック + ボディの連続バイト列
pub struct Envelope {
    status: u16,
    headers: Headers,
    head_len: usize,
    reader: io::Chain<Cursor<Vec<u8>>, BodyReader>,
}

impl Envelope {
    /// レスポンスからエンベロープを組み立てる（ステータスは検査しない）
    pub fn new(response: Response) -> Self {
        let Response {
            status,
            headers,
            body,
        } = response;
        let headers = strip_framing_headers(&headers, &body);
        let head = encode_head(status, &headers);
        Envelope {
            status,
            headers,
            head_len: head.len(),
            reader: Cursor::new(head).chain(body.into_reader()),
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    /// フレーミング除去後のヘッダー
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// ステータス行とヘッダーブロックのバイト数
    pub fn head_len(&self) -> usize {
        self.head_len
    }
}

impl Read for Envelope {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

impl fmt::Debug for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Envelope")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("head_len", &self.head_len)
            .finish()
    }
}

/// urlopen 相当の戻り値
#[derive(Debug)]
pub struct RawResponse {
    /// リクエストした絶対 URL
    pub url: String,
    pub envelope: Envelope,
}

impl RawResponse {
    /// 2xx のレスポンスだけをエンベロープにする
    ///
    /// # エラー
    /// - `FetchError::HttpStatus`: 2xx 以外（ボディは破棄され、ストリームなら接続も解放される）
    pub fn from_response(response: Response, url: impl Into<String>) -> Result<Self, FetchError> {
        let url = url.into();
        let envelope = Envelope::new(response);
        if !(200..300).contains(&envelope.status) {
            tracing::debug!(status = envelope.status, %url, "non-success status");
            return Err(FetchError::HttpStatus {
                status: envelope.status,
                headers: envelope.headers.clone(),
                url,
            });
        }
        Ok(RawResponse { url, envelope })
    }

    pub fn status(&self) -> u16 {
        self.envelope.status()
    }

    pub fn headers(&self) -> &Headers {
        self.envelope.headers()
    }
}

impl Read for RawResponse {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.envelope.read(buf)
    }
}
