//! フェッチ結果

use std::io::{self, Cursor, Read};

use syncfetch_proto::{FetchError, Headers};

use crate::reader::ChunkedReadStream;

/// レスポンスボディ
#[derive(Debug)]
pub enum Body {
    /// 全体がメモリ上にある（非ストリーミング経路）
    Bytes(Vec<u8>),
    /// ワーカーから順に届く
    Stream(ChunkedReadStream),
}

/// HTTP レスポンス
///
/// ボディの所有権は呼び出し側に移る。
#[derive(Debug)]
pub struct Response {
    pub status: u16,
    pub headers: Headers,
    pub body: Body,
}

impl Response {
    pub fn buffered(status: u16, headers: Headers, body: Vec<u8>) -> Self {
        Response {
            status,
            headers,
            body: Body::Bytes(body),
        }
    }

    pub fn streaming(status: u16, headers: Headers, stream: ChunkedReadStream) -> Self {
        Response {
            status,
            headers,
            body: Body::Stream(stream),
        }
    }

    /// ボディがライブストリームか
    pub fn is_stream(&self) -> bool {
        matches!(self.body, Body::Stream(_))
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// ヘッダーを大文字小文字を無視して引く
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// ストリームボディを取り出す（全体バッファの場合は `None`）
    pub fn into_stream(self) -> Option<ChunkedReadStream> {
        match self.body {
            Body::Stream(stream) => Some(stream),
            Body::Bytes(_) => None,
        }
    }

    /// ボディの読み出し口
    pub fn into_reader(self) -> BodyReader {
        self.body.into_reader()
    }

    /// ボディを最後まで読んで返す
    pub fn bytes(self) -> Result<Vec<u8>, FetchError> {
        match self.body {
            Body::Bytes(bytes) => Ok(bytes),
            Body::Stream(mut stream) => {
                let mut out = Vec::new();
                let mut buf = vec![0u8; 64 * 1024];
                loop {
                    let n = stream.read_chunk(&mut buf)?;
                    if n == 0 {
                        return Ok(out);
                    }
                    out.extend_from_slice(&buf[..n]);
                }
            }
        }
    }
}

impl Body {
    pub fn into_reader(self) -> BodyReader {
        match self {
            Body::Bytes(bytes) => BodyReader::Bytes(Cursor::new(bytes)),
            Body::Stream(stream) => BodyReader::Stream(stream),
        }
    }
}

/// `Body` の `Read` 実装
#[derive(Debug)]
pub enum BodyReader {
    Bytes(Cursor<Vec<u8>>),
    Stream(ChunkedReadStream),
}

impl Read for BodyReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            BodyReader::Bytes(cursor) => cursor.read(buf),
            BodyReader::Stream(stream) => stream.read(buf),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffered_response() {
        let headers: Headers = [("Content-Type".to_string(), "text/plain".to_string())]
            .into_iter()
            .collect();
        let resp = Response::buffered(200, headers, b"hello".to_vec());
        assert!(!resp.is_stream());
        assert!(resp.is_success());
        assert_eq!(resp.header("content-type"), Some("text/plain"));

        let mut body = String::new();
        resp.into_reader().read_to_string(&mut body).unwrap();
        assert_eq!(body, "hello");
    }

    #[test]
    fn test_buffered_into_stream_is_none() {
        let resp = Response::buffered(404, Headers::new(), Vec::new());
        assert!(!resp.is_success());
        assert!(resp.into_stream().is_none());
    }
}
