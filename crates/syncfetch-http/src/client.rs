//! ストリーミング / 全体バッファの振り分けを行うクライアント
//!
//! ```text
//! Client::send(request, mode)
//!   ├─ mode = Stream かつ streaming 可 → StreamingFetcher::send
//!   ├─ mode = Stream かつ streaming 不可 → 警告（1 回だけ）→ BufferedTransport
//!   └─ mode = Buffered                 → BufferedTransport
//! ```

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use syncfetch_proto::{FetchError, Request};
use syncfetch_stream::{FetchWorker, Response, StreamingFetcher};
use url::Url;

use crate::envelope::RawResponse;
use crate::options::FetchOptions;
use crate::transport::{BufferedTransport, PreparedRequest};

/// ボディの受け取り方
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SendMode {
    /// 可能ならストリーミング、不可ならフォールバック
    #[default]
    Stream,
    /// 常に全体バッファ
    Buffered,
}

/// 同期 HTTP クライアント
pub struct Client {
    options: FetchOptions,
    base_url: Option<Url>,
    fetcher: Option<Rc<StreamingFetcher>>,
    fallback: Rc<dyn BufferedTransport>,
    warned: Cell<bool>,
}

impl Client {
    /// # エラー
    /// - `FetchError::InvalidRequest`: `options` の base URL またはタイムアウトが不正
    pub fn new(options: FetchOptions, fallback: Rc<dyn BufferedTransport>) -> Result<Self, FetchError> {
        let base_url = options.parsed_base_url()?;
        options.default_timeout()?;
        Ok(Client {
            options,
            base_url,
            fetcher: None,
            fallback,
            warned: Cell::new(false),
        })
    }

    /// ワーカーからストリーミングフェッチャーを組み立てて使う
    pub fn with_worker(self, worker: Rc<dyn FetchWorker>) -> Self {
        self.with_fetcher(Rc::new(StreamingFetcher::new(worker)))
    }

    /// 既存のフェッチャー（プロセス全体のものなど）を使う
    ///
    /// base URL と credentials はフェッチャーではなくこのクライアントの設定で決まる。
    pub fn with_fetcher(mut self, fetcher: Rc<StreamingFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn options(&self) -> &FetchOptions {
        &self.options
    }

    /// ストリーミング経路が使えるか
    pub fn can_stream(&self) -> bool {
        self.options.streaming && self.fetcher.is_some()
    }

    /// リクエストを送る
    ///
    /// # 引数
    /// - `request`: 送信するリクエスト（タイムアウト 0 なら設定の既定値を使う）
    /// - `mode`: ボディの受け取り方
    ///
    /// # エラー
    /// ストリーミング経路・フォールバック経路のエラーをそのまま返す
    pub fn send(&self, mut request: Request, mode: SendMode) -> Result<Response, FetchError> {
        if request.timeout.is_zero() {
            request.timeout = self.options.default_timeout()?;
        }

        match (mode, &self.fetcher) {
            (SendMode::Stream, Some(fetcher)) if self.options.streaming => fetcher.send_with(
                request,
                self.base_url.as_ref(),
                self.options.with_credentials,
            ),
            (SendMode::Stream, _) => {
                self.warn_fallback_once();
                self.send_buffered(&request)
            }
            (SendMode::Buffered, _) => self.send_buffered(&request),
        }
    }

    /// urlopen 相当: エンベロープを組み立て、2xx 以外はエラーにする
    ///
    /// # エラー
    /// - `FetchError::HttpStatus`: 2xx 以外
    /// - その他 `send` と同じ
    pub fn open(&self, request: Request) -> Result<RawResponse, FetchError> {
        let url = self.absolute_url(&request)?;
        let response = self.send(request, SendMode::Stream)?;
        RawResponse::from_response(response, url)
    }

    /// このクライアントの base URL で解決したリクエスト URL（クエリ付き）
    ///
    /// # エラー
    /// - `FetchError::InvalidRequest`: URL が解決できない
    pub fn absolute_url(&self, request: &Request) -> Result<Url, FetchError> {
        request.absolute_url(self.base_url.as_ref())
    }

    fn send_buffered(&self, request: &Request) -> Result<Response, FetchError> {
        let prepared =
            PreparedRequest::prepare(request, self.base_url.as_ref(), self.options.with_credentials)?;
        tracing::debug!(method = %prepared.method, url = %prepared.url, "buffered fetch");
        self.fallback.fetch(&prepared)
    }

    fn warn_fallback_once(&self) {
        if !self.warned.replace(true) {
            tracing::warn!("streaming is unavailable in this context, using non-streaming fallback");
        }
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("options", &self.options)
            .field("can_stream", &self.can_stream())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{head, CannedTransport, Reply, ReplayWorker};
    use std::io::Read;
    use std::time::Duration;
    use syncfetch_proto::{Credentials, WorkerCommand};

    fn streaming_options() -> FetchOptions {
        FetchOptions {
            streaming: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_stream_mode_uses_worker() {
        let worker = Rc::new(ReplayWorker::new(vec![
            Reply::Head(head(200, &[])),
            Reply::Chunk(b"streamed".to_vec()),
            Reply::Eof,
        ]));
        let fallback = Rc::new(CannedTransport::new(200, b"buffered"));
        let client = Client::new(streaming_options(), fallback.clone())
            .unwrap()
            .with_worker(worker.clone());

        let response = client
            .send(Request::get("https://example.test/"), SendMode::Stream)
            .unwrap();
        assert!(response.is_stream());
        assert_eq!(response.bytes().unwrap(), b"streamed");
        assert!(fallback.seen().is_empty());
        assert_eq!(worker.close_count(), 1);
    }

    #[test]
    fn test_streaming_unavailable_falls_back() {
        let worker = Rc::new(ReplayWorker::new(vec![]));
        let fallback = Rc::new(CannedTransport::new(200, b"buffered"));
        let client = Client::new(FetchOptions::default(), fallback.clone())
            .unwrap()
            .with_worker(worker.clone());
        assert!(!client.can_stream());

        for _ in 0..2 {
            let response = client
                .send(Request::get("https://example.test/"), SendMode::Stream)
                .unwrap();
            assert!(!response.is_stream());
        }
        assert!(client.warned.get());
        assert_eq!(fallback.seen().len(), 2);
        assert!(worker.start_commands().is_empty());
    }

    #[test]
    fn test_buffered_mode_skips_worker() {
        let worker = Rc::new(ReplayWorker::new(vec![]));
        let fallback = Rc::new(CannedTransport::new(200, b"whole"));
        let client = Client::new(streaming_options(), fallback.clone())
            .unwrap()
            .with_worker(worker.clone());

        let response = client
            .send(Request::get("https://example.test/"), SendMode::Buffered)
            .unwrap();
        assert_eq!(response.bytes().unwrap(), b"whole");
        assert!(!client.warned.get());
        assert!(worker.start_commands().is_empty());
    }

    #[test]
    fn test_default_timeout_and_credentials_applied() {
        let fallback = Rc::new(CannedTransport::new(200, b""));
        let options = FetchOptions {
            with_credentials: true,
            default_timeout_secs: 2.0,
            base_url: Some("https://example.test/root/".into()),
            ..Default::default()
        };
        let client = Client::new(options, fallback.clone()).unwrap();
        client.send(Request::get("page"), SendMode::Buffered).unwrap();

        let seen = fallback.seen();
        assert_eq!(seen[0].url.as_str(), "https://example.test/root/page");
        assert_eq!(seen[0].timeout, Some(Duration::from_secs(2)));
        assert_eq!(seen[0].credentials, Credentials::Include);
    }

    #[test]
    fn test_worker_gets_base_url_and_credentials() {
        let worker = Rc::new(ReplayWorker::new(vec![Reply::Head(head(204, &[]))]));
        let options = FetchOptions {
            streaming: true,
            with_credentials: true,
            base_url: Some("https://example.test/root/".into()),
            ..Default::default()
        };
        let client = Client::new(options, Rc::new(CannedTransport::new(200, b"")))
            .unwrap()
            .with_worker(worker.clone());
        client.send(Request::get("api"), SendMode::Stream).unwrap();

        match &worker.start_commands()[0] {
            WorkerCommand::Start(start) => {
                assert_eq!(start.url, "https://example.test/root/api");
                assert_eq!(start.credentials, Credentials::Include);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_shared_fetcher_uses_each_client_settings() {
        let worker = Rc::new(ReplayWorker::new(vec![
            Reply::Head(head(200, &[])),
            Reply::Eof,
        ]));
        let shared = Rc::new(
            StreamingFetcher::new(worker.clone())
                .with_base_url(Url::parse("https://a.test/").unwrap()),
        );
        let options = FetchOptions {
            streaming: true,
            with_credentials: true,
            base_url: Some("https://b.test/".into()),
            ..Default::default()
        };
        let client = Client::new(options, Rc::new(CannedTransport::new(200, b"")))
            .unwrap()
            .with_fetcher(shared);

        let raw = client.open(Request::get("page")).unwrap();
        assert_eq!(raw.url, "https://b.test/page");
        match &worker.start_commands()[0] {
            WorkerCommand::Start(start) => {
                assert_eq!(start.url, raw.url);
                assert_eq!(start.credentials, Credentials::Include);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_open_builds_envelope() {
        let worker = Rc::new(ReplayWorker::new(vec![
            Reply::Head(head(200, &[("content-type", "text/plain"), ("transfer-encoding", "chunked")])),
            Reply::Chunk(b"hi".to_vec()),
            Reply::Eof,
        ]));
        let client = Client::new(streaming_options(), Rc::new(CannedTransport::new(500, b"")))
            .unwrap()
            .with_worker(worker);

        let mut raw = client.open(Request::get("https://example.test/hi")).unwrap();
        assert_eq!(raw.url, "https://example.test/hi");
        assert_eq!(raw.status(), 200);

        let mut text = String::new();
        raw.read_to_string(&mut text).unwrap();
        assert_eq!(text, "HTTP/1.1 200 OK\r\ncontent-type: text/plain\r\n\r\nhi");
    }

    #[test]
    fn test_open_surfaces_http_status() {
        let client = Client::new(FetchOptions::default(), Rc::new(CannedTransport::new(503, b"down")))
            .unwrap();
        let err = client.open(Request::get("https://example.test/x")).unwrap_err();
        assert!(matches!(
            err,
            FetchError::HttpStatus { status: 503, ref url, .. } if url == "https://example.test/x"
        ));
    }

    #[test]
    fn test_absolute_url_matches_fetched_url() {
        let fallback = Rc::new(CannedTransport::new(200, b""));
        let options = FetchOptions {
            base_url: Some("https://example.test/root/".into()),
            ..Default::default()
        };
        let client = Client::new(options, fallback.clone()).unwrap();
        let request = Request::get("page").with_param("q", "1");

        let url = client.absolute_url(&request).unwrap();
        assert_eq!(url.as_str(), "https://example.test/root/page?q=1");
        client.send(request, SendMode::Buffered).unwrap();
        assert_eq!(fallback.seen()[0].url, url);
    }

    #[test]
    fn test_invalid_options_rejected() {
        let options = FetchOptions {
            base_url: Some("::".into()),
            ..Default::default()
        };
        assert!(Client::new(options, Rc::new(CannedTransport::new(200, b""))).is_err());
    }
}
