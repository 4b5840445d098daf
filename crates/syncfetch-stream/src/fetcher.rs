//! ストリーミングフェッチャー
//!
//! ## send の流れ
//!
//! ```text
//! allocate_channel → slot0 = 0 → Start{channel, url, ...} → slot0 で待機
//!   HeaderReady(len) : ヘッダー JSON をデコードし、ストリーム付き Response を返す
//!   Idle / Timeout   : StreamingTimeout
//!   Exception(len)   : StreamingException
//!   Chunk / Eof      : ProtocolViolation
//! ```
//!
//! 成功時のチャンネル所有権は返した `ChunkedReadStream` に移る。

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use syncfetch_proto::{
    FetchError, Request, ResponseHead, Signal, StartFetch, TimeoutOrigin, WorkerCommand,
};
use url::Url;

use crate::reader::ChunkedReadStream;
use crate::response::Response;
use crate::worker::FetchWorker;

/// リクエストを開始し、ボディをストリームとして返すフェッチャー
pub struct StreamingFetcher {
    worker: Rc<dyn FetchWorker>,
    base_url: Option<Url>,
    include_credentials: bool,
}

impl StreamingFetcher {
    pub fn new(worker: Rc<dyn FetchWorker>) -> Self {
        StreamingFetcher {
            worker,
            base_url: None,
            include_credentials: false,
        }
    }

    /// 相対 URL の解決に使う基準 URL を設定する
    pub fn with_base_url(mut self, base: Url) -> Self {
        self.base_url = Some(base);
        self
    }

    /// リクエストが credentials を指定しないときの既定値
    pub fn with_credentials_default(mut self, include: bool) -> Self {
        self.include_credentials = include;
        self
    }

    pub fn base_url(&self) -> Option<&Url> {
        self.base_url.as_ref()
    }

    pub fn worker(&self) -> &Rc<dyn FetchWorker> {
        &self.worker
    }

    /// リクエストを送り、ヘッダーが揃うまでブロックする
    ///
    /// # 引数
    /// - `request`: 送信するリクエスト（以後変更されない）
    ///
    /// # 戻り値
    /// ボディが `Body::Stream` の `Response`
    ///
    /// # エラー
    /// - `FetchError::InvalidRequest`: メソッドまたは URL が不正
    /// - `FetchError::StreamingTimeout`: 期限内にヘッダーが届かなかった
    /// - `FetchError::StreamingException`: ワーカーがフェッチ失敗を報告した
    /// - `FetchError::InvalidHead`: ヘッダー JSON が壊れている
    /// - `FetchError::ProtocolViolation`: ヘッダーより先にボディのシグナルが届いた
    pub fn send(&self, request: Request) -> Result<Response, FetchError> {
        self.send_with(request, self.base_url.as_ref(), self.include_credentials)
    }

    /// 呼び出し側の base URL と credentials 既定値で送る
    ///
    /// フェッチャーを複数のクライアントで共有するとき、各クライアントは
    /// 自分の設定をここで渡す。フェッチャー自身の設定は使わない。
    ///
    /// # エラー
    /// `send` と同じ
    pub fn send_with(
        &self,
        request: Request,
        base: Option<&Url>,
        include_credentials: bool,
    ) -> Result<Response, FetchError> {
        let request = Arc::new(request);
        let channel = self.worker.allocate_channel()?;
        let start =
            StartFetch::from_request(channel.id(), &request, base, include_credentials)?;
        tracing::debug!(channel = %channel.id(), method = %start.method, url = %start.url, "starting fetch");

        channel.reset();
        self.worker.post(WorkerCommand::Start(start))?;

        match channel.wait_signal(request.wait_timeout())? {
            Signal::HeaderReady { len } => {
                let blob = channel.payload_prefix(len)?;
                let ResponseHead {
                    status,
                    headers,
                    connection_id,
                } = ResponseHead::from_json(&blob)?;
                tracing::debug!(channel = %channel.id(), connection = %connection_id, status, "header ready");
                let stream =
                    ChunkedReadStream::new(channel, Rc::clone(&self.worker), connection_id, request);
                Ok(Response::streaming(status, headers, stream))
            }
            Signal::Idle => Err(timeout(request, TimeoutOrigin::Local)),
            Signal::Timeout => Err(timeout(request, TimeoutOrigin::Worker)),
            Signal::Exception { len } => {
                let message = channel.payload_text(len)?;
                tracing::warn!(url = %request.url, %message, "fetch failed before headers");
                Err(FetchError::StreamingException { request, message })
            }
            signal @ (Signal::Chunk(_) | Signal::Eof) => Err(FetchError::violation(
                signal.encode().0,
                "body signalled before response head",
            )),
        }
    }
}

fn timeout(request: Arc<Request>, origin: TimeoutOrigin) -> FetchError {
    tracing::warn!(url = %request.url, %origin, "timed out waiting for response head");
    FetchError::StreamingTimeout { request, origin }
}

impl fmt::Debug for StreamingFetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamingFetcher")
            .field("base_url", &self.base_url.as_ref().map(Url::as_str))
            .field("include_credentials", &self.include_credentials)
            .finish()
    }
}

// ============================================================================
// プロセス全体のフェッチャー
// ============================================================================

thread_local! {
    static FETCHER: RefCell<Option<Rc<StreamingFetcher>>> = const { RefCell::new(None) };
}

/// フェッチャーを登録する（既存のものがあれば置き換えて返す）
pub fn install(fetcher: StreamingFetcher) -> Option<Rc<StreamingFetcher>> {
    FETCHER.with(|slot| slot.borrow_mut().replace(Rc::new(fetcher)))
}

/// 登録済みのフェッチャー
pub fn installed() -> Option<Rc<StreamingFetcher>> {
    FETCHER.with(|slot| slot.borrow().clone())
}

/// 未登録なら `init` で作って登録する
///
/// `init` は最初の呼び出しで一度だけ実行される。失敗した場合は何も登録しない。
pub fn get_or_install_with<F>(init: F) -> Result<Rc<StreamingFetcher>, FetchError>
where
    F: FnOnce() -> Result<StreamingFetcher, FetchError>,
{
    if let Some(fetcher) = installed() {
        return Ok(fetcher);
    }
    let fetcher = Rc::new(init()?);
    FETCHER.with(|slot| {
        let mut slot = slot.borrow_mut();
        // init の中で登録された場合はそちらを優先する
        Ok(Rc::clone(slot.get_or_insert(fetcher)))
    })
}

/// 登録を解除する（テストの後始末用）
pub fn teardown() -> Option<Rc<StreamingFetcher>> {
    FETCHER.with(|slot| slot.borrow_mut().take())
}
