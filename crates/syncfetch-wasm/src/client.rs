//! wasm-bindgen エクスポート
//!
//! 同期的な Python / wasm コードから呼ばれる HTTP クライアント。
//! すべての呼び出しはブロッキングで、ボディは `read` で少しずつ取り出す。

use std::io::Read;
use std::rc::Rc;
use std::time::Duration;

use js_sys::Uint8Array;
use syncfetch_http::{Client, FetchOptions, SendMode};
use syncfetch_proto::{FetchError, Headers, Request};
use syncfetch_stream::StreamingFetcher;
use wasm_bindgen::prelude::*;

use crate::capability::Capabilities;
use crate::worker::WasmFetchWorker;
use crate::xhr::XhrTransport;

fn js_error(e: FetchError) -> JsError {
    JsError::new(&e.to_string())
}

/// 同期 fetch クライアント
///
/// ## 内部構成
///
/// ```text
/// SyncFetchClient
///   └── Client (syncfetch-http)
///         ├── StreamingFetcher (プロセス全体で 1 つ) → WasmFetchWorker
///         └── XhrTransport（フォールバック）
/// ```
#[wasm_bindgen]
pub struct SyncFetchClient {
    inner: Client,
}

#[wasm_bindgen]
impl SyncFetchClient {
    /// クライアントを初期化する
    ///
    /// # 引数
    /// - `worker`: fetch を実行する Web Worker（`postMessage` を持つもの）
    /// - `options_json`: `FetchOptions` の JSON（省略時は既定値）
    ///
    /// `streaming` はこの実行コンテキストの能力判定と AND を取る。
    /// フェッチャーは最初の呼び出しで一度だけ作られ、以後のクライアントで共有される。
    /// base URL と credentials はクライアントごとの設定が使われる。
    ///
    /// # エラー
    /// - options の JSON・base URL・タイムアウトが不正
    /// - ストリーミング可能なのに `worker` が `postMessage` を持たない
    #[wasm_bindgen(constructor)]
    pub fn new(worker: JsValue, options_json: Option<String>) -> Result<SyncFetchClient, JsError> {
        let mut options = match options_json.as_deref() {
            Some(json) => FetchOptions::from_json(json).map_err(js_error)?,
            None => FetchOptions::default(),
        };
        let capabilities = Capabilities::detect();
        options.streaming &= capabilities.can_stream();
        tracing::debug!(?capabilities, streaming = options.streaming, "client capabilities");

        let mut inner = Client::new(options, Rc::new(XhrTransport::new(capabilities)))
            .map_err(js_error)?;

        if inner.options().streaming {
            let fetcher = syncfetch_stream::get_or_install_with(|| {
                Ok(StreamingFetcher::new(Rc::new(WasmFetchWorker::new(worker)?)))
            })
            .map_err(js_error)?;
            inner = inner.with_fetcher(fetcher);
        }
        Ok(SyncFetchClient { inner })
    }

    /// ストリーミング経路が有効か
    #[wasm_bindgen(getter, js_name = "canStream")]
    pub fn can_stream(&self) -> bool {
        self.inner.can_stream()
    }

    /// リクエストを送り、ヘッダーが揃った時点で返す
    ///
    /// # 引数
    /// - `method` / `url`: リクエスト行（相対 URL は base URL で解決）
    /// - `headers_json`: `{"name": "value"}` 形式（省略可）
    /// - `body`: リクエストボディ（`undefined` はボディなし）
    /// - `timeout_secs`: 0 または省略で設定の既定値
    /// - `stream`: false で全体バッファを強制
    ///
    /// # エラー
    /// - タイムアウト・ワーカー側の例外・不正なリクエスト
    pub fn fetch(
        &self,
        method: &str,
        url: &str,
        headers_json: Option<String>,
        body: Option<Vec<u8>>,
        timeout_secs: Option<f64>,
        stream: Option<bool>,
    ) -> Result<ResponseReader, JsError> {
        let request = build_request(method, url, headers_json, body, timeout_secs)?;
        let url = self.inner.absolute_url(&request).map_err(js_error)?;
        let mode = if stream.unwrap_or(true) {
            SendMode::Stream
        } else {
            SendMode::Buffered
        };
        let response = self.inner.send(request, mode).map_err(js_error)?;
        Ok(ResponseReader {
            status: response.status,
            headers: response.headers.clone(),
            url: url.into(),
            reader: Some(Box::new(response.into_reader())),
        })
    }

    /// urlopen 相当: 生の HTTP レスポンス（ステータス行から）を読めるリーダーを返す
    ///
    /// # エラー
    /// - 2xx 以外（メッセージに "HTTP Error <status>" を含む）
    /// - その他 `fetch` と同じ
    pub fn open(
        &self,
        method: &str,
        url: &str,
        headers_json: Option<String>,
        body: Option<Vec<u8>>,
    ) -> Result<ResponseReader, JsError> {
        let request = build_request(method, url, headers_json, body, None)?;
        let raw = self.inner.open(request).map_err(js_error)?;
        Ok(ResponseReader {
            status: raw.status(),
            headers: raw.headers().clone(),
            url: raw.url.clone(),
            reader: Some(Box::new(raw)),
        })
    }
}

fn build_request(
    method: &str,
    url: &str,
    headers_json: Option<String>,
    body: Option<Vec<u8>>,
    timeout_secs: Option<f64>,
) -> Result<Request, JsError> {
    let mut request = Request::new(method, url);
    if let Some(json) = headers_json {
        request.headers = serde_json::from_str::<Headers>(&json)
            .map_err(|e| JsError::new(&format!("Invalid headers JSON: {e}")))?;
    }
    request.body = body;
    if let Some(secs) = timeout_secs {
        request.timeout = Duration::try_from_secs_f64(secs)
            .map_err(|e| JsError::new(&format!("Invalid timeout {secs}: {e}")))?;
    }
    Ok(request)
}

/// レスポンスボディの逐次リーダー
///
/// `read` が長さ 0 の配列を返したら終端。`close` またはガベージコレクト時に
/// ワーカーへ接続破棄を伝える。
#[wasm_bindgen]
pub struct ResponseReader {
    status: u16,
    headers: Headers,
    url: String,
    reader: Option<Box<dyn Read>>,
}

#[wasm_bindgen]
impl ResponseReader {
    #[wasm_bindgen(getter)]
    pub fn status(&self) -> u16 {
        self.status
    }

    #[wasm_bindgen(getter)]
    pub fn url(&self) -> String {
        self.url.clone()
    }

    /// ヘッダーを JSON オブジェクト文字列で返す
    #[wasm_bindgen(js_name = "headersJson")]
    pub fn headers_json(&self) -> Result<String, JsError> {
        serde_json::to_string(&self.headers).map_err(|e| JsError::new(&e.to_string()))
    }

    /// 最大 `max_bytes` バイトを読む
    ///
    /// # 戻り値
    /// 読んだバイト列。長さ 0 は EOF（close 後も同様）。
    ///
    /// # エラー
    /// - `max_bytes` が 0（EOF と区別できないため）
    /// - タイムアウト・ワーカー側の例外
    pub fn read(&mut self, max_bytes: u32) -> Result<Uint8Array, JsError> {
        let len = read_len(max_bytes).map_err(JsError::new)?;
        let Some(reader) = self.reader.as_mut() else {
            return Ok(Uint8Array::new_with_length(0));
        };
        let mut buf = vec![0u8; len];
        let n = reader
            .read(&mut buf)
            .map_err(|e| JsError::new(&e.to_string()))?;
        Ok(Uint8Array::from(&buf[..n]))
    }

    /// 残りをすべて読む
    #[wasm_bindgen(js_name = "readAll")]
    pub fn read_all(&mut self) -> Result<Uint8Array, JsError> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(Uint8Array::new_with_length(0));
        };
        let mut out = Vec::new();
        reader
            .read_to_end(&mut out)
            .map_err(|e| JsError::new(&e.to_string()))?;
        Ok(Uint8Array::from(out.as_slice()))
    }

    /// ボディを破棄して接続を解放する（何度呼んでもよい）
    pub fn close(&mut self) {
        self.reader = None;
    }
}

/// 長さ 0 の結果は EOF を意味するので、0 バイトの要求は受け付けない
fn read_len(max_bytes: u32) -> Result<usize, &'static str> {
    match max_bytes {
        0 => Err("maxBytes must be greater than 0"),
        n => Ok(n as usize),
    }
}

/// 登録済みのフェッチャーを破棄する（テストの後始末用）
#[wasm_bindgen(js_name = "resetFetcher")]
pub fn reset_fetcher() {
    syncfetch_stream::teardown();
}
