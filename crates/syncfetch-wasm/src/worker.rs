//! ブラウザの fetch ワーカーへのポート
//!
//! ## postMessage の形状
//!
//! ```text
//! Start   → {buffer: SharedArrayBuffer, url, fetchParams: {headers, body, method, credentials}}
//! GetMore → {getMore: connectionID}
//! Close   → {close: connectionID}
//! ```
//!
//! ワーカーは Start を受けると `buffer` の slot0 に HEADER_READY / EXCEPTION を書き、
//! 以後は接続 ID でバッファを引いて応答する。

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use js_sys::{Function, Object, Reflect, Uint8Array};
use syncfetch_channel::ControlChannel;
use syncfetch_proto::{ChannelId, ConnectionId, FetchError, StartFetch, WorkerCommand};
use syncfetch_stream::FetchWorker;
use wasm_bindgen::{JsCast, JsValue};

use crate::region::SharedArrayRegion;

/// `postMessage` を持つ JS オブジェクト（Worker / MessagePort）をラップする
pub struct WasmFetchWorker {
    target: JsValue,
    post_message: Function,
    next_channel: Cell<u64>,
    /// Start を送るまでの確保済みバッファ
    pending: RefCell<HashMap<ChannelId, Arc<SharedArrayRegion>>>,
}

impl WasmFetchWorker {
    /// # エラー
    /// - `FetchError::WorkerUnavailable`: `postMessage` 関数を持たない
    pub fn new(target: JsValue) -> Result<Self, FetchError> {
        let post_message = Reflect::get(&target, &JsValue::from_str("postMessage"))
            .ok()
            .and_then(|f| f.dyn_into::<Function>().ok())
            .ok_or_else(|| FetchError::WorkerUnavailable("target has no postMessage".into()))?;
        Ok(WasmFetchWorker {
            target,
            post_message,
            next_channel: Cell::new(1),
            pending: RefCell::new(HashMap::new()),
        })
    }

    fn start_message(&self, start: StartFetch) -> Result<JsValue, FetchError> {
        let region = self.pending.borrow_mut().remove(&start.channel).ok_or_else(|| {
            FetchError::WorkerUnavailable(format!("{} was not allocated", start.channel))
        })?;

        let headers = Object::new();
        for (name, value) in &start.headers {
            set(&headers, name, &JsValue::from_str(value))?;
        }
        let params = Object::new();
        set(&params, "headers", &headers)?;
        let body = match &start.body {
            Some(bytes) => Uint8Array::from(bytes.as_slice()).into(),
            None => JsValue::UNDEFINED,
        };
        set(&params, "body", &body)?;
        set(&params, "method", &JsValue::from_str(&start.method))?;
        set(&params, "credentials", &JsValue::from_str(start.credentials.as_str()))?;

        let message = Object::new();
        set(&message, "buffer", region.buffer())?;
        set(&message, "url", &JsValue::from_str(&start.url))?;
        set(&message, "fetchParams", &params)?;
        Ok(message.into())
    }
}

fn connection_value(id: &ConnectionId) -> JsValue {
    match id {
        ConnectionId::Number(n) => JsValue::from_f64(*n as f64),
        ConnectionId::Text(s) => JsValue::from_str(s),
    }
}

fn set(target: &Object, key: &str, value: &JsValue) -> Result<(), FetchError> {
    Reflect::set(target, &JsValue::from_str(key), value)
        .map(|_| ())
        .map_err(|e| FetchError::WorkerUnavailable(format!("cannot build message: {e:?}")))
}

fn keyed(key: &str, id: &ConnectionId) -> Result<JsValue, FetchError> {
    let message = Object::new();
    set(&message, key, &connection_value(id))?;
    Ok(message.into())
}

impl FetchWorker for WasmFetchWorker {
    fn allocate_channel(&self) -> Result<ControlChannel, FetchError> {
        let id = ChannelId(self.next_channel.get());
        self.next_channel.set(id.0 + 1);
        let region = Arc::new(SharedArrayRegion::new());
        let mut pending = self.pending.borrow_mut();
        // 確保と Start は同期的に続くので、残っているのは Start 前に失敗した分
        pending.clear();
        pending.insert(id, Arc::clone(&region));
        Ok(ControlChannel::new(id, region))
    }

    fn post(&self, command: WorkerCommand) -> Result<(), FetchError> {
        let message = match command {
            WorkerCommand::Start(start) => self.start_message(start)?,
            WorkerCommand::GetMore(id) => keyed("getMore", &id)?,
            WorkerCommand::Close(id) => keyed("close", &id)?,
        };
        self.post_message
            .call1(&self.target, &message)
            .map(|_| ())
            .map_err(|e| FetchError::WorkerUnavailable(format!("postMessage failed: {e:?}")))
    }
}

impl fmt::Debug for WasmFetchWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WasmFetchWorker")
            .field("next_channel", &self.next_channel.get())
            .field("pending", &self.pending.borrow().len())
            .finish()
    }
}
