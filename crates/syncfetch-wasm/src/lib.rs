//! # syncfetch-wasm
//!
//! wasm-bindgen エクスポート：Web Worker 上の同期コード（Pyodide など）から呼び出す公開 API。
//!
//! ## 使用方法（JavaScript, Web Worker 内）
//!
//! ```javascript
//! import init, { SyncFetchClient, init_panic_hook, init_logging } from './pkg/syncfetch_wasm.js';
//!
//! await init();
//! init_panic_hook();
//! init_logging("debug");
//!
//! // fetch を実行する別ワーカー（SharedArrayBuffer に結果を書く）
//! const fetchWorker = new Worker('fetch_worker.js');
//! const client = new SyncFetchClient(fetchWorker, JSON.stringify({ defaultTimeoutSecs: 30 }));
//!
//! const res = client.fetch("GET", "https://example.test/data");
//! for (let chunk = res.read(65536); chunk.length > 0; chunk = res.read(65536)) {
//!     consume(chunk);
//! }
//! res.close();
//! ```

use wasm_bindgen::prelude::*;

pub mod capability;
pub mod client;
pub mod logging;
pub mod region;
pub mod worker;
pub mod xhr;

pub use capability::Capabilities;
pub use client::{ResponseReader, SyncFetchClient};
pub use region::SharedArrayRegion;
pub use worker::WasmFetchWorker;
pub use xhr::XhrTransport;

/// パニック時にブラウザコンソールにスタックトレースを出力する
///
/// 開発時に必ず呼び出すこと。本番ビルドでは feature flag で無効化可能。
#[wasm_bindgen]
pub fn init_panic_hook() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

/// tracing の出力先をブラウザコンソールにする
///
/// # 引数
/// - `level`: "error" / "warn" / "info" / "debug" / "trace"（省略時は "warn"）
///
/// # 戻り値
/// 新たに設置した場合 true（2 回目以降は false）
#[wasm_bindgen]
pub fn init_logging(level: Option<String>) -> bool {
    logging::install(level.as_deref())
}

/// 現在の実行コンテキストでストリーミングが使えるか
#[wasm_bindgen(js_name = "streamingSupported")]
pub fn streaming_supported() -> bool {
    Capabilities::detect().can_stream()
}
