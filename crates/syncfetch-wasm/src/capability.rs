//! 実行コンテキストの能力判定
//!
//! ストリーミングには次の 3 つがすべて必要:
//! - `SharedArrayBuffer` が存在する
//! - `crossOriginIsolated` が true（COOP/COEP ヘッダー付きで配信されている）
//! - Web Worker 内で動いている（メインスレッドでは `Atomics.wait` が使えない）

use js_sys::Reflect;
use wasm_bindgen::JsValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    pub shared_memory: bool,
    pub cross_origin_isolated: bool,
    pub in_worker: bool,
}

impl Capabilities {
    /// グローバルオブジェクトを調べる
    pub fn detect() -> Self {
        let global: JsValue = js_sys::global().into();
        let has = |name: &str| Reflect::has(&global, &JsValue::from_str(name)).unwrap_or(false);
        let isolated = Reflect::get(&global, &JsValue::from_str("crossOriginIsolated"))
            .ok()
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        Capabilities {
            shared_memory: has("SharedArrayBuffer"),
            cross_origin_isolated: isolated,
            // importScripts はワーカーのグローバルにだけある
            in_worker: has("importScripts"),
        }
    }

    /// ブロッキング待機つきストリーミングが使えるか
    pub fn can_stream(&self) -> bool {
        self.shared_memory && self.cross_origin_isolated && self.in_worker
    }

    /// 同期 XHR にタイムアウトと arraybuffer を設定できるか
    pub fn can_configure_sync_xhr(&self) -> bool {
        self.in_worker
    }
}
