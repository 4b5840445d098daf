//! 同期 XMLHttpRequest による全体バッファ方式のトランスポート
//!
//! - ワーカー内: `responseType = "arraybuffer"`、タイムアウトを設定する
//! - メインスレッド: 同期 XHR には responseType もタイムアウトも設定できないため、
//!   `x-user-defined` でテキストとして受け取り 1 文字 1 バイトに戻す

use js_sys::Uint8Array;
use syncfetch_http::{parse_header_block, BufferedTransport, PreparedRequest};
use syncfetch_proto::{Credentials, FetchError};
use syncfetch_stream::Response;
use wasm_bindgen::JsValue;
use web_sys::{XmlHttpRequest, XmlHttpRequestResponseType};

use crate::capability::Capabilities;

#[derive(Debug, Clone, Copy)]
pub struct XhrTransport {
    in_worker: bool,
}

impl XhrTransport {
    pub fn new(capabilities: Capabilities) -> Self {
        XhrTransport {
            in_worker: capabilities.can_configure_sync_xhr(),
        }
    }
}

fn js_err(context: &str) -> impl FnOnce(JsValue) -> FetchError + '_ {
    move |e| FetchError::Io(std::io::Error::other(format!("XMLHttpRequest {context}: {e:?}")))
}

impl BufferedTransport for XhrTransport {
    fn fetch(&self, request: &PreparedRequest) -> Result<Response, FetchError> {
        let xhr = XmlHttpRequest::new().map_err(js_err("constructor"))?;
        xhr.open_with_async(request.method.as_str(), request.url.as_str(), false)
            .map_err(js_err("open"))?;

        if self.in_worker {
            xhr.set_response_type(XmlHttpRequestResponseType::Arraybuffer);
            ensure_arraybuffer(xhr.response_type())?;
            if let Some(timeout) = request.timeout {
                xhr.set_timeout(timeout.as_millis().min(u32::MAX as u128) as u32);
            }
        } else {
            xhr.override_mime_type("text/plain; charset=x-user-defined")
                .map_err(js_err("overrideMimeType"))?;
        }

        // 禁止ヘッダー名はブラウザが黙って無視する。例外は名前か値が不正な場合のみ
        for (name, value) in &request.headers {
            xhr.set_request_header(name, value)
                .map_err(js_err("setRequestHeader"))?;
        }
        xhr.set_with_credentials(request.credentials == Credentials::Include);
        xhr.send_with_opt_u8_array(request.body.as_deref())
            .map_err(js_err("send"))?;

        let status = xhr.status().map_err(js_err("status"))?;
        let headers = parse_header_block(
            &xhr.get_all_response_headers()
                .map_err(js_err("getAllResponseHeaders"))?,
        );
        let body = if self.in_worker {
            Uint8Array::new(&xhr.response().map_err(js_err("response"))?).to_vec()
        } else {
            user_defined_bytes(
                &xhr.response_text()
                    .map_err(js_err("responseText"))?
                    .unwrap_or_default(),
            )
        };
        Ok(Response::buffered(status, headers, body))
    }
}

/// 設定が受け入れられずに文字列で返ってくると `Uint8Array` が空になるため、先に検出する
fn ensure_arraybuffer(actual: XmlHttpRequestResponseType) -> Result<(), FetchError> {
    if actual == XmlHttpRequestResponseType::Arraybuffer {
        Ok(())
    } else {
        Err(FetchError::Io(std::io::Error::other(format!(
            "XMLHttpRequest responseType: arraybuffer was not accepted (got {actual:?})"
        ))))
    }
}

/// `x-user-defined` で受け取ったテキストを 1 文字 1 バイトに戻す
fn user_defined_bytes(text: &str) -> Vec<u8> {
    text.chars().map(|c| (c as u32 & 0xff) as u8).collect()
}
