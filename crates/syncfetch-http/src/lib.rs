//! # syncfetch-http
//!
//! ストリーミングブリッジの上に載る HTTP 境界。
//!
//! - `envelope`: ステータス行 + ヘッダー + ボディの再構築、2xx 以外のエラー化
//! - `transport`: 全体バッファ方式のフォールバックポート
//! - `options`: JS ホストから渡す設定
//! - `client`: ストリーミング / フォールバックの振り分けと urlopen 相当の入口

pub mod client;
pub mod envelope;
pub mod options;
pub mod transport;

#[cfg(test)]
mod test_support;

pub use client::{Client, SendMode};
pub use envelope::{encode_head, status_line, strip_framing_headers, Envelope, RawResponse};
pub use options::FetchOptions;
pub use transport::{
    parse_header_block, BufferedTransport, PreparedRequest, SKIPPED_REQUEST_HEADERS,
};
