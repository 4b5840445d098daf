//! # syncfetch-stream
//!
//! 同期コンシューマと非同期フェッチワーカーの橋渡し。
//!
//! ## 構成
//!
//! ```text
//! StreamingFetcher::send(request)
//!   └─ Response { status, headers, body: Body::Stream(ChunkedReadStream) }
//!                                          └─ ConnectionLease（Close を一度だけ送る）
//! ```
//!
//! すべての操作は呼び出し側から見て同期的。
//! 1 つの制御チャンネルでは「コマンド 1 つ → シグナル 1 つ」が厳密に交互になる。

pub mod fetcher;
pub mod reader;
pub mod response;
pub mod worker;

#[cfg(test)]
mod test_support;

pub use fetcher::{get_or_install_with, install, installed, teardown, StreamingFetcher};
pub use reader::ChunkedReadStream;
pub use response::{Body, BodyReader, Response};
pub use worker::FetchWorker;
