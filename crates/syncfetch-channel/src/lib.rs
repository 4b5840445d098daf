//! # syncfetch-channel
//!
//! コンシューマとフェッチワーカーが共有する制御チャンネル。
//!
//! ## 構成
//!
//! ```text
//! ControlRegion (trait)   : slot 読み書き・slot0 での待機/通知・ペイロードコピー
//!   ├── HeapRegion        : ネイティブ実装（AtomicI32 + Condvar）
//!   └── (syncfetch-wasm)  : SharedArrayBuffer + Atomics.wait 実装
//! ControlChannel          : コンシューマ側ハンドル（リセット・待機・ペイロード読み出し）
//! ChannelWriter           : ワーカー側（ペイロード書き込み → シグナル → notify）
//! ```
//!
//! コンシューマはペイロード領域に書き込まない。
//! slot0 は両側が書くが、プロトコル上同時に書く側は常に一方のみ。

pub mod channel;
pub mod region;
pub mod writer;

pub use channel::ControlChannel;
pub use region::{ControlRegion, HeapRegion, WaitOutcome};
pub use writer::ChannelWriter;
