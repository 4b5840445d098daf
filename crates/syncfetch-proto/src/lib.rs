//! # syncfetch-proto
//!
//! 同期側（コンシューマ）と非同期フェッチワーカー間でやり取りする
//! 制御プロトコルの定義。
//!
//! ## 制御チャンネルのメモリレイアウト
//!
//! ```text
//! [slot0: i32][slot1: i32][payload: CHANNEL_SIZE - 8 bytes]
//!
//! slot0: シグナル（0 = idle, >0 = チャンク長, 負値 = 制御シグナル）
//! slot1: 補助長（ヘッダー JSON 長 / エラーメッセージ長）
//! ```
//!
//! ## ハンドシェイク
//!
//! ```text
//! コンシューマ: slot0 = 0 → コマンド送信 → slot0 で待機
//! ワーカー:     payload / slot1 を書く → slot0 = シグナル → notify
//! ```
//!
//! 1 チャンネルにつき未応答のコマンドは常に高々 1 つ。
//! この交互順序がロックの代わりに競合を防ぐ。

pub mod command;
pub mod error;
pub mod head;
pub mod request;
pub mod signal;

pub use command::{ChannelId, ConnectionId, Credentials, StartFetch, WorkerCommand};
pub use error::{FetchError, TimeoutOrigin};
pub use head::ResponseHead;
pub use request::{Headers, Request};
pub use signal::Signal;

/// 制御チャンネル全体のバイト数（1 MiB）
pub const CHANNEL_SIZE: usize = 1 << 20;

/// ヘッダー領域の i32 スロット数
pub const HEADER_SLOTS: usize = 2;

/// ヘッダー領域のバイト数（ペイロードはこのオフセットから始まる）
pub const HEADER_BYTES: usize = HEADER_SLOTS * core::mem::size_of::<i32>();

/// ペイロード領域の最大バイト数
pub const PAYLOAD_CAPACITY: usize = CHANNEL_SIZE - HEADER_BYTES;

/// ヘッダースロットの位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderSlot {
    /// シグナル / チャンク長
    Signal = 0,
    /// ヘッダー JSON 長 / エラーメッセージ長
    AuxLength = 1,
}

impl HeaderSlot {
    /// Int32Array 上のインデックス
    pub fn index(self) -> usize {
        self as usize
    }
}
