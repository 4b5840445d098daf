//! slot0 シグナルのエンコード/デコード
//!
//! 生の i32 をそのまま比較すると誤解釈の余地があるため、
//! 受信側は必ず [`Signal::decode`] でタグ付き列挙型に変換してから分岐する。

use crate::error::FetchError;

/// idle（コンシューマが待機前に書くリセット値）
pub const SIGNAL_IDLE: i32 = 0;
/// レスポンスヘッダー JSON がペイロード先頭にある
pub const SIGNAL_HEADER_READY: i32 = -1;
/// ボディ終端
pub const SIGNAL_EOF: i32 = -2;
/// ワーカー側タイムアウト
pub const SIGNAL_TIMEOUT: i32 = -3;
/// フェッチ例外（ペイロードに UTF-8 メッセージ）
pub const SIGNAL_EXCEPTION: i32 = -4;

/// slot0 / slot1 から復元したシグナル
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// まだ何も届いていない
    Idle,
    /// ペイロード先頭に `n` バイトのボディチャンク
    Chunk(usize),
    /// ペイロード先頭に `len` バイトのヘッダー JSON
    HeaderReady { len: usize },
    /// ボディ終端
    Eof,
    /// ワーカーが報告したタイムアウト
    Timeout,
    /// ペイロード先頭に `len` バイトのエラーメッセージ
    Exception { len: usize },
}

impl Signal {
    /// slot0 / slot1 の値をデコードする
    ///
    /// # 引数
    /// - `status`: slot0 の値
    /// - `aux`: slot1 の値（HeaderReady / Exception のときのみ参照）
    /// - `capacity`: ペイロード領域のバイト数
    ///
    /// # エラー
    /// - `FetchError::ProtocolViolation`: 未知の負値、または長さがペイロード領域を超える
    pub fn decode(status: i32, aux: i32, capacity: usize) -> Result<Self, FetchError> {
        match status {
            SIGNAL_IDLE => Ok(Signal::Idle),
            n if n > 0 => Ok(Signal::Chunk(checked_len(status, n, capacity)?)),
            SIGNAL_HEADER_READY => Ok(Signal::HeaderReady {
                len: checked_len(status, aux, capacity)?,
            }),
            SIGNAL_EOF => Ok(Signal::Eof),
            SIGNAL_TIMEOUT => Ok(Signal::Timeout),
            SIGNAL_EXCEPTION => Ok(Signal::Exception {
                len: checked_len(status, aux, capacity)?,
            }),
            other => Err(FetchError::violation(other, "unknown signal value")),
        }
    }

    /// (slot0, slot1) に書き込む値を返す
    ///
    /// 長さは呼び出し側で `PAYLOAD_CAPACITY` 以下に検証済みであること。
    pub fn encode(&self) -> (i32, i32) {
        match *self {
            Signal::Idle => (SIGNAL_IDLE, 0),
            Signal::Chunk(n) => (n as i32, 0),
            Signal::HeaderReady { len } => (SIGNAL_HEADER_READY, len as i32),
            Signal::Eof => (SIGNAL_EOF, 0),
            Signal::Timeout => (SIGNAL_TIMEOUT, 0),
            Signal::Exception { len } => (SIGNAL_EXCEPTION, len as i32),
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, Signal::Idle)
    }
}

fn checked_len(status: i32, len: i32, capacity: usize) -> Result<usize, FetchError> {
    let len = usize::try_from(len)
        .map_err(|_| FetchError::violation(status, format!("negative payload length {len}")))?;
    if len > capacity {
        return Err(FetchError::violation(
            status,
            format!("payload length {len} exceeds capacity {capacity}"),
        ));
    }
    Ok(len)
}
