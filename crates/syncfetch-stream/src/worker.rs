//! フェッチワーカーへのポート
//!
//! 実際のネットワークフェッチは別スレッド / Web Worker 上のワーカーが行う。
//! このクレートはコマンドの送信と制御チャンネルの確保だけを要求する。

use std::fmt;
use std::rc::Rc;

use syncfetch_channel::ControlChannel;
use syncfetch_proto::{ConnectionId, FetchError, WorkerCommand};

/// 非同期フェッチワーカー
///
/// `post` はノンブロッキングでなければならない（応答は制御チャンネルに届く）。
pub trait FetchWorker {
    /// 新しい制御チャンネルを確保する
    ///
    /// ワーカーは `ChannelId` で領域を引けるよう保持しておくこと。
    fn allocate_channel(&self) -> Result<ControlChannel, FetchError>;

    /// コマンドを送る
    fn post(&self, command: WorkerCommand) -> Result<(), FetchError>;
}

/// 接続 ID の所有権
///
/// `release` またはドロップのどちらの経路でも Close コマンドを一度だけ送る。
pub(crate) struct ConnectionLease {
    worker: Rc<dyn FetchWorker>,
    connection_id: ConnectionId,
    released: bool,
}

impl ConnectionLease {
    pub(crate) fn new(worker: Rc<dyn FetchWorker>, connection_id: ConnectionId) -> Self {
        ConnectionLease {
            worker,
            connection_id,
            released: false,
        }
    }

    pub(crate) fn connection_id(&self) -> &ConnectionId {
        &self.connection_id
    }

    pub(crate) fn is_released(&self) -> bool {
        self.released
    }

    pub(crate) fn worker(&self) -> &dyn FetchWorker {
        self.worker.as_ref()
    }

    /// ワーカーに接続の破棄を伝える（2 回目以降は何もしない）
    pub(crate) fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        tracing::debug!(connection = %self.connection_id, "releasing connection");
        let command = WorkerCommand::Close(self.connection_id.clone());
        if let Err(e) = self.worker.post(command) {
            // ベストエフォート: ワーカー側の解放失敗は呼び出し側に伝えない
            tracing::warn!(connection = %self.connection_id, error = %e, "close command failed");
        }
    }
}

impl Drop for ConnectionLease {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for ConnectionLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionLease")
            .field("connection_id", &self.connection_id)
            .field("released", &self.released)
            .finish()
    }
}
