//! チャンク単位のプル型読み出しストリーム
//!
//! ## read 1 回の流れ
//!
//! ```text
//! ローカルに未読バイトあり → そのままコピー
//! 未読なし → slot0 = 0 → GetMore(connection) → slot0 で待機
//!   Chunk(n)     : n バイトをペイロード先頭から読めるようにする
//!   Eof          : 接続を解放して 0 を返す（以後ワーカーとはやり取りしない）
//!   Exception    : 接続を解放してエラー
//!   Idle/Timeout : 接続を解放してタイムアウトエラー
//! ```
//!
//! 要求より少ないバイト数を返すことがある（EOF ではない）。呼び出し側はループすること。

use std::fmt;
use std::io::{self, Read};
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use syncfetch_channel::ControlChannel;
use syncfetch_proto::{ConnectionId, FetchError, Request, Signal, TimeoutOrigin, WorkerCommand};

use crate::worker::{ConnectionLease, FetchWorker};

enum StreamState {
    /// チャンネル保持中
    Live(ControlChannel),
    /// EOF 観測済み（以後の read は常に 0）
    Finished,
    /// エラーまたは明示的な close の後
    Failed,
}

/// 1 接続分のボディを順に読み出すストリーム
///
/// シーク不可・再開不可・単一リーダー。
pub struct ChunkedReadStream {
    state: StreamState,
    lease: ConnectionLease,
    /// ペイロード上の次の読み出し位置
    read_pos: usize,
    /// ローカルに残っている未読バイト数
    read_len: usize,
    timeout: Option<Duration>,
    request: Arc<Request>,
}

impl ChunkedReadStream {
    pub(crate) fn new(
        channel: ControlChannel,
        worker: Rc<dyn FetchWorker>,
        connection_id: ConnectionId,
        request: Arc<Request>,
    ) -> Self {
        ChunkedReadStream {
            state: StreamState::Live(channel),
            lease: ConnectionLease::new(worker, connection_id),
            read_pos: 0,
            read_len: 0,
            timeout: request.wait_timeout(),
            request,
        }
    }

    pub fn connection_id(&self) -> &ConnectionId {
        self.lease.connection_id()
    }

    /// まだチャンネルを保持しているか
    pub fn is_live(&self) -> bool {
        matches!(self.state, StreamState::Live(_))
    }

    /// EOF を観測済みか
    pub fn is_finished(&self) -> bool {
        matches!(self.state, StreamState::Finished)
    }

    /// ワーカーに問い合わせずに読めるバイト数
    pub fn buffered_len(&self) -> usize {
        self.read_len
    }

    /// 最大 `buf.len()` バイトを読み出す
    ///
    /// # 戻り値
    /// 読み出したバイト数。0 は EOF（または空バッファ）。
    ///
    /// # エラー
    /// - `FetchError::StreamingTimeout`: 期限内にチャンクが届かなかった
    /// - `FetchError::StreamingException`: ワーカーがフェッチ失敗を報告した
    /// - `FetchError::ProtocolViolation`: 想定外のシグナル
    /// - `FetchError::StreamClosed`: 失敗後または close 後の読み出し
    pub fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, FetchError> {
        let channel = match &self.state {
            StreamState::Live(channel) => channel.clone(),
            StreamState::Finished => return Ok(0),
            StreamState::Failed => return Err(FetchError::StreamClosed),
        };
        if buf.is_empty() {
            return Ok(0);
        }

        if self.read_len == 0 {
            channel.reset();
            let command = WorkerCommand::GetMore(self.lease.connection_id().clone());
            if let Err(e) = self.lease.worker().post(command) {
                self.fail();
                return Err(e);
            }

            match channel.wait_signal(self.timeout) {
                Ok(Signal::Chunk(n)) => {
                    tracing::trace!(connection = %self.connection_id(), bytes = n, "chunk ready");
                    self.read_len = n;
                    self.read_pos = 0;
                }
                Ok(Signal::Eof) => {
                    tracing::debug!(connection = %self.connection_id(), "end of stream");
                    self.state = StreamState::Finished;
                    self.lease.release();
                    return Ok(0);
                }
                Ok(Signal::Exception { len }) => {
                    let message = channel.payload_text(len);
                    self.fail();
                    let message = message?;
                    tracing::warn!(connection = %self.connection_id(), %message, "fetch failed mid-stream");
                    return Err(FetchError::StreamingException {
                        request: Arc::clone(&self.request),
                        message,
                    });
                }
                Ok(Signal::Idle) => return Err(self.timed_out(TimeoutOrigin::Local)),
                Ok(Signal::Timeout) => return Err(self.timed_out(TimeoutOrigin::Worker)),
                Ok(signal @ Signal::HeaderReady { .. }) => {
                    self.fail();
                    return Err(FetchError::violation(
                        signal.encode().0,
                        "response head signalled on a body read",
                    ));
                }
                Err(e) => {
                    self.fail();
                    return Err(e);
                }
            }
        }

        let n = self.read_len.min(buf.len());
        if let Err(e) = channel.read_payload(self.read_pos, &mut buf[..n]) {
            self.fail();
            return Err(e);
        }
        self.read_pos += n;
        self.read_len -= n;
        Ok(n)
    }

    /// ストリームを閉じて接続を解放する
    ///
    /// 何度呼んでもよい。EOF 後・エラー後も安全。
    pub fn close(&mut self) {
        if self.is_live() {
            self.state = StreamState::Failed;
        }
        self.read_len = 0;
        self.lease.release();
    }

    fn fail(&mut self) {
        self.state = StreamState::Failed;
        self.read_len = 0;
        self.lease.release();
    }

    fn timed_out(&mut self, origin: TimeoutOrigin) -> FetchError {
        tracing::warn!(connection = %self.connection_id(), %origin, "timed out waiting for chunk");
        self.fail();
        FetchError::StreamingTimeout {
            request: Arc::clone(&self.request),
            origin,
        }
    }
}

impl Read for ChunkedReadStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_chunk(buf).map_err(FetchError::into_io)
    }
}

impl fmt::Debug for ChunkedReadStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.state {
            StreamState::Live(_) => "live",
            StreamState::Finished => "finished",
            StreamState::Failed => "failed",
        };
        f.debug_struct("ChunkedReadStream")
            .field("connection_id", self.connection_id())
            .field("state", &state)
            .field("buffered", &self.read_len)
            .field("released", &self.lease.is_released())
            .finish()
    }
}
