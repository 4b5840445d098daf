//! コンシューマ側の制御チャンネルハンドル

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use syncfetch_proto::signal::SIGNAL_IDLE;
use syncfetch_proto::{ChannelId, FetchError, HeaderSlot, Signal};

use crate::region::{ControlRegion, WaitOutcome};

/// 1 リクエスト分の制御チャンネル
///
/// ワーカーが確保し、`ChannelId` で対応付ける。
/// クローンは同じ共有領域を指す。
#[derive(Clone)]
pub struct ControlChannel {
    id: ChannelId,
    region: Arc<dyn ControlRegion>,
}

impl ControlChannel {
    pub fn new(id: ChannelId, region: Arc<dyn ControlRegion>) -> Self {
        ControlChannel { id, region }
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn region(&self) -> &Arc<dyn ControlRegion> {
        &self.region
    }

    pub fn capacity(&self) -> usize {
        self.region.payload_capacity()
    }

    /// slot0 に idle を書く
    ///
    /// コマンド送信の直前に必ず呼ぶ。前回のシグナルが新しいシグナルとして
    /// 誤読されることを防ぐ。
    pub fn reset(&self) {
        self.region.store(HeaderSlot::Signal, SIGNAL_IDLE);
        self.region.notify();
    }

    /// 現在の slot0 / slot1 をデコードする
    pub fn current_signal(&self) -> Result<Signal, FetchError> {
        Signal::decode(
            self.region.load(HeaderSlot::Signal),
            self.region.load(HeaderSlot::AuxLength),
            self.capacity(),
        )
    }

    /// ワーカーからのシグナルを待つ
    ///
    /// # 引数
    /// - `timeout`: 待機期限（`None` = 無期限）
    ///
    /// # 戻り値
    /// 受信したシグナル。期限内に何も届かなかった場合は `Signal::Idle`。
    /// 待機が期限切れになっても直後に値が書かれていればそのシグナルを返す。
    ///
    /// # エラー
    /// - `FetchError::ProtocolViolation`: 未知のシグナル値
    pub fn wait_signal(&self, timeout: Option<Duration>) -> Result<Signal, FetchError> {
        let outcome = self.region.wait(SIGNAL_IDLE, timeout);
        let signal = self.current_signal()?;
        if outcome == WaitOutcome::TimedOut && signal.is_idle() {
            tracing::trace!(channel = %self.id, "wait expired with idle slot");
        }
        Ok(signal)
    }

    /// ペイロードの `offset` から `dst.len()` バイトをコピーする
    ///
    /// # エラー
    /// - `FetchError::ProtocolViolation`: 範囲がペイロード領域を超える
    pub fn read_payload(&self, offset: usize, dst: &mut [u8]) -> Result<(), FetchError> {
        match offset.checked_add(dst.len()) {
            Some(end) if end <= self.capacity() => {
                self.region.read_payload(offset, dst);
                Ok(())
            }
            _ => Err(FetchError::violation(
                self.region.load(HeaderSlot::Signal),
                format!("payload read {offset}+{} out of range", dst.len()),
            )),
        }
    }

    /// ペイロード先頭 `len` バイトを Vec にコピーする
    ///
    /// 共有領域上のまま UTF-8 デコードはできないため、必ず一度コピーする。
    pub fn payload_prefix(&self, len: usize) -> Result<Vec<u8>, FetchError> {
        let mut buf = vec![0u8; len];
        self.read_payload(0, &mut buf)?;
        Ok(buf)
    }

    /// ペイロード先頭 `len` バイトを UTF-8 文字列として読む（不正なバイトは置換）
    pub fn payload_text(&self, len: usize) -> Result<String, FetchError> {
        let bytes = self.payload_prefix(len)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

impl fmt::Debug for ControlChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlChannel")
            .field("id", &self.id)
            .field("capacity", &self.capacity())
            .finish()
    }
}
