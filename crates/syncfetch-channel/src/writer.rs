//! ワーカー側の書き込み
//!
//! 書き込み順序は常に「ペイロード → slot1 → slot0 → notify」。
//! slot0 の Release ストアより前の書き込みはコンシューマから必ず見える。

use syncfetch_proto::signal::SIGNAL_HEADER_READY;
use syncfetch_proto::{FetchError, HeaderSlot, ResponseHead, Signal};

use crate::region::ControlRegion;

/// 制御領域へシグナルを発行するワーカー側ヘルパー
pub struct ChannelWriter<'a> {
    region: &'a dyn ControlRegion,
}

impl<'a> ChannelWriter<'a> {
    pub fn new(region: &'a dyn ControlRegion) -> Self {
        ChannelWriter { region }
    }

    /// レスポンスヘッダー JSON を書いて HEADER_READY を発行する
    ///
    /// # エラー
    /// - `FetchError::ProtocolViolation`: JSON がペイロード領域に収まらない
    pub fn publish_head(&self, head: &ResponseHead) -> Result<(), FetchError> {
        let json = head.to_json()?;
        if json.len() > self.region.payload_capacity() {
            return Err(FetchError::violation(
                SIGNAL_HEADER_READY,
                format!("header JSON of {} bytes does not fit", json.len()),
            ));
        }
        self.region.write_payload(0, &json);
        self.signal(Signal::HeaderReady { len: json.len() });
        Ok(())
    }

    /// ボディチャンクを書いてチャンク長を発行する
    ///
    /// ペイロード領域に収まる分だけ書き、書いたバイト数を返す。
    /// 残りは次の GetMore で送ること。
    ///
    /// # エラー
    /// - `FetchError::ProtocolViolation`: 空チャンク（slot0 = 0 は idle と区別できない）
    pub fn publish_chunk(&self, data: &[u8]) -> Result<usize, FetchError> {
        if data.is_empty() {
            return Err(FetchError::violation(0, "empty chunk cannot be signalled"));
        }
        let len = data.len().min(self.region.payload_capacity());
        self.region.write_payload(0, &data[..len]);
        self.signal(Signal::Chunk(len));
        Ok(len)
    }

    pub fn publish_eof(&self) {
        self.signal(Signal::Eof);
    }

    pub fn publish_timeout(&self) {
        self.signal(Signal::Timeout);
    }

    /// エラーメッセージを書いて EXCEPTION を発行する
    ///
    /// 容量を超えるメッセージは UTF-8 の文字境界で切り詰める。
    pub fn publish_exception(&self, message: &str) {
        let mut end = message.len().min(self.region.payload_capacity());
        while !message.is_char_boundary(end) {
            end -= 1;
        }
        self.region.write_payload(0, &message.as_bytes()[..end]);
        self.signal(Signal::Exception { len: end });
    }

    fn signal(&self, signal: Signal) {
        let (status, aux) = signal.encode();
        self.region.store(HeaderSlot::AuxLength, aux);
        self.region.store(HeaderSlot::Signal, status);
        self.region.notify();
    }
}
