//! SharedArrayBuffer 上の制御領域
//!
//! ```text
//! SharedArrayBuffer (CHANNEL_SIZE)
//! ┌──────────────┬────────────────────────────────────┐
//! │ Int32Array×2 │ Uint8Array (PAYLOAD_CAPACITY)       │
//! │ slot0 slot1  │ ワーカーが書き、コンシューマが読む  │
//! └──────────────┴────────────────────────────────────┘
//! ```
//!
//! 待機と通知は JS の `Atomics.wait` / `Atomics.notify` をそのまま使う。
//! メインスレッドでは `Atomics.wait` が例外になるため、ワーカー内でのみ使うこと。

use std::time::Duration;

use js_sys::{Atomics, Int32Array, SharedArrayBuffer, Uint8Array};
use syncfetch_channel::{ControlRegion, WaitOutcome};
use syncfetch_proto::{HeaderSlot, CHANNEL_SIZE, HEADER_BYTES, HEADER_SLOTS, PAYLOAD_CAPACITY};

/// ワーカーと共有する 1 チャンネル分のメモリ
pub struct SharedArrayRegion {
    buffer: SharedArrayBuffer,
    slots: Int32Array,
    payload: Uint8Array,
}

impl SharedArrayRegion {
    pub fn new() -> Self {
        let buffer = SharedArrayBuffer::new(CHANNEL_SIZE as u32);
        let slots = Int32Array::new_with_byte_offset_and_length(&buffer, 0, HEADER_SLOTS as u32);
        let payload = Uint8Array::new_with_byte_offset_and_length(
            &buffer,
            HEADER_BYTES as u32,
            PAYLOAD_CAPACITY as u32,
        );
        SharedArrayRegion {
            buffer,
            slots,
            payload,
        }
    }

    /// ワーカーへ渡すバッファ
    pub fn buffer(&self) -> &SharedArrayBuffer {
        &self.buffer
    }
}

impl Default for SharedArrayRegion {
    fn default() -> Self {
        Self::new()
    }
}

impl ControlRegion for SharedArrayRegion {
    fn load(&self, slot: HeaderSlot) -> i32 {
        Atomics::load(&self.slots, slot.index() as u32).unwrap_or_else(|e| {
            tracing::warn!(error = ?e, "Atomics.load failed");
            0
        })
    }

    fn store(&self, slot: HeaderSlot, value: i32) {
        if let Err(e) = Atomics::store(&self.slots, slot.index() as u32, value) {
            tracing::warn!(error = ?e, "Atomics.store failed");
        }
    }

    fn wait(&self, expected: i32, timeout: Option<Duration>) -> WaitOutcome {
        let index = HeaderSlot::Signal.index() as u32;
        let result = match timeout {
            Some(t) => Atomics::wait_with_timeout(&self.slots, index, expected, t.as_secs_f64() * 1000.0),
            None => Atomics::wait(&self.slots, index, expected),
        };
        match result.map(String::from).as_deref() {
            Ok("ok") => WaitOutcome::Woken,
            Ok("not-equal") => WaitOutcome::NotEqual,
            Ok(_) => WaitOutcome::TimedOut,
            Err(e) => {
                // メインスレッドなど待機できない文脈
                tracing::error!(error = ?e, "Atomics.wait is not permitted here");
                WaitOutcome::TimedOut
            }
        }
    }

    fn notify(&self) {
        if let Err(e) = Atomics::notify(&self.slots, HeaderSlot::Signal.index() as u32) {
            tracing::warn!(error = ?e, "Atomics.notify failed");
        }
    }

    fn payload_capacity(&self) -> usize {
        PAYLOAD_CAPACITY
    }

    fn read_payload(&self, offset: usize, dst: &mut [u8]) {
        let end = offset + dst.len();
        self.payload.subarray(offset as u32, end as u32).copy_to(dst);
    }

    fn write_payload(&self, offset: usize, src: &[u8]) {
        let end = offset + src.len();
        self.payload.subarray(offset as u32, end as u32).copy_from(src);
    }
}
