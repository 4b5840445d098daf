//! 共有メモリ領域の抽象化
//!
//! JS の `Atomics.wait(int32, 0, expected, timeout)` / `Atomics.notify(int32, 0)` と
//! 同じ意味論をネイティブでも提供する。

use std::sync::atomic::{AtomicI32, AtomicU8, Ordering};
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use syncfetch_proto::{HeaderSlot, HEADER_SLOTS, PAYLOAD_CAPACITY};

/// `wait` の結果（`Atomics.wait` の戻り値に対応）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// 待機中に slot0 が変化した（"ok"）
    Woken,
    /// 呼び出し時点で slot0 が expected と異なっていた（"not-equal"）
    NotEqual,
    /// 期限までに slot0 が変化しなかった（"timed-out"）
    TimedOut,
}

/// 制御ヘッダー + ペイロードからなる共有メモリ領域
///
/// ペイロードの offset / 長さの範囲チェックは呼び出し側
/// （`ControlChannel` / `ChannelWriter`）の責任。
pub trait ControlRegion {
    /// ヘッダースロットを読む（Acquire）
    fn load(&self, slot: HeaderSlot) -> i32;

    /// ヘッダースロットに書く（Release）
    fn store(&self, slot: HeaderSlot, value: i32);

    /// slot0 が `expected` である間ブロックする
    ///
    /// # 引数
    /// - `expected`: 待機を続ける値（通常は idle = 0）
    /// - `timeout`: 待機期限（`None` = 無期限）
    fn wait(&self, expected: i32, timeout: Option<Duration>) -> WaitOutcome;

    /// slot0 の待機者を起こす
    fn notify(&self);

    /// ペイロード領域のバイト数
    fn payload_capacity(&self) -> usize;

    /// ペイロード領域の `offset` から `dst.len()` バイトをコピーする
    fn read_payload(&self, offset: usize, dst: &mut [u8]);

    /// ペイロード領域の `offset` に `src` を書き込む（ワーカー側のみ）
    fn write_payload(&self, offset: usize, src: &[u8]);
}

/// ネイティブスレッド間で共有するヒープ上の制御領域
///
/// slot は `AtomicI32`、ペイロードは `AtomicU8` 配列。
/// ペイロードの可視性は slot0 の Release/Acquire で保証する。
pub struct HeapRegion {
    slots: [AtomicI32; HEADER_SLOTS],
    payload: Box<[AtomicU8]>,
    lock: Mutex<()>,
    wakeup: Condvar,
}

impl HeapRegion {
    /// 標準サイズ（1 MiB - 8 バイトのペイロード）の領域を確保する
    pub fn new() -> Self {
        Self::with_capacity(PAYLOAD_CAPACITY)
    }

    /// ペイロード容量を指定して確保する（テストで小さいチャンネルを使う場合など）
    pub fn with_capacity(capacity: usize) -> Self {
        HeapRegion {
            slots: std::array::from_fn(|_| AtomicI32::new(0)),
            payload: (0..capacity).map(|_| AtomicU8::new(0)).collect(),
            lock: Mutex::new(()),
            wakeup: Condvar::new(),
        }
    }

    fn signal_slot(&self) -> &AtomicI32 {
        &self.slots[HeaderSlot::Signal.index()]
    }
}

impl Default for HeapRegion {
    fn default() -> Self {
        Self::new()
    }
}

impl ControlRegion for HeapRegion {
    fn load(&self, slot: HeaderSlot) -> i32 {
        self.slots[slot.index()].load(Ordering::Acquire)
    }

    fn store(&self, slot: HeaderSlot, value: i32) {
        self.slots[slot.index()].store(value, Ordering::Release);
    }

    fn wait(&self, expected: i32, timeout: Option<Duration>) -> WaitOutcome {
        let deadline = timeout.map(|t| Instant::now() + t);
        // 値の確認と待機開始をロック内で行い、notify の取りこぼしを防ぐ
        let mut guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);

        if self.signal_slot().load(Ordering::Acquire) != expected {
            return WaitOutcome::NotEqual;
        }

        loop {
            guard = match deadline {
                None => self
                    .wakeup
                    .wait(guard)
                    .unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return WaitOutcome::TimedOut;
                    }
                    self.wakeup
                        .wait_timeout(guard, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };

            if self.signal_slot().load(Ordering::Acquire) != expected {
                return WaitOutcome::Woken;
            }
        }
    }

    fn notify(&self) {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.wakeup.notify_all();
    }

    fn payload_capacity(&self) -> usize {
        self.payload.len()
    }

    fn read_payload(&self, offset: usize, dst: &mut [u8]) {
        let src = &self.payload[offset..offset + dst.len()];
        for (d, s) in dst.iter_mut().zip(src) {
            *d = s.load(Ordering::Relaxed);
        }
    }

    fn write_payload(&self, offset: usize, src: &[u8]) {
        let dst = &self.payload[offset..offset + src.len()];
        for (d, s) in dst.iter().zip(src) {
            d.store(*s, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_wait_not_equal_returns_immediately() {
        let region = HeapRegion::with_capacity(16);
        region.store(HeaderSlot::Signal, -2);
        assert_eq!(region.wait(0, None), WaitOutcome::NotEqual);
    }

    #[test]
    fn test_wait_times_out() {
        let region = HeapRegion::with_capacity(16);
        let started = Instant::now();
        let outcome = region.wait(0, Some(Duration::from_millis(20)));
        assert_eq!(outcome, WaitOutcome::TimedOut);
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_store_and_notify_wakes_waiter() {
        let region = Arc::new(HeapRegion::with_capacity(16));
        let worker = {
            let region = Arc::clone(&region);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(10));
                region.write_payload(0, b"hi");
                region.store(HeaderSlot::Signal, 2);
                region.notify();
            })
        };

        let outcome = region.wait(0, Some(Duration::from_secs(5)));
        assert_eq!(outcome, WaitOutcome::Woken);
        assert_eq!(region.load(HeaderSlot::Signal), 2);

        let mut buf = [0u8; 2];
        region.read_payload(0, &mut buf);
        assert_eq!(&buf, b"hi");
        worker.join().unwrap();
    }

    #[test]
    fn test_notify_without_change_keeps_waiting() {
        let region = Arc::new(HeapRegion::with_capacity(16));
        let notifier = {
            let region = Arc::clone(&region);
            thread::spawn(move || {
                // 値を変えずに notify しても待機は終わらない
                region.notify();
            })
        };
        let outcome = region.wait(0, Some(Duration::from_millis(30)));
        assert_eq!(outcome, WaitOutcome::TimedOut);
        notifier.join().unwrap();
    }

    #[test]
    fn test_default_capacity() {
        assert_eq!(HeapRegion::new().payload_capacity(), PAYLOAD_CAPACITY);
    }
}
