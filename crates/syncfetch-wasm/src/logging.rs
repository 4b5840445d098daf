//! ブラウザコンソールへの tracing 出力
//!
//! fmt レイヤーが 1 イベント分を書き終えたら（writer のドロップ時）、
//! レベルに応じた `console.*` に 1 行で渡す。

use std::io;

use tracing::{Level, Metadata};
use tracing_subscriber::fmt::MakeWriter;

/// 1 イベント分をバッファするライター
pub struct ConsoleWriter {
    level: Level,
    buf: Vec<u8>,
}

impl ConsoleWriter {
    fn new(level: Level) -> Self {
        ConsoleWriter {
            level,
            buf: Vec::new(),
        }
    }

    /// バッファを 1 行として取り出す（末尾の改行は除く）
    fn take_line(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let line = String::from_utf8_lossy(&self.buf).trim_end().to_string();
        self.buf.clear();
        Some(line)
    }

    fn emit(&mut self) {
        if let Some(line) = self.take_line() {
            emit_line(self.level, &line);
        }
    }
}

#[cfg(target_arch = "wasm32")]
fn emit_line(level: Level, line: &str) {
    use wasm_bindgen::JsValue;
    use web_sys::console;

    let value = JsValue::from_str(line);
    match level {
        Level::ERROR => console::error_1(&value),
        Level::WARN => console::warn_1(&value),
        Level::INFO => console::info_1(&value),
        _ => console::debug_1(&value),
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn emit_line(_level: Level, line: &str) {
    use std::io::Write;
    let _ = writeln!(io::stderr(), "{line}");
}

impl io::Write for ConsoleWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.emit();
        Ok(())
    }
}

impl Drop for ConsoleWriter {
    fn drop(&mut self) {
        self.emit();
    }
}

/// fmt レイヤー用の `MakeWriter`
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleMakeWriter;

impl<'a> MakeWriter<'a> for ConsoleMakeWriter {
    type Writer = ConsoleWriter;

    fn make_writer(&'a self) -> Self::Writer {
        ConsoleWriter::new(Level::INFO)
    }

    fn make_writer_for(&'a self, meta: &Metadata<'_>) -> Self::Writer {
        ConsoleWriter::new(*meta.level())
    }
}

/// console 出力の subscriber をグローバルに設置する
///
/// # 引数
/// - `max_level`: "error" / "warn" / "info" / "debug" / "trace"（`None` は "warn"）
///
/// # 戻り値
/// 新たに設置した場合 true。既に設置済みなら false。
pub fn install(max_level: Option<&str>) -> bool {
    let level = max_level
        .and_then(|s| s.parse::<tracing::level_filters::LevelFilter>().ok())
        .unwrap_or(tracing::level_filters::LevelFilter::WARN);
    tracing_subscriber::fmt()
        .with_writer(ConsoleMakeWriter)
        .with_max_level(level)
        .with_target(false)
        .without_time()
        .try_init()
        .is_ok()
}
