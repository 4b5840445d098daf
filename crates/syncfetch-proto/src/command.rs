//! コンシューマ → ワーカーのコマンド
//!
//! ## メッセージ形状（serde の外部タグ表現）
//!
//! ```text
//! {"start": {"channel": 3, "url": "...", "method": "GET", "headers": {...},
//!            "body": [..] | 省略, "credentials": "include" | "omit"}}
//! {"getMore": <connection id>}
//! {"close": <connection id>}
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::FetchError;
use crate::request::{Headers, Request};

/// 制御チャンネルの識別子（チャンネルを確保したワーカーが採番）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(pub u64);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ch#{}", self.0)
    }
}

/// ワーカーが割り当てる接続 ID
///
/// ブラウザ側ワーカーは数値、テストやネイティブワーカーは文字列を使うことがあるため
/// どちらも受け付ける。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConnectionId {
    Number(u64),
    Text(String),
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionId::Number(n) => write!(f, "{n}"),
            ConnectionId::Text(s) => f.write_str(s),
        }
    }
}

impl From<u64> for ConnectionId {
    fn from(n: u64) -> Self {
        ConnectionId::Number(n)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        ConnectionId::Text(s.to_string())
    }
}

/// fetch() の credentials モード
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Credentials {
    Include,
    Omit,
}

impl Credentials {
    pub fn from_flag(include: bool) -> Self {
        if include {
            Credentials::Include
        } else {
            Credentials::Omit
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Credentials::Include => "include",
            Credentials::Omit => "omit",
        }
    }
}

/// フェッチ開始コマンド
///
/// 境界で検証済みの固定スキーマ。URL は常に絶対 URL。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartFetch {
    /// 結果を書き込む制御チャンネル
    pub channel: ChannelId,
    pub url: String,
    pub method: String,
    pub headers: Headers,
    /// `None` = ボディなし（長さ 0 のボディとは区別する）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Vec<u8>>,
    pub credentials: Credentials,
}

impl StartFetch {
    /// リクエストから開始コマンドを組み立てる
    ///
    /// # 引数
    /// - `channel`: 確保済みの制御チャンネル
    /// - `request`: 元のリクエスト
    /// - `base`: 相対 URL を解決する基準 URL
    /// - `default_credentials`: リクエストが指定しない場合の credentials
    ///
    /// # エラー
    /// - `FetchError::InvalidRequest`: メソッドが不正、URL が解決できない
    pub fn from_request(
        channel: ChannelId,
        request: &Request,
        base: Option<&Url>,
        default_credentials: bool,
    ) -> Result<Self, FetchError> {
        let method = request.validated_method()?;
        let url = request.absolute_url(base)?;

        Ok(StartFetch {
            channel,
            url: url.into(),
            method: method.as_str().to_string(),
            headers: request.headers.clone(),
            body: request.body.clone(),
            credentials: Credentials::from_flag(request.credentials.unwrap_or(default_credentials)),
        })
    }
}

/// ワーカーへ送るコマンド
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WorkerCommand {
    /// フェッチを開始し、ヘッダーが揃ったら HEADER_READY を書く
    Start(StartFetch),
    /// 次のボディチャンクを要求する
    GetMore(ConnectionId),
    /// 接続を破棄する（ベストエフォート、応答なし）
    Close(ConnectionId),
}

impl WorkerCommand {
    /// コマンドの対象接続（Start は接続 ID 未割り当て）
    pub fn connection_id(&self) -> Option<&ConnectionId> {
        match self {
            WorkerCommand::Start(_) => None,
            WorkerCommand::GetMore(id) | WorkerCommand::Close(id) => Some(id),
        }
    }

    /// slot0 への応答を伴うコマンドか
    pub fn expects_signal(&self) -> bool {
        !matches!(self, WorkerCommand::Close(_))
    }
}
