//! HEADER_READY ペイロード（レスポンスヘッダー JSON）
//!
//! ```json
//! {"status": 200, "headers": {"content-type": "text/plain"}, "connectionID": "c1"}
//! ```
//!
//! `headers` は `[[name, value], ...]` のペア配列でも受け付ける。
//! ペア配列で同名ヘッダーが複数ある場合は `", "` で連結する。

use serde::{Deserialize, Deserializer, Serialize};

use crate::command::ConnectionId;
use crate::error::FetchError;
use crate::request::Headers;

/// デコード済みのレスポンスヘッダー
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseHead {
    pub status: u16,
    #[serde(default, deserialize_with = "deserialize_headers")]
    pub headers: Headers,
    #[serde(rename = "connectionID")]
    pub connection_id: ConnectionId,
}

impl ResponseHead {
    /// ペイロード先頭から読み出した UTF-8 JSON をデコードする
    ///
    /// # エラー
    /// - `FetchError::InvalidHead`: JSON 構文エラー、必須フィールド欠落
    pub fn from_json(bytes: &[u8]) -> Result<Self, FetchError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// ワーカー側が書き込む JSON を生成する
    pub fn to_json(&self) -> Result<Vec<u8>, FetchError> {
        Ok(serde_json::to_vec(self)?)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum HeaderShape {
    Map(Headers),
    Pairs(Vec<(String, String)>),
}

fn deserialize_headers<'de, D>(deserializer: D) -> Result<Headers, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match HeaderShape::deserialize(deserializer)? {
        HeaderShape::Map(map) => map,
        HeaderShape::Pairs(pairs) => {
            let mut headers = Headers::new();
            for (name, value) in pairs {
                headers
                    .entry(name)
                    .and_modify(|existing| {
                        existing.push_str(", ");
                        existing.push_str(&value);
                    })
                    .or_insert(value);
            }
            headers
        }
    })
}
