//! # HTTPトランスポート
//!
//! WASMアセット取得に使う通信手段を抽象化する。
//!
//! ## トランスポート実装
//! - `HttpTransport`: reqwestによる直接HTTP通信
//!
//! テストでは任意のURLを失敗させるラッパー等に差し替えられる。

pub mod http;

pub use http::HttpTransport;

use crate::error::LoadError;

/// レスポンス本文のチャンク読み取り。
#[async_trait::async_trait]
pub trait BodyStream: Send {
    /// 次のチャンクを返す。本文の終端では`None`。
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, LoadError>;
}

/// GETリクエストのレスポンス。本文は未読のまま保持する。
pub struct FetchResponse {
    /// リクエストURL
    pub url: String,
    /// HTTPステータスコード
    pub status: u16,
    /// ステータスの説明（例: "Not Found"）
    pub status_text: String,
    /// content-typeヘッダー
    pub content_type: Option<String>,
    /// レスポンス本文
    pub body: Box<dyn BodyStream>,
}

impl FetchResponse {
    /// ステータスが2xxかどうか。
    pub fn is_success(&self) -> bool {
        is_success_status(self.status)
    }

    /// 非2xxの場合は`LoadError::Transport`を返す。
    pub fn error_for_status(self) -> Result<Self, LoadError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(LoadError::Transport {
                url: self.url,
                status: self.status,
                status_text: self.status_text,
            })
        }
    }
}

pub(crate) fn is_success_status(status: u16) -> bool {
    (200..300).contains(&status)
}

/// WASMアセット取得用トランスポートのトレイト。
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// GETリクエストを送信する。`accept`が指定された場合はAcceptヘッダーに設定する。
    async fn get(&self, url: &str, accept: Option<&str>) -> Result<FetchResponse, LoadError>;

    /// HEADリクエストを送信し、ステータスコードを返す。本文は転送しない。
    async fn head(&self, url: &str) -> Result<u16, LoadError>;
}
