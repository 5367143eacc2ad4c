//! # HTTPトランスポート（reqwest）
//!
//! reqwestで直接HTTPリクエストを送信する。
//! ルート相対のURL（例: "/wasm/x.wasm"）は設定済みオリジンに連結して送信する。

use std::time::Duration;

use crate::config::LoaderConfig;
use crate::error::LoadError;

use super::{BodyStream, FetchResponse, Transport};

/// reqwestによるトランスポート。
pub struct HttpTransport {
    client: reqwest::Client,
    /// ルート相対URLを解決するオリジン（例: "http://localhost:3000"）
    origin: Option<String>,
}

impl HttpTransport {
    /// 新しいHttpTransportを作成する。
    ///
    /// # 引数
    /// - `timeout`: リクエスト全体（本文受信を含む）のタイムアウト
    /// - `origin`: ルート相対URLを解決するオリジン
    pub fn new(timeout: Duration, origin: Option<String>) -> Result<Self, LoadError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LoadError::Config(format!("HTTPクライアントの構築に失敗: {e}")))?;
        Ok(Self {
            client,
            origin: origin.map(|o| o.trim_end_matches('/').to_string()),
        })
    }

    pub fn from_config(config: &LoaderConfig) -> Result<Self, LoadError> {
        Self::new(
            config.fetch_timeout(),
            config.asset_origin().map(str::to_string),
        )
    }

    /// 送信先の絶対URLを返す。
    pub fn absolute_url(&self, url: &str) -> String {
        match &self.origin {
            Some(origin) if url.starts_with('/') => format!("{origin}{url}"),
            _ => url.to_string(),
        }
    }
}

fn network_error(url: &str, e: reqwest::Error) -> LoadError {
    LoadError::Network {
        url: url.to_string(),
        reason: e.to_string(),
    }
}

/// reqwestレスポンスの本文。
struct ReqwestBody {
    url: String,
    response: reqwest::Response,
}

#[async_trait::async_trait]
impl BodyStream for ReqwestBody {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, LoadError> {
        let chunk = self
            .response
            .chunk()
            .await
            .map_err(|e| network_error(&self.url, e))?;
        Ok(chunk.map(|b| b.to_vec()))
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &str, accept: Option<&str>) -> Result<FetchResponse, LoadError> {
        let target = self.absolute_url(url);
        let mut request = self.client.get(&target);
        if let Some(accept) = accept {
            request = request.header(reqwest::header::ACCEPT, accept);
        }
        let response = request
            .send()
            .await
            .map_err(|e| network_error(&target, e))?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        Ok(FetchResponse {
            url: target.clone(),
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            content_type,
            body: Box::new(ReqwestBody {
                url: target,
                response,
            }),
        })
    }

    async fn head(&self, url: &str) -> Result<u16, LoadError> {
        let target = self.absolute_url(url);
        let response = self
            .client
            .head(&target)
            .send()
            .await
            .map_err(|e| network_error(&target, e))?;
        Ok(response.status().as_u16())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absolute_url() {
        let t = HttpTransport::new(
            Duration::from_secs(1),
            Some("http://localhost:3000/".to_string()),
        )
        .unwrap();
        assert_eq!(
            t.absolute_url("/wasm/a.wasm"),
            "http://localhost:3000/wasm/a.wasm"
        );
        assert_eq!(
            t.absolute_url("https://cdn.example.com/a.wasm"),
            "https://cdn.example.com/a.wasm"
        );

        let no_origin = HttpTransport::new(Duration::from_secs(1), None).unwrap();
        assert_eq!(no_origin.absolute_url("/wasm/a.wasm"), "/wasm/a.wasm");
    }
}
