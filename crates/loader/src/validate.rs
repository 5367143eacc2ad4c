//! # WASMアセット到達性チェック
//!
//! HEADリクエストでアセットの存在を順に確認する。
//! 最初の失敗で打ち切り、残りのファイルにはリクエストを送らない。

use std::sync::Arc;

use crate::config::LoaderConfig;
use crate::resolver::WasmLocationResolver;
use crate::transport::{is_success_status, Transport};

/// WASMアセットのバリデーター。
#[derive(Clone)]
pub struct WasmValidator {
    resolver: WasmLocationResolver,
    transport: Arc<dyn Transport>,
}

impl WasmValidator {
    /// 新しいWasmValidatorを作成する。
    pub fn new(config: &LoaderConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            resolver: WasmLocationResolver::new(config),
            transport,
        }
    }

    /// 全ファイルがベースパス配下で取得可能な場合のみtrueを返す。
    /// エラーは返さず、全ての失敗をfalseに変換する。
    pub async fn validate<S: AsRef<str>>(&self, filenames: &[S]) -> bool {
        for filename in filenames {
            let url = self.resolver.asset_url(filename.as_ref());
            match self.transport.head(&url).await {
                Ok(status) if is_success_status(status) => {
                    tracing::debug!("アセット確認OK: {} ({})", url, status);
                }
                Ok(status) => {
                    tracing::warn!("アセット確認に失敗: {} (ステータス {})", url, status);
                    return false;
                }
                Err(e) => {
                    tracing::warn!("アセット確認に失敗: {}", e);
                    return false;
                }
            }
        }
        tracing::info!("全アセットを確認しました: {} ファイル", filenames.len());
        true
    }
}
