//! # WASMロケーション解決
//!
//! ランタイムが要求するファイル名をURLに変換する。
//! `.wasm`ファイルのみ設定済みのベースパスへ振り向け、
//! ローダースクリプト等はランタイム既定のプレフィックスのまま返す。

use crate::config::LoaderConfig;

/// WASMファイルの拡張子
const WASM_SUFFIX: &str = ".wasm";

/// ファイル名からURLを解決する。I/Oは行わず、失敗しない。
#[derive(Debug, Clone)]
pub struct WasmLocationResolver {
    base_path: String,
}

impl WasmLocationResolver {
    /// 新しいWasmLocationResolverを作成する。
    ///
    /// # 引数
    /// - `config`: ベースパスを取り出すローダー設定
    pub fn new(config: &LoaderConfig) -> Self {
        Self {
            base_path: config.base_path().to_string(),
        }
    }

    /// `filename`のURLを返す。
    ///
    /// - `.wasm`で終わる場合: `{base_path}/{filename}`（`default_prefix`は無視）
    /// - それ以外: `{default_prefix}{filename}`
    pub fn resolve(&self, filename: &str, default_prefix: &str) -> String {
        let location = if filename.ends_with(WASM_SUFFIX) {
            self.asset_url(filename)
        } else {
            format!("{default_prefix}{filename}")
        };
        tracing::debug!("ファイル位置を解決: {} -> {}", filename, location);
        location
    }

    /// ベースパス配下のアセットURL `{base_path}/{filename}`。
    pub fn asset_url(&self, filename: &str) -> String {
        format!("{}/{filename}", self.base_path)
    }

    /// 末尾の`/`を除去済みのベースパス。
    pub fn base_path(&self) -> &str {
        &self.base_path
    }
}
