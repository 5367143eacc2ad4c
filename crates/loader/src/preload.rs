//! # WASMプリロード
//!
//! 既知のWASMファイルを事前に取得・コンパイルし、ネットワーク・キャッシュ経路を温める。
//! 個々の失敗はログに記録して`None`とし、呼び出し元には伝播しない。

use tokio::task::JoinSet;

use crate::instantiator::{CompiledModule, WasmInstantiator};

/// WASMプリローダー。
#[derive(Clone)]
pub struct WasmPreloader {
    instantiator: WasmInstantiator,
}

impl WasmPreloader {
    /// 新しいWasmPreloaderを作成する。取得・コンパイルは`instantiator`に委ねる。
    pub fn new(instantiator: WasmInstantiator) -> Self {
        Self { instantiator }
    }

    /// 全ファイルを並行してコンパイルする。
    ///
    /// 戻り値は入力と同じ順序で、失敗したファイルは`None`。
    /// 同時実行数の上限は設けない（呼び出し側で少数に限定される前提）。
    pub async fn preload<S: AsRef<str>>(&self, filenames: &[S]) -> Vec<Option<CompiledModule>> {
        tracing::info!("WASMプリロードを開始: {} ファイル", filenames.len());

        let mut tasks = JoinSet::new();
        for (index, filename) in filenames.iter().enumerate() {
            let instantiator = self.instantiator.clone();
            let filename = filename.as_ref().to_string();
            tasks.spawn(async move {
                let result = instantiator.compile(&filename).await;
                (index, filename, result)
            });
        }

        let mut results: Vec<Option<CompiledModule>> = vec![None; filenames.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, filename, Ok(compiled))) => {
                    tracing::info!("プリロード完了: {}", filename);
                    results[index] = Some(compiled);
                }
                Ok((_, filename, Err(e))) => {
                    tracing::error!("プリロードに失敗（無視して続行）: {}: {}", filename, e);
                }
                Err(e) => {
                    tracing::error!("プリロードタスクが異常終了（無視して続行）: {}", e);
                }
            }
        }

        let loaded = results.iter().filter(|r| r.is_some()).count();
        tracing::info!("WASMプリロード終了: {}/{} 成功", loaded, filenames.len());
        results
    }
}
