//! # WASMインスタンス化
//!
//! WASMバイナリを取得し、コンパイル・インスタンス化する。
//!
//! ## 取得戦略
//! 1. ストリーミング経路: `Accept: application/wasm`付きでGETし、
//!    受信中の本文をチャンク単位でコンパイラに渡す
//! 2. バッファ経路: 1が理由を問わず失敗した場合、同じURLを再取得し、
//!    本文を全てメモリに読み込んでからコンパイルする
//!
//! 再試行はこの1回のみ。バックオフは行わない。


use std::fmt;
use std::sync::Arc;

use vision_wasm_host::{CompiledBinary, WasmError, WasmHost};
use wasmtime::{Instance, Linker, Module, Store};

use crate::config::{LoaderConfig, WasmVariant, WASM_MIME};
use crate::error::LoadError;
use crate::resolver::WasmLocationResolver;
use crate::transport::{FetchResponse, Transport};

/// モジュールを生成した取得経路。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPath {
    /// ストリーミングコンパイル
    Streaming,
    /// 全体をバッファしてからのコンパイル
    Buffered,
}

impl fmt::Display for LoadPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadPath::Streaming => f.write_str("streaming"),
            LoadPath::Buffered => f.write_str("buffered"),
        }
    }
}

/// インスタンス化前のコンパイル済みモジュール。
#[derive(Clone)]
pub struct CompiledModule {
    /// コンパイル済みモジュール
    pub module: Module,
    /// 取得元URL
    pub source: String,
    /// 取得経路
    pub path: LoadPath,
    /// バイナリサイズ（バイト）
    pub size: usize,
    /// バイナリのSHA-256（hex）
    pub digest: String,
}

impl CompiledModule {
    fn new(binary: CompiledBinary, source: &str, path: LoadPath) -> Self {
        Self {
            module: binary.module,
            source: source.to_string(),
            path,
            size: binary.size,
            digest: binary.digest,
        }
    }
}

/// インスタンス化の結果。呼び出し元が所有する。
#[derive(Debug)]
pub struct LoadedModule {
    /// インスタンス化済みのモジュール（呼び出し元のStoreに属する）
    pub instance: Instance,
    /// インスタンス化元のモジュール
    pub module: Module,
    /// 取得元URL
    pub source: String,
    /// 取得経路
    pub path: LoadPath,
    /// バイナリサイズ（バイト）
    pub size: usize,
    /// バイナリのSHA-256（hex）
    pub digest: String,
}

/// WASMバイナリを取得してインスタンス化する。
#[derive(Clone)]
pub struct WasmInstantiator {
    resolver: WasmLocationResolver,
    transport: Arc<dyn Transport>,
    host: WasmHost,
    variant: WasmVariant,
    strict_mime: bool,
}

impl WasmInstantiator {
    /// 新しいWasmInstantiatorを作成する。
    ///
    /// # 引数
    /// - `config`: ベースパス・ビルド種別・MIME検査・サイズ上限を取り出す設定
    /// - `transport`: 取得に使うトランスポート
    pub fn new(config: &LoaderConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            resolver: WasmLocationResolver::new(config),
            transport,
            host: WasmHost::new(config.max_module_bytes()),
            variant: config.variant(),
            strict_mime: config.strict_mime(),
        }
    }

    /// 呼び出し元のEngineを使う場合に差し替える。
    pub fn with_host(mut self, host: WasmHost) -> Self {
        self.host = host;
        self
    }

    /// Storeの作成に使うWasmHost。
    pub fn host(&self) -> &WasmHost {
        &self.host
    }

    /// インスタンス化対象のWASMバイナリURL。
    pub fn wasm_url(&self) -> String {
        self.resolver.asset_url(self.variant.wasm_file())
    }

    /// 設定済みビルド種別のWASMを取得し、`linker`のインポートでインスタンス化する。
    pub async fn instantiate<T: Send + 'static>(
        &self,
        store: &mut Store<T>,
        linker: &Linker<T>,
    ) -> Result<LoadedModule, LoadError> {
        let url = self.wasm_url();
        tracing::info!(
            "WASMインスタンス化を開始 ({}): {}",
            self.variant.as_str(),
            url
        );

        let host = &self.host;
        let loaded = self
            .load_with_fallback(&url, |compiled| {
                let instance = host.instantiate(&mut *store, linker, &compiled.module)?;
                Ok(LoadedModule {
                    instance,
                    module: compiled.module,
                    source: compiled.source,
                    path: compiled.path,
                    size: compiled.size,
                    digest: compiled.digest,
                })
            })
            .await?;

        tracing::info!(
            "WASMインスタンス化完了 ({}経路, {} バイト, sha256={})",
            loaded.path,
            loaded.size,
            loaded.digest
        );
        Ok(loaded)
    }

    /// ベースパス配下の`filename`をインスタンス化せずにコンパイルする。
    /// 取得戦略は`instantiate`と同じ。
    pub async fn compile(&self, filename: &str) -> Result<CompiledModule, LoadError> {
        let url = self.resolver.asset_url(filename);
        tracing::info!("WASMコンパイルを開始: {}", url);
        let compiled = self.load_with_fallback(&url, Ok).await?;
        tracing::info!(
            "WASMコンパイル完了 ({}経路, {} バイト): {}",
            compiled.path,
            compiled.size,
            url
        );
        Ok(compiled)
    }

    /// ストリーミング経路を試し、失敗した場合はバッファ経路で1回だけ再試行する。
    ///
    /// `finish`はコンパイル済みモジュールの後処理（インスタンス化等）で、
    /// その失敗もその経路の失敗として扱う。
    async fn load_with_fallback<R>(
        &self,
        url: &str,
        mut finish: impl FnMut(CompiledModule) -> Result<R, LoadError>,
    ) -> Result<R, LoadError> {
        let streaming_err = match self.compile_streaming(url).await {
            Ok(compiled) => match finish(compiled) {
                Ok(result) => {
                    tracing::info!("ストリーミング経路で成功: {}", url);
                    return Ok(result);
                }
                Err(e) => e,
            },
            Err(e) => e,
        };
        tracing::warn!(
            "ストリーミング経路に失敗、バッファ経路で再試行します ({}): {}",
            url,
            streaming_err
        );

        let buffered = match self.compile_buffered(url).await {
            Ok(compiled) => finish(compiled),
            Err(e) => Err(e),
        };
        match buffered {
            Ok(result) => {
                tracing::info!("バッファ経路で成功: {}", url);
                Ok(result)
            }
            Err(e) => {
                tracing::error!("バッファ経路も失敗しました ({}): {}", url, e);
                Err(LoadError::FallbackExhausted {
                    streaming: streaming_err.to_string(),
                    source: Box::new(e),
                })
            }
        }
    }

    /// ストリーミング経路: 本文をチャンク単位でコンパイラに渡す。
    async fn compile_streaming(&self, url: &str) -> Result<CompiledModule, LoadError> {
        let mut response = self
            .transport
            .get(url, Some(WASM_MIME))
            .await?
            .error_for_status()?;
        self.check_content_type(&response)?;

        let mut compiler = self.host.streaming();
        while let Some(chunk) = response.body.next_chunk().await? {
            compiler.push(&chunk)?;
        }
        tracing::debug!("ストリーミング受信完了: {} バイト", compiler.received());
        let binary = run_blocking(move || compiler.finish()).await?;
        Ok(CompiledModule::new(binary, url, LoadPath::Streaming))
    }

    /// バッファ経路: Accept指定なしで再取得し、本文を全て読み込んでからコンパイルする。
    async fn compile_buffered(&self, url: &str) -> Result<CompiledModule, LoadError> {
        let mut response = self.transport.get(url, None).await?.error_for_status()?;

        let limit = self.host.max_module_bytes();
        let mut bytes = Vec::new();
        while let Some(chunk) = response.body.next_chunk().await? {
            if bytes.len() + chunk.len() > limit {
                return Err(WasmError::TooLarge {
                    size: bytes.len() + chunk.len(),
                    limit,
                }
                .into());
            }
            bytes.extend_from_slice(&chunk);
        }
        let host = self.host.clone();
        let binary = run_blocking(move || host.compile(&bytes)).await?;
        Ok(CompiledModule::new(binary, url, LoadPath::Buffered))
    }

    /// content-typeを確認する。application/wasmでない場合は警告を出し、
    /// strict_mimeが有効なら拒否する。
    fn check_content_type(&self, response: &FetchResponse) -> Result<(), LoadError> {
        let is_wasm = response
            .content_type
            .as_deref()
            .is_some_and(|ct| ct.to_ascii_lowercase().contains(WASM_MIME));
        if is_wasm {
            return Ok(());
        }

        let content_type = response
            .content_type
            .clone()
            .unwrap_or_else(|| "(なし)".to_string());
        tracing::warn!(
            "content-typeが{}ではありません ({}): {}",
            WASM_MIME,
            response.url,
            content_type
        );
        if self.strict_mime {
            return Err(LoadError::MimeRejected {
                url: response.url.clone(),
                content_type,
            });
        }
        Ok(())
    }
}

/// CPU負荷の高いコンパイルをブロッキングスレッドで実行する。
///
/// 取得（非同期I/O）はランタイム上で行い、`Module::new`のみ
/// `spawn_blocking`に渡してワーカースレッドを占有しない。
async fn run_blocking<R: Send + 'static>(
    compile: impl FnOnce() -> Result<R, WasmError> + Send + 'static,
) -> Result<R, LoadError> {
    match tokio::task::spawn_blocking(compile).await {
        Ok(result) => Ok(result?),
        Err(e) => {
            tracing::error!("spawn_blockingエラー: {}", e);
            Err(WasmError::CompileError(format!("コンパイルタスクが異常終了しました: {e}")).into())
        }
    }
}
