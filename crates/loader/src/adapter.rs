//! # ランタイム向けフックアダプター
//!
//! ビジョンランタイムのモジュール読み込み設定が期待する
//! `{ locateFile, instantiateWasm }`に相当するフック一式。
//! 設定とトランスポートから明示的に構築し、グローバル状態は持たない。

use std::sync::Arc;

use vision_wasm_host::WasmHost;
use wasmtime::{Instance, Linker, Module, Store};

use crate::config::LoaderConfig;
use crate::error::LoadError;
use crate::instantiator::{CompiledModule, LoadedModule, WasmInstantiator};
use crate::preload::WasmPreloader;
use crate::resolver::WasmLocationResolver;
use crate::transport::{HttpTransport, Transport};
use crate::validate::WasmValidator;

/// WASMローダーフック。
pub struct WasmAdapter {
    config: LoaderConfig,
    resolver: WasmLocationResolver,
    instantiator: WasmInstantiator,
    preloader: WasmPreloader,
    validator: WasmValidator,
}

impl WasmAdapter {
    /// 任意のトランスポートでアダプターを構築する。
    pub fn new(config: LoaderConfig, transport: Arc<dyn Transport>) -> Self {
        let instantiator = WasmInstantiator::new(&config, transport.clone());
        Self {
            resolver: WasmLocationResolver::new(&config),
            preloader: WasmPreloader::new(instantiator.clone()),
            validator: WasmValidator::new(&config, transport),
            instantiator,
            config,
        }
    }

    /// reqwestトランスポートでアダプターを構築する。
    pub fn with_http(config: LoaderConfig) -> Result<Self, LoadError> {
        let transport = HttpTransport::from_config(&config)?;
        Ok(Self::new(config, Arc::new(transport)))
    }

    /// 呼び出し元のEngineでコンパイルする場合に差し替える。
    pub fn with_host(mut self, host: WasmHost) -> Self {
        self.instantiator = self.instantiator.with_host(host);
        self.preloader = WasmPreloader::new(self.instantiator.clone());
        self
    }

    /// 構築時のローダー設定。
    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Storeの作成に使うWasmHost。
    pub fn host(&self) -> &WasmHost {
        self.instantiator.host()
    }

    /// `locateFile`フック。
    pub fn locate_file(&self, filename: &str, default_prefix: &str) -> String {
        self.resolver.resolve(filename, default_prefix)
    }

    /// WASMをインスタンス化し、結果を返す。
    pub async fn instantiate<T: Send + 'static>(
        &self,
        store: &mut Store<T>,
        linker: &Linker<T>,
    ) -> Result<LoadedModule, LoadError> {
        self.instantiator.instantiate(store, linker).await
    }

    /// `instantiateWasm`フック（コールバック形式）。
    ///
    /// 成功時は`on_success(&instance, &module)`を返却前に1回だけ同期的に呼び出し、
    /// 同じインスタンスを戻り値としても返す。失敗時はコールバックを呼ばない。
    pub async fn instantiate_wasm<T, F>(
        &self,
        store: &mut Store<T>,
        linker: &Linker<T>,
        on_success: F,
    ) -> Result<Instance, LoadError>
    where
        T: Send + 'static,
        F: FnOnce(&Instance, &Module),
    {
        let loaded = self.instantiator.instantiate(store, linker).await?;
        on_success(&loaded.instance, &loaded.module);
        Ok(loaded.instance)
    }

    /// ベースパス配下の`filename`をインスタンス化せずにコンパイルする。
    pub async fn compile(&self, filename: &str) -> Result<CompiledModule, LoadError> {
        self.instantiator.compile(filename).await
    }

    /// ベースパス配下のWASMファイルを並行してプリロードする。失敗しない。
    pub async fn preload<S: AsRef<str>>(&self, filenames: &[S]) -> Vec<Option<CompiledModule>> {
        self.preloader.preload(filenames).await
    }

    /// ベースパス配下のアセットの到達性を順に確認する。
    pub async fn validate<S: AsRef<str>>(&self, filenames: &[S]) -> bool {
        self.validator.validate(filenames).await
    }
}
