//! # Vision WASM実行ホスト
//!
//! ビジョンランタイムのWASMバイナリをwasmtimeでコンパイル・インスタンス化する。
//!
//! ## コンパイル経路
//! - `StreamingCompiler`: 受信中のバイト列をチャンク単位で受け取り、
//!   プリアンブルとサイズ上限を到着時点で検証する（ストリーミング経路）
//! - `WasmHost::compile`: メモリ上に揃ったバイト列から一括でコンパイルする（バッファ経路）
//!
//! ## 安全性確保
//! - サイズ上限: 受信バイト数の上限（巨大レスポンスによるOOM防止）
//! - Engine一致検査: Storeとモジュールが別Engineの場合はパニックではなくエラーを返す

use sha2::{Digest, Sha256};
use wasmtime::{Engine, Instance, Linker, Module, Store};

/// WASMバイナリ先頭8バイト（マジックナンバー `\0asm` + バージョン1）。
pub const WASM_PREAMBLE: [u8; 8] = [0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00];

/// WASMバイナリの最大サイズ（バイト）: 64MB
pub const DEFAULT_MAX_MODULE_BYTES: usize = 64 * 1024 * 1024;

/// WASM実行ホストのエラー型
#[derive(Debug, thiserror::Error)]
pub enum WasmError {
    /// WASMモジュールのコンパイルエラー（不正・非互換なバイナリ）
    #[error("WASMコンパイルエラー: {0}")]
    CompileError(String),
    /// 先頭8バイトがWASMプリアンブルではない
    #[error("WASMプリアンブルが不正です: {0}")]
    InvalidPreamble(String),
    /// サイズ上限超過
    #[error("WASMバイナリがサイズ上限を超えています ({size} > {limit} バイト)")]
    TooLarge {
        /// 受信済みバイト数
        size: usize,
        /// 上限バイト数
        limit: usize,
    },
    /// インスタンス化エラー（インポート不足、Engine不一致、start関数のトラップ）
    #[error("WASMインスタンス化エラー: {0}")]
    LinkError(String),
}

/// コンパイル済みWASMモジュール。
#[derive(Debug)]
pub struct CompiledBinary {
    /// wasmtimeモジュール
    pub module: Module,
    /// バイナリサイズ（バイト）
    pub size: usize,
    /// バイナリのSHA-256（hex）
    pub digest: String,
}

/// WASMコンパイル・インスタンス化ホスト。
///
/// 内部の`Engine`は参照カウントで共有されるため、cloneは安価。
#[derive(Clone)]
pub struct WasmHost {
    engine: Engine,
    max_module_bytes: usize,
}

impl WasmHost {
    /// デフォルト設定のEngineで新しいWasmHostを作成する。
    ///
    /// # 引数
    /// - `max_module_bytes`: 受け付けるWASMバイナリの最大サイズ（バイト）
    pub fn new(max_module_bytes: usize) -> Self {
        Self::with_engine(Engine::default(), max_module_bytes)
    }

    /// 呼び出し側が構築したEngineでWasmHostを作成する。
    pub fn with_engine(engine: Engine, max_module_bytes: usize) -> Self {
        Self {
            engine,
            max_module_bytes,
        }
    }

    /// コンパイルに使用するEngine。Storeはこれで作成すること。
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// 受け付けるWASMバイナリの最大サイズ（バイト）。
    pub fn max_module_bytes(&self) -> usize {
        self.max_module_bytes
    }

    /// メモリ上のバイト列からモジュールをコンパイルする。
    pub fn compile(&self, bytes: &[u8]) -> Result<CompiledBinary, WasmError> {
        if bytes.len() > self.max_module_bytes {
            return Err(WasmError::TooLarge {
                size: bytes.len(),
                limit: self.max_module_bytes,
            });
        }
        check_preamble(bytes)?;

        let module = Module::new(&self.engine, bytes)
            .map_err(|e| WasmError::CompileError(format!("{e:#}")))?;
        let digest = hex::encode(Sha256::digest(bytes));
        tracing::debug!(
            "WASMコンパイル完了: {} バイト (sha256={})",
            bytes.len(),
            digest
        );

        Ok(CompiledBinary {
            module,
            size: bytes.len(),
            digest,
        })
    }

    /// チャンク単位でバイト列を受け取るストリーミングコンパイラを作成する。
    pub fn streaming(&self) -> StreamingCompiler {
        StreamingCompiler {
            host: self.clone(),
            buffer: Vec::new(),
        }
    }

    /// コンパイル済みモジュールをインスタンス化する。
    ///
    /// インポートは`linker`に登録されたものが使われる。
    pub fn instantiate<T: 'static>(
        &self,
        store: &mut Store<T>,
        linker: &Linker<T>,
        module: &Module,
    ) -> Result<Instance, WasmError> {
        if !Engine::same(store.engine(), module.engine()) {
            return Err(WasmError::LinkError(
                "StoreとモジュールのEngineが一致しません".to_string(),
            ));
        }
        linker
            .instantiate(&mut *store, module)
            .map_err(|e| WasmError::LinkError(format!("{e:#}")))
    }
}

/// ストリーミングコンパイラ。
///
/// 先頭8バイトが揃った時点でプリアンブルを検証するため、
/// HTMLのエラーページ等は本文の受信完了を待たずに拒否される。
pub struct StreamingCompiler {
    host: WasmHost,
    buffer: Vec<u8>,
}

impl StreamingCompiler {
    /// 受信したチャンクを追加する。
    pub fn push(&mut self, chunk: &[u8]) -> Result<(), WasmError> {
        let size = self.buffer.len() + chunk.len();
        if size > self.host.max_module_bytes {
            return Err(WasmError::TooLarge {
                size,
                limit: self.host.max_module_bytes,
            });
        }

        let preamble_pending = self.buffer.len() < WASM_PREAMBLE.len();
        self.buffer.extend_from_slice(chunk);
        if preamble_pending && self.buffer.len() >= WASM_PREAMBLE.len() {
            check_preamble(&self.buffer)?;
        }
        Ok(())
    }

    /// これまでに受信したバイト数。
    pub fn received(&self) -> usize {
        self.buffer.len()
    }

    /// 受信完了後、蓄積したバイト列をコンパイルする。
    pub fn finish(self) -> Result<CompiledBinary, WasmError> {
        self.host.compile(&self.buffer)
    }
}

/// 先頭8バイトがWASMコアモジュールのプリアンブルであることを確認する。
fn check_preamble(bytes: &[u8]) -> Result<(), WasmError> {
    if bytes.len() < WASM_PREAMBLE.len() {
        return Err(WasmError::InvalidPreamble(format!(
            "バイナリが短すぎます ({} バイト)",
            bytes.len()
        )));
    }
    if bytes[..4] != WASM_PREAMBLE[..4] {
        return Err(WasmError::InvalidPreamble(format!(
            "マジックナンバーが一致しません: {}",
            hex::encode(&bytes[..4])
        )));
    }
    if bytes[4..8] != WASM_PREAMBLE[4..8] {
        return Err(WasmError::InvalidPreamble(format!(
            "未対応のバージョンです: {}",
            hex::encode(&bytes[4..8])
        )));
    }
    Ok(())
}
