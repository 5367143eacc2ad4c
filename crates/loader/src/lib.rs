//! # Vision WASMローダー
//!
//! ビジョンランタイムがWASMバイナリを探索・インスタンス化する際のフックを提供する。
//! ホスティング環境は静的アセットを固定のベースパス配下で配信し、
//! content-typeの扱いが厳格であることを前提とする。
//!
//! ## コンポーネント
//! - `WasmLocationResolver`: `.wasm`ファイルをベースパスへ振り向ける
//! - `WasmInstantiator`: ストリーミング → バッファの2段階でコンパイル・インスタンス化する
//! - `WasmPreloader`: 既知ファイルを並行して事前コンパイルする（失敗は無視）
//! - `WasmValidator`: HEADリクエストでアセットの到達性を確認する
//! - `WasmAdapter`: 上記をまとめたランタイム向けフック
//!
//! ログは`tracing`で出力する。サブスクライバーの設定は呼び出し側の責務。

pub mod adapter;
pub mod config;
pub mod error;
pub mod instantiator;
pub mod preload;
pub mod resolver;
pub mod transport;
pub mod validate;

#[cfg(test)]
mod test_helpers;

pub use adapter::WasmAdapter;
pub use config::{LoaderConfig, WasmVariant};
pub use error::LoadError;
pub use instantiator::{CompiledModule, LoadPath, LoadedModule, WasmInstantiator};
pub use preload::WasmPreloader;
pub use resolver::WasmLocationResolver;
pub use transport::{HttpTransport, Transport};
pub use validate::WasmValidator;
pub use vision_wasm_host::{WasmError, WasmHost};
