//! # Vision WASM CLI
//!
//! 稼働中のアセットホストに対してローダーの各操作を実行する。
//!
//! ## サブコマンド
//! - `locate` — ファイル名の解決結果を表示
//! - `validate` — HEADリクエストでアセットの到達性を確認（失敗時は終了コード1）
//! - `preload` — WASMファイルを並行してコンパイルし、結果をJSONで表示
//! - `compile` — 設定済みビルド種別をストリーミング → バッファ戦略でコンパイル
//!
//! 設定は環境変数（`WASM_BASE_PATH`等）から読み込み、フラグで上書きする。

use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::Serialize;
use vision_wasm_loader::{CompiledModule, LoaderConfig, WasmAdapter, WasmVariant};

#[derive(Parser)]
#[command(name = "vision-wasm", about = "Vision WASMアセットローダー")]
struct Cli {
    /// WASMアセットのベースパス（環境変数 WASM_BASE_PATH を上書き）
    #[arg(long)]
    base_path: Option<String>,
    /// ルート相対パスを解決するオリジン
    #[arg(long)]
    origin: Option<String>,
    /// WASMビルド種別（simd / nosimd）
    #[arg(long)]
    variant: Option<WasmVariant>,
    /// content-typeが不正でもストリーミング経路を継続する
    #[arg(long)]
    lenient_mime: bool,
    /// HTTP取得のタイムアウト（秒）
    #[arg(long)]
    timeout_secs: Option<u64>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// ファイル名の解決結果を表示する
    Locate {
        filename: String,
        /// ランタイム既定のプレフィックス
        #[arg(long, default_value = "")]
        prefix: String,
    },
    /// アセットの到達性を確認する（省略時は全ビルド種別の.wasm）
    Validate { files: Vec<String> },
    /// WASMファイルを並行してコンパイルする（省略時は全ビルド種別の.wasm）
    Preload { files: Vec<String> },
    /// 設定済みビルド種別のWASMをコンパイルする
    Compile,
}

#[derive(Serialize)]
struct ModuleReport {
    file: String,
    source: String,
    path: String,
    size: usize,
    sha256: String,
}

impl ModuleReport {
    fn new(file: &str, compiled: &CompiledModule) -> Self {
        Self {
            file: file.to_string(),
            source: compiled.source.clone(),
            path: compiled.path.to_string(),
            size: compiled.size,
            sha256: compiled.digest.clone(),
        }
    }
}

#[derive(Serialize)]
struct PreloadEntry {
    file: String,
    loaded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    module: Option<ModuleReport>,
}

impl Cli {
    /// 環境変数の設定にフラグを上書きする。
    fn config(&self) -> LoaderConfig {
        let mut config = LoaderConfig::from_env();
        if let Some(base_path) = &self.base_path {
            config = config.with_base_path(base_path.clone());
        }
        if let Some(origin) = &self.origin {
            config = config.with_asset_origin(Some(origin.clone()));
        }
        if let Some(variant) = self.variant {
            config = config.with_variant(variant);
        }
        if self.lenient_mime {
            config = config.with_strict_mime(false);
        }
        if let Some(secs) = self.timeout_secs {
            config = config.with_fetch_timeout(Duration::from_secs(secs));
        }
        config
    }
}

fn default_wasm_files(files: &[String]) -> Vec<String> {
    if files.is_empty() {
        WasmVariant::ALL
            .iter()
            .map(|v| v.wasm_file().to_string())
            .collect()
    } else {
        files.to_vec()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 標準出力はJSON結果用に空けておく
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    let config = cli.config();
    tracing::debug!("ローダー設定: {:?}", config);
    let adapter = WasmAdapter::with_http(config)?;

    match cli.command {
        Command::Locate { filename, prefix } => {
            println!("{}", adapter.locate_file(&filename, &prefix));
        }
        Command::Validate { files } => {
            let files = default_wasm_files(&files);
            if !adapter.validate(&files).await {
                anyhow::bail!("アセット確認に失敗しました: {}", adapter.config().base_path());
            }
            println!("ok");
        }
        Command::Preload { files } => {
            let files = default_wasm_files(&files);
            let results = adapter.preload(&files).await;
            let entries: Vec<PreloadEntry> = files
                .iter()
                .zip(results.iter())
                .map(|(file, result)| PreloadEntry {
                    file: file.clone(),
                    loaded: result.is_some(),
                    module: result.as_ref().map(|c| ModuleReport::new(file, c)),
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
        Command::Compile => {
            let file = adapter.config().variant().wasm_file();
            let compiled = adapter.compile(file).await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&ModuleReport::new(file, &compiled))?
            );
        }
    }

    Ok(())
}
