//! # ローダー設定
//!
//! 環境変数からの設定読み込みと、WASMアセット配置の定義。
//! 設定は構築時に一度だけ決まり、以降は変更されない。

use std::str::FromStr;
use std::time::Duration;

use vision_wasm_host::DEFAULT_MAX_MODULE_BYTES;

/// WASMアセットのデフォルトベースパス
pub const DEFAULT_BASE_PATH: &str = "/wasm";

/// ルート相対のベースパスを絶対URLにする際のデフォルトオリジン
pub const DEFAULT_ASSET_ORIGIN: &str = "http://localhost:3000";

/// HTTP取得のタイムアウト（秒）
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 120;

/// WASMバイナリのMIMEタイプ
pub const WASM_MIME: &str = "application/wasm";

/// ビジョンランタイムのWASMビルド種別。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WasmVariant {
    /// SIMD対応ビルド
    #[default]
    Simd,
    /// SIMD非対応環境向けビルド
    NoSimd,
}

impl WasmVariant {
    /// 全ビルド種別。
    pub const ALL: [WasmVariant; 2] = [WasmVariant::Simd, WasmVariant::NoSimd];

    /// WASMバイナリのファイル名。
    pub fn wasm_file(self) -> &'static str {
        match self {
            WasmVariant::Simd => "vision_wasm_internal.wasm",
            WasmVariant::NoSimd => "vision_wasm_nosimd_internal.wasm",
        }
    }

    /// 対応するローダースクリプトのファイル名。
    pub fn loader_script(self) -> &'static str {
        match self {
            WasmVariant::Simd => "vision_wasm_internal.js",
            WasmVariant::NoSimd => "vision_wasm_nosimd_internal.js",
        }
    }

    /// ログ・CLI表示用の名前（`simd` / `nosimd`）。
    pub fn as_str(self) -> &'static str {
        match self {
            WasmVariant::Simd => "simd",
            WasmVariant::NoSimd => "nosimd",
        }
    }
}

impl FromStr for WasmVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simd" => Ok(WasmVariant::Simd),
            "nosimd" | "no-simd" => Ok(WasmVariant::NoSimd),
            other => Err(format!("不明なWASMビルド種別: {other} (simd / nosimd)")),
        }
    }
}

/// ローダー設定。
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// WASMアセットのベースパス（末尾の`/`は除去済み）
    base_path: String,
    /// ルート相対パスを解決するオリジン
    asset_origin: Option<String>,
    /// 使用するWASMビルド種別
    variant: WasmVariant,
    /// trueの場合、content-typeが不正なレスポンスをストリーミング経路で拒否する。
    /// デフォルトはtrueで、MIMEを厳格に検査するブラウザホストと同じ挙動になる
    /// （拒否後はバッファ経路で再取得する）。falseでは警告のみでストリーミングを継続する。
    strict_mime: bool,
    /// HTTP取得のタイムアウト
    fetch_timeout: Duration,
    /// 受け付けるWASMバイナリの最大サイズ（バイト）
    max_module_bytes: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_PATH)
    }
}

impl LoaderConfig {
    /// 新しいLoaderConfigを作成する。
    ///
    /// # 引数
    /// - `base_path`: WASMアセットのベースパス（例: "/wasm", "https://cdn.example.com/wasm"）
    pub fn new(base_path: impl Into<String>) -> Self {
        Self {
            base_path: normalize_base_path(base_path.into()),
            asset_origin: Some(DEFAULT_ASSET_ORIGIN.to_string()),
            variant: WasmVariant::default(),
            strict_mime: true,
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            max_module_bytes: DEFAULT_MAX_MODULE_BYTES,
        }
    }

    /// 環境変数から設定を読み込む。
    ///
    /// - `WASM_BASE_PATH`（デフォルト: `/wasm`）
    /// - `WASM_ASSET_ORIGIN`（デフォルト: `http://localhost:3000`）
    /// - `WASM_VARIANT`: `simd` / `nosimd`
    /// - `WASM_STRICT_MIME`: `true` / `false`
    /// - `WASM_FETCH_TIMEOUT_SECS`
    /// - `WASM_MAX_MODULE_BYTES`
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 任意のキー参照関数から設定を読み込む。
    /// 値が解釈できない場合はデフォルト値を使用し、警告を出す。
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let base_path = lookup("WASM_BASE_PATH").unwrap_or_else(|| DEFAULT_BASE_PATH.to_string());
        let mut config = Self::new(base_path);

        if let Some(origin) = lookup("WASM_ASSET_ORIGIN") {
            config.asset_origin = Some(origin);
        }
        if let Some(variant) = parse_or_warn::<WasmVariant>("WASM_VARIANT", lookup("WASM_VARIANT")) {
            config.variant = variant;
        }
        if let Some(strict) = parse_or_warn::<bool>("WASM_STRICT_MIME", lookup("WASM_STRICT_MIME")) {
            config.strict_mime = strict;
        }
        if let Some(secs) =
            parse_or_warn::<u64>("WASM_FETCH_TIMEOUT_SECS", lookup("WASM_FETCH_TIMEOUT_SECS"))
        {
            config.fetch_timeout = Duration::from_secs(secs);
        }
        if let Some(bytes) =
            parse_or_warn::<usize>("WASM_MAX_MODULE_BYTES", lookup("WASM_MAX_MODULE_BYTES"))
        {
            config.max_module_bytes = bytes;
        }
        config
    }

    /// ベースパスを差し替える。末尾の`/`は除去される。
    pub fn with_base_path(mut self, base_path: impl Into<String>) -> Self {
        self.base_path = normalize_base_path(base_path.into());
        self
    }

    /// ルート相対パスを解決するオリジンを設定する。
    /// `None`の場合、ベースパスは絶対URLである必要がある。
    pub fn with_asset_origin(mut self, origin: Option<String>) -> Self {
        self.asset_origin = origin;
        self
    }

    /// WASMビルド種別を設定する。
    pub fn with_variant(mut self, variant: WasmVariant) -> Self {
        self.variant = variant;
        self
    }

    /// content-type検査の厳格さを設定する。
    ///
    /// # 引数
    /// - `strict_mime`: trueなら不正なcontent-typeでストリーミング経路を拒否、falseなら警告のみ
    pub fn with_strict_mime(mut self, strict_mime: bool) -> Self {
        self.strict_mime = strict_mime;
        self
    }

    /// HTTP取得のタイムアウトを設定する。
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// 受け付けるWASMバイナリの最大サイズ（バイト）を設定する。
    pub fn with_max_module_bytes(mut self, bytes: usize) -> Self {
        self.max_module_bytes = bytes;
        self
    }

    /// WASMアセットのベースパス（末尾の`/`なし）。
    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// ルート相対パスを解決するオリジン。
    pub fn asset_origin(&self) -> Option<&str> {
        self.asset_origin.as_deref()
    }

    /// 使用するWASMビルド種別。
    pub fn variant(&self) -> WasmVariant {
        self.variant
    }

    /// 不正なcontent-typeをストリーミング経路で拒否するかどうか。
    pub fn strict_mime(&self) -> bool {
        self.strict_mime
    }

    /// HTTP取得のタイムアウト。
    pub fn fetch_timeout(&self) -> Duration {
        self.fetch_timeout
    }

    /// 受け付けるWASMバイナリの最大サイズ（バイト）。
    pub fn max_module_bytes(&self) -> usize {
        self.max_module_bytes
    }
}

/// 末尾の`/`を除去する。ルート（"/"）のみの場合は空文字列になる。
fn normalize_base_path(path: String) -> String {
    path.trim_end_matches('/').to_string()
}

fn parse_or_warn<T: FromStr>(key: &str, value: Option<String>) -> Option<T> {
    let value = value?;
    match value.trim().parse::<T>() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            tracing::warn!("{}の値を解釈できません。デフォルト値を使用します: {}", key, value);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = LoaderConfig::from_lookup(lookup_from(&[]));
        assert_eq!(config.base_path(), "/wasm");
        assert_eq!(config.asset_origin(), Some(DEFAULT_ASSET_ORIGIN));
        assert_eq!(config.variant(), WasmVariant::Simd);
        assert!(config.strict_mime());
        assert_eq!(config.fetch_timeout(), Duration::from_secs(120));
        assert_eq!(config.max_module_bytes(), DEFAULT_MAX_MODULE_BYTES);
    }

    #[test]
    fn test_env_overrides() {
        let config = LoaderConfig::from_lookup(lookup_from(&[
            ("WASM_BASE_PATH", "https://cdn.example.com/assets/wasm/"),
            ("WASM_VARIANT", "nosimd"),
            ("WASM_STRICT_MIME", "false"),
            ("WASM_FETCH_TIMEOUT_SECS", "5"),
            ("WASM_MAX_MODULE_BYTES", "1024"),
        ]));
        assert_eq!(config.base_path(), "https://cdn.example.com/assets/wasm");
        assert_eq!(config.variant(), WasmVariant::NoSimd);
        assert!(!config.strict_mime());
        assert_eq!(config.fetch_timeout(), Duration::from_secs(5));
        assert_eq!(config.max_module_bytes(), 1024);
    }

    #[test]
    fn test_unparseable_values_fall_back() {
        let config = LoaderConfig::from_lookup(lookup_from(&[
            ("WASM_VARIANT", "avx512"),
            ("WASM_STRICT_MIME", "yes"),
            ("WASM_FETCH_TIMEOUT_SECS", "-1"),
        ]));
        assert_eq!(config.variant(), WasmVariant::Simd);
        assert!(config.strict_mime());
        assert_eq!(config.fetch_timeout(), Duration::from_secs(120));
    }

    #[test]
    fn test_variant_files() {
        assert_eq!(WasmVariant::Simd.wasm_file(), "vision_wasm_internal.wasm");
        assert_eq!(
            WasmVariant::NoSimd.wasm_file(),
            "vision_wasm_nosimd_internal.wasm"
        );
        assert_eq!(
            WasmVariant::NoSimd.loader_script(),
            "vision_wasm_nosimd_internal.js"
        );
        assert_eq!("No-SIMD".parse::<WasmVariant>(), Ok(WasmVariant::NoSimd));
    }
}
