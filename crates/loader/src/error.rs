//! # ローダーエラー型
//!
//! 全コンポーネントで共通のエラー型。
//! ロケーション解決は失敗しない。プリローダーとバリデーターは
//! このエラーを呼び出し元に伝播せず、ログに記録するのみ。

use vision_wasm_host::WasmError;

/// ローダーエラー型。
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// 非2xxのHTTPステータス
    #[error("WASM取得でHTTPエラー: ステータス {status} {status_text} ({url})")]
    Transport {
        /// 取得先URL
        url: String,
        /// HTTPステータスコード
        status: u16,
        /// ステータステキスト（例: "Not Found"）
        status_text: String,
    },
    /// 接続失敗・タイムアウト・本文の読み取り失敗
    #[error("WASM取得に失敗 ({url}): {reason}")]
    Network {
        /// 取得先URL
        url: String,
        /// 失敗理由
        reason: String,
    },
    /// content-typeがapplication/wasmでないため、ストリーミング経路で拒否された
    #[error("content-typeがapplication/wasmではありません ({url}): {content_type}")]
    MimeRejected {
        /// 取得先URL
        url: String,
        /// 受信したcontent-type（欠落時は"(なし)"）
        content_type: String,
    },
    /// コンパイル・インスタンス化の失敗
    #[error(transparent)]
    Wasm(#[from] WasmError),
    /// ストリーミング経路・バッファ経路の両方が失敗
    ///
    /// `source`はバッファ経路の失敗。ストリーミング経路の失敗は
    /// `streaming`にメッセージとしてのみ保持する。
    #[error("ストリーミング・バッファ両経路でWASMのロードに失敗: {source}")]
    FallbackExhausted {
        /// ストリーミング経路の失敗メッセージ
        streaming: String,
        /// バッファ経路の失敗
        #[source]
        source: Box<LoadError>,
    },
    /// HTTPクライアントの構築失敗等
    #[error("設定エラー: {0}")]
    Config(String),
}
