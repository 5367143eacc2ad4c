//! # テスト用共通ヘルパー
//!
//! instantiator, preload, validate, adapterテストで共有するモックアセットサーバー群。

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::response::Response;
use wasmtime::{Engine, Linker};

use crate::config::LoaderConfig;
use crate::error::LoadError;
use crate::transport::{FetchResponse, HttpTransport, Transport};

/// モックサーバーが返すレスポンス1件。
#[derive(Clone)]
pub struct MockAsset {
    pub status: StatusCode,
    pub content_type: Option<&'static str>,
    pub body: Vec<u8>,
}

impl MockAsset {
    /// `content-type: application/wasm`で返すアセット。
    pub fn wasm(body: Vec<u8>) -> Self {
        Self::with_content_type(body, Some("application/wasm"))
    }

    pub fn with_content_type(body: Vec<u8>, content_type: Option<&'static str>) -> Self {
        Self {
            status: StatusCode::OK,
            content_type,
            body,
        }
    }

    /// 指定ステータスのエラーレスポンス。
    pub fn status(status: StatusCode) -> Self {
        Self {
            status,
            content_type: Some("text/plain"),
            body: b"error".to_vec(),
        }
    }
}

/// モックサーバーが受け付けたリクエスト。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub accept: Option<String>,
}

struct MockState {
    /// パスごとのレスポンス列。n回目のリクエストにはn番目（末尾以降は末尾）を返す。
    assets: HashMap<String, Vec<MockAsset>>,
    served: Mutex<HashMap<String, usize>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

/// 起動済みモックアセットサーバー。
pub struct MockAssetServer {
    port: u16,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockAssetServer {
    pub fn origin(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    /// `/wasm`ベースパスの絶対URL。
    pub fn base_url(&self) -> String {
        format!("{}/wasm", self.origin())
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_for(&self, path: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.path == path)
            .collect()
    }

    /// このサーバーを指すローダー設定。
    pub fn config(&self) -> LoaderConfig {
        LoaderConfig::new(self.base_url()).with_asset_origin(None)
    }
}

async fn serve_asset(
    State(state): State<Arc<MockState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let path = uri.path().to_string();
    state.requests.lock().unwrap().push(RecordedRequest {
        method: method.to_string(),
        path: path.clone(),
        accept: headers
            .get(header::ACCEPT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    });

    let Some(sequence) = state.assets.get(&path) else {
        return Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Body::from("not found"))
            .unwrap();
    };
    let index = {
        let mut served = state.served.lock().unwrap();
        let count = served.entry(path).or_insert(0);
        let index = *count;
        *count += 1;
        index
    };
    let asset = &sequence[index.min(sequence.len() - 1)];

    let mut builder = Response::builder().status(asset.status);
    if let Some(content_type) = asset.content_type {
        builder = builder.header(header::CONTENT_TYPE, content_type);
    }
    builder.body(Body::from(asset.body.clone())).unwrap()
}

/// テスト用モックアセットサーバーを起動する。
///
/// `assets`は（パス, レスポンス列）の一覧。未登録のパスは404を返す。
pub async fn start_mock_assets(assets: Vec<(&str, Vec<MockAsset>)>) -> MockAssetServer {
    let requests = Arc::new(Mutex::new(Vec::new()));
    let state = Arc::new(MockState {
        assets: assets
            .into_iter()
            .map(|(path, sequence)| (path.to_string(), sequence))
            .collect(),
        served: Mutex::new(HashMap::new()),
        requests: requests.clone(),
    });

    let app = axum::Router::new()
        .fallback(serve_asset)
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    MockAssetServer { port, requests }
}

/// テスト中に出力されたログを捕捉するバッファ。
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    /// このバッファへ書き出すsubscriberを現在のスレッドのデフォルトに設定する。
    /// ガードを破棄すると元に戻る。
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let logs = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || logs.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }

    /// `needle`を含む最初のログ行。
    pub fn line_containing(&self, needle: &str) -> Option<String> {
        self.contents()
            .lines()
            .find(|line| line.contains(needle))
            .map(str::to_string)
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// テスト用のreqwestトランスポート。
pub fn http_transport() -> Arc<dyn Transport> {
    Arc::new(HttpTransport::new(Duration::from_secs(5), None).unwrap())
}

/// URLに指定文字列を含むリクエストを通信エラーにするトランスポート。
pub struct FailingTransport {
    inner: HttpTransport,
    failing: Vec<String>,
}

impl FailingTransport {
    pub fn new(failing: &[&str]) -> Arc<dyn Transport> {
        Arc::new(Self {
            inner: HttpTransport::new(Duration::from_secs(5), None).unwrap(),
            failing: failing.iter().map(|s| s.to_string()).collect(),
        })
    }

    fn check(&self, url: &str) -> Result<(), LoadError> {
        if self.failing.iter().any(|f| url.contains(f.as_str())) {
            return Err(LoadError::Network {
                url: url.to_string(),
                reason: "connection reset by peer".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Transport for FailingTransport {
    async fn get(&self, url: &str, accept: Option<&str>) -> Result<FetchResponse, LoadError> {
        self.check(url)?;
        self.inner.get(url, accept).await
    }

    async fn head(&self, url: &str) -> Result<u16, LoadError> {
        self.check(url)?;
        self.inner.head(url).await
    }
}

/// `env.log`をインポートし、42を返す`answer`と
/// 可変グローバル`counter`を増やす`bump`をエクスポートするテスト用WASM。
pub fn answer_wasm() -> Vec<u8> {
    wat::parse_str(
        r#"(module
            (import "env" "log" (func $log (param i32)))
            (global $counter (export "counter") (mut i32) (i32.const 0))
            (func (export "answer") (result i32)
                (call $log (i32.const 42))
                (i32.const 42)
            )
            (func (export "bump")
                (global.set $counter (i32.add (global.get $counter) (i32.const 1)))
            )
        )"#,
    )
    .unwrap()
}

/// `answer_wasm`のインポートを満たすLinker。
pub fn answer_linker(engine: &Engine) -> Linker<()> {
    let mut linker = Linker::new(engine);
    linker.func_wrap("env", "log", |_: i32| {}).unwrap();
    linker
}
