#![recursion_limit = "256"]

mod types;
mod alert;
mod pages;
mod predictor;

pub mod ml;
pub mod model;

pub use alert::{should_alert, trigger_alert, AlertOutcome, AlertPlayer, AlertSink, SAFE_CLASS};
pub use pages::{render, Page, PageAssets, PageError};
pub use predictor::{classify_upload, ClassifiedUpload, decode_payload, decode_upload, finish_interaction, format_confidence, ACCEPTED_EXTENSIONS};
pub use types::{ModelInfo, PageEntry, PageView, PredictionView, Section, TeamMember};

use ml::InferenceEngine;
use model::AppConfig;

use anyhow::Context;
use std::sync::{Arc, Mutex};
use tauri::{AppHandle, Emitter, State};
use tracing_subscriber::EnvFilter;

pub struct AppState {
    engine: Arc<Mutex<InferenceEngine>>, // 起動時に読み込んだモデル（推論時のみロック）
    alert: Arc<AlertPlayer>,
    assets: Arc<PageAssets>,
}

impl AppState {
    /// 設定に従ってモデルとアセットを読み込む
    ///
    /// モデルかヘッダー画像が読めない場合はエラー。警告音の問題は警告ログのみ。
    pub fn load(config: &AppConfig) -> anyhow::Result<Self> {
        let engine = InferenceEngine::load(&config.model.model_path, config.device_type)
            .context("モデルの読み込みに失敗しました")?;
        let assets = PageAssets::load(&config.assets)
            .context("ヘッダー画像の読み込みに失敗しました")?;

        let alert = AlertPlayer::new(&config.assets.alert_sound);
        match alert.probe() {
            Ok(duration_ms) => tracing::info!(
                path = %alert.sound_path().display(),
                duration_ms = duration_ms.unwrap_or_default(),
                "警告音を確認しました"
            ),
            Err(e) => tracing::warn!("警告音を再生できない可能性があります: {:#}", e),
        }

        Ok(Self {
            engine: Arc::new(Mutex::new(engine)),
            alert: Arc::new(alert),
            assets: Arc::new(assets),
        })
    }
}

// Tauri commands
#[tauri::command]
fn list_pages() -> Vec<PageEntry> {
    Page::entries()
}

#[tauri::command]
fn render_page(page_id: String, state: State<AppState>) -> Result<PageView, String> {
    let page: Page = page_id.parse().map_err(|e: PageError| e.to_string())?;
    Ok(render(page, &state.assets))
}

/// 分類結果を警告音の再生前に通知するイベント
pub const PREDICTION_READY_EVENT: &str = "prediction-ready";

/// アップロード画像を分類し、必要なら警告音を鳴らしてから結果を返す
///
/// 表示内容は再生を始める前に `prediction-ready` イベントで先に送ります。
#[tauri::command]
async fn predict_image(
    app: AppHandle,
    file_name: String,
    data: String,
    state: State<'_, AppState>,
) -> Result<PredictionView, String> {
    let engine = state.engine.clone();
    let alert = state.alert.clone();

    tokio::task::spawn_blocking(move || {
        let bytes = decode_payload(&data).map_err(|e| e.to_string())?;

        let classified = {
            let engine = engine
                .lock()
                .map_err(|_| "推論エンジンのロックに失敗しました".to_string())?;
            classify_upload(&file_name, &bytes, &*engine)
        }
        .map_err(|e| {
            tracing::warn!(file = %file_name, "画像を分類できませんでした: {}", e);
            e.to_string()
        })?;

        Ok(finish_interaction(classified, alert.as_ref(), |view| {
            if let Err(e) = app.emit(PREDICTION_READY_EVENT, view) {
                tracing::warn!("分類結果の通知に失敗しました: {}", e);
            }
        }))
    })
    .await
    .map_err(|e| format!("推論タスクが異常終了しました: {}", e))?
}

#[tauri::command]
fn get_model_info(state: State<AppState>) -> Result<ModelInfo, String> {
    let engine = state
        .engine
        .lock()
        .map_err(|_| "推論エンジンのロックに失敗しました".to_string())?;
    let metadata = engine.metadata();

    Ok(ModelInfo {
        class_labels: metadata.class_labels.clone(),
        input_width: metadata.input_width,
        input_height: metadata.input_height,
        device: engine.device_type().to_string(),
        description: metadata.description.clone(),
        exported_at: metadata.exported_at.clone(),
    })
}

/// ログ出力を初期化（RUST_LOG で上書き可能、デフォルトは info）
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    init_logging();

    let config = AppConfig::load_or_default();
    config.log_summary();

    let app_state = match AppState::load(&config) {
        Ok(state) => state,
        Err(e) => {
            tracing::error!("起動に失敗しました: {:#}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = tauri::Builder::default()
        .plugin(tauri_plugin_opener::init())
        .manage(app_state)
        .invoke_handler(tauri::generate_handler![
            list_pages,
            render_page,
            predict_image,
            get_model_info,
        ])
        .run(tauri::generate_context!())
    {
        tracing::error!("error while running tauri application: {}", e);
        std::process::exit(1);
    }
}
