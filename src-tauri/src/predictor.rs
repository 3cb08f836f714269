//! Image Predictorページの処理
//!
//! アップロードされた画像をデコードして分類し、結果の表示内容と警告音の判定をまとめます。

use base64::{engine::general_purpose, Engine as _};
use image::{ImageEncoder, ImageFormat, RgbImage};

use crate::alert::{should_alert, trigger_alert, AlertOutcome, AlertSink};
use crate::ml::{predict_single_image, InferenceError, Prediction, ScoreModel};
use crate::types::PredictionView;

/// アップロードを受け付ける拡張子
pub const ACCEPTED_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// 分類済みのアップロード画像
#[derive(Debug, Clone)]
pub struct ClassifiedUpload {
    pub image: RgbImage,
    pub prediction: Prediction,
}

/// フロントエンドから届いたbase64文字列をデコード
///
/// `data:image/png;base64,...` 形式の接頭辞があれば取り除きます。
pub fn decode_payload(data: &str) -> Result<Vec<u8>, InferenceError> {
    let encoded = data.split_once(',').map(|(_, body)| body).unwrap_or(data);
    general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| InferenceError::Decode(format!("invalid base64 payload: {}", e)))
}

/// アップロードファイルをRGB画像にデコード
///
/// 拡張子と中身の両方がJPEGかPNGであることを確認します。
pub fn decode_upload(file_name: &str, bytes: &[u8]) -> Result<RgbImage, InferenceError> {
    let extension = std::path::Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    if !ACCEPTED_EXTENSIONS.contains(&extension.as_str()) {
        return Err(InferenceError::UnsupportedFormat(file_name.to_string()));
    }

    let format = image::guess_format(bytes).map_err(|e| InferenceError::Decode(e.to_string()))?;
    if !matches!(format, ImageFormat::Jpeg | ImageFormat::Png) {
        return Err(InferenceError::UnsupportedFormat(format!(
            "{} ({:?} data)",
            file_name, format
        )));
    }

    let img = image::load_from_memory_with_format(bytes, format)
        .map_err(|e| InferenceError::Decode(e.to_string()))?;
    Ok(img.to_rgb8())
}

/// アップロード画像をデコードして分類
pub fn classify_upload(
    file_name: &str,
    bytes: &[u8],
    model: &dyn ScoreModel,
) -> Result<ClassifiedUpload, InferenceError> {
    let image = decode_upload(file_name, bytes)?;
    let prediction = predict_single_image(&image, model)?;

    tracing::info!(
        file = file_name,
        class = prediction.label(),
        confidence = prediction.confidence,
        "画像を分類しました"
    );

    Ok(ClassifiedUpload { image, prediction })
}

/// 確率をパーセント表記にする (0.87 -> "87.00%")
pub fn format_confidence(confidence: f32) -> String {
    format!("{:.2}%", confidence as f64 * 100.0)
}

/// PNGにエンコードしてdata URLにする（プレビュー用）
fn png_data_url(img: &RgbImage) -> String {
    let mut png_data = Vec::new();
    let encoder = image::codecs::png::PngEncoder::new(&mut png_data);
    if let Err(e) = encoder.write_image(
        img.as_raw(),
        img.width(),
        img.height(),
        image::ExtendedColorType::Rgb8,
    ) {
        tracing::warn!("プレビューのPNGエンコードに失敗しました: {}", e);
        return String::new();
    }

    format!(
        "data:image/png;base64,{}",
        general_purpose::STANDARD.encode(&png_data)
    )
}

/// 分類結果を表示内容にまとめ、必要なら警告音を鳴らす
///
/// `on_result` には警告音を鳴らす前の表示内容が渡されます。戻り値は再生結果を反映したもので、
/// 警告音の再生が終わるまで戻りません。
pub fn finish_interaction<F>(classified: ClassifiedUpload, alert: &dyn AlertSink, on_result: F) -> PredictionView
where
    F: FnOnce(&PredictionView),
{
    let label = classified.prediction.label();
    let confidence = classified.prediction.confidence;

    let mut view = PredictionView {
        predicted_class: label.to_string(),
        confidence,
        class_line: format!("Predicted Class: {}", label),
        confidence_line: format!("Confidence: {}", format_confidence(confidence)),
        alert_triggered: should_alert(label),
        alert_played: false,
        preview: png_data_url(&classified.image),
        preview_caption: "Uploaded Image.".to_string(),
    };
    on_result(&view);

    let outcome = trigger_alert(label, alert);
    view.alert_triggered = outcome.triggered();
    view.alert_played = outcome == AlertOutcome::Played;
    view
}
