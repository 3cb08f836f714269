//! モデルアーカイブの確認用バイナリ
//!
//! 使い方:
//!   inspect_model show <archive.tar.gz>
//!   inspect_model classify <archive.tar.gz> <image> [--gpu]
//!   inspect_model init <output.tar.gz> <width> <height>   (未学習モデルを書き出す。動作確認用)

use anyhow::{Context, Result};
use burn_ndarray::{NdArray, NdArrayDevice};
use distracted_driver_lib::ml::{encode_weights, InferenceEngine, ModelConfig, NUM_CLASSES};
use distracted_driver_lib::model::{load_metadata, print_metadata_info, save_model_with_metadata, DeviceType, ModelMetadata};
use distracted_driver_lib::{classify_upload, format_confidence, should_alert, ClassifiedUpload};
use std::path::{Path, PathBuf};

fn usage() -> ! {
    eprintln!("usage:");
    eprintln!("  inspect_model show <archive.tar.gz>");
    eprintln!("  inspect_model classify <archive.tar.gz> <image> [--gpu]");
    eprintln!("  inspect_model init <output.tar.gz> <width> <height>");
    std::process::exit(2);
}

fn show(archive: &Path) -> Result<()> {
    let metadata = load_metadata(archive)?;
    print_metadata_info(&metadata);
    metadata.validate()?;
    println!("✓ メタデータは有効です");
    Ok(())
}

fn classify(archive: &Path, image_path: &Path, device_type: DeviceType) -> Result<()> {
    let engine = InferenceEngine::load(archive, device_type)?;
    let bytes = std::fs::read(image_path)
        .with_context(|| format!("画像を読み込めません: {}", image_path.display()))?;
    let file_name = image_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let classified: ClassifiedUpload = classify_upload(&file_name, &bytes, &engine)?;
    let prediction = &classified.prediction;

    println!("Predicted Class: {}", prediction.label());
    println!("Confidence: {}", format_confidence(prediction.confidence));
    println!("Alert: {}", if should_alert(prediction.label()) { "yes" } else { "no" });
    for (label, score) in engine.metadata().class_labels.iter().zip(&prediction.scores) {
        println!("  {}: {}", label, format_confidence(*score));
    }
    Ok(())
}

fn init(output: &Path, width: u32, height: u32) -> Result<()> {
    let device = NdArrayDevice::default();
    let config = ModelConfig::new(NUM_CLASSES);
    let metadata = ModelMetadata::new(width, height, config.base_channels, "untrained (random weights)");
    metadata.validate()?;

    let weights = encode_weights(config.init::<NdArray>(&device))?;
    let saved = save_model_with_metadata(output, &metadata, &weights)?;
    println!("✓ 未学習モデルを書き出しました: {}", saved.display());
    Ok(())
}

fn parse_size(arg: Option<&String>) -> u32 {
    arg.and_then(|s| s.parse().ok()).unwrap_or_else(|| usage())
}

/// classify の残り引数から画像パスと --gpu を取り出す（フラグの位置は問わない）
fn parse_classify_args(rest: &[String]) -> Option<(PathBuf, DeviceType)> {
    let (flags, positional): (Vec<&String>, Vec<&String>) =
        rest.iter().partition(|a| a.starts_with("--"));
    if flags.iter().any(|f| f.as_str() != "--gpu") {
        return None;
    }
    let device_type = if flags.is_empty() {
        DeviceType::Cpu
    } else {
        DeviceType::Wgpu
    };
    match positional.as_slice() {
        [image] => Some((PathBuf::from(image.as_str()), device_type)),
        _ => None,
    }
}

fn main() {
    distracted_driver_lib::init_logging();

    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(String::as_str).unwrap_or_else(|| usage());
    let archive = args.get(2).map(PathBuf::from).unwrap_or_else(|| usage());

    let result = match command {
        "show" => show(&archive),
        "classify" => {
            let (image_path, device_type) =
                parse_classify_args(&args[3..]).unwrap_or_else(|| usage());
            classify(&archive, &image_path, device_type)
        }
        "init" => init(&archive, parse_size(args.get(3)), parse_size(args.get(4))),
        _ => usage(),
    };

    if let Err(e) = result {
        eprintln!("✗ エラー: {:#}", e);
        std::process::exit(1);
    }
}
