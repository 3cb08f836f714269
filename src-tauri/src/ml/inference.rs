//! モデル推論機能

use anyhow::{Context, Result};
use burn::{
    backend::{wgpu::WgpuDevice, Wgpu},
    module::Module,
    record::{BinBytesRecorder, FullPrecisionSettings, Recorder},
    tensor::{backend::Backend, Tensor, TensorData},
};
use burn_ndarray::{NdArray, NdArrayDevice};
use image::RgbImage;
use std::path::Path;
use thiserror::Error;

use crate::ml::{class_label, DriverClassifier, ModelConfig, NormalizedTensor, NUM_CLASSES};
use crate::model::{load_model_with_metadata, DeviceType, ModelMetadata};

/// 推論時のエラー
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("Unsupported file type: {0} (accepted: jpg, jpeg, png)")]
    UnsupportedFormat(String),
    #[error("Could not decode image: {0}")]
    Decode(String),
    #[error("Image size {actual_width}x{actual_height} does not match the model input {expected_width}x{expected_height}")]
    ShapeMismatch {
        expected_width: u32,
        expected_height: u32,
        actual_width: u32,
        actual_height: u32,
    },
    #[error("Model returned {0} scores (expected {expected})", expected = NUM_CLASSES)]
    ScoreCount(usize),
    #[error("Model returned an invalid score: {0}")]
    InvalidScore(f32),
    #[error("Inference failed: {0}")]
    Backend(String),
}

/// モデルが期待する入力画像サイズ
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputShape {
    pub width: u32,
    pub height: u32,
}

/// 正規化済み画像からクラスごとの確率を返すモデル
pub trait ScoreModel {
    /// 期待する入力画像サイズ
    fn input_shape(&self) -> InputShape;

    /// 1枚分の確率ベクトル（長さ NUM_CLASSES）を返す
    fn scores(&self, input: &NormalizedTensor) -> Result<Vec<f32>, InferenceError>;
}

/// 1回の推論結果
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    /// 予測クラスのインデックス (0〜9)
    pub class_index: usize,
    /// 予測クラスの確率 (0.0〜1.0)
    pub confidence: f32,
    /// 全クラスの確率
    pub scores: Vec<f32>,
}

impl Prediction {
    /// 確率ベクトルから予測を作る
    ///
    /// 最大値が複数ある場合は先に現れたインデックスを選びます。
    pub fn from_scores(scores: Vec<f32>) -> Result<Self, InferenceError> {
        if scores.len() != NUM_CLASSES {
            return Err(InferenceError::ScoreCount(scores.len()));
        }
        if let Some(&bad) = scores.iter().find(|s| !(0.0..=1.0).contains(*s)) {
            return Err(InferenceError::InvalidScore(bad));
        }

        let mut class_index = 0;
        for (i, &score) in scores.iter().enumerate().skip(1) {
            if score > scores[class_index] {
                class_index = i;
            }
        }

        Ok(Self {
            class_index,
            confidence: scores[class_index],
            scores,
        })
    }

    /// 予測クラスのラベル (c0〜c9)
    pub fn label(&self) -> &'static str {
        // from_scores で長さを保証済み
        class_label(self.class_index).unwrap_or("unknown")
    }
}

/// 単一画像を分類
///
/// 画像サイズがモデルの入力と一致しない場合はリサイズせずにエラーを返します。
pub fn predict_single_image(
    img: &RgbImage,
    model: &dyn ScoreModel,
) -> Result<Prediction, InferenceError> {
    let expected = model.input_shape();
    let (width, height) = img.dimensions();
    if width != expected.width || height != expected.height {
        return Err(InferenceError::ShapeMismatch {
            expected_width: expected.width,
            expected_height: expected.height,
            actual_width: width,
            actual_height: height,
        });
    }

    let input = NormalizedTensor::from_image(img);
    let scores = model.scores(&input)?;
    Prediction::from_scores(scores)
}

/// モデルの重みをバイナリ化する（tar.gz保存用）
pub fn encode_weights<B: Backend>(model: DriverClassifier<B>) -> Result<Vec<u8>> {
    let recorder = BinBytesRecorder::<FullPrecisionSettings>::default();
    Recorder::<B>::record(&recorder, model.into_record(), ())
        .map_err(|e| anyhow::anyhow!("モデル重みの書き出しエラー: {:?}", e))
}

fn load_classifier<B: Backend>(
    metadata: &ModelMetadata,
    model_binary: Vec<u8>,
    device: &B::Device,
) -> Result<DriverClassifier<B>> {
    let model = ModelConfig::new(NUM_CLASSES)
        .with_base_channels(metadata.base_channels)
        .init::<B>(device);

    let recorder = BinBytesRecorder::<FullPrecisionSettings>::default();
    let record = recorder
        .load(model_binary, device)
        .map_err(|e| anyhow::anyhow!("モデル重みの読み込みエラー: {:?}", e))?;

    Ok(model.load_record(record))
}

fn run_forward<B: Backend>(
    model: &DriverClassifier<B>,
    device: &B::Device,
    input: &NormalizedTensor,
) -> Result<Vec<f32>, InferenceError> {
    let tensor = Tensor::<B, 4>::from_data(
        TensorData::new(input.data().to_vec(), input.shape()),
        device,
    );

    model
        .probabilities(tensor)
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| InferenceError::Backend(format!("{:?}", e)))
}

enum EngineBackend {
    Cpu {
        model: DriverClassifier<NdArray>,
        device: NdArrayDevice,
    },
    Wgpu {
        model: DriverClassifier<Wgpu>,
        device: WgpuDevice,
    },
}

/// 推論エンジン
///
/// 起動時に一度だけ読み込み、以降は読み取り専用で共有します。
pub struct InferenceEngine {
    backend: EngineBackend,
    metadata: ModelMetadata,
}

impl InferenceEngine {
    /// モデルを読み込んで推論エンジンを初期化
    pub fn load<P: AsRef<Path>>(model_path: P, device_type: DeviceType) -> Result<Self> {
        let model_path = model_path.as_ref();
        let (metadata, model_binary) = load_model_with_metadata(model_path)
            .with_context(|| format!("Failed to load model archive: {}", model_path.display()))?;

        let engine = Self::from_parts(metadata, model_binary, device_type)?;
        tracing::info!(
            path = %model_path.display(),
            device = %device_type,
            input_width = engine.metadata.input_width,
            input_height = engine.metadata.input_height,
            "モデルを読み込みました"
        );
        Ok(engine)
    }

    /// メタデータと重みバイナリから推論エンジンを作成
    pub fn from_parts(
        metadata: ModelMetadata,
        model_binary: Vec<u8>,
        device_type: DeviceType,
    ) -> Result<Self> {
        metadata.validate()?;

        let backend = match device_type {
            DeviceType::Cpu => {
                let device = NdArrayDevice::default();
                let model = load_classifier::<NdArray>(&metadata, model_binary, &device)?;
                EngineBackend::Cpu { model, device }
            }
            DeviceType::Wgpu => {
                let device = WgpuDevice::default();
                let model = load_classifier::<Wgpu>(&metadata, model_binary, &device)?;
                EngineBackend::Wgpu { model, device }
            }
        };

        Ok(Self { backend, metadata })
    }

    /// メタデータへの参照を取得
    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    pub fn device_type(&self) -> DeviceType {
        match self.backend {
            EngineBackend::Cpu { .. } => DeviceType::Cpu,
            EngineBackend::Wgpu { .. } => DeviceType::Wgpu,
        }
    }
}

impl ScoreModel for InferenceEngine {
    fn input_shape(&self) -> InputShape {
        InputShape {
            width: self.metadata.input_width,
            height: self.metadata.input_height,
        }
    }

    fn scores(&self, input: &NormalizedTensor) -> Result<Vec<f32>, InferenceError> {
        match &self.backend {
            EngineBackend::Cpu { model, device } => run_forward(model, device, input),
            EngineBackend::Wgpu { model, device } => run_forward(model, device, input),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb};
    use rand::Rng;
    use std::io::Cursor;

    /// 固定の確率ベクトルを返すモデル
    struct FixedScores {
        shape: InputShape,
        scores: Vec<f32>,
    }

    impl ScoreModel for FixedScores {
        fn input_shape(&self) -> InputShape {
            self.shape
        }

        fn scores(&self, _input: &NormalizedTensor) -> Result<Vec<f32>, InferenceError> {
            Ok(self.scores.clone())
        }
    }

    fn untrained_engine(width: u32, height: u32) -> InferenceEngine {
        let device = NdArrayDevice::default();
        let model = ModelConfig::new(NUM_CLASSES)
            .with_base_channels(4)
            .init::<NdArray>(&device);
        let weights = encode_weights(model).unwrap();
        let metadata = ModelMetadata::new(width, height, 4, "untrained");
        InferenceEngine::from_parts(metadata, weights, DeviceType::Cpu).unwrap()
    }

    fn gradient_image(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x * 13 % 256) as u8, (y * 29 % 256) as u8, ((x + y) * 7 % 256) as u8])
        })
    }

    #[test]
    fn test_argmax_tie_picks_first() {
        let mut scores = vec![0.05; NUM_CLASSES];
        scores[2] = 0.3;
        scores[7] = 0.3;
        let prediction = Prediction::from_scores(scores).unwrap();
        assert_eq!(prediction.class_index, 2);
        assert_eq!(prediction.label(), "c2");
        assert_eq!(prediction.confidence, 0.3);
    }

    #[test]
    fn test_all_equal_scores_pick_c0() {
        let prediction = Prediction::from_scores(vec![0.1; NUM_CLASSES]).unwrap();
        assert_eq!(prediction.class_index, 0);
    }

    #[test]
    fn test_rejects_bad_score_vectors() {
        assert!(matches!(
            Prediction::from_scores(vec![0.1; 9]),
            Err(InferenceError::ScoreCount(9))
        ));

        let mut scores = vec![0.0; NUM_CLASSES];
        scores[4] = f32::NAN;
        assert!(matches!(
            Prediction::from_scores(scores),
            Err(InferenceError::InvalidScore(_))
        ));

        let mut scores = vec![0.0; NUM_CLASSES];
        scores[0] = 1.5;
        assert!(Prediction::from_scores(scores).is_err());
    }

    #[test]
    fn test_confidence_is_max_score_for_random_vectors() {
        let mut rng = rand::thread_rng();
        for _ in 0..200 {
            let scores: Vec<f32> = (0..NUM_CLASSES).map(|_| rng.gen_range(0.0..=1.0)).collect();
            let max = scores.iter().cloned().fold(f32::MIN, f32::max);
            let prediction = Prediction::from_scores(scores.clone()).unwrap();

            assert!(prediction.class_index < NUM_CLASSES);
            assert_eq!(prediction.confidence, max);
            assert_eq!(scores.iter().position(|&s| s == max), Some(prediction.class_index));
        }
    }

    #[test]
    fn test_shape_mismatch_is_rejected() {
        let model = FixedScores {
            shape: InputShape { width: 16, height: 16 },
            scores: vec![0.1; NUM_CLASSES],
        };
        let err = predict_single_image(&gradient_image(20, 16), &model).unwrap_err();
        assert!(matches!(
            err,
            InferenceError::ShapeMismatch {
                expected_width: 16,
                actual_width: 20,
                ..
            }
        ));
    }

    #[test]
    fn test_predict_with_fixed_scores() {
        let mut scores = vec![0.01; NUM_CLASSES];
        scores[3] = 0.55;
        let model = FixedScores {
            shape: InputShape { width: 8, height: 8 },
            scores,
        };
        let prediction = predict_single_image(&gradient_image(8, 8), &model).unwrap();
        assert_eq!(prediction.label(), "c3");
        assert_eq!(prediction.confidence, 0.55);
    }

    #[test]
    fn test_engine_output_is_probability_vector() {
        let engine = untrained_engine(16, 12);
        assert_eq!(engine.device_type(), DeviceType::Cpu);
        assert_eq!(engine.input_shape(), InputShape { width: 16, height: 12 });

        let prediction = predict_single_image(&gradient_image(16, 12), &engine).unwrap();
        assert!(prediction.class_index < NUM_CLASSES);
        assert!((0.0..=1.0).contains(&prediction.confidence));
        let max = prediction.scores.iter().cloned().fold(f32::MIN, f32::max);
        assert_eq!(prediction.confidence, max);
    }

    #[test]
    fn test_png_roundtrip_inference_is_deterministic() {
        let engine = untrained_engine(16, 16);

        let mut png = Vec::new();
        gradient_image(16, 16)
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .unwrap();
        let decoded = image::load_from_memory(&png).unwrap().to_rgb8();

        let first = predict_single_image(&decoded, &engine).unwrap();
        let second = predict_single_image(&decoded, &engine).unwrap();
        assert_eq!(first.class_index, second.class_index);
        assert_eq!(first.confidence, second.confidence);
    }

    #[test]
    fn test_weights_survive_archive_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let device = NdArrayDevice::default();
        let model = ModelConfig::new(NUM_CLASSES)
            .with_base_channels(4)
            .init::<NdArray>(&device);
        let metadata = ModelMetadata::new(16, 16, 4, "archive");
        let weights = encode_weights(model).unwrap();

        let direct = InferenceEngine::from_parts(metadata.clone(), weights.clone(), DeviceType::Cpu).unwrap();
        let path = crate::model::save_model_with_metadata(&dir.path().join("m.tar.gz"), &metadata, &weights).unwrap();
        let loaded = InferenceEngine::load(&path, DeviceType::Cpu).unwrap();

        let img = gradient_image(16, 16);
        assert_eq!(
            predict_single_image(&img, &direct).unwrap(),
            predict_single_image(&img, &loaded).unwrap()
        );
    }

    #[test]
    fn test_corrupt_weights_fail_to_load() {
        let metadata = ModelMetadata::new(16, 16, 4, "");
        assert!(InferenceEngine::from_parts(metadata, vec![0, 1, 2], DeviceType::Cpu).is_err());
    }
}
