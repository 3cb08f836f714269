//! 機械学習モデルの共通定義
//!
//! 運転者画像分類用のCNNモデルと、入力画像の正規化を提供します。

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        Linear, LinearConfig, PaddingConfig2d, Relu,
    },
    tensor::{activation::softmax, backend::Backend, Tensor},
};
use image::RgbImage;

/// クラス数
pub const NUM_CLASSES: usize = 10;

/// クラス名の定義（インデックス順）
pub const CLASS_NAMES: [&str; NUM_CLASSES] = [
    "c0", "c1", "c2", "c3", "c4", "c5", "c6", "c7", "c8", "c9",
];

/// 入力チャネル数（RGB）
pub const INPUT_CHANNELS: usize = 3;

/// クラスインデックスからラベルを取得
pub fn class_label(index: usize) -> Option<&'static str> {
    CLASS_NAMES.get(index).copied()
}

/// モデル設定
#[derive(Config, Debug)]
pub struct ModelConfig {
    /// 分類クラス数
    pub num_classes: usize,
    /// 最初の畳み込み層のチャネル数（以降は2倍ずつ増える）
    #[config(default = 32)]
    pub base_channels: usize,
}

impl ModelConfig {
    /// モデルを初期化
    pub fn init<B: Backend>(&self, device: &B::Device) -> DriverClassifier<B> {
        let c1 = self.base_channels;
        let c2 = c1 * 2;
        let c3 = c2 * 2;

        DriverClassifier {
            conv1: Conv2dConfig::new([INPUT_CHANNELS, c1], [3, 3])
                .with_padding(PaddingConfig2d::Same)
                .init(device),
            conv2: Conv2dConfig::new([c1, c2], [3, 3])
                .with_padding(PaddingConfig2d::Same)
                .init(device),
            conv3: Conv2dConfig::new([c2, c3], [3, 3])
                .with_padding(PaddingConfig2d::Same)
                .init(device),
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            gap: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            fc1: LinearConfig::new(c3, c2).init(device),
            fc2: LinearConfig::new(c2, self.num_classes).init(device),
            activation: Relu::new(),
        }
    }
}

/// 運転者画像分類用CNNモデル
///
/// # アーキテクチャ
/// - {Conv 3x3 (same padding) + ReLU + MaxPool 2x2} x 2層
/// - Conv 3x3 (same padding) + ReLU
/// - Global Average Pooling
/// - FC: c3 -> c2 + ReLU
/// - FC: c2 -> num_classes
/// - Softmax (分類時)
///
/// 入力はチャネル末尾の `[batch, height, width, 3]` で受け取り、内部でチャネル先頭に並べ替えます。
#[derive(Module, Debug)]
pub struct DriverClassifier<B: Backend> {
    conv1: Conv2d<B>,
    conv2: Conv2d<B>,
    conv3: Conv2d<B>,
    pool: MaxPool2d,
    gap: AdaptiveAvgPool2d,

    // 全結合層
    fc1: Linear<B>,
    fc2: Linear<B>,

    activation: Relu,
}

impl<B: Backend> DriverClassifier<B> {
    /// 順伝播
    ///
    /// # 引数
    /// - `images`: バッチ画像 [batch_size, height, width, 3]（値域 0.0〜1.0）
    ///
    /// # 戻り値
    /// - クラスごとのロジット [batch_size, num_classes]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let [batch_size, _, _, _] = images.dims();
        let x = images.permute([0, 3, 1, 2]);

        let x = self.conv1.forward(x);
        let x = self.activation.forward(x);
        let x = self.pool.forward(x);

        let x = self.conv2.forward(x);
        let x = self.activation.forward(x);
        let x = self.pool.forward(x);

        let x = self.conv3.forward(x);
        let x = self.activation.forward(x);
        let x = self.gap.forward(x);

        let [_, channels, _, _] = x.dims();
        let x = x.reshape([batch_size, channels]);

        let x = self.fc1.forward(x);
        let x = self.activation.forward(x);

        self.fc2.forward(x)
    }

    /// クラスごとの確率を計算 [batch_size, num_classes]
    pub fn probabilities(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        softmax(self.forward(images), 1)
    }
}

/// 正規化済みの入力テンソル
///
/// 画素値を255で割って 0.0〜1.0 に収め、先頭にバッチ次元 1 を付けた
/// `[1, height, width, 3]` の並び（行優先、チャネル末尾）で保持します。
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedTensor {
    data: Vec<f32>,
    height: usize,
    width: usize,
}

impl NormalizedTensor {
    /// RGB画像から正規化テンソルを作成
    pub fn from_image(img: &RgbImage) -> Self {
        let (width, height) = img.dimensions();
        let data = img
            .as_raw()
            .iter()
            .map(|&value| value as f32 / 255.0)
            .collect();

        Self {
            data,
            height: height as usize,
            width: width as usize,
        }
    }

    /// テンソル形状 [1, height, width, 3]
    pub fn shape(&self) -> [usize; 4] {
        [1, self.height, self.width, INPUT_CHANNELS]
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::TensorData;
    use burn_ndarray::{NdArray, NdArrayDevice};
    use image::Rgb;

    type TestBackend = NdArray;

    #[test]
    fn test_class_table() {
        assert_eq!(CLASS_NAMES.len(), NUM_CLASSES);
        assert_eq!(class_label(0), Some("c0"));
        assert_eq!(class_label(9), Some("c9"));
        assert_eq!(class_label(10), None);
    }

    #[test]
    fn test_normalized_tensor_layout() {
        let mut img = RgbImage::new(2, 1);
        img.put_pixel(0, 0, Rgb([0, 255, 51]));
        img.put_pixel(1, 0, Rgb([255, 0, 102]));

        let tensor = NormalizedTensor::from_image(&img);
        assert_eq!(tensor.shape(), [1, 1, 2, 3]);
        assert_eq!(tensor.data(), &[0.0, 1.0, 0.2, 1.0, 0.0, 0.4]);
    }

    #[test]
    fn test_forward_output_shape() {
        let device = NdArrayDevice::default();
        let model = ModelConfig::new(NUM_CLASSES)
            .with_base_channels(4)
            .init::<TestBackend>(&device);

        let input = Tensor::<TestBackend, 4>::from_data(
            TensorData::new(vec![0.5f32; 2 * 16 * 16 * 3], [2, 16, 16, 3]),
            &device,
        );
        let output = model.forward(input);
        assert_eq!(output.dims(), [2, NUM_CLASSES]);
    }

    #[test]
    fn test_probabilities_sum_to_one() {
        let device = NdArrayDevice::default();
        let model = ModelConfig::new(NUM_CLASSES)
            .with_base_channels(4)
            .init::<TestBackend>(&device);

        let input = Tensor::<TestBackend, 4>::from_data(
            TensorData::new(vec![0.25f32; 12 * 20 * 3], [1, 12, 20, 3]),
            &device,
        );
        let probs = model
            .probabilities(input)
            .into_data()
            .to_vec::<f32>()
            .unwrap();

        assert_eq!(probs.len(), NUM_CLASSES);
        assert!(probs.iter().all(|p| (0.0..=1.0).contains(p)));
        let sum: f32 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-4, "sum = {}", sum);
    }
}
