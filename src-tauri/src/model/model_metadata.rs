//! モデルメタデータの定義と永続化
//!
//! tar.gz形式でモデルと関連するメタデータを保存・読み込みします。
//!
//! ## 入力画像の仕様
//! - RGB 3チャネル、`input_width` x `input_height` ピクセル
//! - 画素値は255で割って 0.0〜1.0 に正規化
//! - 形状が一致しない画像はリサイズせずにエラーとする

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::ml::{CLASS_NAMES, NUM_CLASSES};

fn default_base_channels() -> usize {
    32
}

/// モデルメタデータ
///
/// tar.gz形式で保存される情報：
/// - metadata.json: このメタデータ（JSON形式）
/// - model.bin: モデルの重み（バイナリ）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// 全クラスラベル（インデックス順）
    /// 例: ["c0", "c1", ..., "c9"]
    pub class_labels: Vec<String>,

    /// モデル入力画像の幅（ピクセル）
    pub input_width: u32,

    /// モデル入力画像の高さ（ピクセル）
    pub input_height: u32,

    /// 最初の畳み込み層のチャネル数
    #[serde(default = "default_base_channels")]
    pub base_channels: usize,

    /// モデルの説明（変換元など）
    #[serde(default)]
    pub description: String,

    /// モデルの書き出し時刻（ISO8601形式）
    pub exported_at: String,
}

impl ModelMetadata {
    /// 新しいメタデータを作成
    pub fn new(
        input_width: u32,
        input_height: u32,
        base_channels: usize,
        description: impl Into<String>,
    ) -> Self {
        let exported_at = chrono::Local::now().to_rfc3339();

        Self {
            class_labels: CLASS_NAMES.iter().map(|s| s.to_string()).collect(),
            input_width,
            input_height,
            base_channels,
            description: description.into(),
            exported_at,
        }
    }

    /// メタデータの整合性を確認
    ///
    /// クラスラベルは c0〜c9 の10個が順番通りに並んでいる必要があります。
    pub fn validate(&self) -> Result<()> {
        if self.class_labels.len() != NUM_CLASSES
            || self
                .class_labels
                .iter()
                .zip(CLASS_NAMES.iter())
                .any(|(actual, expected)| actual != expected)
        {
            anyhow::bail!(
                "Unexpected class labels in model metadata: [{}] (expected [{}])",
                self.class_labels.join(", "),
                CLASS_NAMES.join(", ")
            );
        }

        // MaxPool 2x2 を2回通すため最低4ピクセル必要
        if self.input_width < 4 || self.input_height < 4 {
            anyhow::bail!(
                "Model input size too small: {}x{} (minimum 4x4)",
                self.input_width,
                self.input_height
            );
        }

        if self.base_channels == 0 {
            anyhow::bail!("base_channels must be greater than zero");
        }

        Ok(())
    }

    /// メタデータをJSON文字列に変換
    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize metadata to JSON")
    }

    /// JSON文字列からメタデータを生成
    pub fn from_json_string(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to deserialize metadata from JSON")
    }
}
