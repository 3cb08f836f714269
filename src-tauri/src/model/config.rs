//! アプリケーション設定管理モジュール
//!
//! 計算デバイスやモデル・アセットのパスをJSON形式で保存・読み込みします。

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// 計算デバイスの種類
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum DeviceType {
    /// WGPU (GPU) バックエンド
    Wgpu,
    /// NdArray (CPU) バックエンド
    #[default]
    Cpu,
}

impl std::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceType::Wgpu => write!(f, "WGPU (GPU)"),
            DeviceType::Cpu => write!(f, "CPU (NdArray)"),
        }
    }
}

/// モデル設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSettings {
    /// 使用するモデルファイル（tar.gz）のパス
    pub model_path: String,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            model_path: "models/driver_classifier.tar.gz".to_string(),
        }
    }
}

/// 画像・音声アセットのパス
///
/// すべて作業ディレクトリからの相対パスで指定します。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetSettings {
    /// Homeページのヘッダー画像
    pub home_image: String,
    /// Image Predictorページのヘッダー画像
    pub predictor_image: String,
    /// About Usページのヘッダー画像
    pub about_image: String,
    /// 警告音
    pub alert_sound: String,
}

impl Default for AssetSettings {
    fn default() -> Self {
        Self {
            home_image: "assets/drive_safe.png".to_string(),
            predictor_image: "assets/be_safe.png".to_string(),
            about_image: "assets/drive_safe.png".to_string(),
            alert_sound: "assets/alert.wav".to_string(),
        }
    }
}

/// アプリケーション設定
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// 計算デバイスの種類
    #[serde(default)]
    pub device_type: DeviceType,
    /// モデル設定
    #[serde(default)]
    pub model: ModelSettings,
    /// アセット設定
    #[serde(default)]
    pub assets: AssetSettings,
}

impl AppConfig {
    /// 設定ファイルのデフォルトパス
    pub fn default_path() -> PathBuf {
        PathBuf::from("config.json")
    }

    /// 設定を読み込む
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: AppConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// 指定パスから設定を読み込む、存在しない・読めない場合はデフォルト設定を返す
    pub fn load_or_default_from<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!("設定ファイルが存在しません。デフォルト設定を使用します");
            return Self::default();
        }

        match Self::load(path) {
            Ok(config) => {
                tracing::info!("設定ファイルを読み込みました: {}", path.display());
                config
            }
            Err(e) => {
                tracing::warn!(
                    "設定ファイルの読み込みに失敗しました ({}): {}。デフォルト設定を使用します",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// デフォルトパスから設定を読み込む
    pub fn load_or_default() -> Self {
        Self::load_or_default_from(Self::default_path())
    }

    /// 設定を保存する
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// 設定情報をログに出力
    pub fn log_summary(&self) {
        tracing::info!(
            device = %self.device_type,
            model_path = %self.model.model_path,
            alert_sound = %self.assets.alert_sound,
            "アプリケーション設定"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.device_type, DeviceType::Cpu);
        assert_eq!(config.model.model_path, "models/driver_classifier.tar.gz");
        assert_eq!(config.assets.alert_sound, "assets/alert.wav");
    }

    #[test]
    fn test_default_assets_are_shipped() {
        let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("..");
        let assets = AssetSettings::default();
        assert_eq!(assets.home_image, "assets/drive_safe.png");
        for path in [
            &assets.home_image,
            &assets.predictor_image,
            &assets.about_image,
            &assets.alert_sound,
        ] {
            assert!(root.join(path).is_file(), "missing asset {}", path);
        }
    }

    #[test]
    fn test_serialize_deserialize() {
        let mut config = AppConfig::default();
        config.device_type = DeviceType::Wgpu;
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: AppConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(deserialized.device_type, DeviceType::Wgpu);
        assert_eq!(deserialized.assets.home_image, config.assets.home_image);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: AppConfig = serde_json::from_str(r#"{ "device_type": "Wgpu" }"#).unwrap();
        assert_eq!(config.device_type, DeviceType::Wgpu);
        assert_eq!(config.model.model_path, ModelSettings::default().model_path);
    }

    #[test]
    fn test_load_or_default_from_missing_or_broken_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = AppConfig::load_or_default_from(dir.path().join("none.json"));
        assert_eq!(missing.device_type, DeviceType::Cpu);

        let broken = dir.path().join("broken.json");
        fs::write(&broken, "{ not json").unwrap();
        let config = AppConfig::load_or_default_from(&broken);
        assert_eq!(config.model.model_path, ModelSettings::default().model_path);
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut config = AppConfig::default();
        config.model.model_path = "elsewhere/model.tar.gz".to_string();
        config.save(&path).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded.model.model_path, "elsewhere/model.tar.gz");
    }

    #[test]
    fn test_device_type_display() {
        assert_eq!(format!("{}", DeviceType::Wgpu), "WGPU (GPU)");
        assert_eq!(format!("{}", DeviceType::Cpu), "CPU (NdArray)");
    }
}
