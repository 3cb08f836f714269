use serde::{Deserialize, Serialize};

/// サイドバーに表示するページ項目
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PageEntry {
    pub id: String,
    pub label: String,
}

/// Markdown形式のセクション
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Section {
    pub heading: String,
    pub markdown: String,
}

/// チームメンバー（リンクが未登録のメンバーは名前のみ表示）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TeamMember {
    pub name: String,
    pub link: Option<String>,
}

/// 1ページ分の表示内容
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PageView {
    Home {
        header_image: String,
        title: String,
        sections: Vec<Section>,
    },
    ImagePredictor {
        header_image: String,
        title: String,
        upload_label: String,
        accepted_extensions: Vec<String>,
    },
    AboutUs {
        header_image: String,
        title: String,
        subheader: String,
        intro: String,
        team: Vec<TeamMember>,
    },
}

/// 画像分類の結果表示
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PredictionView {
    /// 予測クラスのラベル (例: "c3")
    pub predicted_class: String,
    /// 予測クラスの確率 (0.0〜1.0)
    pub confidence: f32,
    /// "Predicted Class: c3"
    pub class_line: String,
    /// "Confidence: 55.00%"
    pub confidence_line: String,
    /// 警告音の判定が出たか
    pub alert_triggered: bool,
    /// 警告音を最後まで再生できたか
    pub alert_played: bool,
    /// アップロード画像のプレビュー（PNGのdata URL）
    pub preview: String,
    pub preview_caption: String,
}

/// 読み込み済みモデルの情報
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelInfo {
    pub class_labels: Vec<String>,
    pub input_width: u32,
    pub input_height: u32,
    pub device: String,
    pub description: String,
    pub exported_at: String,
}
