//! ページ表示
//!
//! サイドバーで選択する3つのページ（Home / Image Predictor / About Us）を
//! 列挙型で表し、ページごとの描画関数で表示内容を組み立てます。

use anyhow::{Context, Result};
use base64::{engine::general_purpose, Engine as _};
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

use crate::model::AssetSettings;
use crate::predictor::ACCEPTED_EXTENSIONS;
use crate::types::{PageEntry, PageView, Section, TeamMember};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PageError {
    #[error("Unknown page: {0}")]
    UnknownPage(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Home,
    ImagePredictor,
    AboutUs,
}

impl Page {
    /// サイドバーの表示順
    pub const ALL: [Page; 3] = [Page::Home, Page::ImagePredictor, Page::AboutUs];

    pub fn id(&self) -> &'static str {
        match self {
            Page::Home => "home",
            Page::ImagePredictor => "image_predictor",
            Page::AboutUs => "about_us",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Page::Home => "Home",
            Page::ImagePredictor => "Image Predictor",
            Page::AboutUs => "About Us",
        }
    }

    pub fn entries() -> Vec<PageEntry> {
        Self::ALL
            .iter()
            .map(|page| PageEntry {
                id: page.id().to_string(),
                label: page.label().to_string(),
            })
            .collect()
    }
}

impl FromStr for Page {
    type Err = PageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|page| page.id() == s)
            .ok_or_else(|| PageError::UnknownPage(s.to_string()))
    }
}

/// 画像ファイルを読み込んでdata URLに変換
///
/// デコードできない画像はエラーにします。
fn image_file_data_url(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read image: {:?}", path))?;
    let format = image::guess_format(&bytes)
        .with_context(|| format!("Unknown image format: {:?}", path))?;
    image::load_from_memory_with_format(&bytes, format)
        .with_context(|| format!("Failed to decode image: {:?}", path))?;

    Ok(format!(
        "data:{};base64,{}",
        format.to_mime_type(),
        general_purpose::STANDARD.encode(&bytes)
    ))
}

/// 各ページのヘッダー画像（起動時に読み込み済み）
#[derive(Debug, Clone)]
pub struct PageAssets {
    home_header: String,
    predictor_header: String,
    about_header: String,
}

impl PageAssets {
    /// ヘッダー画像をすべて読み込む。1つでも読めなければエラー
    pub fn load(settings: &AssetSettings) -> Result<Self> {
        Ok(Self {
            home_header: image_file_data_url(Path::new(&settings.home_image))?,
            predictor_header: image_file_data_url(Path::new(&settings.predictor_image))?,
            about_header: image_file_data_url(Path::new(&settings.about_image))?,
        })
    }
}

const HOME_TITLE: &str = "Distracted Driver App";

const BUSINESS_OVERVIEW: &str = "\
You're probably wondering why this APP? Well, road safety remains a critical concern around the world, \
with distracted driving claimed as being a leading cause of accidents. Distracted driving accounts for at \
least **9%** of annual car accidents in USA and is the leading cause of accidents worldwide.

According to an NTSA report on accidents in 2023, **1,072** people were killed on our roads, with the main \
causes being drunk driving, speeding and distracted driving. In Kenya we already have measures in place to \
tackle the first two: Alcoblow for drunk-driving, speed guns and speed governors for speeding. There seems \
to be nothing in place to tackle the third cause and that is where our project comes in.

This project aims to leverage computer vision and machine learning techniques to develop a system capable \
of detecting distracted drivers in real-time, contributing to enhanced road safety measures.";

const PROBLEM_STATEMENT: &str = "\
Distracted driving poses significant risks, including accidents, injuries, and fatalities. Identifying and \
mitigating instances of distraction while driving is crucial to reducing road accidents.

The ballooning of car insurance claims led Directline Insurance, Kenya, to engage us in this project, with \
a vision to lower the rising claims from their customers.";

const TEAM_INTRO: &str =
    "We are all data science students from Flat Iron Moringa School, working on our capstone project.";

const TEAM: [(&str, Option<&str>); 7] = [
    ("Leonard Gachimu", Some("https://github.com/leogachimu")),
    ("Rowlandson Kariuki", None),
    ("Francis Njenga", Some("https://github.com/GaturaN")),
    ("Mourine Mwangi", None),
    ("Khadija Omar", None),
    ("Victor Mawira", None),
    ("Onesphoro Kibunja", Some("https://github.com/Ones-Muiru")),
];

fn render_home(assets: &PageAssets) -> PageView {
    PageView::Home {
        header_image: assets.home_header.clone(),
        title: HOME_TITLE.to_string(),
        sections: vec![
            Section {
                heading: "Business Overview".to_string(),
                markdown: BUSINESS_OVERVIEW.to_string(),
            },
            Section {
                heading: "Problem Statement".to_string(),
                markdown: PROBLEM_STATEMENT.to_string(),
            },
        ],
    }
}

fn render_image_predictor(assets: &PageAssets) -> PageView {
    PageView::ImagePredictor {
        header_image: assets.predictor_header.clone(),
        title: "Driver Image Classification App".to_string(),
        upload_label: "Choose a driver image...".to_string(),
        accepted_extensions: ACCEPTED_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
    }
}

fn render_about_us(assets: &PageAssets) -> PageView {
    PageView::AboutUs {
        header_image: assets.about_header.clone(),
        title: "About Us".to_string(),
        subheader: "Meet the Team".to_string(),
        intro: TEAM_INTRO.to_string(),
        team: TEAM
            .iter()
            .map(|(name, link)| TeamMember {
                name: name.to_string(),
                link: link.map(|l| l.to_string()),
            })
            .collect(),
    }
}

/// ページの表示内容を組み立てる
pub fn render(page: Page, assets: &PageAssets) -> PageView {
    match page {
        Page::Home => render_home(assets),
        Page::ImagePredictor => render_image_predictor(assets),
        Page::AboutUs => render_about_us(assets),
    }
}
