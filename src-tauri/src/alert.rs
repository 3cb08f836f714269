//! 警告音の判定と再生
//!
//! 安全運転クラス（c1）以外が予測されたときに警告音を鳴らします。
//! 再生はGStreamerの playbin で行い、再生が終わるまで呼び出し元をブロックします。

use anyhow::{Context, Result};
use gstreamer::prelude::*;
use gstreamer::{self as gst, ElementFactory};
use std::path::{Path, PathBuf};

/// 安全運転クラスのラベル
pub const SAFE_CLASS: &str = "c1";

/// 警告音を鳴らすべきか
pub fn should_alert(label: &str) -> bool {
    label != SAFE_CLASS
}

/// 警告音の出力先
pub trait AlertSink {
    /// 再生が完了するまでブロックする
    fn play(&self) -> Result<()>;
}

/// 警告処理の結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertOutcome {
    /// 安全運転のため鳴らさなかった
    NotTriggered,
    /// 再生完了
    Played,
    /// 再生に失敗した（ログ出力済み）
    Failed(String),
}

impl AlertOutcome {
    pub fn triggered(&self) -> bool {
        !matches!(self, AlertOutcome::NotTriggered)
    }
}

/// 予測ラベルに応じて警告音を再生
///
/// 再生の失敗は呼び出し元に伝播させず、ログに残して結果として返します。
pub fn trigger_alert(label: &str, sink: &dyn AlertSink) -> AlertOutcome {
    if !should_alert(label) {
        return AlertOutcome::NotTriggered;
    }

    tracing::info!(label, "警告音を再生します");
    match sink.play() {
        Ok(()) => AlertOutcome::Played,
        Err(e) => {
            tracing::warn!("警告音の再生に失敗しました: {:#}", e);
            AlertOutcome::Failed(format!("{:#}", e))
        }
    }
}

fn file_uri(path: &Path) -> Result<String> {
    if !path.exists() {
        anyhow::bail!("警告音ファイルが見つかりません: {:?}", path);
    }
    let canonical = path
        .canonicalize()
        .context("警告音ファイルのパスを解決できませんでした")?;
    Ok(url::Url::from_file_path(&canonical)
        .map_err(|_| anyhow::anyhow!("ファイルパスからURIへの変換に失敗しました"))?
        .to_string())
}

/// GStreamerによる警告音プレイヤー
#[derive(Debug, Clone)]
pub struct AlertPlayer {
    sound_path: PathBuf,
}

impl AlertPlayer {
    pub fn new<P: Into<PathBuf>>(sound_path: P) -> Self {
        Self {
            sound_path: sound_path.into(),
        }
    }

    pub fn sound_path(&self) -> &Path {
        &self.sound_path
    }

    /// 音声ファイルを解析して再生時間（ミリ秒）を返す
    ///
    /// 起動時の確認用。音声ストリームが無い場合はエラー。
    pub fn probe(&self) -> Result<Option<u64>> {
        let uri = file_uri(&self.sound_path)?;
        gst::init().context("GStreamerの初期化に失敗しました")?;

        let discoverer = gstreamer_pbutils::Discoverer::new(gst::ClockTime::from_seconds(5))
            .context("Discovererの作成に失敗しました")?;
        let info = discoverer
            .discover_uri(&uri)
            .context("警告音ファイルの解析に失敗しました")?;

        if info.audio_streams().is_empty() {
            anyhow::bail!("音声ストリームが見つかりません: {:?}", self.sound_path);
        }

        Ok(info.duration().map(|d| d.mseconds()))
    }
}

impl AlertSink for AlertPlayer {
    fn play(&self) -> Result<()> {
        let uri = file_uri(&self.sound_path)?;
        gst::init().context("GStreamerの初期化に失敗しました")?;

        let playbin = ElementFactory::make("playbin")
            .name("alert")
            .property("uri", uri.as_str())
            .build()
            .context("playbinの作成に失敗しました")?;

        playbin
            .set_state(gst::State::Playing)
            .context("再生の開始に失敗しました")?;

        let bus = playbin
            .bus()
            .ok_or_else(|| anyhow::anyhow!("playbinにバスがありません"))?;

        let mut result = Ok(());
        for msg in bus.iter_timed(gst::ClockTime::NONE) {
            use gst::MessageView;

            match msg.view() {
                MessageView::Eos(..) => break,
                MessageView::Error(err) => {
                    result = Err(anyhow::anyhow!(
                        "再生エラー: {} (デバッグ情報: {:?})",
                        err.error(),
                        err.debug()
                    ));
                    break;
                }
                _ => (),
            }
        }

        // 再生エラーを停止失敗で上書きしない
        if let Err(e) = playbin.set_state(gst::State::Null) {
            tracing::warn!("再生の停止に失敗しました: {:?}", e);
        }

        result
    }
}
