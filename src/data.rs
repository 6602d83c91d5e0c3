//! 分类原始数据：外部采集器的输出契约
//!
//! 采集器（天气、行情、新闻等）各自产出纯文本，部分还附带图表文件。两种形态统一为
//! CategoryData { text, chart_refs }，纯文本时 chart_refs 为空。
//!
//! 目录约定：`<data_dir>/<category>.txt` 为纯文本；`<data_dir>/<category>.json` 为
//! 字符串或 `{ "text": ..., "chart_refs": [...] }`。同一分类两者都存在时以 JSON 为准。

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::DataError;

/// 分类缺少数据时交给 Agent 的占位文本
pub const MISSING_DATA: &str = "No data available.";

/// 单个分类的原始数据
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CategoryData {
    pub text: String,
    pub chart_refs: Vec<PathBuf>,
}

impl CategoryData {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            chart_refs: Vec::new(),
        }
    }

    pub fn with_charts(text: impl Into<String>, chart_refs: Vec<PathBuf>) -> Self {
        Self {
            text: text.into(),
            chart_refs,
        }
    }
}

/// 采集器 JSON 输出的两种形态
#[derive(Deserialize)]
#[serde(untagged)]
enum RawCategoryData {
    Text(String),
    Structured {
        text: String,
        #[serde(default)]
        chart_refs: Vec<PathBuf>,
    },
}

impl From<RawCategoryData> for CategoryData {
    fn from(raw: RawCategoryData) -> Self {
        match raw {
            RawCategoryData::Text(text) => CategoryData::text(text),
            RawCategoryData::Structured { text, chart_refs } => {
                CategoryData::with_charts(text, chart_refs)
            }
        }
    }
}

impl<'de> Deserialize<'de> for CategoryData {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        RawCategoryData::deserialize(deserializer).map(Into::into)
    }
}

/// 读取数据目录；目录不存在时返回空集合（所有分类都会拿到占位文本）
pub fn load_category_data(dir: impl AsRef<Path>) -> Result<BTreeMap<String, CategoryData>, DataError> {
    let dir = dir.as_ref();
    let mut data = BTreeMap::new();
    if !dir.exists() {
        tracing::warn!(dir = %dir.display(), "Data directory missing, every category gets placeholder data");
        return Ok(data);
    }

    let mut json_files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let Some(category) = path.file_stem().and_then(|s| s.to_str()).map(String::from) else {
            continue;
        };
        match path.extension().and_then(|e| e.to_str()) {
            Some("txt") => {
                let text = std::fs::read_to_string(&path)?;
                data.entry(category).or_insert_with(|| CategoryData::text(text));
            }
            Some("json") => json_files.push((category, path)),
            _ => {}
        }
    }

    for (category, path) in json_files {
        let raw = std::fs::read_to_string(&path)?;
        let parsed: CategoryData = serde_json::from_str(&raw).map_err(|source| DataError::Json {
            file: path.display().to_string(),
            source,
        })?;
        data.insert(category, parsed);
    }

    tracing::info!(categories = data.len(), "Loaded category data");
    Ok(data)
}
