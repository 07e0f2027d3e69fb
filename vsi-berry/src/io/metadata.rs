//! 实验元数据管理.
//!
//! 每个实验目录下的 `.registrationData/metadata.json` 记录该实验全部
//! 切片的配准产物位置与人工标注 (深度坐标, 排除区域等). 本模块提供
//! 该文件的类型化读写与按切片名检索.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// 配准产物目录名.
pub const REGISTRATION_DIR: &str = ".registrationData";

/// 元数据文件名.
pub const METADATA_FILE: &str = "metadata.json";

/// 单张切片的配准元数据.
///
/// 字段名与磁盘上的 JSON 键 (camelCase) 对应.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlideMeta {
    /// 原始 VSI 文件路径, 相对实验目录.
    pub vsi_path: String,

    /// 切片在图谱坐标系中的前后位置 (到 bregma 的毫米数).
    pub atlas_coord: f64,

    /// 配准后的 region map (MHD 头文件) 路径, 相对实验目录.
    pub registered_atlas_labels_path: String,

    /// 配准后的 hemisphere map (MHD 头文件) 路径, 相对实验目录.
    pub registered_hemisphere_labels_path: String,

    /// 统计时应排除的 (脑区, 半球) 组合.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region_ids_to_exclude: Option<Vec<(u32, u8)>>,

    /// 人工审核结论: 该切片是否可用.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slice_usable: Option<bool>,

    /// 整张切片是否从统计中排除.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude: Option<bool>,
}

impl SlideMeta {
    /// 切片是否应计入统计. `exclude` 与 `slice_usable` 缺省时视为可用.
    #[inline]
    pub fn is_usable(&self) -> bool {
        !self.exclude.unwrap_or(false) && self.slice_usable.unwrap_or(true)
    }
}

/// 元数据读写错误.
#[derive(Debug)]
pub enum MetadataError {
    /// 底层 I/O 错误.
    IoError(std::io::Error),

    /// JSON 解析或序列化错误.
    JsonError(serde_json::Error),
}

/// 一个实验目录的全部切片元数据.
#[derive(Clone, Debug, Default)]
pub struct ExperimentMetadata {
    entries: Vec<SlideMeta>,
}

impl ExperimentMetadata {
    /// 空元数据集.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// 元数据文件在实验目录下的路径.
    pub fn file_path(experiment_path: impl AsRef<Path>) -> PathBuf {
        experiment_path
            .as_ref()
            .join(REGISTRATION_DIR)
            .join(METADATA_FILE)
    }

    /// 从实验目录加载元数据. 文件不存在返回 `Err(IoError)`.
    pub fn load(experiment_path: impl AsRef<Path>) -> Result<Self, MetadataError> {
        let text =
            fs::read_to_string(Self::file_path(experiment_path)).map_err(MetadataError::IoError)?;
        let entries = serde_json::from_str(&text).map_err(MetadataError::JsonError)?;
        Ok(Self { entries })
    }

    /// 把元数据写回实验目录, 必要时创建 `.registrationData` 子目录.
    ///
    /// 输出为带缩进的 JSON, 便于人工核对与修改.
    pub fn save(&self, experiment_path: impl AsRef<Path>) -> Result<(), MetadataError> {
        let dir = experiment_path.as_ref().join(REGISTRATION_DIR);
        fs::create_dir_all(&dir).map_err(MetadataError::IoError)?;
        let text =
            serde_json::to_string_pretty(&self.entries).map_err(MetadataError::JsonError)?;
        fs::write(dir.join(METADATA_FILE), text).map_err(MetadataError::IoError)
    }

    /// 全部条目, 按文件内顺序.
    #[inline]
    pub fn entries(&self) -> &[SlideMeta] {
        &self.entries
    }

    /// 追加一个条目.
    #[inline]
    pub fn push(&mut self, meta: SlideMeta) {
        self.entries.push(meta);
    }

    /// 按 VSI 路径精确检索.
    pub fn entry_by_path(&self, vsi_path: &str) -> Option<&SlideMeta> {
        self.entries.iter().find(|m| m.vsi_path == vsi_path)
    }

    /// 按 VSI 文件名 (子串匹配) 检索.
    ///
    /// 存在多个匹配时返回第一个并输出 warning.
    pub fn entry_by_vsi_name(&self, name: &str) -> Option<&SlideMeta> {
        let mut hits = self.entries.iter().filter(|m| m.vsi_path.contains(name));
        let first = hits.next()?;
        if hits.next().is_some() {
            log::warn!("multiple metadata entries match vsi name {name:?}, using the first");
        }
        Some(first)
    }

    /// 迭代可用切片 (见 [`SlideMeta::is_usable`]).
    pub fn usable_entries(&self) -> impl Iterator<Item = &SlideMeta> {
        self.entries.iter().filter(|m| m.is_usable())
    }
}
