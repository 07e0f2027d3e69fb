//! 切片记录.

use std::path::Path;

use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

use super::{CompactHemisphereMap, CompactRegionMap, PhysicalCell};
use crate::consts::ATLAS_SCALE;
use crate::io::metadata::SlideMeta;
use crate::io::mhd::{self, MhdError};
use crate::{conversion, Idx2d};

/// 从元数据构建 [`SlideRecord`] 的错误.
#[derive(Debug)]
pub enum LoadRecordError {
    /// region map 文件加载失败.
    RegionMap(MhdError),

    /// hemisphere map 文件加载失败.
    HemisphereMap(MhdError),
}

/// 一张 VSI 切片的完整描述: 配准图, 偏移与检测到的细胞列表.
///
/// 记录以 `source_path` 标识, 随着分块处理逐步追加细胞,
/// 持久化到 [`crate::io::store::RecordDb`] 后即视为不可变.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SlideRecord {
    source_path: String,
    region_map: Array2<u32>,
    hemisphere_map: Array2<u8>,
    region_map_scale: f64,
    region_map_offset: Idx2d,
    depth: f64,
    vsi_resolution: Idx2d,
    cells: Vec<PhysicalCell>,
}

impl SlideRecord {
    /// 直接构建切片记录.
    ///
    /// `region_map_scale` 取 [`ATLAS_SCALE`], 偏移与 VSI 分辨率为零,
    /// 细胞列表为空; 之后用对应 setter 填充.
    pub fn new(
        source_path: impl Into<String>,
        region_map: Array2<u32>,
        hemisphere_map: Array2<u8>,
        depth: f64,
    ) -> Self {
        Self {
            source_path: source_path.into(),
            region_map,
            hemisphere_map,
            region_map_scale: ATLAS_SCALE,
            region_map_offset: (0, 0),
            depth,
            vsi_resolution: (0, 0),
            cells: Vec::new(),
        }
    }

    /// 从实验元数据条目构建切片记录, 加载其引用的两张配准图.
    ///
    /// `flip` / `flop` 分别表示加载后对两张配准图做上下 / 左右翻转,
    /// 用于修正配准阶段的方向差异.
    pub fn from_metadata(
        meta: &SlideMeta,
        experiment_path: impl AsRef<Path>,
        flip: bool,
        flop: bool,
    ) -> Result<Self, LoadRecordError> {
        let root = experiment_path.as_ref();
        let (mut region_map, _) = mhd::load_mhd::<u32>(root.join(&meta.registered_atlas_labels_path))
            .map_err(LoadRecordError::RegionMap)?;
        let (mut hemisphere_map, _) =
            mhd::load_mhd::<u8>(root.join(&meta.registered_hemisphere_labels_path))
                .map_err(LoadRecordError::HemisphereMap)?;

        if flip {
            region_map.invert_axis(Axis(0));
            hemisphere_map.invert_axis(Axis(0));
        }
        if flop {
            region_map.invert_axis(Axis(1));
            hemisphere_map.invert_axis(Axis(1));
        }

        Ok(Self::new(
            meta.vsi_path.clone(),
            region_map,
            hemisphere_map,
            meta.atlas_coord,
        ))
    }

    /// 源 VSI 文件路径. 该字段同时是持久化键的来源.
    #[inline]
    pub fn source_path(&self) -> &str {
        &self.source_path
    }

    /// 配准得到的脑区标签栅格. 像素值为 Allen 图谱结构 id.
    #[inline]
    pub fn region_map(&self) -> &Array2<u32> {
        &self.region_map
    }

    /// 配准得到的半球标签栅格, 与 region map 对齐.
    #[inline]
    pub fn hemisphere_map(&self) -> &Array2<u8> {
        &self.hemisphere_map
    }

    /// 配准图的像素物理尺寸 (µm).
    #[inline]
    pub fn region_map_scale(&self) -> f64 {
        self.region_map_scale
    }

    /// 缩放后的切片在配准图中的居中偏移 (配准图像素).
    #[inline]
    pub fn region_map_offset(&self) -> Idx2d {
        self.region_map_offset
    }

    /// 设置配准图像素物理尺寸.
    #[inline]
    pub fn set_region_map_scale(&mut self, scale: f64) {
        self.region_map_scale = scale;
    }

    /// 设置配准图偏移. 参见 [`conversion::compute_region_offset`].
    #[inline]
    pub fn set_region_map_offset(&mut self, offset: Idx2d) {
        self.region_map_offset = offset;
    }

    /// 切片在图谱前后轴上的物理位置 (µm, 从脑前端起).
    #[inline]
    pub fn depth(&self) -> f64 {
        self.depth
    }

    /// 切片位置对应的图谱冠状切片索引.
    #[inline]
    pub fn depth_as_index(&self) -> usize {
        conversion::physical_to_index(self.depth)
    }

    /// 以图谱冠状切片索引的形式设置切片位置.
    #[inline]
    pub fn set_depth_by_index(&mut self, atlas_index: usize) {
        self.depth = conversion::index_to_physical(atlas_index);
    }

    /// 源 VSI 图像的原生分辨率 (行, 列).
    #[inline]
    pub fn vsi_resolution(&self) -> Idx2d {
        self.vsi_resolution
    }

    /// 设置源 VSI 图像的原生分辨率.
    #[inline]
    pub fn set_vsi_resolution(&mut self, resolution: Idx2d) {
        self.vsi_resolution = resolution;
    }

    /// 检测到的细胞列表, 保持追加顺序.
    #[inline]
    pub fn cells(&self) -> &[PhysicalCell] {
        &self.cells
    }

    /// 向记录追加一批细胞.
    #[inline]
    pub fn add_cells<I: IntoIterator<Item = PhysicalCell>>(&mut self, cells: I) {
        self.cells.extend(cells);
    }
}

/// 持久化形式: 两张配准图以压缩形式存储, 其余字段原样.
#[derive(Serialize, Deserialize)]
pub(crate) struct StoredRecord {
    source_path: String,
    region_map: CompactRegionMap,
    hemisphere_map: CompactHemisphereMap,
    region_map_scale: f64,
    region_map_offset: Idx2d,
    depth: f64,
    vsi_resolution: Idx2d,
    cells: Vec<PhysicalCell>,
}

impl From<&SlideRecord> for StoredRecord {
    fn from(rec: &SlideRecord) -> Self {
        Self {
            source_path: rec.source_path.clone(),
            region_map: CompactRegionMap::compress(&rec.region_map),
            hemisphere_map: CompactHemisphereMap::compress(&rec.hemisphere_map),
            region_map_scale: rec.region_map_scale,
            region_map_offset: rec.region_map_offset,
            depth: rec.depth,
            vsi_resolution: rec.vsi_resolution,
            cells: rec.cells.clone(),
        }
    }
}

impl From<StoredRecord> for SlideRecord {
    fn from(rec: StoredRecord) -> Self {
        Self {
            source_path: rec.source_path,
            region_map: rec.region_map.decompress(),
            hemisphere_map: rec.hemisphere_map.decompress(),
            region_map_scale: rec.region_map_scale,
            region_map_offset: rec.region_map_offset,
            depth: rec.depth,
            vsi_resolution: rec.vsi_resolution,
            cells: rec.cells,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn sample_record() -> SlideRecord {
        let region = Array2::from_shape_fn((4, 6), |(r, c)| (r * 6 + c) as u32);
        let hemi = Array2::from_elem((4, 6), 1u8);
        SlideRecord::new("a.vsi", region, hemi, 2500.0)
    }

    #[test]
    fn test_depth_index_round_trip() {
        let mut rec = sample_record();
        assert_eq!(rec.depth_as_index(), 100);
        rec.set_depth_by_index(42);
        assert_eq!(rec.depth(), 1050.0);
    }

    #[test]
    fn test_stored_form_round_trip() {
        let mut rec = sample_record();
        rec.set_region_map_offset((7, 9));
        let back = SlideRecord::from(StoredRecord::from(&rec));
        assert_eq!(back.source_path(), "a.vsi");
        assert_eq!(back.region_map(), rec.region_map());
        assert_eq!(back.region_map_offset(), (7, 9));
        assert_eq!(back.cells().len(), rec.cells().len());
    }
}
