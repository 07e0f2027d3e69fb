//! 检测结果数据结构.
//!
//! [`Cell`] 是检测器在单个分块上报告的原始检测, 坐标为像素;
//! [`PhysicalCell`] 是换算到物理坐标 (µm) 后的检测, 可持久化.

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::{conversion, Idx2d, Idx2dF};

mod compact;
mod record;

pub use compact::{CompactHemisphereMap, CompactRegionMap};
pub use record::{LoadRecordError, SlideRecord};
pub(crate) use record::StoredRecord;

/// 半开边界框 (min_row, min_col, max_row, max_col), 上界不含.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox<T> {
    /// 上边界 (含).
    pub min_row: T,

    /// 左边界 (含).
    pub min_col: T,

    /// 下边界 (不含).
    pub max_row: T,

    /// 右边界 (不含).
    pub max_col: T,
}

impl BoundingBox<usize> {
    /// 边界框形状 (高, 宽).
    #[inline]
    pub fn shape(&self) -> Idx2d {
        (self.max_row - self.min_row, self.max_col - self.min_col)
    }

    /// 边界框是否包含给定 (行, 列) 坐标?
    #[inline]
    pub fn contains(&self, (row, col): Idx2dF) -> bool {
        self.min_row as f64 <= row
            && row < self.max_row as f64
            && self.min_col as f64 <= col
            && col < self.max_col as f64
    }
}

/// 检测器在单个分块上报告的一个细胞.
///
/// 质心与边界框坐标既可能在分块局部坐标系, 也可能在全图坐标系;
/// 经过 [`crate::chunk::DuplicateFilter`] 后恒为全图坐标系.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Cell {
    centroid: Idx2dF,
    bbox: BoundingBox<usize>,
    mask: Array2<bool>,
    image: Array2<u16>,
}

impl Cell {
    /// 构建细胞检测.
    ///
    /// 以下任一条件不满足时程序 panic (这些情况均代表检测器输出畸形,
    /// 属于上游编程错误):
    ///
    /// 1. `mask` 与 `image` 的形状等于 `bbox` 的形状;
    /// 2. `centroid` 位于 `bbox` 内部;
    /// 3. `bbox` 的上界不小于下界.
    pub fn new(centroid: Idx2dF, bbox: BoundingBox<usize>, mask: Array2<bool>, image: Array2<u16>) -> Self {
        assert!(
            bbox.min_row <= bbox.max_row && bbox.min_col <= bbox.max_col,
            "malformed bounding box: {bbox:?}"
        );
        assert_eq!(mask.dim(), bbox.shape(), "mask shape does not match bbox");
        assert_eq!(image.dim(), bbox.shape(), "image shape does not match bbox");
        assert!(
            bbox.contains(centroid),
            "centroid {centroid:?} outside bbox {bbox:?}"
        );
        Self {
            centroid,
            bbox,
            mask,
            image,
        }
    }

    /// 质心 (行, 列).
    #[inline]
    pub fn centroid(&self) -> Idx2dF {
        self.centroid
    }

    /// 像素边界框.
    #[inline]
    pub fn bbox(&self) -> BoundingBox<usize> {
        self.bbox
    }

    /// 二值掩膜, 形状与边界框一致.
    #[inline]
    pub fn mask(&self) -> &Array2<bool> {
        &self.mask
    }

    /// 裁剪出的图像块, 形状与边界框一致.
    #[inline]
    pub fn image(&self) -> &Array2<u16> {
        &self.image
    }

    /// 把质心和边界框整体平移 `(rows, cols)`.
    ///
    /// 用于把分块局部坐标转换为全图坐标.
    pub fn translate(&mut self, (rows, cols): Idx2d) {
        self.centroid.0 += rows as f64;
        self.centroid.1 += cols as f64;
        self.bbox.min_row += rows;
        self.bbox.max_row += rows;
        self.bbox.min_col += cols;
        self.bbox.max_col += cols;
    }
}

/// 质心与边界框均已换算到物理坐标 (µm) 的细胞.
///
/// 结构携带换算时使用的 `pixel_scale`, 以便之后可复现地换算到任意
/// 目标栅格 (例如像素尺寸不同的图谱配准图).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PhysicalCell {
    centroid: Idx2dF,
    bbox: BoundingBox<f64>,
    mask: Array2<bool>,
    image: Array2<u16>,
    pixel_scale: f64,
}

impl PhysicalCell {
    /// 用 `pixel_scale` (µm) 把像素坐标系的 `cell` 换算为物理坐标系.
    ///
    /// `pixel_scale` 必须为正, 否则程序 panic.
    pub fn from_cell(cell: Cell, pixel_scale: f64) -> Self {
        assert!(pixel_scale > 0.0, "pixel_scale must be positive");
        let Cell {
            centroid,
            bbox,
            mask,
            image,
        } = cell;
        Self {
            centroid: (centroid.0 * pixel_scale, centroid.1 * pixel_scale),
            bbox: BoundingBox {
                min_row: bbox.min_row as f64 * pixel_scale,
                min_col: bbox.min_col as f64 * pixel_scale,
                max_row: bbox.max_row as f64 * pixel_scale,
                max_col: bbox.max_col as f64 * pixel_scale,
            },
            mask,
            image,
            pixel_scale,
        }
    }

    /// 物理质心 (µm, 行/列序).
    #[inline]
    pub fn centroid(&self) -> Idx2dF {
        self.centroid
    }

    /// 物理边界框 (µm).
    #[inline]
    pub fn bbox(&self) -> BoundingBox<f64> {
        self.bbox
    }

    /// 二值掩膜.
    #[inline]
    pub fn mask(&self) -> &Array2<bool> {
        &self.mask
    }

    /// 裁剪出的图像块.
    #[inline]
    pub fn image(&self) -> &Array2<u16> {
        &self.image
    }

    /// 换算时使用的像素物理尺寸 (µm).
    #[inline]
    pub fn pixel_scale(&self) -> f64 {
        self.pixel_scale
    }

    /// 质心在像素尺寸为 `scale` 的栅格上的整数索引, 叠加 `offset` 偏移.
    ///
    /// 任一分量为负时返回 `None`, 调用方应将其视为越界.
    #[inline]
    pub fn centroid_as_index_scaled(&self, scale: f64, offset: Idx2d) -> Option<Idx2d> {
        conversion::centroid_to_raster_index(self.centroid, scale, offset)
    }

    /// 质心在原生分辨率 (`self.pixel_scale`) 栅格上的整数索引.
    #[inline]
    pub fn centroid_as_index(&self) -> Option<Idx2d> {
        self.centroid_as_index_scaled(self.pixel_scale, (0, 0))
    }
}
