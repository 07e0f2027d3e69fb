//! 通用常量.

use crate::Idx2d;

/// Allen 图谱配准图的像素分辨率, 以 µm 为单位.
pub const ATLAS_SCALE: f64 = 25.0;

/// Allen 冠状图谱最后一个合法切片索引.
pub const ATLAS_LAST_INDEX: usize = 528;

/// 前囟 (bregma) 在图谱前后轴上的物理位置, 以 µm 为单位.
pub const BREGMA_IN_ATLAS_UM: f64 = 5525.0;

/// VSI 原始切片图像的像素分辨率, 以 µm 为单位.
pub const VSI_PIXEL_SCALE: f64 = 0.64497;

/// 配准后 region map / hemisphere map 的栅格形状 (行, 列).
pub const ATLAS_MAP_SHAPE: Idx2d = (320, 456);

/// 半球标签值.
pub mod hemisphere {
    /// 不属于任何半球 (配准图背景).
    pub const HEMI_NONE: u8 = 0;

    /// 半球标签值之一. todo: 确认 1/2 与左/右的实际对应关系.
    pub const HEMI_LEFT: u8 = 1;

    /// 半球标签值之一. 参见 [`HEMI_LEFT`] 的说明.
    pub const HEMI_RIGHT: u8 = 2;

    /// 像素是否不属于任何半球?
    #[inline]
    pub const fn is_none(p: u8) -> bool {
        matches!(p, HEMI_NONE)
    }

    /// 像素是否属于某个半球?
    #[inline]
    pub const fn is_hemisphere(p: u8) -> bool {
        matches!(p, HEMI_LEFT | HEMI_RIGHT)
    }
}

/// 脑区标签值.
pub mod region {
    /// 配准图中 "无脑区" 哨兵值, 代表背景.
    pub const NO_REGION: u32 = 0;

    /// 像素是否是背景?
    #[inline]
    pub const fn is_background(p: u32) -> bool {
        matches!(p, NO_REGION)
    }
}
