//! 坐标转换.
//!
//! 像素坐标, 物理坐标 (µm) 和图谱索引之间的纯函数转换. 本模块无状态,
//! 所有图谱相关参数取自 [`crate::consts`].

use crate::consts::{ATLAS_LAST_INDEX, ATLAS_SCALE, BREGMA_IN_ATLAS_UM};
use crate::{Idx2d, Idx2dF};

/// 把像素坐标转换为物理坐标 (µm). `scale` 为单个像素的物理尺寸.
#[inline]
pub fn pixel_to_physical(coord: f64, scale: f64) -> f64 {
    coord * scale
}

/// 把物理坐标 (µm) 转换为像素坐标. `scale` 为单个像素的物理尺寸.
#[inline]
pub fn physical_to_pixel(coord_um: f64, scale: f64) -> f64 {
    coord_um / scale
}

/// 毫米转微米.
#[inline]
pub fn mm_to_um(mm: f64) -> f64 {
    mm * 1000.0
}

/// 微米转毫米.
#[inline]
pub fn um_to_mm(um: f64) -> f64 {
    um / 1000.0
}

/// 把前后轴物理坐标 (µm, 从脑前端起) 转换为图谱冠状切片索引.
///
/// 超出图谱范围的坐标会被钳制到第一个 / 最后一个合法索引,
/// 并输出 warning 级诊断, 不会失败.
pub fn physical_to_index(coord_um: f64) -> usize {
    let ind = (coord_um / ATLAS_SCALE).round();
    if ind < 0.0 {
        log::warn!("physical coordinate {coord_um} um maps to a negative atlas index, clamping to 0");
        0
    } else if ind > ATLAS_LAST_INDEX as f64 {
        log::warn!(
            "physical coordinate {coord_um} um maps past the atlas, clamping to {ATLAS_LAST_INDEX}"
        );
        ATLAS_LAST_INDEX
    } else {
        ind as usize
    }
}

/// 把图谱冠状切片索引转换为前后轴物理坐标 (µm).
#[inline]
pub fn index_to_physical(atlas_index: usize) -> f64 {
    atlas_index as f64 * ATLAS_SCALE
}

/// 把前后轴物理坐标 (µm) 转换为相对前囟的坐标 (mm, 向前为正).
#[inline]
pub fn physical_to_bregma(coord_um: f64) -> f64 {
    um_to_mm(BREGMA_IN_ATLAS_UM - coord_um)
}

/// 把相对前囟的坐标 (mm) 转换为前后轴物理坐标 (µm).
#[inline]
pub fn bregma_to_physical(bregma_mm: f64) -> f64 {
    BREGMA_IN_ATLAS_UM - mm_to_um(bregma_mm)
}

/// 计算把缩放后的切片图像在更大的目标栅格中居中所需的非负偏移
/// (以目标栅格像素为单位).
///
/// `source_resolution` 为原图形状 (行, 列), `target_shape` 为目标栅格形状,
/// `source_scale` / `target_scale` 分别为二者的像素物理尺寸 (µm).
/// 每个分量按 `ceil((target - source * source_scale / target_scale) / 2)`
/// 计算并钳制到 0 以上.
///
/// 该偏移随后会加到每个缩放后的质心上再索引目标栅格, 因此必须持久化在
/// [`crate::SlideRecord`] 中, 以便分析阶段原样复现.
pub fn compute_region_offset(
    source_resolution: Idx2d,
    target_shape: Idx2d,
    source_scale: f64,
    target_scale: f64,
) -> Idx2d {
    let ratio = source_scale / target_scale;
    let component = |source: usize, target: usize| -> usize {
        let pad = ((target as f64 - source as f64 * ratio) * 0.5).ceil();
        if pad < 0.0 {
            0
        } else {
            pad as usize
        }
    };
    (
        component(source_resolution.0, target_shape.0),
        component(source_resolution.1, target_shape.1),
    )
}

/// 把物理质心 (µm) 转换为像素尺寸为 `scale` 的栅格上的整数索引,
/// 并叠加 `offset` 偏移.
///
/// 质心在取整后若任一分量为负, 则返回 `None`. 调用方应将 `None`
/// 视为越界而不是程序错误.
pub fn centroid_to_raster_index(centroid: Idx2dF, scale: f64, offset: Idx2d) -> Option<Idx2d> {
    let component = |coord: f64, off: usize| -> Option<usize> {
        let ind = (coord / scale).round() + off as f64;
        (ind >= 0.0).then_some(ind as usize)
    };
    Some((
        component(centroid.0, offset.0)?,
        component(centroid.1, offset.1)?,
    ))
}
