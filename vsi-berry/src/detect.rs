//! 检测流水线.
//!
//! 神经网络推理不属于本 crate; 检测器通过 [`Detector`] trait 注入,
//! 对每个分块返回分块局部坐标系下的原始检测. 本模块负责把分块器,
//! 检测器和去重过滤器串成单线程, 确定性的流水线:
//!
//! 加载器 → [`crate::chunk::ImageChunker`] → 检测器 →
//! [`crate::chunk::DuplicateFilter`] → 全图坐标检测列表 →
//! [`crate::SlideRecord`].
//!
//! 分块必须严格按行优先顺序处理 (去重规则依赖前一分块的边界),
//! 因此不做分块级并行.

use ndarray::ArrayView3;

use crate::chunk::{ChunkConfig, ChunkConfigError, DuplicateFilter, ImageChunker};
use crate::{conversion, Cell, PhysicalCell, SlideRecord};

/// 不透明的分块检测器.
///
/// 实现方接收一个 `(通道, 高, 宽)` 分块, 返回质心与边界框均在
/// 分块局部坐标系下的检测序列.
pub trait Detector {
    /// 设置当前待检测的分块.
    fn set_image(&mut self, tile: ArrayView3<'_, u16>);

    /// 在当前分块上运行检测.
    fn detect(&mut self) -> Vec<Cell>;
}

/// 对整张切片图像运行分块检测, 返回物理坐标系下的去重检测列表.
///
/// `pixel_scale` 为源图像的像素物理尺寸 (µm), 通常取
/// [`crate::consts::VSI_PIXEL_SCALE`]. 参数非法时返回 `Err`,
/// 不会开始任何处理.
pub fn detect_slide<D: Detector>(
    image: ArrayView3<'_, u16>,
    detector: &mut D,
    config: &ChunkConfig,
    pixel_scale: f64,
) -> Result<Vec<PhysicalCell>, ChunkConfigError> {
    let chunker = ImageChunker::new(image, config)?;
    let mut filter = DuplicateFilter::new();
    let mut out = Vec::new();

    for (desc, tile) in chunker.chunks() {
        detector.set_image(tile);
        let kept = filter.filter_chunk(&desc, detector.detect());
        out.extend(
            kept.into_iter()
                .map(|cell| PhysicalCell::from_cell(cell, pixel_scale)),
        );
    }
    Ok(out)
}

/// 对整张切片图像运行分块检测, 并把结果写入切片记录.
///
/// 除细胞列表外, 还会设置记录的 VSI 分辨率, 并按记录自带的配准图
/// 形状与分辨率计算居中偏移. 任何失败都发生在记录被修改之前,
/// 失败的切片不会留下半成品记录.
pub fn detect_into_record<D: Detector>(
    record: &mut SlideRecord,
    image: ArrayView3<'_, u16>,
    detector: &mut D,
    config: &ChunkConfig,
    pixel_scale: f64,
) -> Result<(), ChunkConfigError> {
    let cells = detect_slide(image, detector, config, pixel_scale)?;

    let (_, h, w) = image.dim();
    record.set_vsi_resolution((h, w));
    record.set_region_map_offset(conversion::compute_region_offset(
        (h, w),
        record.region_map().dim(),
        pixel_scale,
        record.region_map_scale(),
    ));
    record.add_cells(cells);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::BoundingBox;
    use ndarray::{Array2, Array3};

    /// 在固定的全图位置各放一个细胞的假检测器.
    ///
    /// 检测器知道分块网格布局 (行优先, 网格列数 x 分块边长),
    /// 从调用次数推出当前分块的偏移, 把落在当前分块有效区域内的
    /// 细胞按局部坐标报告出去.
    struct FakeDetector {
        centroids: Vec<(f64, f64)>,
        grid_cols: usize,
        chunk_size: usize,
        offset: (usize, usize),
        shape: (usize, usize),
        calls: usize,
    }

    impl FakeDetector {
        fn new(centroids: Vec<(f64, f64)>, grid_cols: usize, chunk_size: usize) -> Self {
            Self {
                centroids,
                grid_cols,
                chunk_size,
                offset: (0, 0),
                shape: (0, 0),
                calls: 0,
            }
        }
    }

    impl Detector for FakeDetector {
        fn set_image(&mut self, tile: ArrayView3<'_, u16>) {
            let grid = (self.calls / self.grid_cols, self.calls % self.grid_cols);
            self.offset = (grid.0 * self.chunk_size, grid.1 * self.chunk_size);
            let (_, h, w) = tile.dim();
            self.shape = (h, w);
        }

        fn detect(&mut self) -> Vec<Cell> {
            self.calls += 1;
            let (or, oc) = self.offset;
            // 只报告有效区域内的细胞 (真实检测器的输出以有效区域为主,
            // 重叠边缘的重复报告由质心恰好压在边界上的细胞体现).
            let (h, w) = (self.chunk_size.min(self.shape.0), self.chunk_size.min(self.shape.1));
            self.centroids
                .iter()
                .filter(|(r, c)| {
                    *r >= or as f64 && *r < (or + h) as f64 && *c >= oc as f64 && *c < (oc + w) as f64
                })
                .map(|(r, c)| {
                    let (lr, lc) = (r - or as f64, c - oc as f64);
                    Cell::new(
                        (lr, lc),
                        BoundingBox {
                            min_row: lr as usize,
                            min_col: lc as usize,
                            max_row: lr as usize + 1,
                            max_col: lc as usize + 1,
                        },
                        Array2::from_elem((1, 1), true),
                        Array2::zeros((1, 1)),
                    )
                })
                .collect()
        }
    }

    #[test]
    fn test_detect_slide_translates_and_dedups() {
        let image = Array3::<u16>::zeros((1, 64, 64));
        let config = ChunkConfig {
            chunk_size: 32,
            stride: 1,
            window_size: 9,
            num_classes: 2,
        };

        // (10, 10) 归分块 (0, 0); (50, 50) 归分块 (1, 1).
        // (32, 10) 的质心恰好压在行 32 的共享边界上, 由分块 (1, 0)
        // 重复报告, 按去重规则被滤除 (行列均不超过前块结束边界).
        let mut detector =
            FakeDetector::new(vec![(10.0, 10.0), (50.0, 50.0), (32.0, 10.0)], 2, 32);
        let cells = detect_slide(image.view(), &mut detector, &config, 1.0).unwrap();

        assert_eq!(detector.calls, 4);
        let centroids: Vec<_> = cells.iter().map(|c| c.centroid()).collect();
        // 全部为全图物理坐标 (scale = 1), 顺序跟随分块遍历顺序.
        assert_eq!(centroids, vec![(10.0, 10.0), (50.0, 50.0)]);
    }

    #[test]
    fn test_detect_into_record_sets_offset() {
        let image = Array3::<u16>::zeros((1, 40, 40));
        let config = ChunkConfig {
            chunk_size: 64,
            stride: 1,
            window_size: 9,
            num_classes: 2,
        };
        let region = Array2::<u32>::zeros((320, 456));
        let hemi = Array2::<u8>::zeros((320, 456));
        let mut record = SlideRecord::new("x.vsi", region, hemi, 1000.0);

        let mut detector = FakeDetector::new(vec![(10.0, 20.0)], 1, 64);
        detect_into_record(&mut record, image.view(), &mut detector, &config, 0.5).unwrap();

        assert_eq!(record.vsi_resolution(), (40, 40));
        assert_eq!(record.cells().len(), 1);
        // 物理坐标已换算.
        assert_eq!(record.cells()[0].centroid(), (5.0, 10.0));
        let expected = conversion::compute_region_offset((40, 40), (320, 456), 0.5, 25.0);
        assert_eq!(record.region_map_offset(), expected);
    }

    #[test]
    fn test_invalid_config_rejected_before_processing() {
        let image = Array3::<u16>::zeros((1, 8, 8));
        let config = ChunkConfig {
            chunk_size: 0,
            stride: 1,
            window_size: 9,
            num_classes: 2,
        };
        let mut detector = FakeDetector::new(Vec::new(), 1, 8);
        let err = detect_slide(image.view(), &mut detector, &config, 1.0).unwrap_err();
        assert_eq!(err, ChunkConfigError::ChunkSizeZero);
        assert_eq!(detector.calls, 0);
    }
}
