//! 大图分块.
//!
//! 把一张无法一次送入检测器的 `(通道, 高, 宽)` 大图切成带重叠边缘的
//! 方形分块. 分块按行优先顺序产出 (第 0 行从左到右, 然后第 1 行, ...),
//! **该顺序是 API 契约的一部分**: [`dedup`] 的去重规则依赖它.
//!
//! 每个分块在 `chunk_size` 的基础上向右下扩展 `window_size - 1` 个像素,
//! 保证检测器的感受野在分块边缘也有合法输入; 图像边界处按原图范围裁剪,
//! 不做任何填充. 分块的 "有效区域" (effective 边界) 恰好是 `chunk_size`
//! 网格单元与图像的交集, 因此所有有效区域无重叠地覆盖整张图.

use ndarray::{s, Array3, ArrayView2, ArrayView3, Axis};

use crate::Idx2d;

pub mod dedup;

pub use dedup::DuplicateFilter;

/// 分块与检测器参数.
#[derive(Copy, Clone, Debug)]
pub struct ChunkConfig {
    /// 分块边长 (分块为正方形). 必须为正.
    pub chunk_size: usize,

    /// 检测器输出相对输入的步长. 必须为正.
    pub stride: usize,

    /// 检测器感受野边长. 必须为正奇数 (感受野居中).
    pub window_size: usize,

    /// 检测器输出的类别数 (稠密输出时使用).
    pub num_classes: usize,
}

/// 分块参数校验错误. 任何处理开始前即被拦截.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkConfigError {
    /// `chunk_size` 为零.
    ChunkSizeZero,

    /// `stride` 为零.
    StrideZero,

    /// `window_size` 为零.
    WindowSizeZero,

    /// `window_size` 为偶数, 感受野无法居中.
    WindowSizeEven(usize),

    /// 输入图像为空.
    EmptyImage,
}

impl ChunkConfig {
    /// 校验参数.
    pub fn validate(&self) -> Result<(), ChunkConfigError> {
        if self.chunk_size == 0 {
            return Err(ChunkConfigError::ChunkSizeZero);
        }
        if self.stride == 0 {
            return Err(ChunkConfigError::StrideZero);
        }
        match self.window_size {
            0 => Err(ChunkConfigError::WindowSizeZero),
            w if w % 2 == 0 => Err(ChunkConfigError::WindowSizeEven(w)),
            _ => Ok(()),
        }
    }
}

/// 单个分块的位置信息.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ChunkDescriptor {
    /// 分块网格坐标 (行号, 列号).
    pub grid: Idx2d,

    /// 分块在原图中的起始 (行, 列).
    pub start: Idx2d,

    /// 分块窗口的结束 (行, 列), 不含. 包含感受野扩展.
    pub end: Idx2d,

    /// 有效区域的结束 (行, 列), 不含.
    ///
    /// 该区域内的检测结果以本分块为准; 落在 `effective_end` 与 `end`
    /// 之间重叠边缘的检测由后继分块通过去重规则裁决.
    pub effective_end: Idx2d,
}

/// 行优先分块器, 借用源图像.
///
/// 源图像按 `(通道, 高, 宽)` 组织; 单通道 2D 图像经 [`Self::from_plane`]
/// 进入. 分块是源图像的零拷贝视图.
#[derive(Debug)]
pub struct ImageChunker<'a, A> {
    image: ArrayView3<'a, A>,
    chunk_size: usize,
    margin: usize,
    grid: Idx2d,
}

impl<'a, A> ImageChunker<'a, A> {
    /// 构建分块器. 参数非法或图像为空时返回 `Err`.
    pub fn new(image: ArrayView3<'a, A>, config: &ChunkConfig) -> Result<Self, ChunkConfigError> {
        config.validate()?;
        let (c, h, w) = image.dim();
        if c == 0 || h == 0 || w == 0 {
            return Err(ChunkConfigError::EmptyImage);
        }
        let chunk = config.chunk_size;
        Ok(Self {
            image,
            chunk_size: chunk,
            margin: config.window_size - 1,
            grid: (h.div_ceil(chunk), w.div_ceil(chunk)),
        })
    }

    /// 用单通道 2D 图像构建分块器.
    #[inline]
    pub fn from_plane(
        plane: ArrayView2<'a, A>,
        config: &ChunkConfig,
    ) -> Result<Self, ChunkConfigError> {
        Self::new(plane.insert_axis(Axis(0)), config)
    }

    /// 分块网格形状 (行数, 列数).
    #[inline]
    pub fn grid_shape(&self) -> Idx2d {
        self.grid
    }

    /// 分块总数.
    #[inline]
    pub fn len(&self) -> usize {
        self.grid.0 * self.grid.1
    }

    /// 是否没有任何分块? 构造成功后恒为 `false`.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 源图像形状 (通道, 高, 宽).
    #[inline]
    pub fn image_shape(&self) -> (usize, usize, usize) {
        self.image.dim()
    }

    /// 计算网格坐标 `(row, col)` 处分块的位置信息.
    ///
    /// 网格坐标越界时程序 panic.
    pub fn descriptor(&self, (row, col): Idx2d) -> ChunkDescriptor {
        assert!(row < self.grid.0 && col < self.grid.1, "grid index out of range");
        let (_, h, w) = self.image.dim();
        let start = (row * self.chunk_size, col * self.chunk_size);
        let effective_end = (
            (start.0 + self.chunk_size).min(h),
            (start.1 + self.chunk_size).min(w),
        );
        let end = (
            (start.0 + self.chunk_size + self.margin).min(h),
            (start.1 + self.chunk_size + self.margin).min(w),
        );
        ChunkDescriptor {
            grid: (row, col),
            start,
            end,
            effective_end,
        }
    }

    /// 获取按行优先顺序迭代全部分块的迭代器.
    #[inline]
    pub fn chunks(&self) -> ChunkIter<'a, '_, A> {
        ChunkIter {
            chunker: self,
            cur: (0, 0),
        }
    }
}

/// 行优先分块迭代器. 产出 (位置信息, 分块视图).
#[derive(Debug)]
pub struct ChunkIter<'a, 's, A> {
    chunker: &'s ImageChunker<'a, A>,
    cur: Idx2d,
}

impl<'a, A> Iterator for ChunkIter<'a, '_, A> {
    type Item = (ChunkDescriptor, ArrayView3<'a, A>);

    fn next(&mut self) -> Option<Self::Item> {
        let (rows, cols) = self.chunker.grid;
        if self.cur.0 == rows {
            return None;
        }
        let desc = self.chunker.descriptor(self.cur);
        if self.cur.1 + 1 == cols {
            self.cur = (self.cur.0 + 1, 0);
        } else {
            self.cur.1 += 1;
        }

        // 视图是 `Copy` 的, 这里复制出携带 'a 生命周期的分块.
        let view: ArrayView3<'a, A> = self.chunker.image;
        let block = view.slice_move(s![
            ..,
            desc.start.0..desc.end.0,
            desc.start.1..desc.end.1
        ]);
        Some((desc, block))
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        let (rows, cols) = self.chunker.grid;
        let done = self.cur.0 * cols + self.cur.1;
        let rest = rows * cols - done;
        (rest, Some(rest))
    }
}

impl<A> ExactSizeIterator for ChunkIter<'_, '_, A> {}

/// 携带稠密输出缓冲的分块器.
///
/// 当检测器对每个分块产出全分辨率掩膜而非稀疏检测时, 用该变体把各分块
/// 有效区域的输出重新拼接为整图. 缓冲在迭代期间归分块器所有, 迭代结束后
/// 经 [`Self::finish`] 移交调用方.
pub struct AccumChunker<'a, A> {
    chunker: ImageChunker<'a, A>,
    output: Array3<f32>,
}

impl<'a, A> AccumChunker<'a, A> {
    /// 构建分块器并预分配 `(num_classes, 高, 宽)` 的零值输出缓冲.
    pub fn new(image: ArrayView3<'a, A>, config: &ChunkConfig) -> Result<Self, ChunkConfigError> {
        let chunker = ImageChunker::new(image, config)?;
        let (_, h, w) = chunker.image_shape();
        Ok(Self {
            chunker,
            output: Array3::zeros((config.num_classes, h, w)),
        })
    }

    /// 用单通道 2D 图像构建分块器, 其余同 [`Self::new`].
    #[inline]
    pub fn from_plane(
        plane: ArrayView2<'a, A>,
        config: &ChunkConfig,
    ) -> Result<Self, ChunkConfigError> {
        Self::new(plane.insert_axis(Axis(0)), config)
    }

    /// 获取按行优先顺序迭代全部分块的迭代器.
    #[inline]
    pub fn chunks(&self) -> ChunkIter<'a, '_, A> {
        self.chunker.chunks()
    }

    /// 把分块 `desc` 有效区域的稠密输出写入缓冲.
    ///
    /// `block` 的形状必须为 `(num_classes, 有效行数, 有效列数)`,
    /// 否则程序 panic.
    pub fn write(&mut self, desc: &ChunkDescriptor, block: ArrayView3<f32>) {
        let mut target = self.output.slice_mut(s![
            ..,
            desc.start.0..desc.effective_end.0,
            desc.start.1..desc.effective_end.1
        ]);
        assert_eq!(target.dim(), block.dim(), "dense output shape mismatch");
        target.assign(&block);
    }

    /// 结束迭代, 移交输出缓冲.
    #[inline]
    pub fn finish(self) -> Array3<f32> {
        self.output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array2, Array3};

    fn cfg(chunk_size: usize, window_size: usize) -> ChunkConfig {
        ChunkConfig {
            chunk_size,
            stride: 6,
            window_size,
            num_classes: 2,
        }
    }

    #[test]
    fn test_config_validation() {
        assert_eq!(cfg(0, 49).validate(), Err(ChunkConfigError::ChunkSizeZero));
        assert_eq!(
            cfg(100, 48).validate(),
            Err(ChunkConfigError::WindowSizeEven(48))
        );
        assert_eq!(cfg(100, 0).validate(), Err(ChunkConfigError::WindowSizeZero));
        assert!(cfg(100, 49).validate().is_ok());
        let bad = ChunkConfig {
            stride: 0,
            ..cfg(100, 49)
        };
        assert_eq!(bad.validate(), Err(ChunkConfigError::StrideZero));
    }

    #[test]
    fn test_small_image_single_chunk() {
        let image = Array3::<u16>::zeros((2, 30, 40));
        let chunker = ImageChunker::new(image.view(), &cfg(100, 49)).unwrap();
        assert_eq!(chunker.grid_shape(), (1, 1));
        let (desc, block) = chunker.chunks().next().unwrap();
        assert_eq!(desc.start, (0, 0));
        assert_eq!(desc.end, (30, 40));
        assert_eq!(desc.effective_end, (30, 40));
        assert_eq!(block.dim(), (2, 30, 40));
    }

    #[test]
    fn test_row_major_order_and_overlap() {
        let image = Array2::<u8>::zeros((100, 90));
        let chunker = ImageChunker::from_plane(image.view(), &cfg(32, 9)).unwrap();
        assert_eq!(chunker.grid_shape(), (4, 3));

        let descs: Vec<_> = chunker.chunks().map(|(d, _)| d).collect();
        assert_eq!(descs.len(), 12);
        // 行优先.
        let grids: Vec<_> = descs.iter().map(|d| d.grid).collect();
        assert_eq!(grids[0], (0, 0));
        assert_eq!(grids[1], (0, 1));
        assert_eq!(grids[3], (1, 0));

        // 感受野扩展: 内部分块右下各多出 window - 1 = 8 像素.
        let d = descs[0];
        assert_eq!(d.effective_end, (32, 32));
        assert_eq!(d.end, (40, 40));
        // 边界分块被裁剪.
        let last = *descs.last().unwrap();
        assert_eq!(last.start, (96, 64));
        assert_eq!(last.end, (100, 90));
        assert_eq!(last.effective_end, (100, 90));
    }

    #[test]
    fn test_effective_regions_partition_image() {
        let image = Array2::<u8>::zeros((101, 67));
        let chunker = ImageChunker::from_plane(image.view(), &cfg(17, 5)).unwrap();
        let mut hits = Array2::<u32>::zeros((101, 67));
        for (desc, _) in chunker.chunks() {
            for r in desc.start.0..desc.effective_end.0 {
                for c in desc.start.1..desc.effective_end.1 {
                    hits[(r, c)] += 1;
                }
            }
        }
        assert!(hits.iter().all(|&n| n == 1), "有效区域必须恰好覆盖每个像素一次");
    }

    #[test]
    fn test_large_slide_grid() {
        // 10000 x 10000, 分块 2000, 感受野 49: 恰好 5 x 5 = 25 个分块,
        // 各分块有效区域均为 2000 x 2000.
        let image = Array3::<u8>::zeros((1, 10_000, 10_000));
        let chunker = ImageChunker::new(image.view(), &cfg(2000, 49)).unwrap();
        assert_eq!(chunker.len(), 25);

        let descs: Vec<_> = chunker.chunks().map(|(d, _)| d).collect();
        assert_eq!(descs.len(), 25);
        for d in &descs {
            assert_eq!(d.effective_end.0 - d.start.0, 2000);
            assert_eq!(d.effective_end.1 - d.start.1, 2000);
        }
        let last = descs.last().unwrap();
        assert_eq!(last.grid, (4, 4));
        assert_eq!(last.end, (10_000, 10_000));
    }

    #[test]
    fn test_accum_chunker_reassembles() {
        let image = Array2::<u16>::from_shape_fn((50, 60), |(r, c)| (r * 60 + c) as u16);
        let config = cfg(20, 5);
        let mut accum = AccumChunker::from_plane(image.view(), &config).unwrap();
        let descs: Vec<_> = accum.chunks().map(|(d, _)| d).collect();
        for desc in descs {
            let rows = desc.effective_end.0 - desc.start.0;
            let cols = desc.effective_end.1 - desc.start.1;
            let block = Array3::from_elem((2, rows, cols), desc.grid.0 as f32);
            accum.write(&desc, block.view());
        }
        let out = accum.finish();
        assert_eq!(out.dim(), (2, 50, 60));
        assert_eq!(out[(0, 0, 0)], 0.0);
        assert_eq!(out[(1, 45, 59)], 2.0);
    }
}
