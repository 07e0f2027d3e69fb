//! 跨分块去重.
//!
//! 分块按行优先顺序处理时, 落在相邻分块共享边缘附近的同一个细胞会被
//! 两个分块各报告一次. 去重规则以 *前一个* 分块的有效区域结束边界
//! `(prev_end_row, prev_end_col)` 为准, 保留质心满足
//! `row > prev_end_row || col > prev_end_col` 的检测:
//! 行号严格越过前块底边的检测一定是新的; 处于同一行带内的检测,
//! 只有列号越过前块右边界时才是新的.
//!
//! 该非对称规则仅在行优先遍历顺序下成立, 因此分块顺序是
//! [`super::ImageChunker`] 与本模块共同的 API 契约.

use super::ChunkDescriptor;
use crate::{Cell, Idx2d};

/// 按分块顺序工作的去重过滤器.
///
/// 对每个分块: 先把所有检测由分块局部坐标平移到全图坐标,
/// 再按上述规则过滤. 分块内检测的相对顺序保持不变.
#[derive(Debug, Default)]
pub struct DuplicateFilter {
    /// 前一个分块的有效区域结束边界. 第一个分块没有前驱, 全部保留.
    prev_end: Option<Idx2d>,
}

impl DuplicateFilter {
    /// 构建过滤器.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// 处理一个分块的原始检测, 返回平移到全图坐标并去重后的检测.
    ///
    /// 必须严格按照分块器的行优先产出顺序调用.
    /// `desc` 的边界畸形 (结束边界小于起始边界) 时程序 panic,
    /// 这代表上游分块逻辑存在 bug.
    pub fn filter_chunk(&mut self, desc: &ChunkDescriptor, cells: Vec<Cell>) -> Vec<Cell> {
        assert!(
            desc.start.0 <= desc.effective_end.0
                && desc.start.1 <= desc.effective_end.1
                && desc.effective_end.0 <= desc.end.0
                && desc.effective_end.1 <= desc.end.1,
            "malformed chunk bounds: {desc:?}"
        );

        let prev = self.prev_end;
        self.prev_end = Some(desc.effective_end);

        cells
            .into_iter()
            .map(|mut cell| {
                cell.translate(desc.start);
                cell
            })
            .filter(|cell| match prev {
                None => true,
                Some((end_row, end_col)) => {
                    let (row, col) = cell.centroid();
                    row > end_row as f64 || col > end_col as f64
                }
            })
            .collect()
    }
}
