//! 按脑区聚合细胞计数.
//!
//! 把每个物理细胞经 [`crate::conversion`] 的坐标变换投影到配准
//! region map / hemisphere map 上, 读出所在的 (脑区, 半球), 再按
//! 该二元组累计计数. 落在背景或栅格之外的细胞单独计数, 不并入
//! 任何脑区.

use std::collections::HashMap;

use itertools::Itertools;

use crate::atlas::StructureIndex;
use crate::consts::region;
use crate::io::store::{DbError, RecordDb};
use crate::{PhysicalCell, SlideRecord};

/// 单个细胞的定位结果.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RegionHit {
    /// 细胞落在某个脑区内.
    Region {
        /// Allen 图谱结构 id.
        region: u32,
        /// 半球标签, 见 [`crate::consts::hemisphere`].
        hemisphere: u8,
    },

    /// 细胞落在栅格内但处于背景 (组织之外).
    Background,

    /// 细胞的投影坐标超出配准栅格.
    OutOfBounds,
}

/// 把细胞定位到切片记录的配准栅格上.
///
/// 质心先按记录的尺度与偏移换算到栅格像素坐标; 坐标为负或超出
/// 栅格形状时输出 warning 并返回 [`RegionHit::OutOfBounds`].
pub fn region_of_cell(cell: &PhysicalCell, record: &SlideRecord) -> RegionHit {
    let index =
        cell.centroid_as_index_scaled(record.region_map_scale(), record.region_map_offset());
    let (row, col) = match index {
        Some(idx) => idx,
        None => {
            log::warn!(
                "cell centroid {:?} maps to a negative raster coordinate",
                cell.centroid()
            );
            return RegionHit::OutOfBounds;
        }
    };

    let (h, w) = record.region_map().dim();
    if row >= h || col >= w {
        log::warn!("cell raster index ({row}, {col}) exceeds map shape ({h}, {w})");
        return RegionHit::OutOfBounds;
    }

    let id = record.region_map()[(row, col)];
    if region::is_background(id) {
        return RegionHit::Background;
    }
    RegionHit::Region {
        region: id,
        hemisphere: record.hemisphere_map()[(row, col)],
    }
}

/// 按 (脑区, 半球) 聚合的细胞计数.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RegionTally {
    counts: HashMap<(u32, u8), u64>,
    background: u64,
    out_of_bounds: u64,
}

impl RegionTally {
    /// 空计数.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// 累计一个定位结果.
    pub fn record_hit(&mut self, hit: RegionHit) {
        match hit {
            RegionHit::Region { region, hemisphere } => {
                *self.counts.entry((region, hemisphere)).or_insert(0) += 1;
            }
            RegionHit::Background => self.background += 1,
            RegionHit::OutOfBounds => self.out_of_bounds += 1,
        }
    }

    /// 累计一张切片记录中的全部细胞.
    pub fn tally_slide(&mut self, record: &SlideRecord) {
        for cell in record.cells() {
            self.record_hit(region_of_cell(cell, record));
        }
    }

    /// 并入另一份计数.
    pub fn merge(&mut self, other: &Self) {
        for (key, n) in &other.counts {
            *self.counts.entry(*key).or_insert(0) += n;
        }
        self.background += other.background;
        self.out_of_bounds += other.out_of_bounds;
    }

    /// 去掉指定 (脑区, 半球) 组合后的计数副本.
    pub fn without_excluded(&self, excluded: &[(u32, u8)]) -> Self {
        let mut out = self.clone();
        for key in excluded {
            out.counts.remove(key);
        }
        out
    }

    /// 某个 (脑区, 半球) 的细胞数.
    #[inline]
    pub fn count(&self, region: u32, hemisphere: u8) -> u64 {
        self.counts.get(&(region, hemisphere)).copied().unwrap_or(0)
    }

    /// 落在背景上的细胞数.
    #[inline]
    pub fn background(&self) -> u64 {
        self.background
    }

    /// 超出栅格的细胞数.
    #[inline]
    pub fn out_of_bounds(&self) -> u64 {
        self.out_of_bounds
    }

    /// 计入脑区的细胞总数, 不含背景与越界.
    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    /// 全部 (脑区, 半球, 计数) 三元组, 按键排序.
    pub fn entries(&self) -> Vec<(u32, u8, u64)> {
        self.counts
            .iter()
            .map(|(&(r, h), &n)| (r, h, n))
            .sorted()
            .collect()
    }

    /// 把脑区 id 换成本体中的结构名称, 按计数降序.
    ///
    /// 本体未收录的 id 以十进制形式保留.
    pub fn named_counts(&self, index: &StructureIndex) -> Vec<(String, u8, u64)> {
        self.counts
            .iter()
            .map(|(&(id, hemi), &n)| {
                let name = index
                    .name_of(id)
                    .map(str::to_owned)
                    .unwrap_or_else(|| id.to_string());
                (name, hemi, n)
            })
            .sorted_by(|a, b| b.2.cmp(&a.2).then_with(|| a.0.cmp(&b.0)))
            .collect()
    }
}

/// 聚合记录库中全部切片的细胞计数.
pub fn tally_experiment(db: &RecordDb) -> Result<RegionTally, DbError> {
    let mut tally = RegionTally::new();
    for record in db.iter()? {
        tally.tally_slide(&record?);
    }
    Ok(tally)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{BoundingBox, Cell};
    use crate::consts::hemisphere;
    use ndarray::Array2;

    /// 4x6 栅格: 左半 (列 0..3) 为脑区 8 / 左半球,
    /// 右半为脑区 9 / 右半球, 第 0 行为背景.
    fn sample_record() -> SlideRecord {
        let region_map = Array2::from_shape_fn((4, 6), |(r, c)| {
            if r == 0 {
                0
            } else if c < 3 {
                8
            } else {
                9
            }
        });
        let hemisphere_map = Array2::from_shape_fn((4, 6), |(_, c)| {
            if c < 3 {
                hemisphere::HEMI_LEFT
            } else {
                hemisphere::HEMI_RIGHT
            }
        });
        let mut rec = SlideRecord::new("a.vsi", region_map, hemisphere_map, 100.0);
        // 尺度 2: 物理坐标除以 2 得到栅格像素.
        rec.set_region_map_scale(2.0);
        rec
    }

    fn cell_at(row: f64, col: f64) -> crate::PhysicalCell {
        let cell = Cell::new(
            (row, col),
            BoundingBox {
                min_row: row as usize,
                min_col: col as usize,
                max_row: row as usize + 1,
                max_col: col as usize + 1,
            },
            Array2::from_elem((1, 1), true),
            Array2::zeros((1, 1)),
        );
        crate::PhysicalCell::from_cell(cell, 1.0)
    }

    #[test]
    fn test_region_of_cell() {
        let rec = sample_record();

        // (5, 3) / 2 = (2, 1): 脑区 8, 左半球.
        assert_eq!(
            region_of_cell(&cell_at(5.0, 3.0), &rec),
            RegionHit::Region {
                region: 8,
                hemisphere: hemisphere::HEMI_LEFT
            }
        );
        // (2, 10) / 2 = (1, 5): 脑区 9, 右半球.
        assert_eq!(
            region_of_cell(&cell_at(2.0, 10.0), &rec),
            RegionHit::Region {
                region: 9,
                hemisphere: hemisphere::HEMI_RIGHT
            }
        );
        // 第 0 行为背景.
        assert_eq!(region_of_cell(&cell_at(0.0, 4.0), &rec), RegionHit::Background);
        // (9, 0) / 2 = (4, 0): 超出 4 行.
        assert_eq!(region_of_cell(&cell_at(9.0, 0.0), &rec), RegionHit::OutOfBounds);
    }

    #[test]
    fn test_tally_slide() {
        let mut rec = sample_record();
        rec.add_cells([
            cell_at(5.0, 3.0),
            cell_at(7.0, 1.0),
            cell_at(2.0, 10.0),
            cell_at(0.0, 4.0),
            cell_at(9.0, 0.0),
        ]);

        let mut tally = RegionTally::new();
        tally.tally_slide(&rec);

        assert_eq!(tally.count(8, hemisphere::HEMI_LEFT), 2);
        assert_eq!(tally.count(9, hemisphere::HEMI_RIGHT), 1);
        assert_eq!(tally.background(), 1);
        assert_eq!(tally.out_of_bounds(), 1);
        assert_eq!(tally.total(), 3);
    }

    #[test]
    fn test_merge_and_exclusion() {
        let mut a = RegionTally::new();
        a.record_hit(RegionHit::Region { region: 8, hemisphere: 1 });
        a.record_hit(RegionHit::Background);

        let mut b = RegionTally::new();
        b.record_hit(RegionHit::Region { region: 8, hemisphere: 1 });
        b.record_hit(RegionHit::Region { region: 9, hemisphere: 2 });

        a.merge(&b);
        assert_eq!(a.count(8, 1), 2);
        assert_eq!(a.count(9, 2), 1);
        assert_eq!(a.background(), 1);

        let filtered = a.without_excluded(&[(8, 1)]);
        assert_eq!(filtered.count(8, 1), 0);
        assert_eq!(filtered.count(9, 2), 1);
        assert_eq!(filtered.entries(), [(9, 2, 1)]);
    }

    #[test]
    fn test_named_counts() {
        let index = StructureIndex::from_json_str(
            r#"{"id": 1, "name": "root", "acronym": "rt", "children": [
                {"id": 8, "name": "Cortex", "acronym": "CTX"}
            ]}"#,
        )
        .unwrap();

        let mut tally = RegionTally::new();
        tally.record_hit(RegionHit::Region { region: 8, hemisphere: 1 });
        tally.record_hit(RegionHit::Region { region: 8, hemisphere: 1 });
        tally.record_hit(RegionHit::Region { region: 42, hemisphere: 2 });

        let named = tally.named_counts(&index);
        assert_eq!(
            named,
            [
                ("Cortex".to_owned(), 1, 2),
                ("42".to_owned(), 2, 1),
            ]
        );
    }
}
