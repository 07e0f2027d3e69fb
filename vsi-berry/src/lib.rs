#![warn(missing_docs)] // <= 合适时移除它.

//! 核心库. 提供 VSI 小鼠脑切片的分块细胞检测流水线, 以及与 Allen
//! 脑图谱配准结果相关的坐标转换和结构化统计功能.
//!
//! 该 crate 目前仅提供 `safe` 接口.
//!
//! # 注意
//!
//! 1. 该 crate 不负责神经网络推理本身, 也不负责 VSI 文件解码.
//!   检测器通过 [`detect::Detector`] trait 注入, 图像由外部加载器提供.
//! 2. 在非期望情况下 (坐标越界, 分块边界畸形等编程错误), 程序会直接
//!   panic, 而不会导致内存错误. As what Rust promises.
//!
//! # 功能总览
//!
//! ### 大图分块 (chunking) ✅
//!
//! 将无法一次载入检测器的大图按行优先顺序切成带重叠边缘的方形分块.
//! 每个分块携带它在原图中的位置信息和 "有效区域" 边界.
//!
//! 实现位于 `vsi-berry/src/chunk`.
//!
//! ### 跨分块去重 ✅
//!
//! 相邻分块的重叠区域会产生重复检测. 去重规则依赖分块的行优先遍历顺序,
//! 该顺序是 API 契约的一部分.
//!
//! 实现位于 `vsi-berry/src/chunk/dedup.rs`.
//!
//! ### 坐标转换 ✅
//!
//! 像素坐标, 物理坐标 (µm) 与图谱索引之间的纯函数转换,
//! 以及配准图的居中偏移计算.
//!
//! 实现位于 `vsi-berry/src/conversion.rs`.
//!
//! ### 切片记录与内容寻址存储 ✅
//!
//! 每张切片的配准图, 偏移与检测结果构成一个 [`SlideRecord`],
//! 以 `source_path` 的 SHA-256 为键持久化到嵌入式 KV 库.
//!
//! 实现位于 `vsi-berry/src/data` 和 `vsi-berry/src/io/store.rs`.
//!
//! ### 脑结构本体索引 ✅
//!
//! Allen 图谱结构树的 id/名称/缩写查找, 祖先链与子树 id 枚举.
//!
//! 实现位于 `vsi-berry/src/atlas`.
//!
//! ### 分区域细胞计数 ✅
//!
//! 将检测到的细胞质心映射回配准图, 按 (脑区, 半球) 计数.
//!
//! 实现位于 `vsi-berry/src/analysis.rs`.

/// 二维索引, 同时也可一定程度上用作非负整数向量.
pub type Idx2d = (usize, usize);

/// 高精度通用二维坐标 / 向量, 按 (行, 列) 存储.
pub type Idx2dF = (f64, f64);

pub mod consts;

pub mod conversion;

/// 检测结果与切片记录数据结构.
mod data;

pub use data::{
    BoundingBox, Cell, CompactHemisphereMap, CompactRegionMap, LoadRecordError, PhysicalCell,
    SlideRecord,
};

pub mod analysis;
pub mod atlas;
pub mod chunk;
pub mod detect;
pub mod io;
pub mod prelude;
