//! 外部数据 I/O.
//!
//! 包括 MHD 配准栅格的读写, 实验元数据 (`metadata.json`) 管理,
//! 以及切片记录的内容寻址持久化.

pub mod metadata;
pub mod mhd;
pub mod store;
