//! 配准栅格的压缩存储形式.
//!
//! 持久化 [`crate::SlideRecord`] 时, region map 与 hemisphere map
//! 以 zlib 压缩后的不透明字节流存储, 读取时透明解压.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::Idx2d;

macro_rules! impl_compact_map {
    ($(#[$doc:meta])* $name:ident, $elem:ty, $width:expr) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Serialize, Deserialize)]
        pub struct $name {
            /// 压缩的不透明字节流, 行优先, 小端.
            buf: Vec<u8>,

            /// 形状.
            sh: Idx2d,
        }

        impl $name {
            /// 压缩数据.
            pub fn compress(map: &Array2<$elem>) -> Self {
                let mut e = ZlibEncoder::new(Vec::with_capacity(8), Compression::best());
                for p in map.iter() {
                    e.write_all(&p.to_le_bytes()).expect("Compression error");
                }
                Self {
                    buf: e.finish().expect("Compression error"),
                    sh: map.dim(),
                }
            }

            /// 解压缩数据.
            pub fn decompress(self) -> Array2<$elem> {
                let Self { buf, sh: (h, w) } = self;
                let mut d = ZlibDecoder::new(buf.as_slice());
                let mut bytes = Vec::with_capacity(h * w * $width);
                d.read_to_end(&mut bytes).expect("Decompression error");
                debug_assert_eq!(bytes.len(), h * w * $width);
                let data = bytes
                    .chunks_exact($width)
                    .map(|c| <$elem>::from_le_bytes(c.try_into().unwrap()))
                    .collect();
                Array2::from_shape_vec((h, w), data).unwrap()
            }

            /// 栅格形状 (高, 宽).
            #[inline]
            pub fn shape(&self) -> Idx2d {
                self.sh
            }
        }
    };
}

impl_compact_map!(
    /// 压缩存储的 region map (`Array2<u32>`); 不透明类型.
    CompactRegionMap,
    u32,
    4
);

impl_compact_map!(
    /// 压缩存储的 hemisphere map (`Array2<u8>`); 不透明类型.
    CompactHemisphereMap,
    u8,
    1
);

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    #[test]
    fn test_region_map_round_trip() {
        let map = Array2::from_shape_fn((13, 7), |(r, c)| (r * 1000 + c) as u32);
        let compact = CompactRegionMap::compress(&map);
        assert_eq!(compact.shape(), (13, 7));
        assert_eq!(compact.decompress(), map);
    }

    #[test]
    fn test_hemisphere_map_round_trip() {
        let map = Array2::from_shape_fn((320, 456), |(r, _)| (r % 3) as u8);
        let compact = CompactHemisphereMap::compress(&map);
        // 配准图高度重复, 压缩必须有收益.
        assert!(compact.buf.len() < 320 * 456 / 4);
        assert_eq!(compact.decompress(), map);
    }
}
