//! MHD (MetaImage) 格式栅格读写.
//!
//! 配准流水线输出的 region map 和 hemisphere map 以 MHD 头文件 +
//! 同目录 raw 数据文件的形式存储. 头文件按 "Tag = Value" 逐行组织,
//! 本模块只接受固定的标签白名单; 遇到未知标签输出 warning 级诊断
//! 并跳过, 不视为错误.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;

use ndarray::Array2;
use once_cell::sync::Lazy;

use crate::Idx2d;

/// 可接受的 MHD 标签. **顺序有意义**: 写出头文件时按此顺序排列.
pub const ACCEPTED_TAGS: [&str; 20] = [
    "ObjectType",
    "NDims",
    "BinaryData",
    "BinaryDataByteOrderMSB",
    "CompressedData",
    "CompressedDataSize",
    "TransformMatrix",
    "Offset",
    "CenterOfRotation",
    "AnatomicalOrientation",
    "ElementSpacing",
    "DimSize",
    "ElementType",
    "ElementDataFile",
    "Comment",
    "SeriesDescription",
    "AcquisitionDate",
    "AcquisitionTime",
    "StudyDate",
    "StudyTime",
];

/// MHD 元素类型.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ElemKind {
    /// `MET_CHAR` (i8).
    Char,
    /// `MET_UCHAR` (u8).
    UChar,
    /// `MET_SHORT` (i16).
    Short,
    /// `MET_USHORT` (u16).
    UShort,
    /// `MET_INT` (i32).
    Int,
    /// `MET_UINT` (u32).
    UInt,
    /// `MET_FLOAT` (f32).
    Float,
    /// `MET_DOUBLE` (f64).
    Double,
}

/// `MET_*` 标签值到元素类型的映射.
static ELEM_KINDS: Lazy<HashMap<&'static str, ElemKind>> = Lazy::new(|| {
    HashMap::from([
        ("MET_CHAR", ElemKind::Char),
        ("MET_UCHAR", ElemKind::UChar),
        ("MET_SHORT", ElemKind::Short),
        ("MET_USHORT", ElemKind::UShort),
        ("MET_INT", ElemKind::Int),
        ("MET_UINT", ElemKind::UInt),
        ("MET_FLOAT", ElemKind::Float),
        ("MET_DOUBLE", ElemKind::Double),
    ])
});

impl ElemKind {
    /// 解析 `MET_*` 标签值.
    #[inline]
    pub fn from_met(tag: &str) -> Option<Self> {
        ELEM_KINDS.get(tag.to_ascii_uppercase().as_str()).copied()
    }

    /// 对应的 `MET_*` 标签值.
    pub fn met_tag(&self) -> &'static str {
        match self {
            Self::Char => "MET_CHAR",
            Self::UChar => "MET_UCHAR",
            Self::Short => "MET_SHORT",
            Self::UShort => "MET_USHORT",
            Self::Int => "MET_INT",
            Self::UInt => "MET_UINT",
            Self::Float => "MET_FLOAT",
            Self::Double => "MET_DOUBLE",
        }
    }
}

impl fmt::Display for ElemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.met_tag())
    }
}

/// MHD 读写错误.
#[derive(Debug)]
pub enum MhdError {
    /// 底层 I/O 错误.
    IoError(std::io::Error),

    /// 头文件中存在无法解析的行.
    MalformedLine(String),

    /// 缺少必需标签.
    MissingTag(&'static str),

    /// 标签值无法解析 (形状, 间距等).
    MalformedValue(&'static str, String),

    /// 未知的元素类型标签值.
    UnknownElementType(String),

    /// 头文件声明的元素类型与请求的类型不符.
    ElementTypeMismatch {
        /// 请求的类型.
        requested: ElemKind,
        /// 头文件声明的类型.
        declared: ElemKind,
    },

    /// 仅支持 2 维栅格.
    UnsupportedDims(usize),

    /// raw 数据文件大小与头文件声明的形状不符.
    DataSizeMismatch {
        /// 按形状应有的元素个数.
        expected: usize,
        /// 实际读到的元素个数.
        found: usize,
    },
}

/// 解析后的 MHD 头.
///
/// 标签按头文件出现顺序保存; 白名单之外的标签在解析时即被丢弃.
#[derive(Clone, Debug, Default)]
pub struct MhdHeader {
    tags: Vec<(String, String)>,
}

impl MhdHeader {
    /// 查询标签值.
    pub fn get(&self, tag: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|(t, _)| t == tag)
            .map(|(_, v)| v.as_str())
    }

    /// 全部标签, 按出现顺序.
    #[inline]
    pub fn tags(&self) -> &[(String, String)] {
        &self.tags
    }

    /// 栅格形状 (高, 宽). `DimSize` 标签按 "宽 高" 存储.
    pub fn dim_size(&self) -> Result<Idx2d, MhdError> {
        let value = self.get("DimSize").ok_or(MhdError::MissingTag("DimSize"))?;
        let dims: Vec<usize> = value
            .split_whitespace()
            .map(str::parse)
            .collect::<Result<_, _>>()
            .map_err(|_| MhdError::MalformedValue("DimSize", value.to_owned()))?;
        match dims.as_slice() {
            [w, h] => Ok((*h, *w)),
            _ => Err(MhdError::UnsupportedDims(dims.len())),
        }
    }

    /// 元素类型.
    pub fn element_type(&self) -> Result<ElemKind, MhdError> {
        let value = self
            .get("ElementType")
            .ok_or(MhdError::MissingTag("ElementType"))?;
        ElemKind::from_met(value).ok_or_else(|| MhdError::UnknownElementType(value.to_owned()))
    }

    /// 每轴元素间距, 按头文件出现顺序 (宽 高).
    pub fn element_spacing(&self) -> Result<Vec<f64>, MhdError> {
        let value = self
            .get("ElementSpacing")
            .ok_or(MhdError::MissingTag("ElementSpacing"))?;
        value
            .split_whitespace()
            .map(str::parse)
            .collect::<Result<_, _>>()
            .map_err(|_| MhdError::MalformedValue("ElementSpacing", value.to_owned()))
    }

    /// raw 数据文件名 (相对头文件所在目录).
    pub fn element_data_file(&self) -> Result<&str, MhdError> {
        self.get("ElementDataFile")
            .ok_or(MhdError::MissingTag("ElementDataFile"))
    }
}

/// 解析 MHD 头文件.
///
/// 白名单之外的标签输出 warning 并跳过; 无法按 "Tag = Value"
/// 解析的行返回 `Err`.
pub fn load_mhd_header<P: AsRef<Path>>(path: P) -> Result<MhdHeader, MhdError> {
    let text = fs::read_to_string(path.as_ref()).map_err(MhdError::IoError)?;
    let mut header = MhdHeader::default();
    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let (tag, value) = line
            .split_once('=')
            .ok_or_else(|| MhdError::MalformedLine(line.to_owned()))?;
        let (tag, value) = (tag.trim(), value.trim());
        if ACCEPTED_TAGS.contains(&tag) {
            header.tags.push((tag.to_owned(), value.to_owned()));
        } else {
            log::warn!("encountered unexpected mhd tag: {tag}");
        }
    }
    Ok(header)
}

/// 可作为 MHD 元素读写的标量类型.
pub trait MhdElement: Copy {
    /// 对应的元素类型标签.
    const KIND: ElemKind;

    /// 单个元素的字节宽度.
    const WIDTH: usize;

    /// 从小端字节解码.
    fn from_le(bytes: &[u8]) -> Self;

    /// 编码为小端字节, 追加到 `out`.
    fn write_le(&self, out: &mut Vec<u8>);
}

macro_rules! impl_mhd_element {
    ($($ty:ty => $kind:expr, $width:expr;)+) => {$(
        impl MhdElement for $ty {
            const KIND: ElemKind = $kind;
            const WIDTH: usize = $width;

            #[inline]
            fn from_le(bytes: &[u8]) -> Self {
                Self::from_le_bytes(bytes.try_into().unwrap())
            }

            #[inline]
            fn write_le(&self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_le_bytes());
            }
        }
    )+};
}

impl_mhd_element! {
    i8 => ElemKind::Char, 1;
    u8 => ElemKind::UChar, 1;
    i16 => ElemKind::Short, 2;
    u16 => ElemKind::UShort, 2;
    i32 => ElemKind::Int, 4;
    u32 => ElemKind::UInt, 4;
    f32 => ElemKind::Float, 4;
    f64 => ElemKind::Double, 8;
}

/// 加载 MHD 文件为 `(栅格, 头)` 二元组.
///
/// raw 数据在文件中按 x (宽) 最快的顺序存储, 加载结果为 `(高, 宽)`
/// 形状的行优先数组. 头文件声明的元素类型必须与 `T` 一致.
pub fn load_mhd<T: MhdElement>(path: impl AsRef<Path>) -> Result<(Array2<T>, MhdHeader), MhdError> {
    let path = path.as_ref();
    let header = load_mhd_header(path)?;

    let declared = header.element_type()?;
    if declared != T::KIND {
        return Err(MhdError::ElementTypeMismatch {
            requested: T::KIND,
            declared,
        });
    }

    let (h, w) = header.dim_size()?;
    let data_path = path
        .parent()
        .unwrap_or_else(|| Path::new(""))
        .join(header.element_data_file()?);
    let bytes = fs::read(data_path).map_err(MhdError::IoError)?;

    let found = bytes.len() / T::WIDTH;
    if found != h * w || bytes.len() % T::WIDTH != 0 {
        return Err(MhdError::DataSizeMismatch {
            expected: h * w,
            found,
        });
    }

    let data: Vec<T> = bytes.chunks_exact(T::WIDTH).map(T::from_le).collect();
    // 行优先 (高, 宽) 与文件的 x-最快序一致, 无需转置.
    let map = Array2::from_shape_vec((h, w), data).unwrap();
    Ok((map, header))
}

/// 把栅格写为 MHD 头文件 + 同目录 raw 数据文件.
///
/// `path` 为头文件路径, raw 文件名由头文件名把扩展名替换为 `.raw`
/// 得到. 标签按 [`ACCEPTED_TAGS`] 顺序写出, 数据按小端存储.
pub fn write_mhd<T: MhdElement>(path: impl AsRef<Path>, map: &Array2<T>) -> Result<(), MhdError> {
    let path = path.as_ref();
    let (h, w) = map.dim();
    let data_file = {
        let mut name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "data".to_owned());
        name.push_str(".raw");
        name
    };

    let fields = [
        ("ObjectType", "Image".to_owned()),
        ("NDims", "2".to_owned()),
        ("BinaryData", "True".to_owned()),
        ("BinaryDataByteOrderMSB", "False".to_owned()),
        ("DimSize", format!("{w} {h}")),
        ("ElementType", T::KIND.met_tag().to_owned()),
        ("ElementDataFile", data_file.clone()),
    ];

    // 标签顺序有意义, 按白名单顺序而不是 fields 的书写顺序输出.
    let mut text = String::new();
    for tag in ACCEPTED_TAGS {
        if let Some((_, value)) = fields.iter().find(|(t, _)| *t == tag) {
            text.push_str(tag);
            text.push_str(" = ");
            text.push_str(value);
            text.push('\n');
        }
    }
    fs::write(path, text).map_err(MhdError::IoError)?;

    let mut bytes = Vec::with_capacity(h * w * T::WIDTH);
    for p in map.iter() {
        p.write_le(&mut bytes);
    }
    let data_path = path.parent().unwrap_or_else(|| Path::new("")).join(data_file);
    fs::write(data_path, bytes).map_err(MhdError::IoError)
}
