//! Allen 脑图谱结构本体索引.
//!
//! 本体是严格的所有权树: 父结构独占子结构, 不存储任何父指针或共享边.
//! 所有 "查祖先链" 类操作通过重新遍历推导, 树构建完成后只读.

use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::Deserialize;

/// 本体中的一个脑结构节点.
///
/// 字段名与 Allen 结构本体 JSON 文档一致; `id` 在整棵树内唯一
/// (该唯一性是本体自身的不变量, 索引不做强制).
#[derive(Clone, Debug, Deserialize)]
pub struct Structure {
    /// 结构 id, 与 region map 像素值对应.
    pub id: u32,

    /// 结构全名.
    pub name: String,

    /// 结构缩写.
    pub acronym: String,

    /// 子结构, 按文档顺序.
    #[serde(default)]
    pub children: Vec<Structure>,
}

impl Structure {
    /// 获取按先序 (自身最先, 然后按文档顺序递归子结构)
    /// 遍历子树的迭代器.
    #[inline]
    pub fn iter(&self) -> PreOrderIter<'_> {
        PreOrderIter { stack: vec![self] }
    }

    /// 本结构及其全部后代的 id, 按先序排列.
    ///
    /// 用于回答 "该脑区及其所有细分区域" 类查询.
    #[inline]
    pub fn subtree_ids(&self) -> Vec<u32> {
        self.iter().map(|s| s.id).collect()
    }
}

/// 先序子树迭代器.
#[derive(Debug)]
pub struct PreOrderIter<'a> {
    stack: Vec<&'a Structure>,
}

impl<'a> Iterator for PreOrderIter<'a> {
    type Item = &'a Structure;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        // 逆序压栈, 使子结构按文档顺序弹出.
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}

/// 按属性查找结构失败.
#[derive(Debug, Clone)]
pub struct StructureNotFound {
    /// 用于查找的属性名.
    pub attribute: &'static str,

    /// 查找的属性值.
    pub value: String,
}

impl fmt::Display for StructureNotFound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "structure with {} {} could not be found",
            self.attribute, self.value
        )
    }
}

impl std::error::Error for StructureNotFound {}

/// 加载本体文档错误.
#[derive(Debug)]
pub enum OntologyError {
    /// 底层 I/O 错误.
    IoError(std::io::Error),

    /// JSON 解析错误.
    JsonError(serde_json::Error),
}

/// 脑结构本体索引.
///
/// 从嵌套的本体 JSON 文档构建一次, 之后只读. 所有查找均为先序
/// 深度优先搜索 (根最先, 然后按文档顺序递归), 首个匹配胜出.
#[derive(Clone, Debug)]
pub struct StructureIndex {
    root: Structure,
}

impl StructureIndex {
    /// 用已解析的根结构构建索引.
    #[inline]
    pub fn new(root: Structure) -> Self {
        Self { root }
    }

    /// 从本体 JSON 文件构建索引.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, OntologyError> {
        let file = File::open(path.as_ref()).map_err(OntologyError::IoError)?;
        let root = serde_json::from_reader(BufReader::new(file)).map_err(OntologyError::JsonError)?;
        Ok(Self::new(root))
    }

    /// 从本体 JSON 字符串构建索引.
    pub fn from_json_str(data: &str) -> Result<Self, OntologyError> {
        let root = serde_json::from_str(data).map_err(OntologyError::JsonError)?;
        Ok(Self::new(root))
    }

    /// 根结构.
    #[inline]
    pub fn root(&self) -> &Structure {
        &self.root
    }

    /// 按 id 查找结构.
    #[inline]
    pub fn find_by_id(&self, id: u32) -> Option<&Structure> {
        self.root.iter().find(|s| s.id == id)
    }

    /// 按全名查找结构.
    #[inline]
    pub fn find_by_name(&self, name: &str) -> Option<&Structure> {
        self.root.iter().find(|s| s.name == name)
    }

    /// 按缩写查找结构.
    #[inline]
    pub fn find_by_acronym(&self, acronym: &str) -> Option<&Structure> {
        self.root.iter().find(|s| s.acronym == acronym)
    }

    /// 按 id 定位结构, 返回其子树全部 id.
    pub fn ids_by_id(&self, id: u32) -> Result<Vec<u32>, StructureNotFound> {
        self.find_by_id(id)
            .map(Structure::subtree_ids)
            .ok_or_else(|| StructureNotFound {
                attribute: "id",
                value: id.to_string(),
            })
    }

    /// 按全名定位结构, 返回其子树全部 id.
    pub fn ids_by_name(&self, name: &str) -> Result<Vec<u32>, StructureNotFound> {
        self.find_by_name(name)
            .map(Structure::subtree_ids)
            .ok_or_else(|| StructureNotFound {
                attribute: "name",
                value: name.to_owned(),
            })
    }

    /// 按缩写定位结构, 返回其子树全部 id.
    pub fn ids_by_acronym(&self, acronym: &str) -> Result<Vec<u32>, StructureNotFound> {
        self.find_by_acronym(acronym)
            .map(Structure::subtree_ids)
            .ok_or_else(|| StructureNotFound {
                attribute: "acronym",
                value: acronym.to_owned(),
            })
    }

    /// 按 id 定位结构, 返回其祖先链: 直接父结构最先, 根最后.
    /// 被定位的结构自身不在返回值中; 根结构的祖先链为空.
    pub fn ancestors_by_id(&self, id: u32) -> Result<Vec<&Structure>, StructureNotFound> {
        let mut chain = Vec::new();
        if collect_ancestors(&self.root, &|s| s.id == id, &mut chain) {
            Ok(chain)
        } else {
            Err(StructureNotFound {
                attribute: "id",
                value: id.to_string(),
            })
        }
    }

    /// 按缩写定位结构, 返回其祖先链. 其余同 [`Self::ancestors_by_id`].
    pub fn ancestors_by_acronym(&self, acronym: &str) -> Result<Vec<&Structure>, StructureNotFound> {
        let mut chain = Vec::new();
        if collect_ancestors(&self.root, &|s| s.acronym == acronym, &mut chain) {
            Ok(chain)
        } else {
            Err(StructureNotFound {
                attribute: "acronym",
                value: acronym.to_owned(),
            })
        }
    }

    /// 查询 id 对应的结构全名.
    ///
    /// 哨兵 id 0 代表 "无脑区" (背景), 静默返回 `None`;
    /// 其它无法解析的 id 同样返回 `None`, 但输出 warning 级诊断.
    pub fn name_of(&self, id: u32) -> Option<&str> {
        match self.find_by_id(id) {
            Some(s) => Some(s.name.as_str()),
            None => {
                if id != 0 {
                    log::warn!("could not find structure with id {id}");
                }
                None
            }
        }
    }
}

/// 先序搜索满足 `pred` 的结构; 命中时在递归回溯路径上收集祖先.
///
/// 返回值表示子树内是否存在命中. 命中时 `chain` 为
/// \[直接父结构, ..., 根\].
fn collect_ancestors<'a>(
    node: &'a Structure,
    pred: &impl Fn(&Structure) -> bool,
    chain: &mut Vec<&'a Structure>,
) -> bool {
    if pred(node) {
        return true;
    }
    for child in &node.children {
        if collect_ancestors(child, pred, chain) {
            chain.push(node);
            return true;
        }
    }
    false
}
