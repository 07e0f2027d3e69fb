//! 切片记录的内容寻址持久化.
//!
//! 每条 [`SlideRecord`] 以其 `source_path` 的 SHA-256 十六进制摘要为键,
//! 经 bincode 序列化后存入单文件 redb 数据库. 同一来源路径的记录写入
//! 即覆盖, 迭代按键的字典序进行.

use std::fmt::Write as _;
use std::path::Path;

use redb::{Database, ReadTransaction, ReadableTableMetadata, TableDefinition};
use sha2::{Digest, Sha256};

use crate::data::{SlideRecord, StoredRecord};

const RECORDS: TableDefinition<&str, &[u8]> = TableDefinition::new("slide_records");

/// 记录库读写错误.
#[derive(Debug)]
pub enum DbError {
    /// 打开或创建数据库失败.
    Database(redb::DatabaseError),

    /// 事务建立失败.
    Transaction(redb::TransactionError),

    /// 表打开失败.
    Table(redb::TableError),

    /// 读写数据失败.
    Storage(redb::StorageError),

    /// 事务提交失败.
    Commit(redb::CommitError),

    /// 记录序列化或反序列化失败.
    Codec(bincode::Error),
}

/// 计算记录键: `source_path` 的 SHA-256 十六进制摘要.
pub fn key_of(source_path: &str) -> String {
    let digest = Sha256::digest(source_path.as_bytes());
    let mut key = String::with_capacity(digest.len() * 2);
    for byte in digest {
        // String 的 fmt::Write 不会失败.
        let _ = write!(key, "{byte:02x}");
    }
    key
}

/// 切片记录数据库.
pub struct RecordDb {
    db: Database,
}

impl RecordDb {
    /// 打开数据库文件, 不存在则创建.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DbError> {
        let db = Database::create(path).map_err(DbError::Database)?;
        Ok(Self { db })
    }

    /// 写入一条记录, 键相同的既有记录被覆盖.
    pub fn put(&self, record: &SlideRecord) -> Result<(), DbError> {
        self.put_many(std::iter::once(record))
    }

    /// 在单个写事务内写入多条记录.
    ///
    /// 事务提交前对读取方不可见; 提交失败时所有记录均不落盘.
    pub fn put_many<'a, I>(&self, records: I) -> Result<(), DbError>
    where
        I: IntoIterator<Item = &'a SlideRecord>,
    {
        let txn = self.db.begin_write().map_err(DbError::Transaction)?;
        {
            let mut table = txn.open_table(RECORDS).map_err(DbError::Table)?;
            for record in records {
                let key = key_of(record.source_path());
                let bytes =
                    bincode::serialize(&StoredRecord::from(record)).map_err(DbError::Codec)?;
                table
                    .insert(key.as_str(), bytes.as_slice())
                    .map_err(DbError::Storage)?;
            }
        }
        txn.commit().map_err(DbError::Commit)
    }

    /// 按来源路径读取记录, 不存在返回 `Ok(None)`.
    pub fn get(&self, source_path: &str) -> Result<Option<SlideRecord>, DbError> {
        let txn = self.db.begin_read().map_err(DbError::Transaction)?;
        let table = match txn.open_table(RECORDS) {
            Ok(table) => table,
            // 尚无任何写入时表不存在, 等同于查无此键.
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(e) => return Err(DbError::Table(e)),
        };
        match table.get(key_of(source_path).as_str()) {
            Ok(Some(guard)) => {
                let stored: StoredRecord =
                    bincode::deserialize(guard.value()).map_err(DbError::Codec)?;
                Ok(Some(SlideRecord::from(stored)))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DbError::Storage(e)),
        }
    }

    /// 判断记录是否存在, 不做反序列化.
    pub fn contains(&self, source_path: &str) -> Result<bool, DbError> {
        let txn = self.db.begin_read().map_err(DbError::Transaction)?;
        let table = match txn.open_table(RECORDS) {
            Ok(table) => table,
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(false),
            Err(e) => return Err(DbError::Table(e)),
        };
        table
            .get(key_of(source_path).as_str())
            .map(|v| v.is_some())
            .map_err(DbError::Storage)
    }

    /// 库中记录条数.
    pub fn len(&self) -> Result<u64, DbError> {
        let txn = self.db.begin_read().map_err(DbError::Transaction)?;
        match txn.open_table(RECORDS) {
            Ok(table) => table.len().map_err(DbError::Storage),
            Err(redb::TableError::TableDoesNotExist(_)) => Ok(0),
            Err(e) => Err(DbError::Table(e)),
        }
    }

    /// 惰性迭代全部记录, 按键的字典序.
    ///
    /// 迭代基于打开时刻的读快照, 期间的并发写入不会出现在结果中.
    pub fn iter(&self) -> Result<RecordIter, DbError> {
        let txn = self.db.begin_read().map_err(DbError::Transaction)?;
        let range = match txn.open_table(RECORDS) {
            Ok(table) => Some(table.range::<&str>(..).map_err(DbError::Storage)?),
            Err(redb::TableError::TableDoesNotExist(_)) => None,
            Err(e) => return Err(DbError::Table(e)),
        };
        Ok(RecordIter { _txn: txn, range })
    }
}

/// [`RecordDb::iter`] 的惰性迭代器.
///
/// 持有读事务以维持快照, 逐条反序列化.
pub struct RecordIter {
    _txn: ReadTransaction,
    range: Option<redb::Range<'static, &'static str, &'static [u8]>>,
}

impl Iterator for RecordIter {
    type Item = Result<SlideRecord, DbError>;

    fn next(&mut self) -> Option<Self::Item> {
        let entry = self.range.as_mut()?.next()?;
        Some(match entry {
            Ok((_, value)) => bincode::deserialize::<StoredRecord>(value.value())
                .map(SlideRecord::from)
                .map_err(DbError::Codec),
            Err(e) => Err(DbError::Storage(e)),
        })
    }
}
