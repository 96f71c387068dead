//! # 流式物化表
//!
//! 每次更新先追加到变更日志主题，追加被接受后再更新内存状态，
//! 变更日志因此与表的变更序列一一对应。

use crate::{
    codec::Codec,
    domain::{Handle, Produce},
    errors::TransitError,
    record::Record,
};
use ahash::AHashMap;
use serde::{Serialize, de::DeserializeOwned};
use std::{fmt::Debug, hash::Hash, marker::PhantomData, time::Duration};
use tracing::{debug, info, instrument};

/// 记录投影特征，须为纯函数
pub trait Transform: Send {
    /// 输入记录类型
    type Input: DeserializeOwned;
    /// 表主键类型
    type Key: Eq + Hash + Clone + Debug + Serialize + DeserializeOwned + Send;
    /// 表值类型
    type Output: Clone + Serialize + DeserializeOwned + Send;

    /// 提取主键
    fn key(input: &Self::Input) -> Self::Key;
    /// 投影输入记录
    fn apply(input: Self::Input) -> Self::Output;
}

/// 带变更日志的键值表
pub struct Table<T, P, C>
where
    T: Transform,
    P: Produce,
    C: Codec,
{
    name: String,
    changelog: String,
    entries: AHashMap<T::Key, T::Output>,
    producer: P,
    codec: C,
    mutations: u64,
}

impl<T, P, C> Table<T, P, C>
where
    T: Transform,
    P: Produce,
    C: Codec,
{
    /// 构造函数
    pub fn new(
        name: impl Into<String>,
        changelog: impl Into<String>,
        producer: P,
        codec: C,
    ) -> Self {
        Self {
            name: name.into(),
            changelog: changelog.into(),
            entries: AHashMap::new(),
            producer,
            codec,
            mutations: 0,
        }
    }

    /// 表名
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 变更日志主题
    pub fn changelog_topic(&self) -> &str {
        &self.changelog
    }

    /// 插入或覆盖
    pub fn upsert(&mut self, key: T::Key, value: T::Output) -> Result<(), TransitError> {
        let key_bytes = self.codec.encode_key(&key)?;
        let value_bytes = self.codec.encode_value(&value)?;
        self.producer
            .send(&self.changelog, Some(&key_bytes), &value_bytes)?;
        debug!(table = %self.name, ?key, "更新表记录");
        self.entries.insert(key, value);
        self.mutations += 1;
        Ok(())
    }

    /// 查询
    pub fn get(&self, key: &T::Key) -> Option<&T::Output> {
        self.entries.get(key)
    }

    /// 记录数
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 遍历记录
    pub fn iter(&self) -> impl Iterator<Item = (&T::Key, &T::Output)> {
        self.entries.iter()
    }

    /// 自启动以来的更新次数
    pub fn mutations(&self) -> u64 {
        self.mutations
    }

    /// 从变更日志回放状态，不再追加变更日志
    ///
    /// 空消息体视为删除标记。
    #[instrument(name = "recover_table", skip_all, fields(table = %self.name))]
    pub fn recover<I>(&mut self, records: I) -> Result<usize, TransitError>
    where
        I: IntoIterator<Item = Record>,
    {
        let mut count = 0;
        for record in records {
            let key: T::Key = self.codec.decode_key(record.key()?)?;
            match record.payload.as_deref() {
                Some(bytes) => {
                    let value: T::Output = self.codec.decode_value(bytes)?;
                    self.entries.insert(key, value);
                }
                None => {
                    self.entries.remove(&key);
                }
            }
            count += 1;
        }
        info!(count, entries = self.entries.len(), "完成变更日志回放");
        Ok(count)
    }

    /// 刷新变更日志生产者
    pub fn flush(&self, timeout: Duration) -> Result<(), TransitError> {
        self.producer.flush(timeout)
    }
}

/// 物化者：解码源记录、投影并写入表
pub struct Materializer<T, D, P, C>
where
    T: Transform,
    D: Codec,
    P: Produce,
    C: Codec,
{
    decoder: D,
    table: Table<T, P, C>,
    _marker: PhantomData<T>,
}

impl<T, D, P, C> Materializer<T, D, P, C>
where
    T: Transform,
    D: Codec,
    P: Produce,
    C: Codec,
{
    /// 构造函数
    pub fn new(decoder: D, table: Table<T, P, C>) -> Self {
        Self {
            decoder,
            table,
            _marker: PhantomData,
        }
    }

    /// 物化表
    pub fn table(&self) -> &Table<T, P, C> {
        &self.table
    }

    /// 可变物化表，用于启动时回放
    pub fn table_mut(&mut self) -> &mut Table<T, P, C> {
        &mut self.table
    }
}

impl<T, D, P, C> Handle for Materializer<T, D, P, C>
where
    T: Transform,
    D: Codec,
    P: Produce,
    C: Codec,
{
    fn handle(&mut self, record: Record) -> Result<(), TransitError> {
        let input: T::Input = self.decoder.decode_value(record.payload()?)?;
        let key = T::key(&input);
        self.table.upsert(key, T::apply(input))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        codec::JsonCodec,
        station::{Line, StationTransform, TransformedStation, tests::station},
        test_utils::{MemoryProducer, record},
    };
    use std::sync::Arc;

    const SOURCE: &str = "org.chicago.cta.raw.stations";
    const CHANGELOG: &str = "org.chicago.cta.stations.table.v1";

    type StationTable = Table<StationTransform, Arc<MemoryProducer>, JsonCodec>;

    fn table(producer: &Arc<MemoryProducer>) -> StationTable {
        Table::new("stations_table", CHANGELOG, Arc::clone(producer), JsonCodec)
    }

    fn source(offset: i64, id: i32, red: bool, blue: bool, green: bool) -> Record {
        let payload = serde_json::to_vec(&station(id, red, blue, green)).unwrap();
        record(SOURCE, offset, None, &payload)
    }

    #[test]
    fn materialize_three_stations() {
        let producer = Arc::new(MemoryProducer::new());
        let mut materializer = Materializer::new(JsonCodec, table(&producer));

        materializer.handle(source(0, 1, true, false, false)).unwrap();
        materializer.handle(source(1, 2, false, true, false)).unwrap();
        materializer.handle(source(2, 3, false, false, true)).unwrap();

        let table = materializer.table();
        assert_eq!(table.len(), 3);
        assert_eq!(table.get(&1).unwrap().line, Some(Line::Red));
        assert_eq!(table.get(&2).unwrap().line, Some(Line::Blue));
        assert_eq!(table.get(&3).unwrap().line, Some(Line::Green));

        let changelog = producer.sent();
        assert_eq!(changelog.len(), 3);
        let lines: Vec<(i32, Option<Line>)> = changelog
            .iter()
            .map(|sent| {
                assert_eq!(sent.topic, CHANGELOG);
                let value: TransformedStation = serde_json::from_slice(&sent.payload).unwrap();
                let key: i32 = serde_json::from_slice(sent.key.as_deref().unwrap()).unwrap();
                assert_eq!(key, value.station_id);
                (value.station_id, value.line)
            })
            .collect();
        assert_eq!(
            lines,
            vec![
                (1, Some(Line::Red)),
                (2, Some(Line::Blue)),
                (3, Some(Line::Green))
            ]
        );
    }

    #[test]
    fn changelog_mirrors_every_upsert_in_order() {
        let producer = Arc::new(MemoryProducer::new());
        let mut materializer = Materializer::new(JsonCodec, table(&producer));
        let inputs = [
            (1, true, false, false),
            (2, false, true, false),
            (1, false, false, true),
            (1, false, false, false),
            (2, true, false, false),
        ];

        for (offset, (id, red, blue, green)) in inputs.into_iter().enumerate() {
            materializer
                .handle(source(offset as i64, id, red, blue, green))
                .unwrap();
        }

        let changelog: Vec<TransformedStation> = producer
            .sent()
            .iter()
            .map(|sent| serde_json::from_slice(&sent.payload).unwrap())
            .collect();
        assert_eq!(changelog.len(), inputs.len());
        let expected: Vec<(i32, Option<Line>)> = vec![
            (1, Some(Line::Red)),
            (2, Some(Line::Blue)),
            (1, Some(Line::Green)),
            (1, None),
            (2, Some(Line::Red)),
        ];
        let actual: Vec<(i32, Option<Line>)> =
            changelog.iter().map(|s| (s.station_id, s.line)).collect();
        assert_eq!(actual, expected);

        let table = materializer.table();
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(&1).unwrap().line, None);
        assert_eq!(table.get(&2).unwrap().line, Some(Line::Red));
        assert_eq!(table.mutations(), 5);
    }

    #[test]
    fn rejected_changelog_append_leaves_table_unchanged() {
        let producer = Arc::new(MemoryProducer::new());
        let mut materializer = Materializer::new(JsonCodec, table(&producer));
        materializer.handle(source(0, 1, true, false, false)).unwrap();

        producer.reject_sends();
        let result = materializer.handle(source(1, 1, false, true, false));

        assert!(matches!(result, Err(TransitError::Publish(_))));
        assert_eq!(materializer.table().get(&1).unwrap().line, Some(Line::Red));
        assert_eq!(materializer.table().mutations(), 1);
    }

    #[test]
    fn malformed_source_record_is_rejected() {
        let producer = Arc::new(MemoryProducer::new());
        let mut materializer = Materializer::new(JsonCodec, table(&producer));

        let result = materializer.handle(record(SOURCE, 0, None, b"{\"station_id\":1}"));

        assert!(matches!(result, Err(TransitError::Codec(_))));
        assert!(materializer.table().is_empty());
        assert!(producer.sent().is_empty());
    }

    #[test]
    fn recover_replays_changelog_without_appending() {
        let origin = Arc::new(MemoryProducer::new());
        let mut materializer = Materializer::new(JsonCodec, table(&origin));
        materializer.handle(source(0, 1, true, false, false)).unwrap();
        materializer.handle(source(1, 2, false, true, false)).unwrap();
        materializer.handle(source(2, 1, false, false, true)).unwrap();
        let replay: Vec<Record> = origin
            .sent()
            .into_iter()
            .enumerate()
            .map(|(offset, sent)| record(CHANGELOG, offset as i64, sent.key.as_deref(), &sent.payload))
            .collect();

        let producer = Arc::new(MemoryProducer::new());
        let mut restored = table(&producer);
        let count = restored.recover(replay).unwrap();

        assert_eq!(count, 3);
        assert_eq!(restored.len(), 2);
        assert_eq!(restored.get(&1).unwrap().line, Some(Line::Green));
        assert_eq!(restored.get(&2).unwrap().line, Some(Line::Blue));
        assert!(producer.sent().is_empty());
        assert_eq!(restored.mutations(), 0);
    }

    #[test]
    fn recover_applies_tombstones() {
        let producer = Arc::new(MemoryProducer::new());
        let mut restored = table(&producer);
        let value = serde_json::to_vec(&StationTransform::apply(station(7, true, false, false))).unwrap();
        let mut tombstone = record(CHANGELOG, 1, Some(b"7"), b"");
        tombstone.payload = None;

        restored
            .recover([record(CHANGELOG, 0, Some(b"7"), &value), tombstone])
            .unwrap();

        assert!(restored.is_empty());
    }
}
