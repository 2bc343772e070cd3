//! In-memory ordered index: key -> position of the live record in the log.
//!
//! Одна конкретная реализация поверх BTreeMap c внутренним RwLock; наружу
//! отдаются колбэки с ранней остановкой (вернуть Ok(false) — прекратить
//! обход), как в сканах каталога.
//!
//! Lifecycle of an entry: created/overwritten on commit of a Normal record;
//! removed on commit of a tombstone or lazily when a read detects expiry;
//! replaced wholesale when merge finishes and the hint-driven reload runs.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::RwLock;

use crate::errors::Result;
use crate::wal::Position;

#[derive(Default)]
pub struct BTreeIndex {
    tree: RwLock<BTreeMap<Vec<u8>, Position>>,
}

impl BTreeIndex {
    pub fn new() -> BTreeIndex {
        BTreeIndex::default()
    }

    /// Вставить/заменить позицию ключа; возвращает прежнюю позицию.
    pub fn put(&self, key: Vec<u8>, position: Position) -> Option<Position> {
        self.tree.write().unwrap().insert(key, position)
    }

    pub fn get(&self, key: &[u8]) -> Option<Position> {
        self.tree.read().unwrap().get(key).copied()
    }

    /// Удалить ключ; возвращает прежнюю позицию, если ключ был.
    pub fn delete(&self, key: &[u8]) -> Option<Position> {
        self.tree.write().unwrap().remove(key)
    }

    pub fn len(&self) -> usize {
        self.tree.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.read().unwrap().is_empty()
    }

    pub fn clear(&self) {
        self.tree.write().unwrap().clear();
    }

    /// Обход по возрастанию. Колбэк возвращает Ok(true) — продолжить,
    /// Ok(false) — остановиться; ошибка прерывает обход и всплывает.
    pub fn ascend<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(&[u8], &Position) -> Result<bool>,
    {
        let tree = self.tree.read().unwrap();
        for (key, pos) in tree.iter() {
            if !f(key.as_slice(), pos)? {
                break;
            }
        }
        Ok(())
    }

    /// Обход [start, end) по возрастанию.
    pub fn ascend_range<F>(&self, start: &[u8], end: &[u8], mut f: F) -> Result<()>
    where
        F: FnMut(&[u8], &Position) -> Result<bool>,
    {
        let tree = self.tree.read().unwrap();
        let range = tree.range::<[u8], _>((Bound::Included(start), Bound::Excluded(end)));
        for (key, pos) in range {
            if !f(key.as_slice(), pos)? {
                break;
            }
        }
        Ok(())
    }

    /// Обход по возрастанию начиная с key >= `key`.
    pub fn ascend_greater_or_equal<F>(&self, key: &[u8], mut f: F) -> Result<()>
    where
        F: FnMut(&[u8], &Position) -> Result<bool>,
    {
        let tree = self.tree.read().unwrap();
        let range = tree.range::<[u8], _>((Bound::Included(key), Bound::Unbounded));
        for (k, pos) in range {
            if !f(k.as_slice(), pos)? {
                break;
            }
        }
        Ok(())
    }

    /// Обход по убыванию.
    pub fn descend<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(&[u8], &Position) -> Result<bool>,
    {
        let tree = self.tree.read().unwrap();
        for (key, pos) in tree.iter().rev() {
            if !f(key.as_slice(), pos)? {
                break;
            }
        }
        Ok(())
    }

    /// Обход (end, start] по убыванию: от старшего ключа к младшему.
    pub fn descend_range<F>(&self, start: &[u8], end: &[u8], mut f: F) -> Result<()>
    where
        F: FnMut(&[u8], &Position) -> Result<bool>,
    {
        let tree = self.tree.read().unwrap();
        let range = tree.range::<[u8], _>((Bound::Excluded(end), Bound::Included(start)));
        for (key, pos) in range.rev() {
            if !f(key.as_slice(), pos)? {
                break;
            }
        }
        Ok(())
    }

    /// Обход по убыванию начиная с key <= `key`.
    pub fn descend_less_or_equal<F>(&self, key: &[u8], mut f: F) -> Result<()>
    where
        F: FnMut(&[u8], &Position) -> Result<bool>,
    {
        let tree = self.tree.read().unwrap();
        let range = tree.range::<[u8], _>((Bound::Unbounded, Bound::Included(key)));
        for (k, pos) in range.rev() {
            if !f(k.as_slice(), pos)? {
                break;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(segment_id: u32, offset: u64) -> Position {
        Position {
            segment_id,
            block_number: 0,
            chunk_offset: offset,
            chunk_size: 16,
        }
    }

    #[test]
    fn put_returns_prior_position() {
        let index = BTreeIndex::new();
        assert!(index.is_empty());
        assert!(index.put(b"k".to_vec(), pos(1, 0)).is_none());
        let old = index.put(b"k".to_vec(), pos(1, 100)).unwrap();
        assert_eq!(old, pos(1, 0));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn delete_returns_prior_position() {
        let index = BTreeIndex::new();
        index.put(b"k".to_vec(), pos(2, 8));
        assert_eq!(index.delete(b"k"), Some(pos(2, 8)));
        assert_eq!(index.delete(b"k"), None);
        assert!(index.get(b"k").is_none());
    }

    #[test]
    fn ascend_is_ordered_and_stoppable() {
        let index = BTreeIndex::new();
        for i in [3u8, 1, 2, 5, 4] {
            index.put(vec![i], pos(1, i as u64));
        }
        let mut seen = Vec::new();
        index
            .ascend(|k, _| {
                seen.push(k[0]);
                Ok(seen.len() < 3)
            })
            .unwrap();
        assert_eq!(seen, vec![1, 2, 3]);
    }

    #[test]
    fn descend_and_ranges() {
        let index = BTreeIndex::new();
        for i in 1u8..=5 {
            index.put(vec![i], pos(1, i as u64));
        }
        let mut seen = Vec::new();
        index
            .descend(|k, _| {
                seen.push(k[0]);
                Ok(true)
            })
            .unwrap();
        assert_eq!(seen, vec![5, 4, 3, 2, 1]);

        let mut seen = Vec::new();
        index
            .ascend_range(&[2], &[4], |k, _| {
                seen.push(k[0]);
                Ok(true)
            })
            .unwrap();
        assert_eq!(seen, vec![2, 3]);

        let mut seen = Vec::new();
        index
            .ascend_greater_or_equal(&[3], |k, _| {
                seen.push(k[0]);
                Ok(true)
            })
            .unwrap();
        assert_eq!(seen, vec![3, 4, 5]);

        let mut seen = Vec::new();
        index
            .descend_less_or_equal(&[3], |k, _| {
                seen.push(k[0]);
                Ok(true)
            })
            .unwrap();
        assert_eq!(seen, vec![3, 2, 1]);
    }
}
