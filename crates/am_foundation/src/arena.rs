// crates/am_foundation/src/arena.rs

//! 带代际验证的泛型 Arena
//!
//! 网格单元之间的邻接关系是一个带环的图。这里把单元放进 Arena，
//! 以 `Idx<Tag>` 句柄互相引用，避免引用环，同时保持 O(1) 访问。
//!
//! 与简单的空闲链表池不同，每个槽位带有代际号：
//! 槽位被回收再利用后，旧句柄的代际不再匹配，`get` 返回 `None`，
//! 因而网格加密后残留的旧邻居句柄会被立即发现，而不是静默指向新单元。
//!
//! # 示例
//!
//! ```
//! use am_foundation::arena::{Arena, CellTag};
//!
//! let mut arena: Arena<i32, CellTag> = Arena::new();
//! let a = arena.insert(1);
//! assert_eq!(arena.remove(a), Some(1));
//!
//! // 复用槽位，但旧句柄失效
//! let b = arena.insert(2);
//! assert_eq!(a.index(), b.index());
//! assert_eq!(arena.get(a), None);
//! assert_eq!(arena.get(b), Some(&2));
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

// ============================================================================
// 标记类型
// ============================================================================

/// Arena 标记 trait，用于区分不同用途的 Arena
pub trait ArenaTag: 'static + Copy + Send + Sync {}

/// 网格单元标记
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellTag;
impl ArenaTag for CellTag {}

// ============================================================================
// 句柄类型
// ============================================================================

/// 带代际的强类型句柄（8 字节）
///
/// `generation == 0` 保留给 [`Idx::INVALID`]。
#[derive(Serialize, Deserialize)]
pub struct Idx<Tag> {
    index: u32,
    generation: u32,
    #[serde(skip)]
    _marker: PhantomData<fn() -> Tag>,
}

// 手动实现，避免 derive 给 Tag 加上多余的约束
impl<Tag> Copy for Idx<Tag> {}

impl<Tag> Clone for Idx<Tag> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl<Tag> PartialEq for Idx<Tag> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}

impl<Tag> Eq for Idx<Tag> {}

impl<Tag> Hash for Idx<Tag> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
        self.generation.hash(state);
    }
}

impl<Tag> PartialOrd for Idx<Tag> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<Tag> Ord for Idx<Tag> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.index, self.generation).cmp(&(other.index, other.generation))
    }
}

impl<Tag> fmt::Debug for Idx<Tag> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "Idx({}v{})", self.index, self.generation)
        } else {
            write!(f, "Idx(INVALID)")
        }
    }
}

impl<Tag> Default for Idx<Tag> {
    fn default() -> Self {
        Self::INVALID
    }
}

impl<Tag> Idx<Tag> {
    /// 无效句柄常量
    pub const INVALID: Self = Self {
        index: u32::MAX,
        generation: 0,
        _marker: PhantomData,
    };

    /// 由槽位与代际构造句柄
    #[inline]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self {
            index,
            generation,
            _marker: PhantomData,
        }
    }

    /// 槽位索引
    #[inline]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// 槽位索引（usize）
    #[inline]
    pub const fn as_usize(self) -> usize {
        self.index as usize
    }

    /// 代际号
    #[inline]
    pub const fn generation(self) -> u32 {
        self.generation
    }

    /// 是否为有效句柄
    #[inline]
    pub const fn is_valid(self) -> bool {
        self.generation != 0 && self.index != u32::MAX
    }
}

// ============================================================================
// Slot 定义
// ============================================================================

#[derive(Debug, Clone)]
enum Entry<T> {
    Occupied(T),
    Vacant { next_free: Option<u32> },
}

#[derive(Debug, Clone)]
struct Slot<T> {
    generation: u32,
    entry: Entry<T>,
}

// ============================================================================
// Arena 实现
// ============================================================================

/// 泛型内存池
///
/// 插入与删除均为 O(1)；删除后的槽位通过空闲链表复用，
/// 复用时代际号加一。
#[derive(Debug, Clone)]
pub struct Arena<T, Tag: ArenaTag> {
    slots: Vec<Slot<T>>,
    free_head: Option<u32>,
    len: usize,
    _marker: PhantomData<Tag>,
}

impl<T, Tag: ArenaTag> Default for Arena<T, Tag> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, Tag: ArenaTag> Arena<T, Tag> {
    /// 创建空 Arena
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// 预分配容量
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free_head: None,
            len: 0,
            _marker: PhantomData,
        }
    }

    /// 有效元素数量
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// 是否为空
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// 槽位总数（含空闲槽位），可用于按槽位索引的旁路表
    #[inline]
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// 插入元素，返回句柄
    pub fn insert(&mut self, value: T) -> Idx<Tag> {
        self.insert_with(|_| value)
    }

    /// 插入元素，构造函数可以拿到即将分配的句柄
    pub fn insert_with(&mut self, make: impl FnOnce(Idx<Tag>) -> T) -> Idx<Tag> {
        self.len += 1;
        match self.free_head {
            Some(free) => {
                let slot = &mut self.slots[free as usize];
                let next_free = match slot.entry {
                    Entry::Vacant { next_free } => next_free,
                    Entry::Occupied(_) => unreachable!("free list points at an occupied slot"),
                };
                self.free_head = next_free;
                slot.generation = slot.generation.wrapping_add(1).max(1);
                let idx = Idx::new(free, slot.generation);
                slot.entry = Entry::Occupied(make(idx));
                idx
            }
            None => {
                let index = u32::try_from(self.slots.len())
                    .ok()
                    .filter(|&i| i != u32::MAX)
                    .unwrap_or_else(|| panic!("arena capacity exhausted"));
                let idx = Idx::new(index, 1);
                self.slots.push(Slot {
                    generation: 1,
                    entry: Entry::Occupied(make(idx)),
                });
                idx
            }
        }
    }

    /// 删除元素，旧句柄随即失效
    pub fn remove(&mut self, idx: Idx<Tag>) -> Option<T> {
        let slot = self.slots.get_mut(idx.as_usize())?;
        if slot.generation != idx.generation || !matches!(slot.entry, Entry::Occupied(_)) {
            return None;
        }
        let old = std::mem::replace(
            &mut slot.entry,
            Entry::Vacant {
                next_free: self.free_head,
            },
        );
        self.free_head = Some(idx.index);
        self.len -= 1;
        match old {
            Entry::Occupied(value) => Some(value),
            Entry::Vacant { .. } => None,
        }
    }

    /// 句柄是否仍然有效
    #[inline]
    pub fn contains(&self, idx: Idx<Tag>) -> bool {
        self.get(idx).is_some()
    }

    /// 不可变访问
    #[inline]
    pub fn get(&self, idx: Idx<Tag>) -> Option<&T> {
        match self.slots.get(idx.as_usize()) {
            Some(Slot {
                generation,
                entry: Entry::Occupied(value),
            }) if *generation == idx.generation => Some(value),
            _ => None,
        }
    }

    /// 可变访问
    #[inline]
    pub fn get_mut(&mut self, idx: Idx<Tag>) -> Option<&mut T> {
        match self.slots.get_mut(idx.as_usize()) {
            Some(Slot {
                generation,
                entry: Entry::Occupied(value),
            }) if *generation == idx.generation => Some(value),
            _ => None,
        }
    }

    /// 按槽位顺序遍历有效元素
    pub fn iter(&self) -> impl Iterator<Item = (Idx<Tag>, &T)> {
        self.slots.iter().enumerate().filter_map(|(i, slot)| match &slot.entry {
            Entry::Occupied(value) => Some((Idx::new(i as u32, slot.generation), value)),
            Entry::Vacant { .. } => None,
        })
    }

    /// 按槽位顺序可变遍历
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Idx<Tag>, &mut T)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(i, slot)| match &mut slot.entry {
                Entry::Occupied(value) => Some((Idx::new(i as u32, slot.generation), value)),
                Entry::Vacant { .. } => None,
            })
    }

    /// 清空，所有句柄失效
    pub fn clear(&mut self) {
        self.slots.clear();
        self.free_head = None;
        self.len = 0;
    }
}

impl<T, Tag: ArenaTag> std::ops::Index<Idx<Tag>> for Arena<T, Tag> {
    type Output = T;

    fn index(&self, idx: Idx<Tag>) -> &T {
        self.get(idx)
            .unwrap_or_else(|| panic!("stale or invalid handle {idx:?}"))
    }
}

impl<T, Tag: ArenaTag> std::ops::IndexMut<Idx<Tag>> for Arena<T, Tag> {
    fn index_mut(&mut self, idx: Idx<Tag>) -> &mut T {
        self.get_mut(idx)
            .unwrap_or_else(|| panic!("stale or invalid handle {idx:?}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_get_remove() {
        let mut arena: Arena<&str, CellTag> = Arena::new();
        let a = arena.insert("a");
        let b = arena.insert("b");
        assert_eq!(arena.len(), 2);
        assert_eq!(arena[a], "a");
        assert_eq!(arena.remove(b), Some("b"));
        assert_eq!(arena.remove(b), None);
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn test_stale_handle_after_reuse() {
        let mut arena: Arena<u8, CellTag> = Arena::new();
        let a = arena.insert(1);
        arena.remove(a);
        let b = arena.insert(2);
        assert_eq!(a.index(), b.index());
        assert_ne!(a, b);
        assert!(!arena.contains(a));
        assert!(arena.get_mut(a).is_none());
        assert_eq!(arena.get(b), Some(&2));
    }

    #[test]
    fn test_insert_with_sees_own_handle() {
        let mut arena: Arena<Idx<CellTag>, CellTag> = Arena::new();
        let id = arena.insert_with(|me| me);
        assert_eq!(arena[id], id);
    }

    #[test]
    fn test_iter_skips_vacant() {
        let mut arena: Arena<i32, CellTag> = Arena::new();
        let ids: Vec<_> = (0..5).map(|i| arena.insert(i)).collect();
        arena.remove(ids[1]);
        arena.remove(ids[3]);
        let values: Vec<i32> = arena.iter().map(|(_, v)| *v).collect();
        assert_eq!(values, vec![0, 2, 4]);
        assert_eq!(arena.slot_count(), 5);
    }

    #[test]
    fn test_invalid_handle() {
        let arena: Arena<i32, CellTag> = Arena::new();
        assert!(!Idx::<CellTag>::INVALID.is_valid());
        assert!(arena.get(Idx::INVALID).is_none());
    }
}
