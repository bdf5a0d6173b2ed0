// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Archetype storage with row allocation and deferred removal

use std::alloc::{self, Layout};
use std::any::{type_name, TypeId};
use std::hash::{Hash, Hasher};
use std::ptr::{self, NonNull};

use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::component::{Component, ComponentInfo, TypeKey};
use crate::error::{EcsError, Result};

/// Index of an archetype inside its world
pub type ArchetypeId = usize;

/// Sorted component keys
pub type TypeKeys = SmallVec<[TypeKey; 8]>;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Combined identifier of a sorted set of component keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Signature(u64);

impl Signature {
    /// Combine a sorted key list into one value
    ///
    /// The set size is mixed in ahead of the keys and the result goes through a
    /// finalizer, so a one-element set never maps to its bare key.
    pub fn of(sorted_keys: &[TypeKey]) -> Self {
        let mut hash = fnv_mix(FNV_OFFSET, sorted_keys.len() as u32);
        for key in sorted_keys {
            hash = fnv_mix(hash, key.raw());
        }
        Self(finalize(hash))
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

fn fnv_mix(mut hash: u64, value: u32) -> u64 {
    for byte in value.to_le_bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

// splitmix64 finalizer
fn finalize(mut x: u64) -> u64 {
    x ^= x >> 30;
    x = x.wrapping_mul(0xbf58_476d_1ce4_e5b9);
    x ^= x >> 27;
    x = x.wrapping_mul(0x94d0_49bb_1331_11eb);
    x ^ (x >> 31)
}

/// Check that every key of `sub` is present in `whole`
///
/// Both slices must be sorted ascending. Walks `whole` once.
pub fn is_superset(sub: &[TypeKey], whole: &[TypeKey]) -> bool {
    let mut matched = 0;
    for key in whole {
        match sub.get(matched) {
            None => break,
            Some(wanted) if wanted == key => matched += 1,
            Some(wanted) if wanted < key => return false,
            Some(_) => {}
        }
    }
    matched == sub.len()
}

/// Sorted, duplicate-free set of component keys with its precomputed signature
///
/// Hashing only feeds the signature; equality also compares the keys, so two
/// sets whose signatures collide still resolve to different map entries.
#[derive(Debug, Clone)]
pub struct TypeSet {
    keys: TypeKeys,
    signature: Signature,
}

impl TypeSet {
    /// The set with no components
    pub fn empty() -> Self {
        Self::from_sorted_unchecked(TypeKeys::new())
    }

    fn from_sorted_unchecked(keys: TypeKeys) -> Self {
        let signature = Signature::of(&keys);
        Self { keys, signature }
    }

    /// Build from keys already sorted ascending without duplicates
    pub fn from_sorted(keys: &[TypeKey]) -> Result<Self> {
        if keys.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(EcsError::UnsortedTypeSet);
        }
        Ok(Self::from_sorted_unchecked(SmallVec::from_slice(keys)))
    }

    /// Sort `keys`; fails with the first key that appears twice
    pub fn from_unsorted(keys: &[TypeKey]) -> std::result::Result<Self, TypeKey> {
        let mut sorted = TypeKeys::from_slice(keys);
        sorted.sort_unstable();
        if let Some(pair) = sorted.windows(2).find(|pair| pair[0] == pair[1]) {
            return Err(pair[0]);
        }
        Ok(Self::from_sorted_unchecked(sorted))
    }

    /// This set plus `added`; fails with a key already present
    pub fn with(&self, added: &[TypeKey]) -> std::result::Result<Self, TypeKey> {
        let mut keys = self.keys.clone();
        keys.extend_from_slice(added);
        Self::from_unsorted(&keys)
    }

    /// This set minus `removed`
    pub fn without(&self, removed: &[TypeKey]) -> Self {
        let keys = self
            .keys
            .iter()
            .copied()
            .filter(|key| !removed.contains(key))
            .collect();
        Self::from_sorted_unchecked(keys)
    }

    pub fn keys(&self) -> &[TypeKey] {
        &self.keys
    }

    pub fn signature(&self) -> Signature {
        self.signature
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn contains(&self, key: TypeKey) -> bool {
        self.keys.binary_search(&key).is_ok()
    }

    /// Position of `key` in sorted order
    pub fn position(&self, key: TypeKey) -> Option<usize> {
        self.keys.binary_search(&key).ok()
    }

    pub fn is_superset_of(&self, sub: &TypeSet) -> bool {
        is_superset(&sub.keys, &self.keys)
    }
}

impl PartialEq for TypeSet {
    fn eq(&self, other: &Self) -> bool {
        self.signature == other.signature && self.keys == other.keys
    }
}

impl Eq for TypeSet {}

impl Hash for TypeSet {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.signature.0);
    }
}

/// Type-erased component column
///
/// Owns a buffer laid out for the component's `Layout`, so every element is
/// properly aligned and can be viewed as `&[T]`. Values are plain `Copy` data
/// and are moved with raw byte copies.
pub struct ComponentColumn {
    info: ComponentInfo,
    data: NonNull<u8>,
    len: usize,
    capacity: usize,
}

// SAFETY: a column only ever holds `Component` values, which are `Send + Sync`
unsafe impl Send for ComponentColumn {}
unsafe impl Sync for ComponentColumn {}

impl ComponentColumn {
    /// Create an empty column for the registered component
    pub fn new(info: ComponentInfo) -> Self {
        let layout = info.layout();
        Self {
            info,
            data: dangling(layout),
            len: 0,
            // Zero-sized values never need storage
            capacity: if layout.size() == 0 { usize::MAX } else { 0 },
        }
    }

    pub fn with_capacity(info: ComponentInfo, capacity: usize) -> Self {
        let mut column = Self::new(info);
        column.reserve(capacity);
        column
    }

    pub fn info(&self) -> &ComponentInfo {
        &self.info
    }

    pub fn key(&self) -> TypeKey {
        self.info.key()
    }

    /// Size of one element in bytes
    pub fn item_size(&self) -> usize {
        self.info.size()
    }

    /// Number of components
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes occupied by live elements
    pub fn byte_len(&self) -> usize {
        self.len * self.item_size()
    }

    /// Reserve space for additional elements
    pub fn reserve(&mut self, additional: usize) {
        let Some(required) = self.len.checked_add(additional) else {
            panic!("Column capacity overflow");
        };
        if required <= self.capacity {
            return;
        }
        let new_capacity = required.max(self.capacity.saturating_mul(2)).max(4);
        self.grow_to(new_capacity);
    }

    fn grow_to(&mut self, new_capacity: usize) {
        let item = self.info.layout();
        let new_layout = array_layout(item, new_capacity);
        let new_ptr = if self.capacity == 0 {
            // SAFETY: non-zero size, checked by the zero-sized capacity sentinel
            unsafe { alloc::alloc(new_layout) }
        } else {
            let old_layout = array_layout(item, self.capacity);
            // SAFETY: `data` was allocated with `old_layout` by this column
            unsafe { alloc::realloc(self.data.as_ptr(), old_layout, new_layout.size()) }
        };
        self.data = NonNull::new(new_ptr).unwrap_or_else(|| alloc::handle_alloc_error(new_layout));
        self.capacity = new_capacity;
    }

    /// Pointer to the slot of `row`
    ///
    /// # Safety
    /// `row` must not exceed the capacity
    pub(crate) unsafe fn ptr_at(&self, row: usize) -> *mut u8 {
        self.data.as_ptr().add(row * self.item_size())
    }

    /// Base pointer of the buffer
    pub(crate) fn base_ptr(&self) -> NonNull<u8> {
        self.data
    }

    /// Grow by one element and return its slot
    ///
    /// # Safety
    /// The slot must be written before anything reads the column
    pub(crate) unsafe fn push_uninit(&mut self) -> *mut u8 {
        self.reserve(1);
        let slot = self.ptr_at(self.len);
        self.len += 1;
        slot
    }

    pub(crate) fn check_size(&self, actual: usize) -> Result<()> {
        if actual != self.item_size() {
            return Err(EcsError::ComponentSizeMismatch {
                expected: self.item_size(),
                actual,
            });
        }
        Ok(())
    }

    /// Append one element from raw bytes
    pub fn push_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.check_size(bytes.len())?;
        // SAFETY: the slot is fully overwritten with `item_size` bytes
        unsafe {
            let slot = self.push_uninit();
            ptr::copy_nonoverlapping(bytes.as_ptr(), slot, bytes.len());
        }
        Ok(())
    }

    /// Typed view over all elements; `None` if `T` is not this column's type
    pub fn as_slice<T: Component>(&self) -> Option<&[T]> {
        if TypeId::of::<T>() != self.info.type_id() {
            return None;
        }
        // SAFETY: the buffer holds `len` initialized, aligned values of `T`
        Some(unsafe { std::slice::from_raw_parts(self.data.as_ptr().cast::<T>(), self.len) })
    }

    pub fn as_mut_slice<T: Component>(&mut self) -> Option<&mut [T]> {
        if TypeId::of::<T>() != self.info.type_id() {
            return None;
        }
        // SAFETY: as above, and `&mut self` guarantees exclusive access
        Some(unsafe { std::slice::from_raw_parts_mut(self.data.as_ptr().cast::<T>(), self.len) })
    }

    /// Get component at index
    pub fn get<T: Component>(&self, row: usize) -> Option<&T> {
        self.as_slice::<T>()?.get(row)
    }

    /// Get mutable component at index
    pub fn get_mut<T: Component>(&mut self, row: usize) -> Option<&mut T> {
        self.as_mut_slice::<T>()?.get_mut(row)
    }

    /// Overwrite `row` with the last element and shrink by one
    pub(crate) fn swap_remove(&mut self, row: usize) {
        debug_assert!(row < self.len, "swap_remove past end of column");
        let last = self.len - 1;
        if row != last && self.item_size() > 0 {
            // SAFETY: both rows are live and distinct
            unsafe {
                ptr::copy_nonoverlapping(self.ptr_at(last), self.ptr_at(row), self.item_size());
            }
        }
        self.len = last;
    }

    /// Copy the element at `row` into slot `dst_row` of `dst`, which must
    /// store the same component
    pub(crate) fn copy_row_into(&self, row: usize, dst: &mut ComponentColumn, dst_row: usize) {
        assert_eq!(
            self.info.type_id(),
            dst.info.type_id(),
            "copy_row_into between columns of different types"
        );
        assert!(row < self.len && dst_row < dst.len, "copy_row_into past end of column");
        if self.item_size() == 0 {
            return;
        }
        // SAFETY: both rows are in bounds and the buffers are distinct allocations
        unsafe {
            ptr::copy_nonoverlapping(self.ptr_at(row), dst.ptr_at(dst_row), self.item_size());
        }
    }
}

impl Drop for ComponentColumn {
    fn drop(&mut self) {
        if self.item_size() > 0 && self.capacity > 0 {
            let layout = array_layout(self.info.layout(), self.capacity);
            // SAFETY: allocated by `grow_to` with this layout
            unsafe { alloc::dealloc(self.data.as_ptr(), layout) };
        }
    }
}

fn array_layout(item: Layout, count: usize) -> Layout {
    item.size()
        .checked_mul(count)
        .and_then(|size| Layout::from_size_align(size, item.align()).ok())
        .unwrap_or_else(|| panic!("Column capacity overflow ({count} elements)"))
}

fn dangling(layout: Layout) -> NonNull<u8> {
    // An address equal to the alignment is non-null and aligned
    NonNull::new(layout.align() as *mut u8).unwrap_or(NonNull::dangling())
}

/// Archetype: Structure of Arrays storage for one exact set of components
pub struct Archetype {
    id: ArchetypeId,
    types: TypeSet,
    columns: Vec<ComponentColumn>,
    len: usize,
    /// Rows waiting for `flush_removals`, sorted ascending
    pending_removals: Mutex<Vec<usize>>,
}

impl Archetype {
    /// Create new archetype with one empty column per component
    ///
    /// `infos` must be sorted by key, ascending and unique.
    pub fn new(id: ArchetypeId, infos: &[ComponentInfo]) -> Result<Self> {
        Self::with_capacity(id, infos, 0)
    }

    pub fn with_capacity(
        id: ArchetypeId,
        infos: &[ComponentInfo],
        capacity: usize,
    ) -> Result<Self> {
        let keys: TypeKeys = infos.iter().map(ComponentInfo::key).collect();
        let types = TypeSet::from_sorted(&keys)?;
        let columns = infos
            .iter()
            .map(|info| ComponentColumn::with_capacity(*info, capacity))
            .collect();

        Ok(Self {
            id,
            types,
            columns,
            len: 0,
            pending_removals: Mutex::new(Vec::new()),
        })
    }

    pub fn id(&self) -> ArchetypeId {
        self.id
    }

    pub fn types(&self) -> &TypeSet {
        &self.types
    }

    pub fn signature(&self) -> Signature {
        self.types.signature()
    }

    /// Number of rows, including rows marked for removal
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn row_count(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[ComponentColumn] {
        &self.columns
    }

    pub fn has_component(&self, key: TypeKey) -> bool {
        self.types.contains(key)
    }

    /// Get column index for a component key
    pub fn column_index(&self, key: TypeKey) -> Option<usize> {
        self.types.position(key)
    }

    /// Get column immutably
    pub fn column(&self, key: TypeKey) -> Option<&ComponentColumn> {
        self.columns.get(self.column_index(key)?)
    }

    /// Get column mutably
    pub fn column_mut(&mut self, key: TypeKey) -> Option<&mut ComponentColumn> {
        let index = self.column_index(key)?;
        self.columns.get_mut(index)
    }

    /// Column storing `T`, found by type rather than key
    pub fn column_of<T: Component>(&self) -> Option<&ComponentColumn> {
        let type_id = TypeId::of::<T>();
        self.columns
            .iter()
            .find(|column| column.info().type_id() == type_id)
    }

    pub(crate) fn column_by_index(&self, index: usize) -> &ComponentColumn {
        &self.columns[index]
    }

    pub(crate) fn column_by_index_mut(&mut self, index: usize) -> &mut ComponentColumn {
        &mut self.columns[index]
    }

    /// Typed view over the column for `key`, indexed by row
    pub fn read_column<T: Component>(&self, key: TypeKey) -> Result<&[T]> {
        self.column(key)
            .and_then(ComponentColumn::as_slice::<T>)
            .ok_or(EcsError::ComponentNotFound(type_name::<T>()))
    }

    pub fn read_column_mut<T: Component>(&mut self, key: TypeKey) -> Result<&mut [T]> {
        self.column_mut(key)
            .and_then(ComponentColumn::as_mut_slice::<T>)
            .ok_or(EcsError::ComponentNotFound(type_name::<T>()))
    }

    /// Append one row of raw bytes, one slice per column in key order
    ///
    /// Every slice is validated before any column grows, so a rejected row
    /// leaves the columns in lock-step.
    pub fn append_row(&mut self, row: &[&[u8]]) -> Result<usize> {
        if row.len() != self.columns.len() {
            return Err(EcsError::ColumnCountMismatch {
                expected: self.columns.len(),
                actual: row.len(),
            });
        }
        for (column, bytes) in self.columns.iter().zip(row) {
            column.check_size(bytes.len())?;
        }
        for (column, bytes) in self.columns.iter_mut().zip(row) {
            column.push_bytes(bytes)?;
        }
        self.len += 1;
        self.debug_assert_lockstep();
        Ok(self.len - 1)
    }

    /// Grow every column by one uninitialized row
    ///
    /// # Safety
    /// Every column slot of the returned row must be written before the
    /// archetype is read again.
    pub(crate) unsafe fn allocate_row(&mut self) -> usize {
        for column in &mut self.columns {
            column.push_uninit();
        }
        self.len += 1;
        self.len - 1
    }

    /// Pointer to one slot
    ///
    /// # Safety
    /// `column` must be a valid column index and `row` a live row
    pub(crate) unsafe fn slot_ptr(&self, column: usize, row: usize) -> *mut u8 {
        self.columns[column].ptr_at(row)
    }

    /// Reserve space for additional rows
    pub fn reserve_rows(&mut self, additional: usize) {
        for column in &mut self.columns {
            column.reserve(additional);
        }
    }

    /// Queue `row` for removal on the next flush
    ///
    /// Only touches the pending list, so it is safe while queries hold column
    /// pointers into this archetype.
    pub fn mark_row_for_removal(&self, row: usize) -> Result<()> {
        if row >= self.len {
            return Err(EcsError::RowOutOfBounds { row, len: self.len });
        }
        let mut pending = self.pending_removals.lock();
        match pending.binary_search(&row) {
            Ok(_) => Err(EcsError::AlreadyMarkedForRemoval { row }),
            Err(position) => {
                pending.insert(position, row);
                Ok(())
            }
        }
    }

    pub fn is_marked_for_removal(&self, row: usize) -> bool {
        self.pending_removals.lock().binary_search(&row).is_ok()
    }

    pub fn pending_removal_count(&self) -> usize {
        self.pending_removals.lock().len()
    }

    /// Swap-and-pop every pending row, returning how many were removed
    ///
    /// Rows are processed from the largest index down: the row moved into a
    /// freed slot always comes from above it, never from a slot still pending.
    pub fn flush_removals(&mut self) -> usize {
        let pending = std::mem::take(self.pending_removals.get_mut());
        for &row in pending.iter().rev() {
            for column in &mut self.columns {
                column.swap_remove(row);
            }
            self.len -= 1;
        }
        self.debug_assert_lockstep();
        pending.len()
    }

    fn debug_assert_lockstep(&self) {
        debug_assert!(
            self.columns.iter().all(|column| column.len() == self.len),
            "BUG: archetype columns out of lock-step"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::TypeRegistry;

    #[derive(Debug, Clone, Copy, PartialEq)]
    #[repr(C)]
    struct Position {
        x: f32,
        y: f32,
    }

    #[derive(Debug, Clone, Copy, PartialEq)]
    #[repr(align(16))]
    struct Wide(u64);

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Marker;

    fn keys(raw: &[u32]) -> Vec<TypeKey> {
        raw.iter().copied().map(TypeKey::from_raw).collect()
    }

    fn position_archetype() -> (Archetype, TypeKey) {
        let mut registry = TypeRegistry::new();
        let key = registry.register::<Position>();
        let info = *registry.info(key).unwrap();
        (Archetype::new(0, &[info]).unwrap(), key)
    }

    #[test]
    fn test_signature_ignores_order() {
        let a = TypeSet::from_unsorted(&keys(&[3, 1, 2])).unwrap();
        let b = TypeSet::from_unsorted(&keys(&[2, 3, 1])).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.signature(), b.signature());
        assert_eq!(a.keys(), keys(&[1, 2, 3]).as_slice());
    }

    #[test]
    fn test_signature_depends_on_membership() {
        let single = Signature::of(&keys(&[5]));
        assert_ne!(single.raw(), 5);
        assert_ne!(single, Signature::of(&keys(&[0, 5])));
        assert_ne!(single, Signature::of(&keys(&[5, 6])));
        assert_ne!(Signature::of(&[]), Signature::of(&keys(&[0])));
        assert_ne!(Signature::of(&keys(&[1, 2])), Signature::of(&keys(&[1, 3])));
    }

    #[test]
    fn test_type_set_rejects_duplicates() {
        assert_eq!(
            TypeSet::from_unsorted(&keys(&[4, 2, 4])).unwrap_err(),
            TypeKey::from_raw(4)
        );
        assert_eq!(
            TypeSet::from_sorted(&keys(&[1, 1])).unwrap_err(),
            EcsError::UnsortedTypeSet
        );
        assert_eq!(
            TypeSet::from_sorted(&keys(&[2, 1])).unwrap_err(),
            EcsError::UnsortedTypeSet
        );
    }

    #[test]
    fn test_type_set_with_and_without() {
        let base = TypeSet::from_sorted(&keys(&[1, 4])).unwrap();
        let grown = base.with(&keys(&[2])).unwrap();
        assert_eq!(grown.keys(), keys(&[1, 2, 4]).as_slice());
        assert!(base.with(&keys(&[4])).is_err());
        assert_eq!(grown.without(&keys(&[1, 4])).keys(), keys(&[2]).as_slice());
        assert!(grown.without(&keys(&[1, 2, 4])).is_empty());
    }

    #[test]
    fn test_is_superset() {
        assert!(is_superset(&keys(&[1]), &keys(&[1, 2, 3])));
        assert!(is_superset(&keys(&[1, 3]), &keys(&[1, 2, 3])));
        assert!(is_superset(&[], &keys(&[1])));
        assert!(is_superset(&[], &[]));
        assert!(!is_superset(&keys(&[1]), &keys(&[2, 3])));
        assert!(!is_superset(&keys(&[1, 2]), &keys(&[1])));
        assert!(!is_superset(&keys(&[4]), &keys(&[1, 2, 3])));
    }

    #[test]
    fn test_archetype_creation() {
        let mut registry = TypeRegistry::new();
        let a = registry.register::<Position>();
        let b = registry.register::<Wide>();
        let infos = [*registry.info(a).unwrap(), *registry.info(b).unwrap()];

        let arch = Archetype::new(7, &infos).unwrap();
        assert_eq!(arch.id(), 7);
        assert_eq!(arch.column_count(), 2);
        assert_eq!(arch.len(), 0);
        assert_eq!(arch.column_index(b), Some(1));

        let reversed = [infos[1], infos[0]];
        assert!(Archetype::new(8, &reversed).is_err());
    }

    #[test]
    fn test_append_row_and_read_column() {
        let (mut arch, key) = position_archetype();
        let value = Position { x: 1.5, y: -2.0 };
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&value.x.to_ne_bytes());
        bytes.extend_from_slice(&value.y.to_ne_bytes());

        assert_eq!(arch.append_row(&[&bytes]).unwrap(), 0);
        assert_eq!(arch.read_column::<Position>(key).unwrap(), &[value]);
        assert!(arch.read_column::<Wide>(key).is_err());
    }

    #[test]
    fn test_append_row_validates_before_growing() {
        let mut registry = TypeRegistry::new();
        let a = registry.register::<u32>();
        let b = registry.register::<u64>();
        let infos = [*registry.info(a).unwrap(), *registry.info(b).unwrap()];
        let mut arch = Archetype::new(0, &infos).unwrap();

        let err = arch.append_row(&[&[0u8; 4], &[0u8; 4]]).unwrap_err();
        assert_eq!(err, EcsError::ComponentSizeMismatch { expected: 8, actual: 4 });
        assert!(arch.append_row(&[&[0u8; 4]]).is_err());
        assert_eq!(arch.len(), 0);
        assert!(arch.columns().iter().all(|column| column.is_empty()));

        arch.append_row(&[&7u32.to_ne_bytes(), &9u64.to_ne_bytes()]).unwrap();
        assert_eq!(arch.read_column::<u32>(a).unwrap(), &[7]);
        assert_eq!(arch.read_column::<u64>(b).unwrap(), &[9]);
    }

    #[test]
    fn test_column_alignment() {
        let mut registry = TypeRegistry::new();
        let key = registry.register::<Wide>();
        let mut column = ComponentColumn::new(*registry.info(key).unwrap());
        for i in 0..33u64 {
            column.push_bytes(&[i as u8; 16]).unwrap();
        }
        assert_eq!(column.base_ptr().as_ptr() as usize % 16, 0);
        assert_eq!(column.len(), 33);
        assert_eq!(column.byte_len(), 33 * 16);
    }

    #[test]
    fn test_zero_sized_column() {
        let mut registry = TypeRegistry::new();
        let key = registry.register::<Marker>();
        let mut arch = Archetype::new(0, &[*registry.info(key).unwrap()]).unwrap();
        arch.append_row(&[&[]]).unwrap();
        arch.append_row(&[&[]]).unwrap();
        assert_eq!(arch.len(), 2);
        assert_eq!(arch.read_column::<Marker>(key).unwrap().len(), 2);

        arch.mark_row_for_removal(0).unwrap();
        assert_eq!(arch.flush_removals(), 1);
        assert_eq!(arch.read_column::<Marker>(key).unwrap().len(), 1);
    }

    #[test]
    fn test_mark_row_for_removal_rejects_duplicates() {
        let (mut arch, _) = position_archetype();
        arch.append_row(&[&[0u8; 8]]).unwrap();
        arch.mark_row_for_removal(0).unwrap();
        assert_eq!(
            arch.mark_row_for_removal(0).unwrap_err(),
            EcsError::AlreadyMarkedForRemoval { row: 0 }
        );
        assert_eq!(
            arch.mark_row_for_removal(3).unwrap_err(),
            EcsError::RowOutOfBounds { row: 3, len: 1 }
        );
        assert!(arch.is_marked_for_removal(0));
        assert_eq!(arch.len(), 1);
    }

    #[test]
    fn test_flush_removals_swap_and_pop() {
        let mut registry = TypeRegistry::new();
        let key = registry.register::<u32>();
        let mut arch = Archetype::new(0, &[*registry.info(key).unwrap()]).unwrap();
        for value in 0..6u32 {
            arch.append_row(&[&value.to_ne_bytes()]).unwrap();
        }

        // Marked out of order; the list stays sorted
        arch.mark_row_for_removal(4).unwrap();
        arch.mark_row_for_removal(0).unwrap();
        arch.mark_row_for_removal(5).unwrap();
        assert_eq!(arch.pending_removal_count(), 3);

        assert_eq!(arch.flush_removals(), 3);
        assert_eq!(arch.len(), 3);
        assert_eq!(arch.pending_removal_count(), 0);

        let mut remaining = arch.read_column::<u32>(key).unwrap().to_vec();
        remaining.sort_unstable();
        assert_eq!(remaining, vec![1, 2, 3]);
    }

    #[test]
    fn test_copy_row_into_existing_slot() {
        let mut registry = TypeRegistry::new();
        let key = registry.register::<u64>();
        let info = *registry.info(key).unwrap();
        let mut source = Archetype::new(0, &[info]).unwrap();
        let mut target = Archetype::new(1, &[info]).unwrap();
        for value in [3u64, 9] {
            source.append_row(&[&value.to_ne_bytes()]).unwrap();
        }
        target.append_row(&[&0u64.to_ne_bytes()]).unwrap();
        target.append_row(&[&0u64.to_ne_bytes()]).unwrap();

        source
            .column_by_index(0)
            .copy_row_into(1, target.column_by_index_mut(0), 0);
        assert_eq!(target.read_column::<u64>(key).unwrap(), &[9, 0]);
        assert_eq!(source.len(), 2);
    }

    #[test]
    #[should_panic(expected = "past end of column")]
    fn test_copy_row_into_rejects_unallocated_slot() {
        let (mut source, _) = position_archetype();
        let (mut target, _) = position_archetype();
        source.append_row(&[&[0u8; 8]]).unwrap();
        target.append_row(&[&[0u8; 8]]).unwrap();
        source
            .column_by_index(0)
            .copy_row_into(0, target.column_by_index_mut(0), 1);
    }
}
