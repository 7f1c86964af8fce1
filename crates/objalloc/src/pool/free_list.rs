//! Intrusive list of free slots
//!
//! The list owns no memory: each node is the payload of a free slot and the
//! link lives in that payload's first word (see [`Slot::next_free`]).

use core::fmt;
use core::marker::PhantomData;
use core::ptr::NonNull;

use super::slot::Slot;

/// Singly linked list of free slots, newest first
pub struct FreeList {
    head: Option<Slot>,
    len: usize,
}

impl FreeList {
    pub(crate) const fn new() -> Self {
        Self { head: None, len: 0 }
    }

    /// Number of free slots
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Slot the next allocation will receive
    pub fn head(&self) -> Option<NonNull<u8>> {
        self.head.map(Slot::payload)
    }

    /// Walks the free slots from head to tail
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            next: self.head,
            _list: PhantomData,
        }
    }

    /// Whether `ptr` is currently on the list (linear scan)
    pub fn contains(&self, ptr: NonNull<u8>) -> bool {
        self.iter().any(|slot| slot == ptr)
    }

    /// Prepends `slot`
    ///
    /// # Safety
    /// `slot` must be a slot of a live page that no client owns and that is
    /// not already on the list.
    #[inline]
    pub(crate) unsafe fn push(&mut self, slot: Slot) {
        // SAFETY: caller guarantees the slot is free, so its link word is ours.
        unsafe { slot.set_next_free(self.head) };
        self.head = Some(slot);
        self.len += 1;
    }

    /// Removes and returns the head slot
    #[inline]
    pub(crate) fn pop(&mut self) -> Option<Slot> {
        let slot = self.head?;
        // SAFETY: every slot on the list was pushed as free, so its link
        // word is valid.
        self.head = unsafe { slot.next_free() };
        self.len -= 1;
        Some(slot)
    }

    /// Counts the free slots whose address satisfies `pred`
    pub(crate) fn count_where(&self, mut pred: impl FnMut(usize) -> bool) -> usize {
        self.iter().filter(|slot| pred(slot.as_ptr() as usize)).count()
    }

    /// Unlinks every slot whose address satisfies `pred`, keeping the order
    /// of the remaining slots. Returns how many were removed.
    pub(crate) fn remove_where(&mut self, mut pred: impl FnMut(usize) -> bool) -> usize {
        let mut removed = 0;
        let mut prev: Option<Slot> = None;
        let mut cursor = self.head;

        while let Some(slot) = cursor {
            // SAFETY: `slot` is on the list.
            let next = unsafe { slot.next_free() };
            if pred(slot.addr()) {
                match prev {
                    // SAFETY: `prev` is still on the list and free.
                    Some(kept) => unsafe { kept.set_next_free(next) },
                    None => self.head = next,
                }
                removed += 1;
            } else {
                prev = Some(slot);
            }
            cursor = next;
        }

        self.len -= removed;
        removed
    }
}

impl fmt::Debug for FreeList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FreeList")
            .field("head", &self.head())
            .field("len", &self.len)
            .finish()
    }
}

impl<'a> IntoIterator for &'a FreeList {
    type Item = NonNull<u8>;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the payload addresses of a [`FreeList`]
pub struct Iter<'a> {
    next: Option<Slot>,
    _list: PhantomData<&'a FreeList>,
}

impl Iterator for Iter<'_> {
    type Item = NonNull<u8>;

    fn next(&mut self) -> Option<Self::Item> {
        let slot = self.next?;
        // SAFETY: the borrowed list cannot change while we walk it.
        self.next = unsafe { slot.next_free() };
        Some(slot.payload())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Word-aligned fake slots, two words each
    fn slots(storage: &mut [[usize; 2]]) -> Vec<Slot> {
        storage
            .iter_mut()
            .map(|cell| unsafe { Slot::from_payload(NonNull::from(cell).cast::<u8>()) })
            .collect()
    }

    #[test]
    fn test_push_pop_is_lifo() {
        let mut storage = [[0usize; 2]; 3];
        let slots = slots(&mut storage);
        let mut list = FreeList::new();

        for &slot in &slots {
            unsafe { list.push(slot) };
        }
        assert_eq!(list.len(), 3);
        assert_eq!(list.head(), Some(slots[2].payload()));

        assert_eq!(list.pop(), Some(slots[2]));
        assert_eq!(list.pop(), Some(slots[1]));
        assert_eq!(list.pop(), Some(slots[0]));
        assert_eq!(list.pop(), None);
        assert!(list.is_empty());
        assert_eq!(list.len(), 0);
    }

    #[test]
    fn test_remove_where_keeps_order() {
        let mut storage = [[0usize; 2]; 5];
        let slots = slots(&mut storage);
        let mut list = FreeList::new();
        for &slot in &slots {
            unsafe { list.push(slot) };
        }

        let odd: Vec<usize> = [1, 3].iter().map(|&i| slots[i].addr()).collect();
        let removed = list.remove_where(|addr| odd.contains(&addr));

        assert_eq!(removed, 2);
        assert_eq!(list.len(), 3);
        let order: Vec<_> = list.iter().collect();
        assert_eq!(
            order,
            vec![slots[4].payload(), slots[2].payload(), slots[0].payload()]
        );
        assert!(!list.contains(slots[3].payload()));
    }

    #[test]
    fn test_remove_head_and_count() {
        let mut storage = [[0usize; 2]; 2];
        let slots = slots(&mut storage);
        let mut list = FreeList::new();
        unsafe {
            list.push(slots[0]);
            list.push(slots[1]);
        }

        let head = slots[1].addr();
        assert_eq!(list.count_where(|addr| addr == head), 1);
        assert_eq!(list.remove_where(|addr| addr == head), 1);
        assert_eq!(list.head(), Some(slots[0].payload()));
        assert_eq!(list.len(), 1);
    }
}
