//! Reference-counted object heap with generation-checked references

use std::fmt;
use std::rc::Rc;

use crate::trap::TrapKind;
use crate::value::Value;

/// Handle to a heap object. A handle outlives its object only as a stale
/// generation, so a freed slot is never aliased.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HeapRef {
    index: u32,
    generation: u32,
}

impl fmt::Display for HeapRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.index, self.generation)
    }
}

#[derive(Debug, Clone)]
pub struct Object {
    /// Type-descriptor constant index
    pub ty: u32,
    pub refcount: u32,
    pub fields: Vec<Value>,
    /// Which fields are released with the object
    owned: Rc<[bool]>,
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    object: Option<Object>,
}

#[derive(Debug, Default)]
pub struct Heap {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of objects not yet freed
    pub fn live(&self) -> usize {
        self.live
    }

    pub fn alloc(&mut self, ty: u32, fields: Vec<Value>, owned: Rc<[bool]>) -> HeapRef {
        let object = Object { ty, refcount: 1, fields, owned };
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.object = Some(object);
            return HeapRef { index, generation: slot.generation };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot { generation: 0, object: Some(object) });
        HeapRef { index, generation: 0 }
    }

    pub fn get(&self, r: HeapRef) -> Result<&Object, TrapKind> {
        match self.slots.get(r.index as usize) {
            Some(Slot { generation, object: Some(object) }) if *generation == r.generation => Ok(object),
            _ => Err(TrapKind::DanglingReference),
        }
    }

    pub fn get_mut(&mut self, r: HeapRef) -> Result<&mut Object, TrapKind> {
        match self.slots.get_mut(r.index as usize) {
            Some(Slot { generation, object: Some(object) }) if *generation == r.generation => Ok(object),
            _ => Err(TrapKind::DanglingReference),
        }
    }

    /// Drop one reference. At zero the object is freed and its owned
    /// fields are released in turn, without recursion.
    pub fn release(&mut self, root: HeapRef) -> Result<(), TrapKind> {
        let mut pending = vec![root];
        while let Some(r) = pending.pop() {
            let object = self.get_mut(r)?;
            object.refcount -= 1;
            if object.refcount > 0 {
                continue;
            }

            let slot = &mut self.slots[r.index as usize];
            let Some(object) = slot.object.take() else {
                return Err(TrapKind::DanglingReference);
            };
            slot.generation = slot.generation.wrapping_add(1);
            self.free.push(r.index);
            self.live -= 1;

            for (value, owned) in object.fields.into_iter().zip(object.owned.iter()) {
                if let (true, Value::Ref(child)) = (*owned, value) {
                    pending.push(child);
                }
            }
        }
        Ok(())
    }

    /// Copy an object and, transitively, every object it owns
    pub fn deep_clone(&mut self, root: HeapRef) -> Result<HeapRef, TrapKind> {
        let copy = self.shallow_clone(root)?;
        let mut pending = vec![copy];
        while let Some(r) = pending.pop() {
            let object = self.get(r)?;
            let children: Vec<(usize, HeapRef)> = object
                .fields
                .iter()
                .zip(object.owned.iter())
                .enumerate()
                .filter_map(|(i, (value, owned))| match (owned, value) {
                    (true, Value::Ref(child)) => Some((i, *child)),
                    _ => None,
                })
                .collect();
            for (i, child) in children {
                let child_copy = self.shallow_clone(child)?;
                self.get_mut(r)?.fields[i] = Value::Ref(child_copy);
                pending.push(child_copy);
            }
        }
        Ok(copy)
    }

    fn shallow_clone(&mut self, r: HeapRef) -> Result<HeapRef, TrapKind> {
        let object = self.get(r)?;
        let (ty, fields, owned) = (object.ty, object.fields.clone(), object.owned.clone());
        Ok(self.alloc(ty, fields, owned))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask(owned: &[bool]) -> Rc<[bool]> {
        Rc::from(owned)
    }

    #[test]
    fn test_freed_slot_is_reused_with_new_generation() {
        let mut heap = Heap::new();
        let a = heap.alloc(0, vec![Value::Int(1)], mask(&[false]));
        heap.release(a).unwrap();
        let b = heap.alloc(0, vec![Value::Int(2)], mask(&[false]));
        assert_eq!(a.index, b.index);
        assert_ne!(a, b);
        assert_eq!(heap.get(a).unwrap_err(), TrapKind::DanglingReference);
        assert_eq!(heap.get(b).unwrap().fields, vec![Value::Int(2)]);
    }

    #[test]
    fn test_double_release_is_dangling() {
        let mut heap = Heap::new();
        let a = heap.alloc(0, vec![], mask(&[]));
        heap.release(a).unwrap();
        assert_eq!(heap.release(a), Err(TrapKind::DanglingReference));
    }

    #[test]
    fn test_release_frees_long_chain_iteratively() {
        let mut heap = Heap::new();
        let mut next = Value::Null;
        for i in 0..100_000 {
            let r = heap.alloc(0, vec![Value::Int(i), next], mask(&[false, true]));
            next = Value::Ref(r);
        }
        assert_eq!(heap.live(), 100_000);
        let Value::Ref(head) = next else { unreachable!() };
        heap.release(head).unwrap();
        assert_eq!(heap.live(), 0);
    }

    #[test]
    fn test_deep_clone_copies_owned_children() {
        let mut heap = Heap::new();
        let child = heap.alloc(1, vec![Value::Int(7)], mask(&[false]));
        let parent = heap.alloc(0, vec![Value::Ref(child)], mask(&[true]));
        let copy = heap.deep_clone(parent).unwrap();
        assert_eq!(heap.live(), 4);

        let Value::Ref(child_copy) = heap.get(copy).unwrap().fields[0] else { panic!("expected a reference") };
        assert_ne!(child_copy, child);
        heap.release(parent).unwrap();
        assert_eq!(heap.get(child_copy).unwrap().fields, vec![Value::Int(7)]);
        heap.release(copy).unwrap();
        assert_eq!(heap.live(), 0);
    }
}
