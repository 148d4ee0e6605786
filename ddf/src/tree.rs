//! The DDF arena: a self-describing tagged value tree.
//!
//! Nodes live in a single arena (`Ddf`) and are addressed by `NodeId`, a
//! plain index. A parent back-reference is therefore just another
//! `NodeId` stored on the child's slot — a lookup relation, never an
//! owning one. This is the arena encoding the design notes call out for
//! implementers who aren't using a garbage-collected host language.
//! `destroy()` does not reclaim a slot: it tombstones it to `Null` in
//! place, so a `NodeId` a caller is still holding remains valid to query
//! (it will simply report `is_null`).

use std::collections::HashMap;
use std::fmt;

use crate::error::TreeError;

/// Handle to a node living in a [`Ddf`] arena.
///
/// `NodeId`s from one tree are meaningless in another; all methods here
/// are inherent on `Ddf` and take the tree they address as `&self`/`&mut
/// self`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    index: usize,
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.index)
    }
}

/// An opaque in-process object reference. Never serialized.
///
/// The tree stores only an index into a side table the caller populates;
/// DDF itself has no opinion on what a pointer points to.
pub type PointerId = u64;

#[derive(Clone)]
pub(crate) enum Value {
    /// Produced only by `destroy()`. Compares non-equal to everything,
    /// including another `Null`.
    Null,
    Empty,
    StringSafe(String),
    StringUnsafe(Vec<u8>),
    Int(i32),
    Float(f64),
    Struct(StructData),
    List(Vec<NodeId>),
    Pointer(PointerId),
}

#[derive(Clone, Default)]
pub(crate) struct StructData {
    /// Insertion order of keys, kept in sync with `by_name`.
    pub(crate) order: Vec<String>,
    pub(crate) by_name: HashMap<String, NodeId>,
}

impl StructData {
    fn insert(&mut self, name: String, child: NodeId) -> Option<NodeId> {
        if let Some(prior) = self.by_name.insert(name.clone(), child) {
            Some(prior)
        } else {
            self.order.push(name);
            None
        }
    }

    fn remove(&mut self, name: &str) -> Option<NodeId> {
        let removed = self.by_name.remove(name);
        if removed.is_some() {
            self.order.retain(|k| k != name);
        }
        removed
    }
}

#[derive(Clone)]
struct Slot {
    name: Option<String>,
    parent: Option<NodeId>,
    value: Value,
}

/// A DDF tree arena. Not thread-safe: callers serialize access to a given
/// tree, exactly as spec.md requires. Distinct `Ddf` instances are
/// independent and may be used from different threads concurrently.
#[derive(Default)]
pub struct Ddf {
    slots: Vec<Slot>,
}

/// Type tag, matching the wire-level numeric values in spec.md §3.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tag {
    Empty = 0,
    String = 1,
    Int = 2,
    Float = 3,
    Struct = 4,
    List = 5,
    Pointer = 6,
    StringUnsafe = 7,
    /// Not a wire tag: the sentinel state produced by `destroy()`.
    Null = 255,
}

impl Ddf {
    pub fn new() -> Self {
        Self::default()
    }

    // -----------------------------------------------------------------
    // Constructors
    // -----------------------------------------------------------------

    fn alloc(&mut self, value: Value) -> NodeId {
        let index = self.slots.len();
        self.slots.push(Slot { name: None, parent: None, value });
        NodeId { index }
    }

    pub fn empty(&mut self) -> NodeId {
        self.alloc(Value::Empty)
    }

    pub fn string(&mut self, s: impl Into<String>) -> NodeId {
        self.alloc(Value::StringSafe(s.into()))
    }

    pub fn unsafe_string(&mut self, bytes: impl Into<Vec<u8>>) -> NodeId {
        self.alloc(Value::StringUnsafe(bytes.into()))
    }

    pub fn integer(&mut self, n: i32) -> NodeId {
        self.alloc(Value::Int(n))
    }

    pub fn floating(&mut self, f: f64) -> NodeId {
        self.alloc(Value::Float(f))
    }

    pub fn pointer(&mut self, p: PointerId) -> NodeId {
        self.alloc(Value::Pointer(p))
    }

    pub fn structure(&mut self) -> NodeId {
        self.alloc(Value::Struct(StructData::default()))
    }

    pub fn list(&mut self) -> NodeId {
        self.alloc(Value::List(Vec::new()))
    }

    // -----------------------------------------------------------------
    // Internal slot access
    // -----------------------------------------------------------------

    fn slot(&self, id: NodeId) -> &Slot {
        &self.slots[id.index]
    }

    fn slot_mut(&mut self, id: NodeId) -> &mut Slot {
        &mut self.slots[id.index]
    }

    pub fn name(&self, id: NodeId) -> Option<&str> {
        self.slot(id).name.as_deref()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.slot(id).parent
    }

    pub fn tag(&self, id: NodeId) -> Tag {
        match &self.slot(id).value {
            Value::Null => Tag::Null,
            Value::Empty => Tag::Empty,
            Value::StringSafe(_) => Tag::String,
            Value::StringUnsafe(_) => Tag::StringUnsafe,
            Value::Int(_) => Tag::Int,
            Value::Float(_) => Tag::Float,
            Value::Struct(_) => Tag::Struct,
            Value::List(_) => Tag::List,
            Value::Pointer(_) => Tag::Pointer,
        }
    }

    // -----------------------------------------------------------------
    // Type predicates
    // -----------------------------------------------------------------

    pub fn is_empty(&self, id: NodeId) -> bool {
        self.tag(id) == Tag::Empty
    }
    pub fn is_null(&self, id: NodeId) -> bool {
        self.tag(id) == Tag::Null
    }
    pub fn is_string(&self, id: NodeId) -> bool {
        self.tag(id) == Tag::String
    }
    pub fn is_unsafe_string(&self, id: NodeId) -> bool {
        self.tag(id) == Tag::StringUnsafe
    }
    pub fn is_int(&self, id: NodeId) -> bool {
        self.tag(id) == Tag::Int
    }
    pub fn is_float(&self, id: NodeId) -> bool {
        self.tag(id) == Tag::Float
    }
    pub fn is_struct(&self, id: NodeId) -> bool {
        self.tag(id) == Tag::Struct
    }
    pub fn is_list(&self, id: NodeId) -> bool {
        self.tag(id) == Tag::List
    }
    pub fn is_pointer(&self, id: NodeId) -> bool {
        self.tag(id) == Tag::Pointer
    }

    // -----------------------------------------------------------------
    // Scalar getters (with coercion for integer()/floating())
    // -----------------------------------------------------------------

    pub fn as_str(&self, id: NodeId) -> Option<&str> {
        match &self.slot(id).value {
            Value::StringSafe(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_unsafe_bytes(&self, id: NodeId) -> Option<&[u8]> {
        match &self.slot(id).value {
            Value::StringUnsafe(b) => Some(b.as_slice()),
            _ => None,
        }
    }

    /// Returns the integer value, coercing from a parseable string, from a
    /// float (truncating), or from the element count of a struct/list.
    pub fn as_int(&self, id: NodeId) -> Option<i32> {
        match &self.slot(id).value {
            Value::Int(n) => Some(*n),
            Value::Float(f) => Some(*f as i32),
            Value::StringSafe(s) => s.trim().parse::<i32>().ok(),
            Value::Struct(s) => Some(s.order.len() as i32),
            Value::List(l) => Some(l.len() as i32),
            _ => None,
        }
    }

    /// Returns the float value, coercing from a parseable string, from an
    /// int, or from the element count of a struct/list.
    pub fn as_float(&self, id: NodeId) -> Option<f64> {
        match &self.slot(id).value {
            Value::Float(f) => Some(*f),
            Value::Int(n) => Some(*n as f64),
            Value::StringSafe(s) => s.trim().parse::<f64>().ok(),
            Value::Struct(s) => Some(s.order.len() as f64),
            Value::List(l) => Some(l.len() as f64),
            _ => None,
        }
    }

    pub fn as_pointer(&self, id: NodeId) -> Option<PointerId> {
        match &self.slot(id).value {
            Value::Pointer(p) => Some(*p),
            _ => None,
        }
    }

    /// Struct children in insertion order, as `(name, NodeId)` pairs.
    pub fn struct_entries(&self, id: NodeId) -> Option<Vec<(&str, NodeId)>> {
        match &self.slot(id).value {
            Value::Struct(s) => Some(
                s.order
                    .iter()
                    .map(|k| (k.as_str(), *s.by_name.get(k).expect("order/map in sync")))
                    .collect(),
            ),
            _ => None,
        }
    }

    /// List children in order.
    pub fn list_entries(&self, id: NodeId) -> Option<&[NodeId]> {
        match &self.slot(id).value {
            Value::List(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    // -----------------------------------------------------------------
    // Setters: atomically replace type + value, releasing prior children
    // -----------------------------------------------------------------

    fn release_children_if_container(&mut self, id: NodeId) {
        let old = std::mem::replace(&mut self.slot_mut(id).value, Value::Empty);
        match old {
            Value::Struct(s) => {
                for (_, child) in s.by_name {
                    self.destroy(child);
                }
            }
            Value::List(items) => {
                for child in items {
                    self.destroy(child);
                }
            }
            other => {
                // put it back; we only needed to check the shape
                self.slot_mut(id).value = other;
            }
        }
    }

    pub fn set_string(&mut self, id: NodeId, s: impl Into<String>) {
        self.release_children_if_container(id);
        self.slot_mut(id).value = Value::StringSafe(s.into());
    }

    pub fn set_unsafe_string(&mut self, id: NodeId, bytes: impl Into<Vec<u8>>) {
        self.release_children_if_container(id);
        self.slot_mut(id).value = Value::StringUnsafe(bytes.into());
    }

    pub fn set_integer(&mut self, id: NodeId, n: i32) {
        self.release_children_if_container(id);
        self.slot_mut(id).value = Value::Int(n);
    }

    pub fn set_floating(&mut self, id: NodeId, f: f64) {
        self.release_children_if_container(id);
        self.slot_mut(id).value = Value::Float(f);
    }

    pub fn set_pointer(&mut self, id: NodeId, p: PointerId) {
        self.release_children_if_container(id);
        self.slot_mut(id).value = Value::Pointer(p);
    }

    /// Converts `id` into an empty struct, releasing any prior children.
    pub fn make_struct(&mut self, id: NodeId) {
        self.release_children_if_container(id);
        self.slot_mut(id).value = Value::Struct(StructData::default());
    }

    /// Converts `id` into an empty list, releasing any prior children.
    pub fn make_list(&mut self, id: NodeId) {
        self.release_children_if_container(id);
        self.slot_mut(id).value = Value::List(Vec::new());
    }

    // -----------------------------------------------------------------
    // Ancestry / cycle check
    // -----------------------------------------------------------------

    fn is_ancestor_of(&self, maybe_ancestor: NodeId, id: NodeId) -> bool {
        let mut cur = self.parent(id);
        while let Some(p) = cur {
            if p == maybe_ancestor {
                return true;
            }
            cur = self.parent(p);
        }
        false
    }

    // -----------------------------------------------------------------
    // Child mutation
    // -----------------------------------------------------------------

    /// Appends `child` on a list, or upserts it on a struct keyed by the
    /// child's name. No-op if the receiver is not a struct/list, if
    /// `child` is already a direct child of `receiver`, if inserting would
    /// create a cycle, or (struct receivers only) if `child` has no name
    /// to key on.
    pub fn add(&mut self, receiver: NodeId, child: NodeId) -> Result<(), TreeError> {
        if self.parent(child) == Some(receiver) {
            return Ok(());
        }
        if receiver == child || self.is_ancestor_of(child, receiver) {
            return Err(TreeError::WouldCreateCycle);
        }

        match self.tag(receiver) {
            Tag::List => {
                self.detach_from_current_parent(child);
                if let Value::List(items) = &mut self.slot_mut(receiver).value {
                    items.push(child);
                }
                self.slot_mut(child).parent = Some(receiver);
                Ok(())
            }
            Tag::Struct => {
                let name = match self.slot(child).name.clone() {
                    Some(n) => n,
                    None => return Ok(()), // no-op: nothing to key on
                };
                self.detach_from_current_parent(child);
                let prior = if let Value::Struct(s) = &mut self.slot_mut(receiver).value {
                    s.insert(name, child)
                } else {
                    None
                };
                if let Some(prior) = prior {
                    self.destroy(prior);
                }
                self.slot_mut(child).parent = Some(receiver);
                Ok(())
            }
            _ => Ok(()), // no-op: receiver isn't struct/list
        }
    }

    /// Inserts `child` immediately before `reference` in the same list
    /// `reference` already belongs to. No-op if `reference` is not in a
    /// list, or on the cycle condition `add` checks.
    pub fn add_before(&mut self, reference: NodeId, child: NodeId) -> Result<(), TreeError> {
        self.add_relative(reference, child, true)
    }

    /// As [`Ddf::add_before`] but inserts immediately after `reference`.
    pub fn add_after(&mut self, reference: NodeId, child: NodeId) -> Result<(), TreeError> {
        self.add_relative(reference, child, false)
    }

    fn add_relative(&mut self, reference: NodeId, child: NodeId, before: bool) -> Result<(), TreeError> {
        let parent = match self.parent(reference) {
            Some(p) if self.is_list(p) => p,
            _ => return Ok(()),
        };
        if child == parent || self.is_ancestor_of(child, parent) {
            return Err(TreeError::WouldCreateCycle);
        }
        self.detach_from_current_parent(child);
        if let Value::List(items) = &mut self.slot_mut(parent).value {
            let at = items.iter().position(|&n| n == reference);
            match at {
                Some(pos) => {
                    let insert_at = if before { pos } else { pos + 1 };
                    items.insert(insert_at, child);
                }
                None => return Ok(()),
            }
        }
        self.slot_mut(child).parent = Some(parent);
        Ok(())
    }

    fn detach_from_current_parent(&mut self, id: NodeId) {
        let Some(parent) = self.parent(id) else { return };
        let name = self.slots[id.index].name.clone();
        match &mut self.slots[parent.index].value {
            Value::List(items) => items.retain(|&n| n != id),
            Value::Struct(s) => {
                if let Some(name) = name {
                    s.remove(&name);
                }
            }
            _ => {}
        }
        self.slots[id.index].parent = None;
    }

    /// Detaches `id` from its current parent (if any) and returns it.
    pub fn remove(&mut self, id: NodeId) -> NodeId {
        self.detach_from_current_parent(id);
        id
    }

    /// Empties a node's value (to the `Null` sentinel), recursively
    /// destroying struct/list children, and detaches it from any parent.
    /// Idempotent: destroying an already-`Null` node is a no-op.
    pub fn destroy(&mut self, id: NodeId) {
        if self.is_null(id) {
            return;
        }
        self.detach_from_current_parent(id);
        let old = std::mem::replace(&mut self.slot_mut(id).value, Value::Null);
        match old {
            Value::Struct(s) => {
                for (_, child) in s.by_name {
                    self.destroy(child);
                }
            }
            Value::List(items) => {
                for child in items {
                    self.destroy(child);
                }
            }
            _ => {}
        }
        self.slot_mut(id).name = None;
    }

    // -----------------------------------------------------------------
    // Path navigation
    // -----------------------------------------------------------------

    /// Looks up a dotted path (struct keys, or `[n]` for list indices)
    /// starting at `id`. Returns the null sentinel on any miss.
    pub fn get_member(&mut self, id: NodeId, path: &str) -> NodeId {
        let mut cur = id;
        for segment in path.split('.') {
            if segment.is_empty() {
                continue;
            }
            cur = self.step(cur, segment);
        }
        cur
    }

    fn step(&mut self, cur: NodeId, segment: &str) -> NodeId {
        if let Some(idx_str) = segment.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
            let idx: usize = match idx_str.parse() {
                Ok(n) => n,
                Err(_) => return self.null_sentinel(),
            };
            let found = self.list_entries(cur).and_then(|items| items.get(idx).copied());
            return found.unwrap_or_else(|| self.null_sentinel());
        }
        match self.tag(cur) {
            Tag::Struct => {
                let found = match &self.slot(cur).value {
                    Value::Struct(s) => s.by_name.get(segment).copied(),
                    _ => None,
                };
                found.unwrap_or_else(|| self.null_sentinel())
            }
            Tag::List => {
                // Path continues past a list without an explicit index:
                // use the first element, cursor does not advance past
                // this segment (we re-resolve `segment` against element 0).
                let first = self.list_entries(cur).and_then(|items| items.first().copied());
                match first {
                    Some(first) => self.step(first, segment),
                    None => self.null_sentinel(),
                }
            }
            _ => self.null_sentinel(),
        }
    }

    fn null_sentinel(&mut self) -> NodeId {
        self.alloc(Value::Null)
    }

    /// Creates the chain named by `path`, converting any non-struct
    /// ancestor to an empty struct and inserting missing segments as
    /// empty nodes. Returns the deepest node. `[n]` segments are not
    /// supported for creation (structs only); such a segment creates a
    /// struct member literally named `[n]`, matching the conversion rule
    /// ("any non-struct ancestor is first converted to an empty struct").
    pub fn add_member(&mut self, id: NodeId, path: &str) -> NodeId {
        let mut cur = id;
        for segment in path.split('.') {
            if segment.is_empty() {
                continue;
            }
            if !self.is_struct(cur) {
                self.make_struct(cur);
            }
            let existing = match &self.slot(cur).value {
                Value::Struct(s) => s.by_name.get(segment).copied(),
                _ => None,
            };
            cur = match existing {
                Some(child) => child,
                None => {
                    let child = self.empty();
                    self.slot_mut(child).name = Some(segment.to_string());
                    let _ = self.add(cur, child);
                    child
                }
            };
        }
        cur
    }

    // -----------------------------------------------------------------
    // Structural equality (name + type + value, recursive; parents and
    // NodeId identity are not part of the comparison)
    // -----------------------------------------------------------------

    pub fn structural_eq(&self, a: NodeId, b: NodeId) -> bool {
        if self.is_null(a) || self.is_null(b) {
            return false;
        }
        if self.name(a) != self.name(b) {
            return false;
        }
        match (&self.slot(a).value, &self.slot(b).value) {
            (Value::Empty, Value::Empty) => true,
            (Value::StringSafe(x), Value::StringSafe(y)) => x == y,
            (Value::StringUnsafe(x), Value::StringUnsafe(y)) => x == y,
            (Value::Int(x), Value::Int(y)) => x == y,
            (Value::Float(x), Value::Float(y)) => x.to_bits() == y.to_bits(),
            (Value::Pointer(x), Value::Pointer(y)) => x == y,
            (Value::List(x), Value::List(y)) => {
                x.len() == y.len() && x.iter().zip(y).all(|(&p, &q)| self.structural_eq(p, q))
            }
            (Value::Struct(x), Value::Struct(y)) => {
                if x.order.len() != y.order.len() {
                    return false;
                }
                x.order.iter().zip(&y.order).all(|(kx, ky)| kx == ky)
                    && x.order.iter().all(|k| {
                        match (x.by_name.get(k), y.by_name.get(k)) {
                            (Some(&p), Some(&q)) => self.structural_eq(p, q),
                            _ => false,
                        }
                    })
            }
            _ => false,
        }
    }

    // -----------------------------------------------------------------
    // Name assignment (used by struct insertion and tests)
    // -----------------------------------------------------------------

    /// Sets a node's display name. Truncated to 255 bytes of UTF-8 as
    /// spec.md requires; truncation lands on a char boundary.
    /// No-op while `id` is currently a struct's member, since a struct
    /// child's name is immutable and equal to its key for as long as it
    /// stays in that container (spec invariant). Detach it first if it
    /// needs a new name.
    pub fn set_name(&mut self, id: NodeId, name: impl Into<String>) {
        if let Some(parent) = self.parent(id) {
            if self.is_struct(parent) {
                return;
            }
        }
        let mut name = name.into();
        if name.len() > 255 {
            let mut cut = 255;
            while !name.is_char_boundary(cut) {
                cut -= 1;
            }
            name.truncate(cut);
        }
        self.slot_mut(id).name = Some(name);
    }
}
