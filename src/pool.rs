//! Sorted-children trie storing interned strings in a [`SegmentedArena`].
//!
//! Every node is a 13-byte record declared with [`StructShape`]:
//!
//! ```text
//! [ascii_char:1][parent_ptr:4][kid_capacity:4][kids_ptr:4]
//! ```
//!
//! `kids_ptr` addresses a child table of `kid_capacity` 4-byte pointers. The
//! occupied entries form a prefix sorted by the child's character and every
//! slot after it is zero, so both "how many children" and "is there a child
//! for `c`" are binary searches.
//!
//! The trie alphabet is 7 bits wide. Bit 7 of `ascii_char` marks a node at
//! which an interned string ends.

use tracing::{debug, trace};

use crate::arena::{ArenaStats, Ptr, SegmentedArena};
use crate::codec::{ByteCodec, PercentCodec};
use crate::error::{Error, Result};
use crate::layout::{FieldType, ListRef, ListShape, Primitive, StructRef, StructShape};
use crate::{Config, DEFAULT_SEGMENT_SIZE};

// =============================================================================
// Node layout
// =============================================================================

const NODE_LAYOUT: StructShape<4> = StructShape::new(
    "Node",
    [
        ("ascii_char", FieldType::U8),
        ("parent_ptr", FieldType::U32),
        ("kid_capacity", FieldType::U32),
        ("kids_ptr", FieldType::U32),
    ],
);

/// Node accessors borrow the shape, so it lives in a static.
static NODE: StructShape<4> = NODE_LAYOUT;

const ASCII_CHAR: usize = 0;
const PARENT_PTR: usize = 1;
const KID_CAPACITY: usize = 2;
const KIDS_PTR: usize = 3;

/// Size of one trie node in the arena.
pub const NODE_SIZE: usize = NODE_LAYOUT.size();

const _: () = assert!(NODE_SIZE == 13);

const KIDS: ListShape = ListShape::open(Primitive::U32);

const INTERNED_BIT: u8 = 0x80;
const CHAR_MASK: u8 = 0x7f;

/// Child-table capacity for a freshly created node at `depth`.
///
/// Branching concentrates near the root and chains deeper down, so tables
/// shrink with depth.
#[inline]
fn initial_capacity(depth: usize) -> usize {
    match depth {
        0 => 128,
        1 => 32,
        2 => 8,
        3..=15 => 4,
        16..=31 => 2,
        _ => 1,
    }
}

// =============================================================================
// Public types
// =============================================================================

/// Stable identifier of an interned string: the address of its terminal node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Handle(u32);

impl Handle {
    /// Wraps a raw value, e.g. one previously obtained from [`as_u32`].
    ///
    /// [`as_u32`]: Handle::as_u32
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl From<Handle> for u32 {
    fn from(handle: Handle) -> u32 {
        handle.0
    }
}

/// Pool statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Distinct interned strings.
    pub strings: usize,
    /// Trie nodes, including the root.
    pub nodes: usize,
    /// Bytes of child tables superseded by larger ones.
    pub abandoned_bytes: u64,
    pub arena: ArenaStats,
}

// =============================================================================
// StringPool
// =============================================================================

/// String interning table backed by a byte arena.
///
/// Inserting the same text twice yields the same [`Handle`]. Handles never
/// change and resolve back to their text by walking parent pointers.
pub struct StringPool<C = PercentCodec> {
    arena: SegmentedArena,
    root: Ptr,
    codec: C,
    strings: usize,
    nodes: usize,
    abandoned_bytes: u64,
}

impl StringPool<PercentCodec> {
    /// Creates an empty pool whose segments hold `segment_size` bytes.
    ///
    /// # Panics
    /// Panics if `segment_size` is zero.
    pub fn new(segment_size: usize) -> Self {
        match Self::with_config(Config::default().with_segment_size(segment_size)) {
            Ok(pool) => pool,
            Err(e) => panic!("cannot create a pool with {segment_size}-byte segments: {e}"),
        }
    }

    pub fn with_config(config: Config) -> Result<Self> {
        Self::with_codec(config, PercentCodec)
    }
}

impl Default for StringPool<PercentCodec> {
    fn default() -> Self {
        Self::new(DEFAULT_SEGMENT_SIZE)
    }
}

impl<C> StringPool<C> {
    #[inline]
    pub fn len(&self) -> usize {
        self.strings
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.strings == 0
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            strings: self.strings,
            nodes: self.nodes,
            abandoned_bytes: self.abandoned_bytes,
            arena: self.arena.stats(),
        }
    }

    /// Handles of all interned strings, ordered by their encoded bytes.
    pub fn handles(&self) -> Handles<'_, C> {
        Handles {
            pool: self,
            stack: vec![self.root],
        }
    }

    #[inline]
    fn node(&self, ptr: Ptr) -> StructRef<'_, 4> {
        NODE.view(self.arena.bytes(ptr, NODE_SIZE))
    }

    #[inline]
    fn char_of(&self, ptr: Ptr) -> u8 {
        self.node(ptr).get(ASCII_CHAR) as u8 & CHAR_MASK
    }

    #[inline]
    fn is_interned(&self, ptr: Ptr) -> bool {
        self.node(ptr).get(ASCII_CHAR) as u8 & INTERNED_BIT != 0
    }

    fn kids(&self, ptr: Ptr) -> ListRef<'_> {
        let node = self.node(ptr);
        let capacity = node.get(KID_CAPACITY) as usize;
        let table = Ptr::new(node.get(KIDS_PTR));
        KIDS.view(self.arena.bytes(table, KIDS.size_for(capacity)))
    }

    /// Searches `ptr`'s child table for `c`.
    ///
    /// Returns the child if present, its insertion index otherwise, and the
    /// number of occupied slots.
    fn find_child(&self, ptr: Ptr, c: u8) -> (std::result::Result<Ptr, usize>, usize) {
        let kids = self.kids(ptr);
        let occupied = kids.partition_point(|p| p != 0);
        let lower = kids.partition_point(|p| p != 0 && self.char_of(Ptr::new(p)) < c);
        if lower < occupied {
            let child = Ptr::new(kids.get(lower));
            if self.char_of(child) == c {
                return (Ok(child), occupied);
            }
        }
        (Err(lower), occupied)
    }
}

impl<C: ByteCodec> StringPool<C> {
    pub fn with_codec(config: Config, codec: C) -> Result<Self> {
        let mut arena = SegmentedArena::new(&config)?;
        let root = alloc_node(&mut arena, 0, Ptr::NULL, 0)?;
        debug!(
            root = %root,
            segment_size = config.segment_size,
            max_bytes = config.max_bytes,
            "created string pool"
        );
        Ok(Self {
            arena,
            root,
            codec,
            strings: 0,
            nodes: 1,
            abandoned_bytes: 0,
        })
    }

    /// Interns `text`, returning its handle.
    ///
    /// On [`Error::ResourceExhausted`] the pool stays usable. Nodes created
    /// before the failure remain as unmarked path nodes and `text` is not
    /// interned.
    pub fn insert(&mut self, text: &str) -> Result<Handle> {
        let encoded = self.codec.encode(text);
        check_alphabet(&encoded)?;

        let mut node = self.root;
        for (depth, &c) in encoded.iter().enumerate() {
            node = self.descend(node, c, depth)?;
        }

        let root = self.root;
        let mut view = NODE.view_mut(self.arena.bytes_mut(node, NODE_SIZE));
        if Ptr::new(view.get(PARENT_PTR)) == root {
            view.set(PARENT_PTR, Ptr::NULL.get());
        }
        let ch = view.get(ASCII_CHAR) as u8;
        if ch & INTERNED_BIT == 0 {
            view.set(ASCII_CHAR, u32::from(ch | INTERNED_BIT));
            self.strings += 1;
        }
        Ok(Handle(node.get()))
    }

    /// Returns the handle of `text` if it was interned, without allocating.
    pub fn lookup(&self, text: &str) -> Result<Option<Handle>> {
        let encoded = self.codec.encode(text);
        check_alphabet(&encoded)?;

        let mut node = self.root;
        for &c in encoded.iter() {
            match self.find_child(node, c).0 {
                Ok(child) => node = child,
                Err(_) => return Ok(None),
            }
        }
        Ok(self.is_interned(node).then_some(Handle(node.get())))
    }

    pub fn contains(&self, text: &str) -> bool {
        matches!(self.lookup(text), Ok(Some(_)))
    }

    /// Recovers the text of a handle returned by [`insert`](Self::insert).
    pub fn resolve(&self, handle: Handle) -> Result<String> {
        let bytes = self.path_bytes(handle)?;
        Ok(self.codec.decode(&bytes)?)
    }

    /// Moves from `node` to its child labelled `c`, creating it if needed.
    fn descend(&mut self, node: Ptr, c: u8, depth: usize) -> Result<Ptr> {
        let (at, occupied) = match self.find_child(node, c) {
            (Ok(child), _) => return Ok(child),
            (Err(at), occupied) => (at, occupied),
        };

        let capacity = self.node(node).get(KID_CAPACITY) as usize;
        if occupied == capacity {
            self.grow(node, capacity)?;
        }

        // The child is complete before it becomes reachable.
        let child = alloc_node(&mut self.arena, c, node, depth + 1)?;
        self.nodes += 1;

        let view = self.node(node);
        let capacity = view.get(KID_CAPACITY) as usize;
        let table = Ptr::new(view.get(KIDS_PTR));
        let mut kids = KIDS.view_mut(self.arena.bytes_mut(table, KIDS.size_for(capacity)));
        kids.insert(at, occupied, child.get());
        Ok(child)
    }

    /// Replaces `node`'s full child table with one twice as large. The old
    /// table is abandoned.
    fn grow(&mut self, node: Ptr, capacity: usize) -> Result<()> {
        let new_capacity = capacity * 2;
        let old = Ptr::new(self.node(node).get(KIDS_PTR));
        let new = self.arena.allocate(KIDS.size_for(new_capacity))?;
        self.arena.copy(old, new, KIDS.size_for(capacity));

        let mut view = NODE.view_mut(self.arena.bytes_mut(node, NODE_SIZE));
        view.set(KID_CAPACITY, new_capacity as u32);
        view.set(KIDS_PTR, new.get());
        self.abandoned_bytes += KIDS.size_for(capacity) as u64;

        trace!(
            node = %node,
            from = capacity,
            to = new_capacity,
            abandoned = self.abandoned_bytes,
            "grew child table"
        );
        Ok(())
    }

    /// Collects the encoded bytes from the root down to `handle`.
    fn path_bytes(&self, handle: Handle) -> Result<Vec<u8>> {
        let invalid = |reason| Error::InvalidHandle {
            handle: handle.0,
            reason,
        };

        let start = Ptr::new(handle.0);
        if start.is_null() {
            return Err(invalid("null handle"));
        }
        let first = self
            .arena
            .try_bytes(start, NODE_SIZE)
            .ok_or_else(|| invalid("not an allocated node"))?;
        if NODE.view(first).get(ASCII_CHAR) as u8 & INTERNED_BIT == 0 {
            return Err(invalid("not an interned string"));
        }

        let mut out = Vec::new();
        let mut cur = start;
        // A valid chain visits each node at most once.
        let mut steps = 0;
        while cur != self.root {
            if steps == self.nodes {
                return Err(invalid("parent chain does not reach the root"));
            }
            steps += 1;

            let node = self
                .arena
                .try_bytes(cur, NODE_SIZE)
                .map(|bytes| NODE.view(bytes))
                .ok_or_else(|| invalid("parent chain leaves the arena"))?;
            out.push(node.get(ASCII_CHAR) as u8 & CHAR_MASK);
            let parent = Ptr::new(node.get(PARENT_PTR));
            if parent.is_null() {
                break;
            }
            cur = parent;
        }
        out.reverse();
        Ok(out)
    }

    /// Checks every structural invariant of the trie.
    #[cfg(test)]
    pub(crate) fn validate(&self) {
        let mut nodes = 0;
        let mut strings = 0;
        let mut stack = vec![(self.root, 0usize)];
        while let Some((ptr, depth)) = stack.pop() {
            nodes += 1;
            if self.is_interned(ptr) {
                strings += 1;
            }

            let view = self.node(ptr);
            let capacity = view.get(KID_CAPACITY) as usize;
            assert!(
                capacity >= initial_capacity(depth),
                "capacity {capacity} below the initial size for depth {depth}"
            );

            let kids = self.kids(ptr);
            let occupied = kids.partition_point(|p| p != 0);
            for i in 0..kids.len() {
                let child = Ptr::new(kids.get(i));
                if i >= occupied {
                    assert!(child.is_null(), "non-zero slot {i} past the occupied prefix");
                    continue;
                }
                if i > 0 {
                    let prev = Ptr::new(kids.get(i - 1));
                    assert!(
                        self.char_of(prev) < self.char_of(child),
                        "children of {ptr} not strictly ascending at slot {i}"
                    );
                }
                let parent = Ptr::new(self.node(child).get(PARENT_PTR));
                let expected = parent == ptr || (parent.is_null() && ptr == self.root);
                assert!(expected, "child {child} of {ptr} has parent {parent}");
                stack.push((child, depth + 1));
            }
        }
        assert_eq!(nodes, self.nodes, "reachable nodes must match the node count");
        assert_eq!(strings, self.strings, "interned nodes must match len()");
    }
}

fn alloc_node(arena: &mut SegmentedArena, c: u8, parent: Ptr, depth: usize) -> Result<Ptr> {
    let capacity = initial_capacity(depth);
    let node = arena.allocate(NODE_SIZE)?;
    let table = arena.allocate(KIDS.size_for(capacity))?;

    let mut view = NODE.view_mut(arena.bytes_mut(node, NODE_SIZE));
    view.set(ASCII_CHAR, u32::from(c));
    view.set(PARENT_PTR, parent.get());
    view.set(KID_CAPACITY, capacity as u32);
    view.set(KIDS_PTR, table.get());
    Ok(node)
}

fn check_alphabet(encoded: &[u8]) -> Result<()> {
    match encoded.iter().position(|&b| b & INTERNED_BIT != 0) {
        Some(position) => Err(Error::NonAsciiByte {
            byte: encoded[position],
            position,
        }),
        None => Ok(()),
    }
}

/// Iterator over interned handles in encoded-byte order.
pub struct Handles<'a, C> {
    pool: &'a StringPool<C>,
    stack: Vec<Ptr>,
}

impl<'a, C> Iterator for Handles<'a, C> {
    type Item = Handle;

    fn next(&mut self) -> Option<Handle> {
        while let Some(ptr) = self.stack.pop() {
            let kids = self.pool.kids(ptr);
            let occupied = kids.partition_point(|p| p != 0);
            for i in (0..occupied).rev() {
                self.stack.push(Ptr::new(kids.get(i)));
            }
            if self.pool.is_interned(ptr) {
                return Some(Handle(ptr.get()));
            }
        }
        None
    }
}
