//! Declarative binary layouts projected onto raw byte ranges.
//!
//! A [`StructShape`] is declared once from an ordered list of
//! `(name, FieldType)` pairs. Field offsets are the cumulative sum of the
//! preceding widths and are computed by a `const fn`, so a shape declared in a
//! `const` or `static` item has compile-time offsets and a malformed one fails
//! to compile.
//!
//! Shapes never allocate. They only interpret bytes someone else handed them,
//! through the [`StructRef`]/[`StructMut`] and [`ListRef`]/[`ListMut`]
//! accessors.
//!
//! All multi-byte values are little endian.

use thiserror::Error;

// =============================================================================
// Primitives
// =============================================================================

/// Fixed-width unsigned integer encodings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Primitive {
    U8,
    U32,
}

impl Primitive {
    #[inline]
    pub const fn width(self) -> usize {
        match self {
            Primitive::U8 => 1,
            Primitive::U32 => 4,
        }
    }

    #[inline]
    pub fn read(self, bytes: &[u8]) -> u32 {
        match self {
            Primitive::U8 => u32::from(bytes[0]),
            Primitive::U32 => u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        }
    }

    #[inline]
    pub fn write(self, bytes: &mut [u8], value: u32) {
        match self {
            Primitive::U8 => {
                debug_assert!(value <= u32::from(u8::MAX), "{value} does not fit in u8");
                bytes[0] = value as u8;
            }
            Primitive::U32 => bytes[..4].copy_from_slice(&value.to_le_bytes()),
        }
    }
}

// =============================================================================
// Shapes
// =============================================================================

/// Packed array of primitives.
///
/// A fixed list has a known element count. An open list takes its length
/// from the byte range it is bound to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ListShape {
    elem: Primitive,
    count: Option<usize>,
}

impl ListShape {
    pub const fn fixed(elem: Primitive, count: usize) -> Self {
        Self {
            elem,
            count: Some(count),
        }
    }

    pub const fn open(elem: Primitive) -> Self {
        Self { elem, count: None }
    }

    #[inline]
    pub const fn stride(&self) -> usize {
        self.elem.width()
    }

    #[inline]
    pub const fn count(&self) -> Option<usize> {
        self.count
    }

    /// Total size, or `None` for an open list.
    pub const fn size(&self) -> Option<usize> {
        match self.count {
            Some(count) => Some(count * self.stride()),
            None => None,
        }
    }

    /// Bytes needed for `count` elements.
    #[inline]
    pub const fn size_for(&self, count: usize) -> usize {
        count * self.stride()
    }

    pub fn view<'a>(&self, bytes: &'a [u8]) -> ListRef<'a> {
        let len = self.bound_len(bytes.len());
        ListRef {
            elem: self.elem,
            bytes: &bytes[..len * self.stride()],
            len,
        }
    }

    pub fn view_mut<'a>(&self, bytes: &'a mut [u8]) -> ListMut<'a> {
        let len = self.bound_len(bytes.len());
        ListMut {
            elem: self.elem,
            bytes: &mut bytes[..len * self.stride()],
            len,
        }
    }

    fn bound_len(&self, available: usize) -> usize {
        match self.count {
            Some(count) => {
                assert!(
                    available >= count * self.stride(),
                    "{available} bytes cannot hold {count} list elements"
                );
                count
            }
            None => available / self.stride(),
        }
    }
}

/// Type of one struct field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldType {
    Primitive(Primitive),
    List(ListShape),
}

impl FieldType {
    pub const U8: FieldType = FieldType::Primitive(Primitive::U8);
    pub const U32: FieldType = FieldType::Primitive(Primitive::U32);

    /// Byte size, or `None` for an open list.
    pub const fn size(&self) -> Option<usize> {
        match self {
            FieldType::Primitive(p) => Some(p.width()),
            FieldType::List(list) => list.size(),
        }
    }
}

/// A named field with its resolved byte offset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub offset: usize,
    pub ty: FieldType,
}

/// Malformed struct declarations.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutError {
    #[error("struct `{name}` declares no fields")]
    EmptyStruct { name: &'static str },
    #[error("open-ended list `{field}` must be the last field")]
    OpenListNotLast { field: &'static str },
    #[error("fixed list `{field}` has no elements")]
    ZeroLengthList { field: &'static str },
}

/// Sequentially packed struct of `N` fields.
///
/// Only the final field may be an open list. Such a struct has no total size
/// and [`size`](Self::size) reports its fixed prefix.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StructShape<const N: usize> {
    name: &'static str,
    fields: [Field; N],
    size: usize,
    open_tail: bool,
}

impl<const N: usize> StructShape<N> {
    pub const fn try_new(
        name: &'static str,
        decl: [(&'static str, FieldType); N],
    ) -> Result<Self, LayoutError> {
        if N == 0 {
            return Err(LayoutError::EmptyStruct { name });
        }

        let mut fields = [Field {
            name: "",
            offset: 0,
            ty: FieldType::U8,
        }; N];
        let mut offset = 0;
        let mut open_tail = false;
        let mut i = 0;
        while i < N {
            let (field, ty) = decl[i];
            fields[i] = Field {
                name: field,
                offset,
                ty,
            };
            match ty.size() {
                Some(0) => return Err(LayoutError::ZeroLengthList { field }),
                Some(size) => offset += size,
                None if i + 1 == N => open_tail = true,
                None => return Err(LayoutError::OpenListNotLast { field }),
            }
            i += 1;
        }

        Ok(Self {
            name,
            fields,
            size: offset,
            open_tail,
        })
    }

    /// # Panics
    /// Panics on any [`LayoutError`]. In a `const` or `static` initializer
    /// that is a compile error.
    pub const fn new(name: &'static str, decl: [(&'static str, FieldType); N]) -> Self {
        match Self::try_new(name, decl) {
            Ok(shape) => shape,
            Err(LayoutError::EmptyStruct { .. }) => panic!("struct shape declares no fields"),
            Err(LayoutError::OpenListNotLast { .. }) => {
                panic!("open-ended list must be the last field")
            }
            Err(LayoutError::ZeroLengthList { .. }) => panic!("fixed list has no elements"),
        }
    }

    #[inline]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Size of the fixed part in bytes.
    #[inline]
    pub const fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub const fn is_sized(&self) -> bool {
        !self.open_tail
    }

    #[inline]
    pub const fn field(&self, index: usize) -> Field {
        self.fields[index]
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn view<'a>(&'a self, bytes: &'a [u8]) -> StructRef<'a, N> {
        debug_assert!(bytes.len() >= self.size, "range too small for `{}`", self.name);
        StructRef { shape: self, bytes }
    }

    pub fn view_mut<'a>(&'a self, bytes: &'a mut [u8]) -> StructMut<'a, N> {
        debug_assert!(bytes.len() >= self.size, "range too small for `{}`", self.name);
        StructMut { shape: self, bytes }
    }
}

// =============================================================================
// Accessors
// =============================================================================

fn primitive_of(field: &Field) -> Primitive {
    match field.ty {
        FieldType::Primitive(p) => p,
        FieldType::List(_) => panic!("field `{}` is a list", field.name),
    }
}

fn list_range(field: &Field, available: usize) -> (ListShape, std::ops::Range<usize>) {
    match field.ty {
        FieldType::List(list) => {
            let end = list.size().map_or(available, |size| field.offset + size);
            (list, field.offset..end)
        }
        FieldType::Primitive(_) => panic!("field `{}` is not a list", field.name),
    }
}

/// Read-only typed view of a struct.
#[derive(Clone, Copy)]
pub struct StructRef<'a, const N: usize> {
    shape: &'a StructShape<N>,
    bytes: &'a [u8],
}

impl<'a, const N: usize> StructRef<'a, N> {
    /// Reads primitive field `index`.
    #[inline]
    pub fn get(&self, index: usize) -> u32 {
        let field = &self.shape.fields[index];
        primitive_of(field).read(&self.bytes[field.offset..])
    }

    pub fn get_named(&self, name: &str) -> Option<u32> {
        self.shape.index_of(name).map(|i| self.get(i))
    }

    /// View of list field `index`.
    pub fn list(&self, index: usize) -> ListRef<'a> {
        let (list, range) = list_range(&self.shape.fields[index], self.bytes.len());
        list.view(&self.bytes[range])
    }
}

/// Mutable typed view of a struct.
pub struct StructMut<'a, const N: usize> {
    shape: &'a StructShape<N>,
    bytes: &'a mut [u8],
}

impl<'a, const N: usize> StructMut<'a, N> {
    #[inline]
    pub fn get(&self, index: usize) -> u32 {
        let field = &self.shape.fields[index];
        primitive_of(field).read(&self.bytes[field.offset..])
    }

    /// Writes primitive field `index`.
    #[inline]
    pub fn set(&mut self, index: usize, value: u32) {
        let field = &self.shape.fields[index];
        primitive_of(field).write(&mut self.bytes[field.offset..], value);
    }

    /// Writes the named field. Returns `false` if there is no such field.
    pub fn set_named(&mut self, name: &str, value: u32) -> bool {
        match self.shape.index_of(name) {
            Some(i) => {
                self.set(i, value);
                true
            }
            None => false,
        }
    }

    pub fn list_mut(&mut self, index: usize) -> ListMut<'_> {
        let (list, range) = list_range(&self.shape.fields[index], self.bytes.len());
        list.view_mut(&mut self.bytes[range])
    }
}

/// Read-only view of a list.
#[derive(Clone, Copy)]
pub struct ListRef<'a> {
    elem: Primitive,
    bytes: &'a [u8],
    len: usize,
}

impl<'a> ListRef<'a> {
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn get(&self, index: usize) -> u32 {
        assert!(index < self.len, "list index {index} out of bounds ({})", self.len);
        let stride = self.elem.width();
        self.elem.read(&self.bytes[index * stride..])
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + 'a {
        let list = *self;
        (0..list.len).map(move |i| list.get(i))
    }

    /// Index of the first element for which `pred` is false, assuming all
    /// `true` elements precede all `false` ones.
    pub fn partition_point(&self, mut pred: impl FnMut(u32) -> bool) -> usize {
        let mut lo = 0;
        let mut hi = self.len;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if pred(self.get(mid)) {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        lo
    }
}

/// Mutable view of a list.
pub struct ListMut<'a> {
    elem: Primitive,
    bytes: &'a mut [u8],
    len: usize,
}

impl<'a> ListMut<'a> {
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn view(&self) -> ListRef<'_> {
        ListRef {
            elem: self.elem,
            bytes: &*self.bytes,
            len: self.len,
        }
    }

    #[inline]
    pub fn get(&self, index: usize) -> u32 {
        self.view().get(index)
    }

    #[inline]
    pub fn set(&mut self, index: usize, value: u32) {
        assert!(index < self.len, "list index {index} out of bounds ({})", self.len);
        let stride = self.elem.width();
        self.elem.write(&mut self.bytes[index * stride..], value);
    }

    /// Shifts elements `at..occupied` one slot right and writes `value` at
    /// `at`. Requires `occupied < len`.
    pub fn insert(&mut self, at: usize, occupied: usize, value: u32) {
        assert!(occupied < self.len, "list is full");
        debug_assert!(at <= occupied);
        let stride = self.elem.width();
        self.bytes
            .copy_within(at * stride..occupied * stride, (at + 1) * stride);
        self.set(at, value);
    }
}
