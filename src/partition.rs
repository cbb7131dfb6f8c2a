//! Splitting of a domain into contiguous column ranges
//!
//! The same decomposition is used twice: first to give every process a slice
//! of the domain, then to split that slice between the local workers. Worker
//! slices are relative to their process slice and must be translated before
//! they are used on full-domain grids.

/// A contiguous range `[offset, offset + len)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Slice {
    /// First index of the range
    pub offset: usize,
    /// Number of indices in the range
    pub len: usize,
}

impl Slice {
    /// Create a new slice.
    pub fn new(offset: usize, len: usize) -> Self {
        Self { offset, len }
    }

    /// One past the last index.
    pub fn end(&self) -> usize {
        self.offset + self.len
    }

    /// Is the slice empty?
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Does the slice contain `index`?
    pub fn contains(&self, index: usize) -> bool {
        index >= self.offset && index < self.end()
    }

    /// Shift the slice by `origin`, for example to move a worker slice
    /// (relative to its process slice) into global coordinates.
    pub fn translate(&self, origin: usize) -> Self {
        Self {
            offset: self.offset + origin,
            len: self.len,
        }
    }
}

/// Get the slice of a domain of `total` indices that part `index` of `parts` owns.
///
/// The remainder of the division is given to the earliest parts. When there
/// are more parts than indices, the excess parts are empty and start at `total`.
pub fn slice_params(total: usize, parts: usize, index: usize) -> Slice {
    assert!(index < parts, "Part {index} requested out of {parts} parts");

    let base = total / parts;
    let remainder = total % parts;
    if index < remainder {
        Slice::new(index * (base + 1), base + 1)
    } else {
        Slice::new(remainder * (base + 1) + (index - remainder) * base, base)
    }
}

/// Split `total` indices into `parts` contiguous slices.
pub fn partition(total: usize, parts: usize) -> Vec<Slice> {
    (0..parts)
        .map(|index| slice_params(total, parts, index))
        .collect()
}
