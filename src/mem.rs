//! Defines the `MemSize` trait for estimating memory usage.

/// A trait for types to report their memory size, including heap-allocated
/// data.
///
/// The index uses this to account for live and retired bytes, which feeds the
/// memory-footprint telemetry and the "is there anything worth collecting"
/// check. Implement it for custom key and value types: report the inline size
/// of the value plus whatever heap it owns.
pub trait MemSize {
    /// Returns the total memory size of the value in bytes.
    fn mem_size(&self) -> usize;
}

// Implementations for the key and row-reference shapes the index is used
// with: scalars, strings, and vectors of either.

macro_rules! impl_memsize_for_scalar {
    ($($ty:ty),*) => {
        $(
            impl MemSize for $ty {
                fn mem_size(&self) -> usize {
                    std::mem::size_of::<Self>()
                }
            }
        )*
    };
}

impl_memsize_for_scalar!(
    u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize, f32, f64, bool, char
);

impl MemSize for String {
    fn mem_size(&self) -> usize {
        // Inline pointer/length/capacity words plus the allocated buffer,
        // which may be longer than the string itself.
        std::mem::size_of::<Self>() + self.capacity()
    }
}

impl<T: MemSize> MemSize for Vec<T> {
    fn mem_size(&self) -> usize {
        // Occupied slots report through the element itself, so nested heap
        // data is included; spare capacity only holds uninitialized inline
        // slots and counts at the element's inline size.
        let spare = (self.capacity() - self.len()) * std::mem::size_of::<T>();
        let elements: usize = self.iter().map(MemSize::mem_size).sum();
        std::mem::size_of::<Self>() + spare + elements
    }
}
