use std::fmt::Debug;
use std::hash::Hash;

/// Scalar stored in a hypertrie cell.
///
/// `Default::default()` is the empty value: a cell holding it is absent and
/// is never stored.
pub trait Value: Copy + Default + Eq + Hash + Debug + Send + Sync + 'static {
    #[inline]
    fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

macro_rules! impl_value {
    ($($ty:ty),*) => {
        $(impl Value for $ty {})*
    };
}

impl_value! { bool, u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize }
