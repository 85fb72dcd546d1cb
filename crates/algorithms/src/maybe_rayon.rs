//! Line-parallel iteration for the transform passes.
//!
//! With the `parallel` feature the column and row passes fan their lines
//! out over rayon. Without it, `into_par_iter()` is plain `into_iter()` and
//! the same `flat_map(..).collect()` chains run in order. Lines are
//! independent and collected in index order either way, so the output is
//! identical.

#[cfg(feature = "parallel")]
pub use rayon::prelude::*;

#[cfg(not(feature = "parallel"))]
mod sequential {
    pub trait IntoParallelIterator {
        type Iter;
        type Item;
        fn into_par_iter(self) -> Self::Iter;
    }

    impl<I: IntoIterator> IntoParallelIterator for I {
        type Iter = I::IntoIter;
        type Item = I::Item;
        fn into_par_iter(self) -> Self::Iter {
            self.into_iter()
        }
    }
}

#[cfg(not(feature = "parallel"))]
pub use sequential::*;
