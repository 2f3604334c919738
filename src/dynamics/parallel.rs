//! Data-parallel job helpers. With the `parallel` feature and the runtime toggle on,
//! jobs run on the rayon pool; otherwise they run in order on the calling thread.
//! Results always come back in input order.

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Maps `f` over `items`, returning results in input order.
pub fn map_jobs<T, R, F>(items: &[T], parallel: bool, f: F) -> Vec<R>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Send + Sync,
{
    #[cfg(feature = "parallel")]
    if parallel {
        return items.par_iter().map(f).collect();
    }
    #[cfg(not(feature = "parallel"))]
    let _ = parallel;
    items.iter().map(f).collect()
}

/// Runs `f` on every item, each job owning its item exclusively.
pub fn for_each_job<T, F>(items: &mut [T], parallel: bool, f: F)
where
    T: Send,
    F: Fn(&mut T) + Send + Sync,
{
    #[cfg(feature = "parallel")]
    if parallel {
        items.par_iter_mut().for_each(f);
        return;
    }
    #[cfg(not(feature = "parallel"))]
    let _ = parallel;
    items.iter_mut().for_each(f);
}

/// Whether parallel execution is compiled in.
pub const fn parallel_available() -> bool {
    cfg!(feature = "parallel")
}
