use std::ops::Range;
use crate::dataset::DatasetError;

/// The contiguous slice of `len` items owned by `worker_id` out of `num_workers`.
///
/// Each worker gets at most `ceil(len / num_workers)` items. Slices are disjoint, in worker
/// order, and together cover `0..len`. Trailing workers may get an empty slice.
pub fn partition_range(len: usize, num_workers: usize, worker_id: usize) -> Result<Range<usize>, DatasetError> {
    if num_workers == 0 {
        return Err(DatasetError::NoWorkers);
    }
    if worker_id >= num_workers {
        return Err(DatasetError::WorkerOutOfRange { worker_id, num_workers });
    }

    let per_worker = len.div_ceil(num_workers);
    let start = (worker_id * per_worker).min(len);
    let end = (start + per_worker).min(len);
    Ok(start..end)
}
