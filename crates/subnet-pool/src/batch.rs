use core::slice::Chunks;

use crate::{
    error::{Error, Result},
    record::AllocationRecord,
};

/// Splits `plan` into contiguous batches of at most `limit` records.
///
/// Batches preserve plan order and together cover every record exactly once.
/// Only the last batch may be short, and only when `limit` does not divide the
/// plan length.
///
/// # Errors
///
/// Returns [`Error::InvalidBatchLimit`] if `limit` is 0.
///
/// # Example
/// ```
/// use subnet_pool::{PartitionLayout, chunk, generate_plan};
///
/// let plan = generate_plan(&PartitionLayout::REFERENCE);
/// let sizes: Vec<usize> = chunk(&plan, 25).unwrap().map(<[_]>::len).collect();
/// assert_eq!(sizes.len(), 328);
/// assert_eq!(sizes.last(), Some(&17));
/// ```
pub fn chunk(plan: &[AllocationRecord], limit: usize) -> Result<Chunks<'_, AllocationRecord>> {
    if limit == 0 {
        return Err(Error::InvalidBatchLimit);
    }
    Ok(plan.chunks(limit))
}

/// Number of batches [`chunk`] yields for `len` records.
pub const fn batch_count(len: usize, limit: usize) -> usize {
    if limit == 0 { 0 } else { len.div_ceil(limit) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PartitionLayout, generate_plan};

    #[test]
    fn reference_plan_chunks_into_328_batches() {
        let plan = generate_plan(&PartitionLayout::REFERENCE);
        let batches: Vec<&[AllocationRecord]> = chunk(&plan, 25).unwrap().collect();

        assert_eq!(batches.len(), 328);
        assert_eq!(batch_count(plan.len(), 25), 328);
        assert!(batches[..327].iter().all(|b| b.len() == 25));
        assert_eq!(batches[327].len(), 8192 % 25);
    }

    #[test]
    fn batches_preserve_order_without_gaps() {
        let plan = generate_plan(&PartitionLayout::REFERENCE);
        let flattened: Vec<AllocationRecord> =
            chunk(&plan, 25).unwrap().flatten().copied().collect();
        assert_eq!(flattened, plan);
    }

    #[test]
    fn ten_records_limit_four() {
        let layout = PartitionLayout::new(10, 5, 16, 8).unwrap();
        let plan = generate_plan(&layout);
        let sizes: Vec<usize> = chunk(&plan, 4).unwrap().map(<[_]>::len).collect();
        assert_eq!(sizes, [4, 4, 2]);
    }

    #[test]
    fn exact_multiple_has_no_short_batch() {
        let layout = PartitionLayout::new(10, 5, 160, 8).unwrap();
        let plan = generate_plan(&layout);
        assert_eq!(plan.len(), 100);

        let sizes: Vec<usize> = chunk(&plan, 25).unwrap().map(<[_]>::len).collect();
        assert_eq!(sizes, [25, 25, 25, 25]);
    }

    #[test]
    fn zero_limit_is_rejected() {
        let plan = generate_plan(&PartitionLayout::REFERENCE);
        assert_eq!(chunk(&plan, 0).unwrap_err(), Error::InvalidBatchLimit);
        assert_eq!(batch_count(plan.len(), 0), 0);
    }
}
