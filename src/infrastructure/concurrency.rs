/// Worker pool setup for batch layout passes.
/// Decoding and saving stay on the calling thread.

use anyhow::Result;
use tracing::info;

/// Worker count for a machine with `cores` CPUs: half of them, minimum 1.
pub fn worker_count(cores: usize) -> usize {
    std::cmp::max(1, cores / 2)
}

/// Initialize the global rayon thread pool with controlled worker count.
pub fn init_thread_pool() -> Result<()> {
    let cores = num_cpus::get();
    let workers = worker_count(cores);

    rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build_global()?;

    info!(workers, cores, "initialized layout thread pool");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_count() {
        assert_eq!(worker_count(0), 1);
        assert_eq!(worker_count(1), 1);
        assert_eq!(worker_count(8), 4);
        assert_eq!(worker_count(7), 3);
    }
}
