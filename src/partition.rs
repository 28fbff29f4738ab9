use thiserror::Error;

/// Deterministic hash used to select a partition for a given logical key.
pub fn hash_partition_key(key: impl AsRef<[u8]>) -> u64 {
    // 64-bit FNV-1a keeps the hash stable across toolchains without extra dependencies.
    const OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;
    key.as_ref().iter().fold(OFFSET_BASIS, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(PRIME)
    })
}

/// Maps a key onto one of `partitions` partitions.
pub fn partition_for_key(key: impl AsRef<[u8]>, partitions: u32) -> Result<u32, PartitionError> {
    if partitions == 0 {
        return Err(PartitionError::NoPartitions);
    }
    Ok((hash_partition_key(key) % u64::from(partitions)) as u32)
}

/// Error raised while laying out partitions over workers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PartitionError {
    #[error("topic must have at least one partition")]
    NoPartitions,
    #[error("consumer group requires at least one worker")]
    NoWorkers,
}

/// Disjoint partition subsets handed to the workers of one consumer group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionAssignment {
    per_worker: Vec<Vec<u32>>,
}

impl PartitionAssignment {
    /// Deals partitions round-robin. Workers beyond the partition count stay
    /// idle, as in a consumer group with more members than partitions.
    pub fn round_robin(partitions: u32, workers: usize) -> Result<Self, PartitionError> {
        if partitions == 0 {
            return Err(PartitionError::NoPartitions);
        }
        if workers == 0 {
            return Err(PartitionError::NoWorkers);
        }
        let mut per_worker = vec![Vec::new(); workers];
        for partition in 0..partitions {
            per_worker[partition as usize % workers].push(partition);
        }
        Ok(Self { per_worker })
    }

    /// Partitions owned by `worker`.
    pub fn partitions_for(&self, worker: usize) -> &[u32] {
        self.per_worker
            .get(worker)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Workers that own at least one partition, with their partitions.
    pub fn active_workers(&self) -> impl Iterator<Item = (usize, &[u32])> {
        self.per_worker
            .iter()
            .enumerate()
            .filter(|(_, partitions)| !partitions.is_empty())
            .map(|(worker, partitions)| (worker, partitions.as_slice()))
    }

    pub fn worker_count(&self) -> usize {
        self.per_worker.len()
    }
}
