/// GC generations tracked per collection counter.
pub const GC_GENERATIONS: usize = 3;

/// Memory and GC introspection supplied by the host runtime. When the host
/// has nothing to report, memory/GC tracking degrades per-timer without
/// affecting timing correctness.
pub trait MemoryProbe: Send + Sync {
    /// Bytes allocated so far by the calling thread, or `None` when the
    /// runtime cannot report it.
    fn allocated_bytes(&self) -> Option<i64>;

    /// Collections performed so far, per generation.
    fn gc_collections(&self) -> [u64; GC_GENERATIONS];
}

impl<P: MemoryProbe + ?Sized> MemoryProbe for std::sync::Arc<P> {
    fn allocated_bytes(&self) -> Option<i64> {
        (**self).allocated_bytes()
    }

    fn gc_collections(&self) -> [u64; GC_GENERATIONS] {
        (**self).gc_collections()
    }
}

/// Probe for hosts without memory introspection.
pub struct NullProbe;

impl MemoryProbe for NullProbe {
    fn allocated_bytes(&self) -> Option<i64> {
        None
    }

    fn gc_collections(&self) -> [u64; GC_GENERATIONS] {
        [0; GC_GENERATIONS]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_probe_reports_nothing() {
        assert!(NullProbe.allocated_bytes().is_none());
        assert_eq!(NullProbe.gc_collections(), [0; GC_GENERATIONS]);
    }
}
