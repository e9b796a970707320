use profdata::ResolvedObject;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// Raw captured reference. Capturing is just an `Arc` clone; conversion to a
/// serializable snapshot is deferred to the resolution pass at frame and
/// recording boundaries, never on the hot path.
pub type RawObjectRef = Arc<dyn Any + Send + Sync>;

/// Converts raw captured references into serializable snapshots. Implemented
/// by the host; invoked only at frame/recording boundaries.
pub trait ObjectResolver: Send {
    /// Resolve without consulting any resolver-internal cache.
    fn resolve_uncached(&mut self, raw: &RawObjectRef) -> Option<ResolvedObject>;

    /// Resolve, possibly from a resolver-internal cache. The default has no
    /// cache.
    fn resolve(&mut self, raw: &RawObjectRef) -> Option<ResolvedObject> {
        self.resolve_uncached(raw)
    }

    fn clear_cache(&mut self) {}
}

/// Resolver for hosts that attach no object payloads. Every reference
/// degrades to a placeholder.
pub struct NullResolver;

impl ObjectResolver for NullResolver {
    fn resolve_uncached(&mut self, _raw: &RawObjectRef) -> Option<ResolvedObject> {
        None
    }
}

/// One resolution pass over a batch of captured references. Memoizes per
/// source object (pointer identity) so repeated events referencing one live
/// object within a frame share a single resolver call.
pub(crate) struct ResolutionPass<'a> {
    resolver: &'a mut dyn ObjectResolver,
    memo: HashMap<usize, Option<ResolvedObject>>,
}

impl<'a> ResolutionPass<'a> {
    pub(crate) fn new(resolver: &'a mut dyn ObjectResolver) -> Self {
        ResolutionPass {
            resolver,
            memo: HashMap::new(),
        }
    }

    /// `None` means the reference degrades to a placeholder payload; the
    /// failure is isolated to this one event.
    pub(crate) fn resolve(&mut self, raw: &RawObjectRef) -> Option<ResolvedObject> {
        let ptr = Arc::as_ptr(raw) as *const () as usize;
        self.memo
            .entry(ptr)
            .or_insert_with(|| {
                let resolved = self.resolver.resolve(raw);
                if resolved.is_none() {
                    warn!(ptr, "object reference did not resolve, using placeholder");
                }
                resolved
            })
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::*;

    struct CountingResolver {
        calls: usize,
    }

    impl ObjectResolver for CountingResolver {
        fn resolve_uncached(&mut self, raw: &RawObjectRef) -> Option<ResolvedObject> {
            self.calls += 1;
            raw.downcast_ref::<String>().map(|s| ResolvedObject {
                type_name: "String".to_string(),
                display: s.clone(),
            })
        }
    }

    #[rstest]
    fn test_pass_memoizes_by_object_identity() {
        let mut resolver = CountingResolver { calls: 0 };
        let obj: RawObjectRef = Arc::new("player#1".to_string());

        let mut pass = ResolutionPass::new(&mut resolver);
        let first = pass.resolve(&obj).unwrap();
        let second = pass.resolve(&obj).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.display, "player#1");
        assert_eq!(resolver.calls, 1);
    }

    #[rstest]
    fn test_distinct_objects_resolve_separately() {
        let mut resolver = CountingResolver { calls: 0 };
        let a: RawObjectRef = Arc::new("a".to_string());
        let b: RawObjectRef = Arc::new("b".to_string());

        let mut pass = ResolutionPass::new(&mut resolver);
        assert_eq!(pass.resolve(&a).unwrap().display, "a");
        assert_eq!(pass.resolve(&b).unwrap().display, "b");
        assert_eq!(resolver.calls, 2);
    }

    #[rstest]
    fn test_failure_degrades_to_placeholder_and_is_memoized() {
        let mut resolver = CountingResolver { calls: 0 };
        let opaque: RawObjectRef = Arc::new(42u64);

        let mut pass = ResolutionPass::new(&mut resolver);
        assert!(pass.resolve(&opaque).is_none());
        assert!(pass.resolve(&opaque).is_none());
        assert_eq!(resolver.calls, 1);
    }

    #[rstest]
    fn test_null_resolver() {
        let mut resolver = NullResolver;
        let obj: RawObjectRef = Arc::new(1u8);
        assert!(resolver.resolve(&obj).is_none());
    }
}
