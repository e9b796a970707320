use crate::group::GroupHandle;

/// RAII measurement scope. Dropping unwinds the active-timer chain to this
/// scope's depth — stopping any abandoned descendants first — then stops the
/// scope itself. That restores the nesting invariant on every exit path,
/// including panics, without per-call-site handling.
pub struct Scope<'a> {
    handle: &'a GroupHandle,
    depth: u16,
}

impl<'a> Scope<'a> {
    pub(crate) fn new(handle: &'a GroupHandle, depth: u16) -> Self {
        Scope { handle, depth }
    }

    /// Depth this scope's timer runs at.
    pub fn depth(&self) -> u16 {
        self.depth
    }
}

impl Drop for Scope<'_> {
    fn drop(&mut self) {
        self.handle.unwind_to_depth(self.depth.saturating_sub(1));
    }
}
