/// Ownership token of one in-flight operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct BusyToken(u64);

/// "Something is in flight" flag for disabling inputs.
///
/// Only the most recently started operation can clear it; a slower, older
/// completion leaves the gate alone. Advisory only, not a lock.
#[derive(Debug, Default)]
pub(crate) struct BusyGate {
    generation: u64,
    current: Option<BusyToken>,
}

impl BusyGate {
    pub fn begin(&mut self) -> BusyToken {
        self.generation += 1;
        let token = BusyToken(self.generation);
        self.current = Some(token);
        token
    }

    /// Returns whether this call cleared the gate.
    pub fn end(&mut self, token: BusyToken) -> bool {
        if self.current == Some(token) {
            self.current = None;
            true
        } else {
            false
        }
    }

    pub fn is_busy(&self) -> bool {
        self.current.is_some()
    }
}
