use duet_core::IceCandidate;
use std::collections::VecDeque;
use std::future::Future;

/// Remote candidates that arrived before the remote description was set.
///
/// One buffer belongs to one attempt. It is drained exactly once; after the
/// flush the owner applies new candidates directly.
#[derive(Debug, Default)]
pub struct CandidateBuffer {
    pending: VecDeque<IceCandidate>,
    flushed: bool,
}

impl CandidateBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, candidate: IceCandidate) {
        self.pending.push_back(candidate);
    }

    /// Applies every buffered candidate in arrival order, then empties the
    /// buffer. Stops at the first failing candidate; the rest are dropped
    /// along with the attempt.
    pub async fn flush<F, Fut, E>(&mut self, mut apply: F) -> Result<usize, E>
    where
        F: FnMut(IceCandidate) -> Fut,
        Fut: Future<Output = Result<(), E>>,
    {
        self.flushed = true;
        let drained: Vec<IceCandidate> = self.pending.drain(..).collect();
        let mut applied = 0;
        for candidate in drained {
            apply(candidate).await?;
            applied += 1;
        }
        Ok(applied)
    }

    pub fn is_flushed(&self) -> bool {
        self.flushed
    }

    /// Drops whatever is still buffered. Returns how many were dropped.
    pub fn discard(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        dropped
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
