use parley_core::CANDIDATES_COMPLETE;

/// Whether `candidate` is the end-of-candidates marker rather than a real candidate.
pub fn is_end_of_candidates(candidate: &str) -> bool {
    candidate.trim() == CANDIDATES_COMPLETE
}

/// Remote candidates that arrived before the remote description was applied.
///
/// Keeps arrival order, drops exact duplicates and never holds the
/// end-of-candidates marker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateBuffer {
    candidates: Vec<String>,
}

impl CandidateBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the candidate was queued.
    pub fn push(&mut self, candidate: &str) -> bool {
        if is_end_of_candidates(candidate) || self.candidates.iter().any(|c| c == candidate) {
            return false;
        }
        self.candidates.push(candidate.to_owned());
        true
    }

    /// Appends another buffer, keeping the dedup rule.
    pub fn extend(&mut self, other: CandidateBuffer) {
        for candidate in other.candidates {
            self.push(&candidate);
        }
    }

    /// Takes every queued candidate in arrival order, leaving the buffer empty.
    pub fn drain(&mut self) -> Vec<String> {
        std::mem::take(&mut self.candidates)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.candidates
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}
