//! Generation-token lifecycle for a lazily started worker.
//!
//! The worker is started when the active-item count goes from zero to
//! one and told to stop when it returns to zero. The worker may be
//! blocked in a long poll when it is told, so instead of joining it the
//! supervisor bumps its generation; a worker whose captured generation is
//! no longer current exits the next time it wakes. A replacement may be
//! running by then, which is why equality with the current generation,
//! not a shared stop flag, decides.

/// Tracks which worker generation, if any, is current.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Supervisor {
    generation: u64,
    active: bool,
}

impl Supervisor {
    /// No worker, generation 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Note that there is work. Returns the generation a new worker must
    /// run under, or `None` if the current worker is still live.
    pub fn activate(&mut self) -> Option<u64> {
        if self.active {
            return None;
        }
        self.active = true;
        self.generation += 1;
        Some(self.generation)
    }

    /// Note that the work ran out. Supersedes the current worker.
    pub fn deactivate(&mut self) {
        if self.active {
            self.active = false;
            self.generation += 1;
        }
    }

    /// Whether a worker started under `generation` should keep running.
    pub fn is_current(&self, generation: u64) -> bool {
        self.active && self.generation == generation
    }

    /// Whether a worker is expected to be running.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Current generation.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}
