use parking_lot::{Condvar, Mutex};

/// Counting semaphore bounding how many block processors run at once.
///
/// All threads of a batch are spawned immediately; each one blocks in
/// [`AdmissionGate::acquire`] until a slot frees up.
pub struct AdmissionGate {
    available: Mutex<usize>,
    released: Condvar,
}

impl AdmissionGate {
    /// A gate admitting at most `permits` holders (at least one).
    pub fn new(permits: usize) -> Self {
        Self {
            available: Mutex::new(permits.max(1)),
            released: Condvar::new(),
        }
    }

    /// Block until a slot is free. The slot is returned when the permit drops,
    /// on every exit path of the holder.
    pub fn acquire(&self) -> Permit<'_> {
        let mut available = self.available.lock();
        while *available == 0 {
            self.released.wait(&mut available);
        }
        *available -= 1;
        Permit { gate: self }
    }

    fn release(&self) {
        *self.available.lock() += 1;
        self.released.notify_one();
    }
}

pub struct Permit<'a> {
    gate: &'a AdmissionGate,
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        self.gate.release();
    }
}
