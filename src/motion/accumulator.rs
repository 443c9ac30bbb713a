//! Mutex-protected per-source pending-delta map, written from the async I/O task as samples
//! arrive and drained once per tick by the motion-loop thread.

use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
pub struct Accumulator {
    pending: Mutex<HashMap<String, (f64, f64)>>,
}

impl Accumulator {
    pub fn new() -> Self {
        Accumulator { pending: Mutex::new(HashMap::new()) }
    }

    /// Add `(dx, dy)` to the running total for `source`, to be picked up on the next drain.
    pub fn add(&self, source: &str, dx: f64, dy: f64) {
        let mut guard = self.pending.lock().expect("accumulator mutex poisoned");
        let entry = guard.entry(source.to_string()).or_insert((0.0, 0.0));
        entry.0 += dx;
        entry.1 += dy;
    }

    /// Take the accumulated map and reset it to empty for the next tick.
    pub fn drain(&self) -> HashMap<String, (f64, f64)> {
        let mut guard = self.pending.lock().expect("accumulator mutex poisoned");
        std::mem::take(&mut *guard)
    }

    pub fn clear(&self) {
        self.pending.lock().expect("accumulator mutex poisoned").clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_accumulates_same_source() {
        let acc = Accumulator::new();
        acc.add("accel", 1.0, 2.0);
        acc.add("accel", 0.5, -1.0);
        let drained = acc.drain();
        assert_eq!(drained.get("accel"), Some(&(1.5, 1.0)));
    }

    #[test]
    fn drain_empties_the_map() {
        let acc = Accumulator::new();
        acc.add("gyro", 1.0, 1.0);
        acc.drain();
        let second = acc.drain();
        assert!(second.is_empty());
    }

    #[test]
    fn sources_stay_independent() {
        let acc = Accumulator::new();
        acc.add("accel", 1.0, 0.0);
        acc.add("gyro", 0.0, 1.0);
        let drained = acc.drain();
        assert_eq!(drained.len(), 2);
    }
}
