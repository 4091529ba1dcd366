use std::sync::atomic::{AtomicU32, Ordering};

/// Lock-free `f32` accumulation buffer for scattered gradient writes.
///
/// Many pixels may land on the same texel, so additions from different threads race on one cell.
/// Each cell stores the bit pattern of an `f32` and adds with a compare-exchange loop. Addition
/// only has to be commutative and associative up to rounding, so the final sums do not depend on
/// thread scheduling beyond the last few bits.
pub struct AtomicAccumulator {
    cells: Vec<AtomicU32>,
}

impl AtomicAccumulator {
    /// `len` zero-initialized cells.
    pub fn new(len: usize) -> Self {
        Self { cells: (0..len).map(|_| AtomicU32::new(0.0f32.to_bits())).collect() }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn add(&self, index: usize, value: f32) {
        if value == 0.0 {
            return;
        }
        let cell = &self.cells[index];
        let mut current = cell.load(Ordering::Relaxed);
        loop {
            let next = (f32::from_bits(current) + value).to_bits();
            match cell.compare_exchange_weak(current, next, Ordering::Relaxed, Ordering::Relaxed) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
    }

    pub fn load(&self, index: usize) -> f32 {
        f32::from_bits(self.cells[index].load(Ordering::Relaxed))
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.cells.into_iter().map(|c| f32::from_bits(c.into_inner())).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayon::prelude::*;

    #[test]
    fn test_starts_zeroed() {
        let acc = AtomicAccumulator::new(3);
        assert_eq!(acc.len(), 3);
        assert_eq!(acc.into_vec(), vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_add_accumulates() {
        let acc = AtomicAccumulator::new(2);
        acc.add(1, 1.5);
        acc.add(1, -0.25);
        acc.add(0, 0.0);
        assert_eq!(acc.load(0), 0.0);
        assert_eq!(acc.load(1), 1.25);
    }

    #[test]
    fn test_concurrent_adds() {
        let acc = AtomicAccumulator::new(4);
        (0..10_000).into_par_iter().for_each(|i| acc.add(i % 4, 0.5));
        // Sums of halves stay exact in f32 at this scale.
        assert_eq!(acc.into_vec(), vec![1250.0; 4]);
    }
}
