//! Per-cell accumulators
//!
//! Cell sums are kept exactly, as lists of non-overlapping partial sums
//! (Shewchuk's algorithm), and only rounded when read. Inputs of at least
//! 2^500 in magnitude go to a second list scaled down by 2^-600, so no
//! partial ever overflows. The rounded value depends only on the multiset of
//! inputs, never on the order records arrive in, on batch boundaries, or on
//! how partial grids were merged.

/// 2^500; inputs at or above this magnitude are accumulated scaled down
const LARGE: f64 = 3.273390607896142e150;
/// 2^-600
const SCALE_DOWN: f64 = 2.409919865102884e-181;
/// 2^600
const SCALE_UP: f64 = 4.149515568880993e180;
/// 2^422, largest scaled-down total that still fits after scaling back up
const SCALED_LIMIT: f64 = 1.0830740992659433e127;

/// Non-overlapping partials, increasing magnitude
///
/// Callers keep the running total far from overflow.
#[derive(Debug, Clone, Default, PartialEq)]
struct Partials(Vec<f64>);

impl Partials {
    fn add(&mut self, value: f64) {
        let mut x = value;
        let mut kept = 0;
        for i in 0..self.0.len() {
            let mut y = self.0[i];
            if x.abs() < y.abs() {
                std::mem::swap(&mut x, &mut y);
            }
            let hi = x + y;
            let lo = y - (hi - x);
            if lo != 0.0 {
                self.0[kept] = lo;
                kept += 1;
            }
            x = hi;
        }
        self.0.truncate(kept);
        if x != 0.0 {
            self.0.push(x);
        }
    }

    fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn value(&self) -> f64 {
        let p = &self.0;
        let mut n = p.len();
        if n == 0 {
            return 0.0;
        }
        n -= 1;
        let mut hi = p[n];
        let mut lo = 0.0;
        while n > 0 {
            let x = hi;
            n -= 1;
            let y = p[n];
            hi = x + y;
            let y_rounded = hi - x;
            lo = y - y_rounded;
            if lo != 0.0 {
                break;
            }
        }
        // Round half-even correction when the remaining partials share lo's sign
        if n > 0 && ((lo < 0.0 && p[n - 1] < 0.0) || (lo > 0.0 && p[n - 1] > 0.0)) {
            let y = lo * 2.0;
            let x = hi + y;
            if y == x - hi {
                hi = x;
            }
        }
        hi
    }
}

/// Exact running sum of f64 values
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExactSum {
    /// Finite inputs below `LARGE`
    small: Partials,
    /// Finite inputs at or above `LARGE`, times `SCALE_DOWN`
    large: Partials,
    /// Sum of NaN/infinite inputs, which cannot be tracked exactly
    special: Option<f64>,
}

impl ExactSum {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, value: f64) {
        if !value.is_finite() {
            self.add_special(value);
        } else if value.abs() >= LARGE {
            // Exact: the scaled value stays a normal number
            self.large.add(value * SCALE_DOWN);
        } else {
            self.small.add(value);
        }
    }

    fn add_special(&mut self, value: f64) {
        self.special = Some(match self.special {
            Some(s) => s + value,
            None => value,
        });
    }

    /// Absorb another sum; the result is exact
    pub fn merge(&mut self, other: &ExactSum) {
        for &partial in &other.small.0 {
            self.small.add(partial);
        }
        for &partial in &other.large.0 {
            self.large.add(partial);
        }
        if let Some(special) = other.special {
            self.add_special(special);
        }
    }

    /// The rounded total
    ///
    /// Correctly rounded unless the exact total is within a factor of four
    /// of `f64::MAX`; a total beyond the finite range reads as an infinity.
    pub fn value(&self) -> f64 {
        if let Some(special) = self.special {
            return special;
        }
        if self.large.is_empty() {
            return self.small.value();
        }

        let scaled = self.large.value();
        if scaled.abs() < SCALED_LIMIT {
            let mut combined = self.small.clone();
            for &partial in &self.large.0 {
                combined.add(partial * SCALE_UP);
            }
            combined.value()
        } else {
            scaled * SCALE_UP + self.small.value()
        }
    }
}

/// Count and exact sum of the values that fell into one cell
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GridCell {
    count: u64,
    sum: ExactSum,
}

impl GridCell {
    pub fn add(&mut self, value: f64) {
        self.count += 1;
        self.sum.add(value);
    }

    pub fn merge(&mut self, other: &GridCell) {
        self.count += other.count;
        self.sum.merge(&other.sum);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn sum(&self) -> f64 {
        self.sum.value()
    }

    /// Mean of the cell's values, `None` for an empty cell
    pub fn mean(&self) -> Option<f64> {
        if self.count == 0 {
            None
        } else {
            Some(self.sum.value() / self.count as f64)
        }
    }
}
