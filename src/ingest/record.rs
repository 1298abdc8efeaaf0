/// Number of numeric fields per results-file line
pub const RECORD_ARITY: usize = 5;

/// One parsed results-file line: `[x_R, T, aux1, aux2, statistic]`
///
/// Ephemeral; produced per line and consumed by the aggregator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawRecord {
    pub fields: [f64; RECORD_ARITY],
}

impl RawRecord {
    pub fn new(fields: [f64; RECORD_ARITY]) -> Self {
        Self { fields }
    }

    /// Field by index; callers validate indices against `RECORD_ARITY` up front
    #[inline]
    pub fn field(&self, index: usize) -> f64 {
        self.fields[index]
    }

    /// First scan parameter (x_R in the observed layout)
    pub fn coord_a(&self) -> f64 {
        self.fields[0]
    }

    /// Second scan parameter (T in the observed layout)
    pub fn coord_b(&self) -> f64 {
        self.fields[1]
    }

    pub fn aux1(&self) -> f64 {
        self.fields[2]
    }

    pub fn aux2(&self) -> f64 {
        self.fields[3]
    }

    /// The ISI statistic
    pub fn statistic(&self) -> f64 {
        self.fields[4]
    }
}

impl From<[f64; RECORD_ARITY]> for RawRecord {
    fn from(fields: [f64; RECORD_ARITY]) -> Self {
        Self { fields }
    }
}
