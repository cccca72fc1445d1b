//! Fixed-domain frequency counter for Phred-scaled quality scores.
//!
//! Depth at a single position can reach thousands of reads. Counting scores
//! into 101 bins keeps memory constant per position and lets the median be
//! located by walking the bins instead of sorting the observations.

pub const MAX_QUALITY: u8 = 100;
const BIN_COUNT: usize = MAX_QUALITY as usize + 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualityHistogram {
    bins: [u32; BIN_COUNT],
    count: u64,
}

impl Default for QualityHistogram {
    fn default() -> Self {
        Self::new()
    }
}

impl QualityHistogram {
    pub const fn new() -> Self {
        Self {
            bins: [0; BIN_COUNT],
            count: 0,
        }
    }

    /// Records one observation. Scores above [`MAX_QUALITY`] land in the top bin.
    #[inline]
    pub fn add(&mut self, value: u8) {
        let bin = usize::from(value.min(MAX_QUALITY));
        self.bins[bin] += 1;
        self.count += 1;
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn reset(&mut self) {
        if self.count != 0 {
            self.bins = [0; BIN_COUNT];
            self.count = 0;
        }
    }

    /// Median of the recorded scores, or `None` when nothing was recorded.
    ///
    /// For an even number of observations this is the mean of the two middle
    /// values, located as the k-th and (k+1)-th smallest by cumulative bin
    /// counts.
    pub fn median(&self) -> Option<f64> {
        if self.count == 0 {
            return None;
        }

        let upper_rank = self.count / 2 + 1;
        if self.count % 2 == 1 {
            return self.value_at_rank(upper_rank).map(f64::from);
        }

        let lower = self.value_at_rank(upper_rank - 1)?;
        let upper = self.value_at_rank(upper_rank)?;
        Some((f64::from(lower) + f64::from(upper)) / 2.0)
    }

    /// Fraction of observations strictly below `threshold`, or `None` when empty.
    pub fn fraction_below(&self, threshold: u8) -> Option<f64> {
        if self.count == 0 {
            return None;
        }

        let limit = usize::from(threshold).min(BIN_COUNT);
        let below: u64 = self.bins[..limit].iter().map(|&n| u64::from(n)).sum();
        Some(below as f64 / self.count as f64)
    }

    // 1-based rank into the sorted observations.
    fn value_at_rank(&self, rank: u64) -> Option<u8> {
        let mut cumulative = 0_u64;
        for (value, &n) in self.bins.iter().enumerate() {
            cumulative += u64::from(n);
            if cumulative >= rank {
                return u8::try_from(value).ok();
            }
        }
        None
    }
}
