//! An approximate membership filter
//!
//! This is a classic Bloom filter: a fixed array of bits plus a number of probes per key. Adding
//! a key sets the bit at every probe index, and a key is reported as contained if every one of
//! its probe bits is set. There are never false negatives, and false positives occur at roughly
//! the rate the filter was sized for as long as it isn't filled past its expected load.

use core::f64::consts::LN_2;

use rand::{rngs::SmallRng, Rng, SeedableRng};

/// Seed for the generator producing the per-probe seeds of [`ProbeScheme::Rehash`]
///
/// Chosen randomly, but fixed so that runs over the same input are reproducible.
const PROBE_SEED: u64 = 0x6A09_E667_F3BC_C908;

/// How the probe indices for a key are derived
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ProbeScheme {
    /// Each probe mixes the key with its own seed before reducing it modulo the bit count
    #[default]
    Rehash,
    /// Probes are successive remainders of the key divided by the bit count
    ///
    /// The key is reduced modulo `m` for the first probe, then replaced by the quotient for the
    /// next one, and so on. This only works if the key carries at least `k * log2(m)` bits of
    /// entropy; past that the later probes are all zero and the false-positive rate climbs above
    /// the configured target. See [`BloomFilter::required_entropy_bits`].
    Quotient,
}

/// A fixed-capacity probabilistic set of `u64` keys
#[derive(Clone, Debug)]
pub struct BloomFilter {
    /// The bit array, packed into words
    words: Box<[u64]>,
    /// The number of usable bits in `words` (`m`)
    num_bits: u64,
    /// One seed per probe (`k` of them)
    ///
    /// Only mixed into the key under [`ProbeScheme::Rehash`], but the length sets the probe count
    /// for both schemes.
    seeds: Box<[u64]>,
    scheme: ProbeScheme,
    /// The number of calls to [`BloomFilter::add`]
    inserted: usize,
}

impl BloomFilter {
    /// Make a filter sized to hold `expected_elements` keys with the given false-positive rate
    ///
    /// An expectation of zero elements is treated as one.
    ///
    /// # Panics
    ///
    /// If `false_positive_rate` is not strictly between 0 and 1.
    pub fn new(expected_elements: usize, false_positive_rate: f64) -> Self {
        Self::with_scheme(expected_elements, false_positive_rate, ProbeScheme::default())
    }

    /// Like [`BloomFilter::new`], but with an explicit way of deriving the probes
    pub fn with_scheme(
        expected_elements: usize,
        false_positive_rate: f64,
        scheme: ProbeScheme,
    ) -> Self {
        assert!(
            false_positive_rate > 0. && false_positive_rate < 1.,
            "false positive rate must be in (0, 1), got {false_positive_rate}"
        );
        let num_bits = optimal_num_bits(expected_elements, false_positive_rate);
        let num_probes = optimal_num_probes(num_bits, expected_elements);
        let mut rng = SmallRng::seed_from_u64(PROBE_SEED);
        let seeds = (0..num_probes).map(|_| rng.gen::<u64>()).collect();
        let num_words = num_bits.div_ceil(64) as usize;
        Self {
            words: vec![0; num_words].into_boxed_slice(),
            num_bits,
            seeds,
            scheme,
            inserted: 0,
        }
    }

    /// Mark the key as present
    pub fn add(&mut self, key: u64) {
        for idx in probe_indices(self.scheme, &self.seeds, self.num_bits, key) {
            self.words[(idx / 64) as usize] |= 1 << (idx % 64);
        }
        self.inserted += 1;
    }

    /// Whether the key may have been added
    ///
    /// Always `true` for keys that were added, and sometimes `true` for keys that weren't.
    pub fn contains(&self, key: u64) -> bool {
        probe_indices(self.scheme, &self.seeds, self.num_bits, key)
            .all(|idx| self.words[(idx / 64) as usize] & (1 << (idx % 64)) != 0)
    }

    /// The size of the bit array (`m`)
    pub const fn num_bits(&self) -> u64 {
        self.num_bits
    }

    /// The number of probes per key (`k`)
    pub fn num_probes(&self) -> u32 {
        self.seeds.len() as u32
    }

    pub const fn scheme(&self) -> ProbeScheme {
        self.scheme
    }

    /// The number of keys added so far, counting repeats
    pub const fn len(&self) -> usize {
        self.inserted
    }

    pub const fn is_empty(&self) -> bool {
        self.inserted == 0
    }

    /// The bits of key entropy the probes consume under [`ProbeScheme::Quotient`]
    ///
    /// A 64-bit key can't satisfy more than 64 of these.
    pub fn required_entropy_bits(&self) -> f64 {
        f64::from(self.num_probes()) * (self.num_bits as f64).log2()
    }

    /// The expected false-positive rate at the current load, assuming well-spread probes
    pub fn estimated_false_positive_rate(&self) -> f64 {
        let k = f64::from(self.num_probes());
        let fill = 1. - (-k * self.inserted as f64 / self.num_bits as f64).exp();
        fill.powf(k)
    }
}

/// The bit count minimizing space for `false_positive_rate` at `expected_elements` keys
///
/// `m = ceil(-n ln(p) / ln(2)^2)`
pub fn optimal_num_bits(expected_elements: usize, false_positive_rate: f64) -> u64 {
    let n = expected_elements.max(1) as f64;
    let bits = (-n * false_positive_rate.ln() / (LN_2 * LN_2)).ceil();
    (bits as u64).max(1)
}

/// The probe count minimizing false positives for `num_bits` bits at `expected_elements` keys
///
/// `k = round(m / n * ln(2))`, and at least one.
pub fn optimal_num_probes(num_bits: u64, expected_elements: usize) -> u32 {
    let n = expected_elements.max(1) as f64;
    ((num_bits as f64 / n * LN_2).round() as u32).max(1)
}

/// The bit indices probed for `key`
fn probe_indices(
    scheme: ProbeScheme,
    seeds: &[u64],
    num_bits: u64,
    key: u64,
) -> impl Iterator<Item = u64> + '_ {
    let mut quotient = key;
    seeds.iter().map(move |&seed| match scheme {
        ProbeScheme::Rehash => mix(key ^ seed) % num_bits,
        ProbeScheme::Quotient => {
            let idx = quotient % num_bits;
            quotient /= num_bits;
            idx
        }
    })
}

/// The SplitMix64 finalizer
const fn mix(mut x: u64) -> u64 {
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    x ^ (x >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;

    use quickcheck::quickcheck;

    quickcheck! {
        fn test_no_false_negatives_rehash(keys: Vec<u64>) -> bool {
            let mut filter = BloomFilter::with_scheme(keys.len(), 0.05, ProbeScheme::Rehash);
            keys.iter().for_each(|&key| filter.add(key));
            keys.iter().all(|&key| filter.contains(key))
        }

        fn test_no_false_negatives_quotient(keys: Vec<u64>) -> bool {
            let mut filter = BloomFilter::with_scheme(keys.len(), 0.05, ProbeScheme::Quotient);
            keys.iter().for_each(|&key| filter.add(key));
            keys.iter().all(|&key| filter.contains(key))
        }
    }

    #[test]
    fn test_sizing_closed_form() {
        let filter = BloomFilter::new(1000, 0.01);
        assert_eq!(filter.num_bits(), 9586);
        assert_eq!(filter.num_probes(), 7);

        let filter = BloomFilter::new(179_550, 0.1);
        assert_eq!(filter.num_bits(), 860_499);
        assert_eq!(filter.num_probes(), 3);
    }

    #[test]
    fn test_zero_expected_elements() {
        let mut filter = BloomFilter::new(0, 0.5);
        assert!(filter.num_bits() >= 1);
        assert!(filter.num_probes() >= 1);
        filter.add(42);
        assert!(filter.contains(42));
    }

    #[test]
    fn test_empty_filter_contains_nothing() {
        let filter = BloomFilter::new(100, 0.01);
        assert!(filter.is_empty());
        assert!((0..1000).all(|key| !filter.contains(key)));
    }

    #[test]
    #[should_panic]
    fn test_rejects_certain_false_positives() {
        BloomFilter::new(10, 1.0);
    }

    /// Count how often keys that were never added are reported present
    fn measured_false_positive_rate(scheme: ProbeScheme, expected: usize, rate: f64) -> f64 {
        // Chosen randomly, but fixed for test consistency
        let mut rng = SmallRng::seed_from_u64(1_497_113_504_117_839_215);
        let mut filter = BloomFilter::with_scheme(expected, rate, scheme);
        for _ in 0..expected {
            filter.add(rng.gen());
        }
        const TRIALS: usize = 100_000;
        let hits = (0..TRIALS).filter(|_| filter.contains(rng.gen())).count();
        hits as f64 / TRIALS as f64
    }

    #[test]
    fn test_rehash_false_positive_rate_near_target() {
        let measured = measured_false_positive_rate(ProbeScheme::Rehash, 10_000, 0.01);
        assert!(measured < 0.02, "measured false positive rate {measured}");
    }

    #[test]
    fn test_quotient_false_positive_rate_with_enough_entropy() {
        let filter = BloomFilter::with_scheme(1000, 0.1, ProbeScheme::Quotient);
        assert!(filter.required_entropy_bits() < 64.);
        let measured = measured_false_positive_rate(ProbeScheme::Quotient, 1000, 0.1);
        assert!(measured < 0.2, "measured false positive rate {measured}");
    }

    #[test]
    fn test_quotient_entropy_shortfall_is_reported() {
        let filter = BloomFilter::with_scheme(10_000, 0.01, ProbeScheme::Quotient);
        assert!(filter.required_entropy_bits() > 64.);
    }

    #[test]
    fn test_estimated_rate_tracks_load() {
        let mut filter = BloomFilter::new(1000, 0.01);
        assert_eq!(filter.estimated_false_positive_rate(), 0.);
        for key in 0..1000 {
            filter.add(mix(key));
        }
        assert_eq!(filter.len(), 1000);
        let estimate = filter.estimated_false_positive_rate();
        assert!((0.005..0.02).contains(&estimate), "estimate {estimate}");
    }
}
