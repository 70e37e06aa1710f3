// rng.rs — bit-compatible port of the .NET Framework `System.Random`.
//
// The asset packer that scrambled the meshes drew its swap targets from
// `new Random(key)` / `rand.Next(i + 1)`. Undoing the scramble therefore
// requires the *exact* draw sequence for a given key — a generator that is
// merely "seeded the same" is useless if a single draw differs, and a
// mismatch corrupts the mesh silently (no error is ever raised).
//
// The algorithm is Knuth's subtractive lagged-Fibonacci generator as shipped
// in the .NET Framework: a 56-entry seed array initialised from the seed via
// MSEED = 161803398, four mixing rounds, then samples produced by
// subtracting two lagged entries. `Next(maxValue)` scales the raw sample
// into range through an `f64` multiply, and that double-precision rounding
// path is part of the contract — we reproduce it rather than using a modulo.
//
// Reference check: the first raw sample for seed 0 is 1559595546, a widely
// documented value for this generator.

const MBIG: i32 = i32::MAX; // 2147483647
const MSEED: i32 = 161803398;

/// Deterministic keyed generator matching the .NET Framework `Random`.
///
/// Pure function of the seed: the same seed yields the same draw sequence on
/// every platform and every run. No interior mutability, no global state —
/// callers that need independent streams construct independent values.
pub struct DotnetRng {
    seed_array: [i32; 56],
    inext: usize,
    inextp: usize,
}

impl DotnetRng {
    /// Seed the generator. Negative seeds behave like their absolute value;
    /// `i32::MIN` (whose absolute value overflows) clamps to `i32::MAX`,
    /// matching the reference implementation's special case.
    pub fn new(seed: i32) -> Self {
        let subtraction = if seed == i32::MIN {
            MBIG
        } else {
            seed.abs()
        };

        let mut seed_array = [0i32; 56];
        let mut mj = MSEED - subtraction;
        seed_array[55] = mj;
        let mut mk = 1i32;

        // Scatter the seed across the array at stride 21 (21*i mod 55 visits
        // every slot exactly once).
        // All arithmetic wraps: the source generator runs unchecked 32-bit
        // ops, and extreme seeds do overflow during mixing.
        for i in 1..55 {
            let ii = (21 * i) % 55;
            seed_array[ii] = mk;
            mk = mj.wrapping_sub(mk);
            if mk < 0 {
                mk = mk.wrapping_add(MBIG);
            }
            mj = seed_array[ii];
        }

        // Four mixing rounds over the lagged pairs.
        for _ in 1..5 {
            for i in 1..56 {
                let lag = seed_array[1 + (i + 30) % 55];
                seed_array[i] = seed_array[i].wrapping_sub(lag);
                if seed_array[i] < 0 {
                    seed_array[i] = seed_array[i].wrapping_add(MBIG);
                }
            }
        }

        DotnetRng {
            seed_array,
            inext: 0,
            inextp: 21,
        }
    }

    /// Raw sample in `[0, 2147483646]` — the reference `InternalSample`.
    pub fn next_i32(&mut self) -> i32 {
        self.inext += 1;
        if self.inext >= 56 {
            self.inext = 1;
        }
        self.inextp += 1;
        if self.inextp >= 56 {
            self.inextp = 1;
        }

        let mut ret = self.seed_array[self.inext].wrapping_sub(self.seed_array[self.inextp]);
        if ret == MBIG {
            ret -= 1;
        }
        if ret < 0 {
            ret = ret.wrapping_add(MBIG);
        }
        self.seed_array[self.inext] = ret;
        ret
    }

    /// Uniform draw in `[0, max)` — the reference `Next(maxValue)`.
    ///
    /// Scales the raw sample through `f64` exactly as the reference does;
    /// the rounding behaviour of that path is load-bearing for replaying
    /// historical draw sequences.
    pub fn next_below(&mut self, max: i32) -> i32 {
        debug_assert!(max >= 0, "next_below requires a non-negative bound");
        let sample = self.next_i32() as f64 * (1.0 / MBIG as f64);
        (sample * max as f64) as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_zero_matches_reference_sequence() {
        // First five raw samples of the reference generator for seed 0.
        let mut rng = DotnetRng::new(0);
        let drawn: Vec<i32> = (0..5).map(|_| rng.next_i32()).collect();
        assert_eq!(
            drawn,
            [1559595546, 1755192844, 1649316166, 1198642031, 442452829]
        );
    }

    #[test]
    fn seed_1337_matches_reference_sequence() {
        let mut rng = DotnetRng::new(1337);
        let drawn: Vec<i32> = (0..6).map(|_| rng.next_i32()).collect();
        assert_eq!(
            drawn,
            [448584296, 253439744, 676384244, 2000079047, 1809184579, 2062126174]
        );
    }

    #[test]
    fn negative_seed_equals_absolute_seed() {
        let mut a = DotnetRng::new(-1337);
        let mut b = DotnetRng::new(1337);
        for _ in 0..100 {
            assert_eq!(a.next_i32(), b.next_i32());
        }
    }

    #[test]
    fn min_seed_does_not_panic() {
        let mut rng = DotnetRng::new(i32::MIN);
        for _ in 0..100 {
            let v = rng.next_i32();
            assert!((0..MBIG).contains(&v));
        }
    }

    #[test]
    fn next_below_respects_bound() {
        let mut rng = DotnetRng::new(42);
        for bound in 1..200 {
            let v = rng.next_below(bound);
            assert!((0..bound).contains(&v), "draw {v} out of [0, {bound})");
        }
    }

    #[test]
    fn next_below_zero_is_zero() {
        let mut rng = DotnetRng::new(7);
        assert_eq!(rng.next_below(0), 0);
    }

    #[test]
    fn same_seed_same_stream() {
        let mut a = DotnetRng::new(99);
        let mut b = DotnetRng::new(99);
        for _ in 0..1000 {
            assert_eq!(a.next_i32(), b.next_i32());
        }
    }
}
