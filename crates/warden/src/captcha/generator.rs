//! Arithmetic challenge generation.
//!
//! Two operands are drawn independently from a bounded range and the
//! answer is their sum. Distractors come from the same range of sums so
//! every button looks plausible.

use rand::Rng;
use rand::seq::SliceRandom;
use std::collections::BTreeSet;

use warden_common::constants::OPERAND_LIMIT;
use warden_common::{Challenge, WardenError};

use crate::config::VerificationConfig;

/// Challenge generator service
#[derive(Debug, Clone)]
pub struct ChallengeGenerator {
    operand_min: i64,
    operand_max: i64,
    option_count: usize,
}

impl ChallengeGenerator {
    pub fn new(operand_min: i64, operand_max: i64, option_count: usize) -> Result<Self, WardenError> {
        if operand_min > operand_max {
            return Err(WardenError::Challenge(format!(
                "operand range {operand_min}..={operand_max} is empty"
            )));
        }
        if operand_min < -OPERAND_LIMIT || operand_max > OPERAND_LIMIT {
            return Err(WardenError::Challenge(format!(
                "operands must stay within -{OPERAND_LIMIT}..={OPERAND_LIMIT}"
            )));
        }
        // bounded operands keep every sum and range width far from overflow
        let distinct_sums = (2 * (operand_max - operand_min) + 1) as u64;
        if option_count < 2 || option_count as u64 > distinct_sums {
            return Err(WardenError::Challenge(format!(
                "cannot draw {option_count} distinct options from {distinct_sums} possible sums"
            )));
        }
        Ok(Self {
            operand_min,
            operand_max,
            option_count,
        })
    }

    pub fn from_config(config: &VerificationConfig) -> Result<Self, WardenError> {
        Self::new(config.operand_min, config.operand_max, config.option_count)
    }

    /// Generate a new challenge from `rng`
    pub fn generate<R: Rng + ?Sized>(&self, rng: &mut R) -> Challenge {
        let left = rng.random_range(self.operand_min..=self.operand_max);
        let right = rng.random_range(self.operand_min..=self.operand_max);
        self.build(left, right, rng)
    }

    /// Build a challenge for fixed operands, only the options are random
    pub fn build<R: Rng + ?Sized>(&self, left: i64, right: i64, rng: &mut R) -> Challenge {
        let answer = left + right;
        let lowest = 2 * self.operand_min;
        let highest = 2 * self.operand_max;

        let mut options = BTreeSet::from([answer]);
        // Constructor guarantees enough distinct sums exist
        while options.len() < self.option_count {
            options.insert(rng.random_range(lowest..=highest));
        }

        let mut options: Vec<i64> = options.into_iter().collect();
        options.shuffle(rng);

        Challenge {
            left,
            right,
            prompt: format!("What is {left} + {right}?"),
            options,
            answer,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn generator() -> ChallengeGenerator {
        ChallengeGenerator::new(1, 10, 4).unwrap()
    }

    #[test]
    fn test_fixed_operands() {
        let mut rng = StdRng::seed_from_u64(7);
        let challenge = generator().build(3, 4, &mut rng);

        assert_eq!(challenge.answer, 7);
        assert_eq!(challenge.prompt, "What is 3 + 4?");
        assert_eq!(challenge.options.len(), 4);
        assert!(challenge.options.contains(&7));

        let distinct: BTreeSet<_> = challenge.options.iter().collect();
        assert_eq!(distinct.len(), 4, "options must be distinct");
    }

    #[test]
    fn test_generated_challenges_are_well_formed() {
        let mut rng = StdRng::seed_from_u64(42);
        let generator = generator();

        for _ in 0..500 {
            let challenge = generator.generate(&mut rng);
            assert!((1..=10).contains(&challenge.left));
            assert!((1..=10).contains(&challenge.right));
            assert_eq!(challenge.answer, challenge.left + challenge.right);
            assert_eq!(challenge.options.len(), 4);
            assert_eq!(
                challenge.options.iter().filter(|&&o| o == challenge.answer).count(),
                1
            );

            let distinct: BTreeSet<_> = challenge.options.iter().collect();
            assert_eq!(distinct.len(), challenge.options.len());
            assert!(challenge.options.iter().all(|o| (2..=20).contains(o)));
        }
    }

    #[test]
    fn test_correct_answer_position_varies() {
        let mut rng = StdRng::seed_from_u64(1);
        let generator = generator();
        let positions: BTreeSet<usize> = (0..100)
            .map(|_| {
                let challenge = generator.generate(&mut rng);
                challenge
                    .options
                    .iter()
                    .position(|&o| o == challenge.answer)
                    .unwrap()
            })
            .collect();

        assert!(positions.len() > 1, "answer should not sit in a fixed slot");
    }

    #[test]
    fn test_tight_range_uses_every_sum() {
        // operands 1..=2 give sums {2, 3, 4}
        let generator = ChallengeGenerator::new(1, 2, 3).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        let challenge = generator.generate(&mut rng);

        let mut options = challenge.options.clone();
        options.sort();
        assert_eq!(options, vec![2, 3, 4]);
    }

    #[test]
    fn test_invalid_ranges_rejected() {
        assert!(ChallengeGenerator::new(5, 1, 4).is_err());
        assert!(ChallengeGenerator::new(1, 1, 2).is_err());
        assert!(ChallengeGenerator::new(1, 10, 1).is_err());
        assert!(ChallengeGenerator::new(1, 10, 20).is_err());
        assert!(ChallengeGenerator::new(1, i64::MAX, 4).is_err());
        assert!(ChallengeGenerator::new(i64::MIN, 1, 4).is_err());
        assert!(ChallengeGenerator::new(1, 10, usize::MAX).is_err());
        assert!(ChallengeGenerator::new(-OPERAND_LIMIT, OPERAND_LIMIT, 4).is_ok());
    }
}
