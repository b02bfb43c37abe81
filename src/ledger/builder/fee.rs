use serde::{Deserialize, Serialize};

pub const DEFAULT_FEE: u64 = 100_000;
pub const MIN_FEE: u64 = 1_000;
pub const FEE_PER_INPUT: u64 = 1_000;
pub const FEE_PER_OUTPUT: u64 = 100;

/// Size-proportional fee estimate, never below `min_fee`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeePolicy {
    pub base_fee: u64,
    pub min_fee: u64,
    pub per_input: u64,
    pub per_output: u64,
}

impl FeePolicy {
    pub fn estimate(&self, inputs: usize, outputs: usize) -> u64 {
        let inputs = inputs as u64;
        let outputs = outputs as u64;
        self.base_fee
            .saturating_add(inputs.saturating_mul(self.per_input))
            .saturating_add(outputs.saturating_mul(self.per_output))
            .max(self.min_fee)
    }
}

impl Default for FeePolicy {
    fn default() -> Self {
        Self {
            base_fee: DEFAULT_FEE,
            min_fee: MIN_FEE,
            per_input: FEE_PER_INPUT,
            per_output: FEE_PER_OUTPUT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_is_monotonic_and_bounded() {
        let p = FeePolicy::default();
        let one_one = p.estimate(1, 1);
        let one_two = p.estimate(1, 2);
        let ten_two = p.estimate(10, 2);
        assert!(one_one <= one_two);
        assert!(one_two <= ten_two);
        assert!(one_one >= MIN_FEE);
        assert_eq!(one_two, DEFAULT_FEE + FEE_PER_INPUT + 2 * FEE_PER_OUTPUT);
    }

    #[test]
    fn floor_applies_to_cheap_policies() {
        let p = FeePolicy {
            base_fee: 0,
            min_fee: MIN_FEE,
            per_input: 1,
            per_output: 1,
        };
        assert_eq!(p.estimate(1, 1), MIN_FEE);
    }
}
