/// Bounded counter limiting how many alternate-verification checks a run may
/// make before it gives up on finding the render target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    max: u32,
    remaining: u32,
}

impl RetryBudget {
    pub fn new(max: u32) -> Self {
        Self {
            max,
            remaining: max,
        }
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }

    /// Spend one attempt. Returns `false` without changing anything when the
    /// budget is already exhausted.
    pub fn try_consume(&mut self) -> bool {
        if self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        true
    }

    pub fn reset(&mut self) {
        self.remaining = self.max;
    }
}

impl Default for RetryBudget {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_MAX_RETRIES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consumes_down_to_zero() {
        let mut budget = RetryBudget::new(2);
        assert!(budget.try_consume());
        assert!(budget.try_consume());
        assert!(budget.is_exhausted());
        assert!(!budget.try_consume());
        assert_eq!(budget.remaining(), 0);
    }

    #[test]
    fn reset_restores_max() {
        let mut budget = RetryBudget::new(4);
        budget.try_consume();
        budget.try_consume();
        budget.reset();
        assert_eq!(budget.remaining(), 4);
        assert_eq!(budget.max(), 4);
    }

    #[test]
    fn zero_budget_starts_exhausted() {
        let budget = RetryBudget::new(0);
        assert!(budget.is_exhausted());
    }
}
