//! Failure injection for in-memory endpoints

use blichat_core::EndpointError;
use std::collections::VecDeque;

/// Decides whether the next call on an endpoint fails
#[derive(Debug, Clone)]
pub struct FaultPlan {
    /// Errors returned, in order, by the next calls
    scripted: VecDeque<EndpointError>,
    /// Probability that a call without a scripted error fails anyway
    failure_rate: f64,
    /// Error used for random failures
    random_error: EndpointError,
}

impl Default for FaultPlan {
    fn default() -> Self {
        Self {
            scripted: VecDeque::new(),
            failure_rate: 0.0,
            random_error: EndpointError::Network {
                reason: "injected failure".into(),
            },
        }
    }
}

impl FaultPlan {
    pub fn fail_next(&mut self, error: EndpointError) {
        self.scripted.push_back(error);
    }

    pub fn fail_next_n(&mut self, count: usize, error: EndpointError) {
        for _ in 0..count {
            self.scripted.push_back(error.clone());
        }
    }

    pub fn set_failure_rate(&mut self, rate: f64, error: EndpointError) {
        self.failure_rate = rate.clamp(0.0, 1.0);
        self.random_error = error;
    }

    pub fn clear(&mut self) {
        self.scripted.clear();
        self.failure_rate = 0.0;
    }

    /// Outcome of the next call; `Some` means it fails
    pub fn next_failure(&mut self) -> Option<EndpointError> {
        if let Some(error) = self.scripted.pop_front() {
            return Some(error);
        }
        if self.failure_rate > 0.0 && fastrand::f64() < self.failure_rate {
            return Some(self.random_error.clone());
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_failures_in_order() {
        let mut plan = FaultPlan::default();
        plan.fail_next(EndpointError::Closed);
        plan.fail_next_n(2, EndpointError::Throttled { retry_after: None });

        assert_eq!(plan.next_failure(), Some(EndpointError::Closed));
        assert_eq!(
            plan.next_failure(),
            Some(EndpointError::Throttled { retry_after: None })
        );
        assert_eq!(
            plan.next_failure(),
            Some(EndpointError::Throttled { retry_after: None })
        );
        assert_eq!(plan.next_failure(), None);
    }

    #[test]
    fn test_certain_random_failure() {
        let mut plan = FaultPlan::default();
        plan.set_failure_rate(1.0, EndpointError::Timeout { duration_ms: 5 });
        assert_eq!(
            plan.next_failure(),
            Some(EndpointError::Timeout { duration_ms: 5 })
        );
        plan.clear();
        assert_eq!(plan.next_failure(), None);
    }
}
