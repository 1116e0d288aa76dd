//! Termination grace period long enough for Envoy's preStop drain

use k8s_openapi::api::core::v1::Pod;
use tracing::debug;

use mesh_injector_common::Result;

use super::sidecar::{pod_name, spec_mut};

/// Kubernetes default grace period in seconds
const DEFAULT_GRACE_PERIOD_SECONDS: u32 = 30;

/// Raises `terminationGracePeriodSeconds` to the preStop delay when the delay
/// would outlast the default grace period
pub struct TerminationGracePeriodMutator {
    grace_period: Option<i64>,
}

impl TerminationGracePeriodMutator {
    /// Create a grace period mutator for Envoy's preStop delay in seconds
    pub fn new(pre_stop_delay: u32) -> Self {
        Self {
            grace_period: (pre_stop_delay > DEFAULT_GRACE_PERIOD_SECONDS)
                .then_some(i64::from(pre_stop_delay)),
        }
    }

    /// Set the grace period when the preStop delay needs it
    pub fn mutate(&self, pod: &mut Pod) -> Result<()> {
        let Some(grace_period) = self.grace_period else {
            return Ok(());
        };
        debug!(pod = %pod_name(pod), grace_period, "setting termination grace period");
        spec_mut(pod).termination_grace_period_seconds = Some(grace_period);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inject::testing::app_pod;
    use rstest::rstest;

    #[rstest]
    #[case::default_delay(20, None)]
    #[case::at_default(30, None)]
    #[case::long_drain(45, Some(45))]
    fn test_grace_period(#[case] delay: u32, #[case] expected: Option<i64>) {
        let mut pod = app_pod();
        TerminationGracePeriodMutator::new(delay)
            .mutate(&mut pod)
            .expect("grace period should apply");
        assert_eq!(
            pod.spec.as_ref().and_then(|s| s.termination_grace_period_seconds),
            expected
        );
    }
}
