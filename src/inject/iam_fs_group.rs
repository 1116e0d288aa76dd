//! Filesystem group for IAM roles for service accounts
//!
//! Projected service account tokens are only readable by the proxy when the
//! pod has an fsGroup; pods that already set one keep it.

use k8s_openapi::api::core::v1::{Pod, PodSecurityContext};
use tracing::debug;

use mesh_injector_common::Result;

use super::sidecar::{pod_name, spec_mut, PROXY_UID};

/// Sets `fsGroup` to the proxy UID when the pod has none
pub struct IamFsGroupMutator {
    enabled: bool,
}

impl IamFsGroupMutator {
    /// Create an fsGroup mutator
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    /// Fill in `fsGroup` if unset
    pub fn mutate(&self, pod: &mut Pod) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let has_fs_group = pod
            .spec
            .as_ref()
            .and_then(|spec| spec.security_context.as_ref())
            .is_some_and(|ctx| ctx.fs_group.is_some());
        if has_fs_group {
            return Ok(());
        }

        debug!(pod = %pod_name(pod), fs_group = PROXY_UID, "setting fsGroup");
        spec_mut(pod)
            .security_context
            .get_or_insert_with(PodSecurityContext::default)
            .fs_group = Some(PROXY_UID);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inject::testing::{app_pod, pod};
    use serde_json::json;

    fn fs_group(pod: &Pod) -> Option<i64> {
        pod.spec
            .as_ref()
            .and_then(|s| s.security_context.as_ref())
            .and_then(|c| c.fs_group)
    }

    #[test]
    fn test_sets_fs_group() {
        let mut pod = app_pod();
        IamFsGroupMutator::new(true)
            .mutate(&mut pod)
            .expect("fsGroup should be set");
        assert_eq!(fs_group(&pod), Some(1337));
    }

    #[test]
    fn test_existing_fs_group_kept() {
        let mut pod = pod(json!({
            "metadata": {"name": "app"},
            "spec": {
                "containers": [{"name": "app"}],
                "securityContext": {"fsGroup": 2000, "runAsNonRoot": true}
            }
        }));
        IamFsGroupMutator::new(true)
            .mutate(&mut pod)
            .expect("noop should succeed");
        assert_eq!(fs_group(&pod), Some(2000));
    }

    #[test]
    fn test_other_security_context_fields_kept() {
        let mut pod = pod(json!({
            "metadata": {"name": "app"},
            "spec": {
                "containers": [{"name": "app"}],
                "securityContext": {"runAsNonRoot": true}
            }
        }));
        IamFsGroupMutator::new(true)
            .mutate(&mut pod)
            .expect("fsGroup should be set");
        let ctx = pod
            .spec
            .as_ref()
            .and_then(|s| s.security_context.clone())
            .expect("security context should be set");
        assert_eq!(ctx.run_as_non_root, Some(true));
        assert_eq!(ctx.fs_group, Some(1337));
    }

    #[test]
    fn test_disabled_is_noop() {
        let mut pod = app_pod();
        IamFsGroupMutator::new(false)
            .mutate(&mut pod)
            .expect("noop should succeed");
        assert_eq!(fs_group(&pod), None);
    }
}
