//! Sidecar injection pipeline
//!
//! [`SidecarInjector`] turns an application pod into a mesh member by running
//! a fixed, ordered list of [`PodMutator`]s against it:
//!
//! 1. traffic interception (CNI annotations or the `proxyinit` init container)
//! 2. the Envoy sidecar
//! 3. tracers (X-Ray, Jaeger, Datadog), independent of each other
//! 4. auxiliaries (Cloud Map readiness gate, fsGroup, ECR pull secret,
//!    termination grace period), independent of everything
//!
//! Every mutator recognises its own output by name and does nothing when it
//! finds it, so running the pipeline twice yields the same pod. The first error
//! aborts the run; mutations already applied stay on the pod.

pub mod annotations;
pub mod config;

mod cni_proxy;
mod datadog;
mod ecr_secret;
mod envoy;
mod iam_fs_group;
mod init_proxy;
mod jaeger;
mod proxy;
mod readiness_gate;
mod sidecar;
mod termination_grace_period;
mod tracer_config;
mod virtual_gateway_envoy;
mod xray;

#[cfg(test)]
mod testing;

pub use config::{ClusterIdentity, InjectConfig};
pub use proxy::ProxyConfig;

use k8s_openapi::api::core::v1::Pod;
use tracing::debug;

use mesh_injector_common::mesh::{Mesh, VirtualGateway, VirtualNode};
use mesh_injector_common::Result;

use datadog::DatadogMutator;
use ecr_secret::EcrSecretMutator;
use envoy::EnvoyMutator;
use iam_fs_group::IamFsGroupMutator;
use jaeger::JaegerMutator;
use proxy::ProxyMutator;
use readiness_gate::CloudMapReadinessGateMutator;
use sidecar::{annotation, pod_name};
use termination_grace_period::TerminationGracePeriodMutator;
use virtual_gateway_envoy::VirtualGatewayEnvoyMutator;
use xray::XrayMutator;

/// One step of the injection pipeline
pub enum PodMutator<'a> {
    /// Traffic interception
    Proxy(ProxyMutator<'a>),
    /// Envoy sidecar for a virtual node
    Envoy(EnvoyMutator<'a>),
    /// Envoy configuration for a virtual gateway
    VirtualGatewayEnvoy(VirtualGatewayEnvoyMutator<'a>),
    /// X-Ray daemon
    Xray(XrayMutator<'a>),
    /// Jaeger tracer config
    Jaeger(JaegerMutator<'a>),
    /// Datadog tracer config
    Datadog(DatadogMutator<'a>),
    /// Cloud Map health readiness gate
    CloudMapReadinessGate(CloudMapReadinessGateMutator<'a>),
    /// fsGroup for IAM roles for service accounts
    IamFsGroup(IamFsGroupMutator),
    /// ECR image pull secret
    EcrSecret(EcrSecretMutator),
    /// Termination grace period covering the preStop drain
    TerminationGracePeriod(TerminationGracePeriodMutator),
}

impl PodMutator<'_> {
    /// Short name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::Proxy(_) => "proxy",
            Self::Envoy(_) => "envoy",
            Self::VirtualGatewayEnvoy(_) => "virtual-gateway-envoy",
            Self::Xray(_) => "xray",
            Self::Jaeger(_) => "jaeger",
            Self::Datadog(_) => "datadog",
            Self::CloudMapReadinessGate(_) => "cloudmap-readiness-gate",
            Self::IamFsGroup(_) => "iam-fs-group",
            Self::EcrSecret(_) => "ecr-secret",
            Self::TerminationGracePeriod(_) => "termination-grace-period",
        }
    }

    /// Apply this step to `pod`
    pub fn mutate(&self, pod: &mut Pod) -> Result<()> {
        match self {
            Self::Proxy(m) => m.mutate(pod),
            Self::Envoy(m) => m.mutate(pod),
            Self::VirtualGatewayEnvoy(m) => m.mutate(pod),
            Self::Xray(m) => m.mutate(pod),
            Self::Jaeger(m) => m.mutate(pod),
            Self::Datadog(m) => m.mutate(pod),
            Self::CloudMapReadinessGate(m) => m.mutate(pod),
            Self::IamFsGroup(m) => m.mutate(pod),
            Self::EcrSecret(m) => m.mutate(pod),
            Self::TerminationGracePeriod(m) => m.mutate(pod),
        }
    }
}

/// Runs the injection pipeline with a validated configuration
#[derive(Clone, Debug)]
pub struct SidecarInjector {
    config: InjectConfig,
    identity: ClusterIdentity,
}

impl SidecarInjector {
    /// Create an injector; fails if the configuration is inconsistent
    pub fn new(config: InjectConfig, identity: ClusterIdentity) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, identity })
    }

    /// The configuration in use
    pub fn config(&self) -> &InjectConfig {
        &self.config
    }

    /// Whether `pod` should be injected at all
    ///
    /// The sidecar-inject annotation decides when present ("enabled" in any
    /// case injects, anything else does not); otherwise the configured
    /// default applies.
    pub fn should_inject(&self, pod: &Pod) -> bool {
        match annotation(pod, annotations::SIDECAR_INJECT) {
            Some(value) => value.eq_ignore_ascii_case(annotations::ENABLED),
            None => self.config.inject_default,
        }
    }

    /// Mutators for a pod selected by a virtual node, in application order
    pub fn virtual_node_mutators<'a>(
        &'a self,
        mesh: &'a Mesh,
        vn: &'a VirtualNode,
    ) -> Vec<PodMutator<'a>> {
        let config = &self.config;
        vec![
            PodMutator::Proxy(ProxyMutator::new(&config.proxy_init, &config.sidecar, vn)),
            PodMutator::Envoy(EnvoyMutator::new(config, &self.identity, mesh, vn)),
            PodMutator::Xray(XrayMutator::new(
                &config.tracing.xray,
                &config.sidecar,
                &self.identity.aws_region,
            )),
            PodMutator::Jaeger(JaegerMutator::new(&config.tracing.jaeger)),
            PodMutator::Datadog(DatadogMutator::new(&config.tracing.datadog)),
            PodMutator::CloudMapReadinessGate(CloudMapReadinessGateMutator::new(vn)),
            PodMutator::IamFsGroup(IamFsGroupMutator::new(
                config.enable_iam_for_service_accounts,
            )),
            PodMutator::EcrSecret(EcrSecretMutator::new(config.enable_ecr_secret)),
            PodMutator::TerminationGracePeriod(TerminationGracePeriodMutator::new(
                config.envoy.pre_stop_delay,
            )),
        ]
    }

    /// Mutators for a pod selected by a virtual gateway, in application order
    pub fn virtual_gateway_mutators<'a>(
        &'a self,
        mesh: &'a Mesh,
        vg: &'a VirtualGateway,
    ) -> Vec<PodMutator<'a>> {
        let config = &self.config;
        vec![
            PodMutator::VirtualGatewayEnvoy(VirtualGatewayEnvoyMutator::new(
                &config.sidecar,
                &config.envoy,
                &self.identity,
                mesh,
                vg,
            )),
            PodMutator::Xray(XrayMutator::new(
                &config.tracing.xray,
                &config.sidecar,
                &self.identity.aws_region,
            )),
            PodMutator::Jaeger(JaegerMutator::new(&config.tracing.jaeger)),
            PodMutator::Datadog(DatadogMutator::new(&config.tracing.datadog)),
        ]
    }

    /// Inject a pod selected by `vn`
    pub fn inject(&self, mesh: &Mesh, vn: &VirtualNode, pod: &mut Pod) -> Result<()> {
        if !self.should_inject(pod) {
            debug!(pod = %pod_name(pod), "injection disabled for pod");
            return Ok(());
        }
        run(&self.virtual_node_mutators(mesh, vn), pod)
    }

    /// Inject a pod selected by `vg`
    pub fn inject_gateway(&self, mesh: &Mesh, vg: &VirtualGateway, pod: &mut Pod) -> Result<()> {
        if !self.should_inject(pod) {
            debug!(pod = %pod_name(pod), "injection disabled for pod");
            return Ok(());
        }
        run(&self.virtual_gateway_mutators(mesh, vg), pod)
    }
}

fn run(mutators: &[PodMutator<'_>], pod: &mut Pod) -> Result<()> {
    for mutator in mutators {
        debug!(pod = %pod_name(pod), mutator = mutator.name(), "applying mutator");
        mutator.mutate(pod)?;
    }
    debug!(pod = %pod_name(pod), mutators = mutators.len(), "pod injected");
    Ok(())
}
