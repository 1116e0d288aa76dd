//! Annotation keys, labels and artifact names managed by the injector
//!
//! Everything the pipeline reads from or writes to a pod is named here so the
//! mutators never spell a key inline.

/// Prefix shared by every injector annotation
pub const PREFIX: &str = "appmesh.k8s.aws";

// =============================================================================
// Pod annotations
// =============================================================================

/// Enables ("enabled") or disables injection for a single pod
pub const SIDECAR_INJECT: &str = "appmesh.k8s.aws/sidecarInjectorWebhook";

/// CPU request for injected sidecars
pub const CPU_REQUEST: &str = "appmesh.k8s.aws/cpuRequest";
/// Memory request for injected sidecars
pub const MEMORY_REQUEST: &str = "appmesh.k8s.aws/memoryRequest";
/// CPU limit for injected sidecars
pub const CPU_LIMIT: &str = "appmesh.k8s.aws/cpuLimit";
/// Memory limit for injected sidecars
pub const MEMORY_LIMIT: &str = "appmesh.k8s.aws/memoryLimit";

/// Traffic interception is configured by the CNI plugin instead of an init container
pub const CNI: &str = "appmesh.k8s.aws/appmeshCNI";
/// Ports the proxy forwards inbound traffic to
pub const PORTS: &str = "appmesh.k8s.aws/ports";
/// IPs excluded from egress interception
pub const EGRESS_IGNORED_IPS: &str = "appmesh.k8s.aws/egressIgnoredIPs";
/// Ports excluded from egress interception
pub const EGRESS_IGNORED_PORTS: &str = "appmesh.k8s.aws/egressIgnoredPorts";
/// UID whose traffic is never intercepted (the proxy's own)
pub const IGNORED_UID: &str = "appmesh.k8s.aws/ignoredUID";
/// Proxy port for outbound traffic
pub const PROXY_EGRESS_PORT: &str = "appmesh.k8s.aws/proxyEgressPort";
/// Proxy port for inbound traffic
pub const PROXY_INGRESS_PORT: &str = "appmesh.k8s.aws/proxyIngressPort";
/// Disables ("disabled") IPv6 interception rules
pub const IPV6: &str = "appmesh.k8s.aws/ipv6";

/// Use the control plane preview channel
pub const PREVIEW: &str = "appmesh.k8s.aws/preview";
/// Secrets mounted into the proxy, as `secretName:mountPath,...`
pub const SECRET_MOUNTS: &str = "appmesh.k8s.aws/secretMounts";
/// Existing pod volumes mounted into the proxy, as `volumeName:mountPath,...`
pub const VOLUME_MOUNTS: &str = "appmesh.k8s.aws/volumeMounts";
/// Extra proxy env vars, as `KEY=value,...`
pub const SIDECAR_ENV: &str = "appmesh.k8s.aws/sidecarEnv";
/// Opts a pod out ("disabled") of the SDS socket mount
pub const SDS: &str = "appmesh.k8s.aws/sds";
/// Keeps the image a gateway deployment declares for its envoy container
pub const VIRTUAL_GATEWAY_SKIP_IMAGE_OVERRIDE: &str =
    "appmesh.k8s.aws/virtualGatewaySkipImageOverride";
/// Volume holding the X-Ray daemon config, as `volumeName:mountPath`
pub const XRAY_AGENT_CONFIG_MOUNT: &str = "appmesh.k8s.aws/xrayAgentConfigMount";

// =============================================================================
// Pod labels
// =============================================================================

/// Set by the Fargate scheduler; Fargate pods always use CNI interception
pub const FARGATE_PROFILE_LABEL: &str = "eks.amazonaws.com/fargate-profile";

// =============================================================================
// Injected artifact names
// =============================================================================

/// Envoy sidecar container
pub const ENVOY_CONTAINER: &str = "envoy";
/// Traffic interception init container
pub const PROXY_INIT_CONTAINER: &str = "proxyinit";
/// X-Ray daemon sidecar container
pub const XRAY_DAEMON_CONTAINER: &str = "xray-daemon";
/// Init container writing the Jaeger tracing config
pub const JAEGER_INIT_CONTAINER: &str = "inject-jaeger-config";
/// Init container writing the Datadog tracing config
pub const DATADOG_INIT_CONTAINER: &str = "inject-datadog-config";
/// emptyDir shared between tracing init containers and Envoy
pub const TRACING_CONFIG_VOLUME: &str = "envoy-tracing-config";
/// Where the tracing config volume is mounted
pub const TRACING_CONFIG_MOUNT_PATH: &str = "/tmp/envoy";
/// hostPath volume exposing the SDS agent socket
pub const SDS_SOCKET_VOLUME: &str = "appmesh-sds-socket-volume";
/// Image pull secret for the proxy images
pub const ECR_SECRET: &str = "appmesh-ecr-secret";
/// Readiness gate flipped by the Cloud Map health reconciler
pub const CLOUDMAP_HEALTHY_CONDITION: &str = "conditions.appmesh.k8s.aws/aws-cloudmap-healthy";

// =============================================================================
// Annotation values
// =============================================================================

/// Value that switches a toggle annotation on
pub const ENABLED: &str = "enabled";
/// Value that switches a toggle annotation off
pub const DISABLED: &str = "disabled";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_annotations_share_prefix() {
        for key in [
            SIDECAR_INJECT,
            CPU_REQUEST,
            MEMORY_REQUEST,
            CPU_LIMIT,
            MEMORY_LIMIT,
            CNI,
            PORTS,
            EGRESS_IGNORED_IPS,
            EGRESS_IGNORED_PORTS,
            IGNORED_UID,
            PROXY_EGRESS_PORT,
            PROXY_INGRESS_PORT,
            IPV6,
            PREVIEW,
            SECRET_MOUNTS,
            VOLUME_MOUNTS,
            SIDECAR_ENV,
            SDS,
            VIRTUAL_GATEWAY_SKIP_IMAGE_OVERRIDE,
            XRAY_AGENT_CONFIG_MOUNT,
        ] {
            assert!(key.starts_with(PREFIX), "{key} should use the shared prefix");
        }
    }
}
