//! AWS X-Ray daemon sidecar

use k8s_openapi::api::core::v1::{Pod, VolumeMount};
use serde::Serialize;
use tracing::debug;

use mesh_injector_common::{Error, Result};

use super::annotations;
use super::config::{SidecarConfig, XrayConfig};
use super::sidecar::{
    annotation, has_container, pod_name, render_container, resources_for, spec_mut, PROXY_UID,
};

const XRAY_LOG_LEVELS: [&str; 6] = ["dev", "debug", "info", "prod", "warn", "error"];
const CONFIG_MOUNT_FORMAT: &str = "volumeName:mountPath";
const DAEMON_CONFIG_FILE: &str = "xray-daemon.yaml";

const XRAY_TEMPLATE: &str = r#"{
  "name": {{ name|tojson }},
  "image": {{ image|tojson }},
  "securityContext": {"runAsUser": {{ proxy_uid }}},
  "ports": [
    {"name": "xray", "containerPort": {{ daemon_port }}, "protocol": "UDP"}
  ],
  "env": [
    {"name": "AWS_REGION", "value": {{ aws_region|tojson }}}
  ]
}"#;

#[derive(Serialize)]
struct XrayVariables<'a> {
    name: &'a str,
    image: &'a str,
    proxy_uid: i64,
    daemon_port: u16,
    aws_region: &'a str,
}

/// Injects the X-Ray daemon next to Envoy
pub struct XrayMutator<'a> {
    xray: &'a XrayConfig,
    sizing: &'a SidecarConfig,
    aws_region: &'a str,
}

impl<'a> XrayMutator<'a> {
    /// Create an X-Ray mutator
    pub fn new(xray: &'a XrayConfig, sizing: &'a SidecarConfig, aws_region: &'a str) -> Self {
        Self {
            xray,
            sizing,
            aws_region,
        }
    }

    /// Append `xray-daemon` when X-Ray is enabled and the daemon is not there yet
    pub fn mutate(&self, pod: &mut Pod) -> Result<()> {
        if !self.xray.enabled {
            return Ok(());
        }
        if has_container(pod, annotations::XRAY_DAEMON_CONTAINER) {
            debug!(pod = %pod_name(pod), "xray daemon already present");
            return Ok(());
        }
        self.check_config()?;

        let vars = XrayVariables {
            name: annotations::XRAY_DAEMON_CONTAINER,
            image: &self.xray.image,
            proxy_uid: PROXY_UID,
            daemon_port: self.xray.daemon_port,
            aws_region: self.aws_region,
        };
        let mut container = render_container("xray", XRAY_TEMPLATE, &vars)?;

        match config_mount(pod)? {
            Some((volume, path)) => {
                container.command = Some(vec![
                    "/xray".to_string(),
                    "--config".to_string(),
                    format!("{}/{}", path.trim_end_matches([' ', '/']), DAEMON_CONFIG_FILE),
                ]);
                container.volume_mounts = Some(vec![VolumeMount {
                    name: volume,
                    mount_path: path,
                    read_only: Some(true),
                    ..Default::default()
                }]);
            }
            None => {
                let args = self.daemon_args()?;
                if !args.is_empty() {
                    container.args = Some(args);
                }
            }
        }
        container.resources = Some(resources_for(pod, self.sizing)?);

        debug!(pod = %pod_name(pod), "injecting xray daemon");
        spec_mut(pod).containers.push(container);
        Ok(())
    }

    fn check_config(&self) -> Result<()> {
        let missing: Vec<&str> = [
            ("AWSRegion", self.aws_region.is_empty()),
            ("xRayImage", self.xray.image.is_empty()),
            ("xRayDaemonPort", self.xray.daemon_port == 0),
        ]
        .into_iter()
        .filter_map(|(name, missing)| missing.then_some(name))
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::invalid_config(format!(
                "Missing configuration parameters: {}",
                missing.join(",")
            )))
        }
    }

    fn daemon_args(&self) -> Result<Vec<String>> {
        let mut args = Vec::new();

        let level = self.xray.log_level.as_str();
        if !level.is_empty() {
            if !XRAY_LOG_LEVELS.contains(&level) {
                return Err(Error::invalid_config(format!(
                    "tracing.logLevel: \"{}\" is not valid. Set one of {}",
                    level,
                    XRAY_LOG_LEVELS.join(", ")
                )));
            }
            args.push("--log-level".to_string());
            args.push(level.to_string());
        }

        if let Some(role) = self.xray.role_arn.as_deref().filter(|r| !r.is_empty()) {
            if !is_valid_arn(role) {
                return Err(Error::invalid_config(format!(
                    "tracing.role: \"{}\" is not a valid `--role-arn`. Please refer to AWS X-Ray Documentation for more information",
                    role
                )));
            }
            args.push("--role-arn".to_string());
            args.push(role.to_string());
        }
        Ok(args)
    }
}

/// `(volumeName, mountPath)` from the config mount annotation, if present
fn config_mount(pod: &Pod) -> Result<Option<(String, String)>> {
    let Some(value) = annotation(pod, annotations::XRAY_AGENT_CONFIG_MOUNT) else {
        return Ok(None);
    };
    if value.contains(',') {
        return Err(Error::invalid_config(format!(
            "provide only one config mount for annotation \"{}: {}\"",
            annotations::XRAY_AGENT_CONFIG_MOUNT,
            value
        )));
    }
    let parts: Vec<&str> = value.split(':').map(str::trim).collect();
    match parts.as_slice() {
        [volume, path] if !volume.is_empty() && !path.is_empty() => {
            Ok(Some((volume.to_string(), path.to_string())))
        }
        _ => Err(Error::malformed_annotation(
            format!("\"{}\"", annotations::XRAY_AGENT_CONFIG_MOUNT),
            CONFIG_MOUNT_FORMAT,
        )),
    }
}

/// `arn:partition:service:region:account:resource`; the resource may contain colons
fn is_valid_arn(arn: &str) -> bool {
    let parts: Vec<&str> = arn.splitn(6, ':').collect();
    parts.len() == 6
        && parts[0] == "arn"
        && !parts[1].is_empty()
        && !parts[2].is_empty()
        && !parts[5].is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inject::testing::{annotated_pod, app_pod, env_value};
    use k8s_openapi::api::core::v1::Container;
    use rstest::rstest;
    use serde_json::json;

    fn enabled() -> XrayConfig {
        XrayConfig {
            enabled: true,
            ..Default::default()
        }
    }

    fn apply(xray: &XrayConfig, region: &str, pod: &mut Pod) -> Result<()> {
        XrayMutator::new(xray, &SidecarConfig::default(), region).mutate(pod)
    }

    fn daemon(pod: &Pod) -> &Container {
        pod.spec
            .as_ref()
            .and_then(|s| s.containers.iter().find(|c| c.name == "xray-daemon"))
            .expect("xray daemon should be injected")
    }

    #[test]
    fn test_disabled_is_noop() {
        let mut pod = app_pod();
        let before = pod.clone();
        apply(&XrayConfig::default(), "us-west-2", &mut pod).expect("noop should succeed");
        assert_eq!(pod, before);
    }

    #[test]
    fn test_daemon_container() {
        let mut pod = app_pod();
        apply(&enabled(), "us-west-2", &mut pod).expect("xray should render");

        let c = daemon(&pod);
        assert_eq!(c.image.as_deref(), Some("public.ecr.aws/xray/aws-xray-daemon"));
        assert_eq!(c.security_context.as_ref().and_then(|s| s.run_as_user), Some(1337));
        let port = &c.ports.as_ref().expect("ports should be set")[0];
        assert_eq!(port.name.as_deref(), Some("xray"));
        assert_eq!(port.container_port, 2000);
        assert_eq!(port.protocol.as_deref(), Some("UDP"));
        assert_eq!(env_value(c, "AWS_REGION"), Some("us-west-2"));
        assert_eq!(
            c.args.clone().expect("args should be set"),
            vec!["--log-level", "info"]
        );
        assert!(c.resources.is_some());
    }

    #[test]
    fn test_role_arn_arg() {
        let xray = XrayConfig {
            role_arn: Some("arn:aws:iam::111122223333:role/xray-writer".to_string()),
            ..enabled()
        };
        let mut pod = app_pod();
        apply(&xray, "us-west-2", &mut pod).expect("xray should render");
        assert_eq!(
            daemon(&pod).args.clone().expect("args should be set"),
            vec![
                "--log-level",
                "info",
                "--role-arn",
                "arn:aws:iam::111122223333:role/xray-writer"
            ]
        );
    }

    #[rstest]
    #[case::not_an_arn("xray-writer")]
    #[case::too_few_segments("arn:aws:iam::role")]
    fn test_invalid_role_arn(#[case] role: &str) {
        let xray = XrayConfig {
            role_arn: Some(role.to_string()),
            ..enabled()
        };
        let err = apply(&xray, "us-west-2", &mut app_pod()).unwrap_err();
        assert_eq!(
            err.to_string(),
            format!(
                "tracing.role: \"{}\" is not a valid `--role-arn`. Please refer to AWS X-Ray Documentation for more information",
                role
            )
        );
    }

    #[test]
    fn test_invalid_log_level() {
        let xray = XrayConfig {
            log_level: "verbose".to_string(),
            ..enabled()
        };
        let err = apply(&xray, "us-west-2", &mut app_pod()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "tracing.logLevel: \"verbose\" is not valid. Set one of dev, debug, info, prod, warn, error"
        );
    }

    #[test]
    fn test_empty_log_level_omits_flag() {
        let xray = XrayConfig {
            log_level: String::new(),
            role_arn: Some("arn:aws:iam::111122223333:role/xray-writer".to_string()),
            ..enabled()
        };
        let mut pod = app_pod();
        apply(&xray, "us-west-2", &mut pod).expect("xray should render");
        assert_eq!(
            daemon(&pod).args.clone().expect("args should be set"),
            vec!["--role-arn", "arn:aws:iam::111122223333:role/xray-writer"]
        );
    }

    #[test]
    fn test_empty_log_level_without_role_sets_no_args() {
        let xray = XrayConfig {
            log_level: String::new(),
            ..enabled()
        };
        let mut pod = app_pod();
        apply(&xray, "us-west-2", &mut pod).expect("xray should render");
        assert!(daemon(&pod).args.is_none());
    }

    #[test]
    fn test_missing_parameters() {
        let xray = XrayConfig {
            image: String::new(),
            daemon_port: 0,
            ..enabled()
        };
        let err = apply(&xray, "", &mut app_pod()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Missing configuration parameters: AWSRegion,xRayImage,xRayDaemonPort"
        );
    }

    #[test]
    fn test_config_mount_sets_command() {
        let mut pod = annotated_pod(json!({
            "appmesh.k8s.aws/xrayAgentConfigMount": "xray-config:/config/ "
        }));
        apply(&enabled(), "us-west-2", &mut pod).expect("xray should render");

        let c = daemon(&pod);
        assert_eq!(
            c.command.clone().expect("command should be set"),
            vec!["/xray", "--config", "/config/xray-daemon.yaml"]
        );
        assert!(c.args.is_none());
        let mounts = c.volume_mounts.clone().expect("mount should be set");
        assert_eq!(mounts[0].name, "xray-config");
        assert_eq!(mounts[0].mount_path, "/config/");
    }

    #[rstest]
    #[case::two_mounts(
        "a:/a,b:/b",
        "provide only one config mount for annotation \"appmesh.k8s.aws/xrayAgentConfigMount: a:/a,b:/b\""
    )]
    #[case::no_path(
        "xray-config",
        "malformed annotation \"appmesh.k8s.aws/xrayAgentConfigMount\", expected format: volumeName:mountPath"
    )]
    fn test_bad_config_mount(#[case] value: &str, #[case] message: &str) {
        let mut pod = annotated_pod(json!({"appmesh.k8s.aws/xrayAgentConfigMount": value}));
        let err = apply(&enabled(), "us-west-2", &mut pod).unwrap_err();
        assert_eq!(err.to_string(), message);
    }

    #[test]
    fn test_applied_twice_is_noop() {
        let mut pod = app_pod();
        apply(&enabled(), "us-west-2", &mut pod).expect("first apply should succeed");
        let once = pod.clone();
        apply(&enabled(), "us-west-2", &mut pod).expect("second apply should succeed");
        assert_eq!(pod, once);
    }
}
