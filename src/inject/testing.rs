//! Pod fixtures for mutator tests

use k8s_openapi::api::core::v1::Pod;
use serde_json::json;

/// Build a pod from a JSON fragment; `apiVersion` and `kind` are filled in
pub fn pod(mut value: serde_json::Value) -> Pod {
    value["apiVersion"] = "v1".into();
    value["kind"] = "Pod".into();
    serde_json::from_value(value).expect("test pod should deserialize")
}

/// A single-container application pod
pub fn app_pod() -> Pod {
    pod(json!({
        "metadata": {"name": "app", "namespace": "default"},
        "spec": {"containers": [{"name": "app", "image": "app:latest"}]}
    }))
}

/// An application pod carrying `annotations`
pub fn annotated_pod(annotations: serde_json::Value) -> Pod {
    pod(json!({
        "metadata": {"name": "app", "namespace": "default", "annotations": annotations},
        "spec": {"containers": [{"name": "app", "image": "app:latest"}]}
    }))
}

/// Env var value by name
pub fn env_value<'a>(container: &'a k8s_openapi::api::core::v1::Container, name: &str) -> Option<&'a str> {
    container
        .env
        .as_ref()?
        .iter()
        .find(|e| e.name == name)?
        .value
        .as_deref()
}
