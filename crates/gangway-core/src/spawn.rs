//! Spawn specifications and their validation.
//!
//! A `SpawnSpec` is the raw request body; `validate()` turns it into a
//! `SpawnPlan` with parsed port and volume mappings, or a validation error
//! before any engine call is made.

use crate::error::{GatewayError, GatewayResult};
use serde::{Deserialize, Serialize};

/// Raw spawn request as received from an observer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpawnSpec {
    /// Image reference to run. Required.
    pub image: String,

    /// Optional container name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Port pairs as `"containerPort:hostPort"`.
    #[serde(default)]
    pub ports: Vec<String>,

    /// Volume pairs as `"hostPath:containerPath"`.
    #[serde(default)]
    pub volumes: Vec<String>,

    /// Environment entries, passed to the engine verbatim.
    #[serde(default)]
    pub env: Vec<String>,
}

impl SpawnSpec {
    /// Validates the spec and parses it into a `SpawnPlan`.
    ///
    /// # Errors
    ///
    /// `GatewayError::Validation` if the image is missing or any port or
    /// volume pair is malformed.
    pub fn validate(&self) -> GatewayResult<SpawnPlan> {
        if self.image.trim().is_empty() {
            return Err(GatewayError::Validation("image is required".to_string()));
        }

        let mut ports = Vec::with_capacity(self.ports.len());
        for pair in &self.ports {
            ports.push(PortMapping::parse(pair)?);
        }

        let mut volumes = Vec::with_capacity(self.volumes.len());
        for pair in &self.volumes {
            volumes.push(VolumeMapping::parse(pair)?);
        }

        Ok(SpawnPlan {
            image: self.image.clone(),
            name: self.name.clone(),
            ports,
            volumes,
            env: self.env.clone(),
        })
    }
}

/// A validated spawn request, ready for translation to an engine config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnPlan {
    pub image: String,
    pub name: Option<String>,
    pub ports: Vec<PortMapping>,
    pub volumes: Vec<VolumeMapping>,
    pub env: Vec<String>,
}

/// One `containerPort:hostPort` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortMapping {
    pub container_port: u16,
    pub host_port: u16,
}

impl PortMapping {
    /// Parses `"8080:80"` style pairs (container first, host second).
    pub fn parse(pair: &str) -> GatewayResult<Self> {
        let (container, host) = pair.split_once(':').ok_or_else(|| {
            GatewayError::Validation(format!(
                "port mapping '{pair}' must be 'containerPort:hostPort'"
            ))
        })?;

        let container_port = container.trim().parse::<u16>().map_err(|_| {
            GatewayError::Validation(format!("invalid container port in '{pair}'"))
        })?;
        let host_port = host
            .trim()
            .parse::<u16>()
            .map_err(|_| GatewayError::Validation(format!("invalid host port in '{pair}'")))?;

        Ok(Self {
            container_port,
            host_port,
        })
    }

    /// Engine port key, e.g. `"8080/tcp"`.
    pub fn container_key(&self) -> String {
        format!("{}/tcp", self.container_port)
    }
}

/// One `hostPath:containerPath` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeMapping {
    pub host_path: String,
    pub container_path: String,
}

impl VolumeMapping {
    /// Parses `"/data:/var/lib/data"` style pairs (host first,
    /// container second).
    pub fn parse(pair: &str) -> GatewayResult<Self> {
        let (host, container) = pair.split_once(':').ok_or_else(|| {
            GatewayError::Validation(format!(
                "volume mapping '{pair}' must be 'hostPath:containerPath'"
            ))
        })?;

        if host.is_empty() || container.is_empty() {
            return Err(GatewayError::Validation(format!(
                "volume mapping '{pair}' has an empty side"
            )));
        }

        Ok(Self {
            host_path: host.to_string(),
            container_path: container.to_string(),
        })
    }

    /// Engine bind string, e.g. `"/data:/var/lib/data"`.
    pub fn bind(&self) -> String {
        format!("{}:{}", self.host_path, self.container_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_image_rejected() {
        let spec = SpawnSpec::default();
        let err = spec.validate().unwrap_err();
        assert!(matches!(err, GatewayError::Validation(_)));
        assert_eq!(err.code(), "validation");
    }

    #[test]
    fn test_whitespace_image_rejected() {
        let spec = SpawnSpec {
            image: "   ".to_string(),
            ..Default::default()
        };
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_full_spec_parses() {
        let spec = SpawnSpec {
            image: "nginx:latest".to_string(),
            name: Some("web".to_string()),
            ports: vec!["80:8080".to_string(), "443:8443".to_string()],
            volumes: vec!["/srv/www:/usr/share/nginx/html".to_string()],
            env: vec!["MODE=prod".to_string()],
        };

        let plan = spec.validate().unwrap();
        assert_eq!(plan.image, "nginx:latest");
        assert_eq!(
            plan.ports,
            vec![
                PortMapping {
                    container_port: 80,
                    host_port: 8080
                },
                PortMapping {
                    container_port: 443,
                    host_port: 8443
                },
            ]
        );
        assert_eq!(plan.ports[0].container_key(), "80/tcp");
        assert_eq!(
            plan.volumes[0].bind(),
            "/srv/www:/usr/share/nginx/html"
        );
        assert_eq!(plan.env, vec!["MODE=prod".to_string()]);
    }

    #[test]
    fn test_malformed_port_rejected() {
        for bad in ["80", "80:", ":8080", "http:80", "80:web"] {
            let spec = SpawnSpec {
                image: "nginx".to_string(),
                ports: vec![bad.to_string()],
                ..Default::default()
            };
            assert!(spec.validate().is_err(), "'{bad}' should be rejected");
        }
    }

    #[test]
    fn test_malformed_volume_rejected() {
        for bad in ["/data", "/data:", ":/var/data"] {
            let spec = SpawnSpec {
                image: "nginx".to_string(),
                volumes: vec![bad.to_string()],
                ..Default::default()
            };
            assert!(spec.validate().is_err(), "'{bad}' should be rejected");
        }
    }

    #[test]
    fn test_spec_deserializes_with_defaults() {
        let spec: SpawnSpec = serde_json::from_str(r#"{"image": "redis"}"#).unwrap();
        assert_eq!(spec.image, "redis");
        assert!(spec.ports.is_empty());
        assert!(spec.volumes.is_empty());
        assert!(spec.env.is_empty());
        assert!(spec.name.is_none());
    }
}
