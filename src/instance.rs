//! Instance directory lookups.
//!
//! The execution core only needs one fact from here: is the target instance
//! running, and what is its public address. The production implementation
//! shells out to the `aws` CLI; tests substitute the [`InstanceDirectory`]
//! trait with fakes.

use crate::error::SessionError;
use async_trait::async_trait;
use std::fmt;
use std::process::Stdio;
use tokio::process::Command;

/// EC2 instance lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    Pending,
    Running,
    ShuttingDown,
    Stopping,
    Stopped,
    Terminated,
}

impl InstanceState {
    /// Parse the wire name used by the EC2 API (`State.Name`).
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "shutting-down" => Some(Self::ShuttingDown),
            "stopping" => Some(Self::Stopping),
            "stopped" => Some(Self::Stopped),
            "terminated" => Some(Self::Terminated),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::ShuttingDown => "shutting-down",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Terminated => "terminated",
        }
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Point-in-time snapshot of one instance. Read once per execution; the
/// execution core never mutates it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instance {
    pub instance_id: String,
    pub public_ip: Option<String>,
    pub state: InstanceState,
}

/// External collaborator that answers "describe this instance".
#[async_trait]
pub trait InstanceDirectory {
    async fn describe(&self, instance_id: &str, region: &str) -> Result<Instance, SessionError>;
}

/// Production directory backed by `aws ec2 describe-instances`.
pub struct Ec2CliDirectory;

#[async_trait]
impl InstanceDirectory for Ec2CliDirectory {
    async fn describe(&self, instance_id: &str, region: &str) -> Result<Instance, SessionError> {
        let output = Command::new("aws")
            .args([
                "ec2",
                "describe-instances",
                "--instance-ids",
                instance_id,
                "--region",
                region,
                "--output",
                "json",
            ])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| SessionError::Describe(format!("aws: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SessionError::Describe(format!(
                "aws ec2 describe-instances failed for {instance_id}: {}",
                stderr.trim()
            )));
        }

        parse_describe_output(&String::from_utf8_lossy(&output.stdout), instance_id)
    }
}

/// Parse `describe-instances` JSON down to the single instance snapshot.
pub(crate) fn parse_describe_output(
    json: &str,
    instance_id: &str,
) -> Result<Instance, SessionError> {
    let value: serde_json::Value = serde_json::from_str(json)
        .map_err(|e| SessionError::Describe(format!("malformed describe output: {e}")))?;

    let instance = value
        .get("Reservations")
        .and_then(|r| r.as_array())
        .and_then(|reservations| {
            reservations.iter().find_map(|reservation| {
                reservation
                    .get("Instances")
                    .and_then(|i| i.as_array())
                    .and_then(|instances| {
                        instances.iter().find(|instance| {
                            instance.get("InstanceId").and_then(|id| id.as_str())
                                == Some(instance_id)
                        })
                    })
            })
        })
        .ok_or_else(|| {
            SessionError::Describe(format!("instance {instance_id} not found in describe output"))
        })?;

    let state_name = instance
        .get("State")
        .and_then(|s| s.get("Name"))
        .and_then(|n| n.as_str())
        .ok_or_else(|| {
            SessionError::Describe(format!("instance {instance_id} has no state in output"))
        })?;
    let state = InstanceState::from_name(state_name).ok_or_else(|| {
        SessionError::Describe(format!("unknown instance state `{state_name}`"))
    })?;

    Ok(Instance {
        instance_id: instance_id.to_string(),
        public_ip: instance
            .get("PublicIpAddress")
            .and_then(|ip| ip.as_str())
            .map(str::to_string),
        state,
    })
}
