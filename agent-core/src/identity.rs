use std::fmt;

use serde::Serialize;
use strum::Display;
use typed_builder::TypedBuilder;

/// Host identity and platform metadata, bound once at process start and
/// treated as read-only for the remainder of the process lifetime.
#[derive(Debug, Clone, TypedBuilder)]
pub struct AgentIdentity {
    /// Short instance id MGS uses to address the control channel URL.
    pub short_instance_id: String,
    pub region: String,
    pub agent_version: String,
    pub platform_type: PlatformType,
    #[builder(default)]
    pub language: Option<String>,
}

impl AgentIdentity {
    pub fn control_channel_path(&self) -> String {
        format!("v1/control-channel/{}", self.short_instance_id)
    }

    pub fn short_instance_id(&self) -> &str {
        &self.short_instance_id
    }

    pub fn platform_type(&self) -> PlatformType {
        self.platform_type
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum PlatformType {
    Linux,
    Windows,
    Macos,
}

impl fmt::Display for AgentIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.short_instance_id, self.region)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_channel_path_embeds_short_instance_id() {
        let identity = AgentIdentity::builder()
            .short_instance_id("mi-0123456789abcdef0".to_string())
            .region("us-east-1".to_string())
            .agent_version("3.2.1".to_string())
            .platform_type(PlatformType::Linux)
            .build();

        assert_eq!(identity.control_channel_path(), "v1/control-channel/mi-0123456789abcdef0");
    }
}
