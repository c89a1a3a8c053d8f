//! Builds the monitor and input client for the configured device

use std::sync::Arc;

use crate::common::config::Config;
use crate::common::{Error, Result};
use crate::input::{
    EmulatorInfoResolver, Endpoint, EndpointResolver, InputClient, StaticResolver,
    TransportSettings,
};
use crate::monitor::{CommandSource, LogMonitor, LogSource};

/// Where to take the device from when not using the config defaults
#[derive(Debug, Default, Clone)]
pub struct DeviceOverrides {
    /// Fixed input endpoint, bypassing the emulator info file
    pub endpoint: Option<Endpoint>,
    /// Log command to run instead of the device tool's log tail
    pub log_command: Option<Vec<String>>,
}

/// Resolver for the configured platform, or the fixed override
pub fn resolver(config: &Config, overrides: &DeviceOverrides) -> Arc<dyn EndpointResolver> {
    match &overrides.endpoint {
        Some(endpoint) => Arc::new(StaticResolver(endpoint.clone())),
        None => Arc::new(
            EmulatorInfoResolver::new(config.emulator_info_path(), config.device.platform.as_str())
                .version(config.device.sdk_version.clone()),
        ),
    }
}

pub fn input_client(config: &Config, overrides: &DeviceOverrides) -> InputClient {
    InputClient::websocket(
        resolver(config, overrides),
        TransportSettings::from(&config.transport),
    )
}

/// Log source for the device, honoring a command override
pub fn log_source(config: &Config, overrides: &DeviceOverrides) -> Result<Arc<dyn LogSource>> {
    if let Some(command) = &overrides.log_command {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| Error::Config("log command must not be empty".to_string()))?;
        return Ok(Arc::new(CommandSource::new(program, args.to_vec())));
    }

    let tool = config.tool_path()?;
    Ok(Arc::new(CommandSource::device_logs(
        &tool,
        &config.device.platform,
    )))
}

pub fn log_monitor(config: &Config, overrides: &DeviceOverrides) -> Result<LogMonitor> {
    Ok(LogMonitor::with_config(
        log_source(config, overrides)?,
        &config.monitor,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_endpoint_override_wins() {
        let overrides = DeviceOverrides {
            endpoint: Some(Endpoint::new("127.0.0.1", 4000)),
            ..Default::default()
        };
        let endpoint = resolver(&Config::default(), &overrides)
            .resolve()
            .await
            .unwrap();
        assert_eq!(endpoint, Endpoint::new("127.0.0.1", 4000));
    }

    #[test]
    fn test_log_command_override() {
        let overrides = DeviceOverrides {
            log_command: Some(vec!["cat".to_string(), "device.log".to_string()]),
            ..Default::default()
        };
        let source = log_source(&Config::default(), &overrides).unwrap();
        assert_eq!(source.describe(), "cat device.log");

        let empty = DeviceOverrides {
            log_command: Some(Vec::new()),
            ..Default::default()
        };
        assert!(matches!(
            log_source(&Config::default(), &empty),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_missing_tool_is_reported() {
        let mut config = Config::default();
        config.device.tool = "definitely-not-a-device-tool-1234".into();
        assert!(matches!(
            log_source(&config, &DeviceOverrides::default()),
            Err(Error::ToolNotFound { .. })
        ));
    }
}
