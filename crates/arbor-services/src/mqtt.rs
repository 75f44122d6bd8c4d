//! MQTT broker launch
//!
//! MQTT services are backed by an external broker process started in
//! daemon mode. The launch's exit status is checked: a broker that cannot
//! be spawned or that exits unsuccessfully fails the service.

use tokio::process::Command;
use tracing::info;

use crate::error::ServiceError;

/// Executable launched for MQTT services unless configured otherwise
pub const DEFAULT_BROKER: &str = "mosquitto";

/// Arguments that daemonize the broker on `port`
pub fn broker_args(port: u16) -> Vec<String> {
    vec!["-d".to_string(), "-p".to_string(), port.to_string()]
}

/// Start the broker on `port` and wait for the launcher to return
pub async fn launch_broker(command: &str, port: u16) -> Result<(), ServiceError> {
    let status = Command::new(command)
        .args(broker_args(port))
        .status()
        .await
        .map_err(|source| ServiceError::BrokerLaunch {
            command: command.to_string(),
            source,
        })?;

    if !status.success() {
        return Err(ServiceError::BrokerExit {
            command: command.to_string(),
            status,
        });
    }

    info!(command = %command, port = port, "Launched MQTT broker");
    Ok(())
}
