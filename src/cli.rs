//! Command-line arguments shared by both service binaries

use crate::config::{Config, ServiceRole};
use crate::messaging::MessagingBackend;
use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Default, Parser)]
#[command(version, about = "Content event pipeline service", long_about = None)]
pub struct ServiceArgs {
    /// Configuration file layered over the built-in defaults
    #[arg(short, long, env = "CONFIG_PATH")]
    pub config: Option<PathBuf>,

    /// HTTP port
    #[arg(short, long, env = "PORT")]
    pub port: Option<u16>,

    /// Kafka bootstrap servers, comma separated
    #[arg(long, env = "KAFKA_BROKERS")]
    pub brokers: Option<String>,

    /// Topic carrying content events
    #[arg(long, env = "KAFKA_TOPIC")]
    pub topic: Option<String>,

    /// Consumer group
    #[arg(long, env = "KAFKA_GROUP_ID")]
    pub group_id: Option<String>,

    /// Use the process-local broker instead of Kafka
    #[arg(long)]
    pub in_memory: bool,

    /// Emit logs as JSON
    #[arg(long)]
    pub json_logs: bool,
}

impl ServiceArgs {
    /// Load configuration for `role` and apply command-line overrides on top
    pub fn load_config(&self, role: ServiceRole) -> Result<Config, config::ConfigError> {
        let mut config = Config::load(role, self.config.as_deref())?;
        self.apply(&mut config);
        Ok(config)
    }

    pub fn apply(&self, config: &mut Config) {
        if let Some(port) = self.port {
            config.server.http_port = port;
        }
        if let Some(ref brokers) = self.brokers {
            config.messaging.kafka.bootstrap_servers = brokers.clone();
        }
        if let Some(ref topic) = self.topic {
            config.messaging.topic = topic.clone();
        }
        if let Some(ref group_id) = self.group_id {
            config.messaging.kafka.group_id = group_id.clone();
        }
        if self.in_memory {
            config.messaging.backend = MessagingBackend::InMemory;
        }
        if self.json_logs {
            config.observability.json_logs = true;
        }
    }
}
