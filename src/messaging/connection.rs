//! Broker connection state machine.
//!
//! Publisher and consumer each own one [`ConnectionStateMachine`]. Only the
//! owner can drive transitions; everyone else gets a [`ConnectionHealth`]
//! handle, which is read-only.
//!
//! ```text
//! disconnected ──► connecting ──► connected
//!      ▲               │  ▲            │
//!      └── (failure) ──┘  │            ▼ (failure)
//!                         └──── reconnecting
//! ```

use crate::messaging::error::{MessagingError, MessagingResult};
use crate::messaging::metrics::PIPELINE_METRICS;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Current state of a broker connection
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl ConnectionState {
    /// Numeric value for the Prometheus gauge
    pub fn to_metric_value(&self) -> f64 {
        match self {
            ConnectionState::Disconnected => 0.0,
            ConnectionState::Connecting => 1.0,
            ConnectionState::Connected => 2.0,
            ConnectionState::Reconnecting => 3.0,
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    /// Whether `self -> next` is a legal edge of the state machine
    pub fn can_transition_to(&self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Disconnected, Connecting)
                | (Reconnecting, Connecting)
                | (Connecting, Connected)
                | (Connecting, Disconnected)
                | (Connecting, Reconnecting)
                | (Connected, Reconnecting)
                | (Connected, Disconnected)
                | (Reconnecting, Disconnected)
        )
    }
}

/// A recorded state change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateTransition {
    pub from: ConnectionState,
    pub to: ConnectionState,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
}

#[derive(Debug, Clone)]
struct StateData {
    state: ConnectionState,
    has_connected: bool,
    last_state_change: DateTime<Utc>,
    connected_since: Option<DateTime<Utc>>,
    last_error: Option<String>,
    connect_attempts: u64,
    transition_count: u64,
    last_transition: Option<StateTransition>,
}

impl StateData {
    fn new() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            has_connected: false,
            last_state_change: Utc::now(),
            connected_since: None,
            last_error: None,
            connect_attempts: 0,
            transition_count: 0,
            last_transition: None,
        }
    }
}

/// Point-in-time view of a connection, for status endpoints
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSnapshot {
    pub state: ConnectionState,
    pub since: DateTime<Utc>,
    pub connected_since: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub connect_attempts: u64,
    pub transition_count: u64,
    pub last_transition: Option<StateTransition>,
}

/// Owner side of a connection state machine
#[derive(Debug)]
pub struct ConnectionStateMachine {
    role: &'static str,
    data: Arc<RwLock<StateData>>,
}

impl ConnectionStateMachine {
    /// Create a machine in the `disconnected` state. `role` labels logs and metrics.
    pub fn new(role: &'static str) -> Self {
        PIPELINE_METRICS
            .connection_state
            .with_label_values(&[role])
            .set(ConnectionState::Disconnected.to_metric_value());

        Self {
            role,
            data: Arc::new(RwLock::new(StateData::new())),
        }
    }

    /// Read-only handle for health reporting
    pub fn health(&self) -> ConnectionHealth {
        ConnectionHealth {
            data: self.data.clone(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.data.read().state
    }

    /// Start a connection attempt
    pub fn begin_connect(&self) -> MessagingResult<()> {
        let mut data = self.data.write();
        self.transition(&mut data, ConnectionState::Connecting, "connection attempt")?;
        data.connect_attempts += 1;
        PIPELINE_METRICS
            .connection_attempts
            .with_label_values(&[self.role])
            .inc();
        Ok(())
    }

    /// The pending attempt succeeded
    pub fn mark_connected(&self) -> MessagingResult<()> {
        let mut data = self.data.write();
        self.transition(&mut data, ConnectionState::Connected, "broker reachable")?;
        data.has_connected = true;
        data.connected_since = Some(data.last_state_change);
        data.last_error = None;
        Ok(())
    }

    /// The pending attempt failed. Lands in `disconnected` until the first
    /// successful connect, in `reconnecting` afterwards.
    pub fn mark_connect_failed(&self, error: &str) -> MessagingResult<()> {
        let mut data = self.data.write();
        let next = if data.has_connected {
            ConnectionState::Reconnecting
        } else {
            ConnectionState::Disconnected
        };
        self.transition(&mut data, next, error)?;
        data.last_error = Some(error.to_string());
        Ok(())
    }

    /// A live connection broke
    pub fn mark_connection_lost(&self, error: &str) -> MessagingResult<()> {
        let mut data = self.data.write();
        self.transition(&mut data, ConnectionState::Reconnecting, error)?;
        data.connected_since = None;
        data.last_error = Some(error.to_string());
        Ok(())
    }

    /// Move to `disconnected` for shutdown. `false` if already there.
    pub fn mark_disconnected(&self) -> bool {
        let mut data = self.data.write();
        if data.state == ConnectionState::Disconnected {
            return false;
        }
        if self
            .transition(&mut data, ConnectionState::Disconnected, "shutdown")
            .is_err()
        {
            return false;
        }
        data.connected_since = None;
        true
    }

    fn transition(
        &self,
        data: &mut StateData,
        to: ConnectionState,
        reason: &str,
    ) -> MessagingResult<()> {
        let from = data.state;
        if !from.can_transition_to(to) {
            return Err(MessagingError::InvalidTransition { from, to });
        }

        let transition = StateTransition {
            from,
            to,
            timestamp: Utc::now(),
            reason: reason.to_string(),
        };

        data.state = to;
        data.last_state_change = transition.timestamp;
        data.transition_count += 1;
        data.last_transition = Some(transition);

        PIPELINE_METRICS
            .connection_state
            .with_label_values(&[self.role])
            .set(to.to_metric_value());

        tracing::debug!(
            role = self.role,
            from = %from,
            to = %to,
            reason = reason,
            "Connection state changed"
        );

        Ok(())
    }
}

/// Read-only view of a connection's state
#[derive(Debug, Clone)]
pub struct ConnectionHealth {
    data: Arc<RwLock<StateData>>,
}

impl ConnectionHealth {
    pub fn state(&self) -> ConnectionState {
        self.data.read().state
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Label used by `/health`: anything short of connected reports as reconnecting
    pub fn broker_label(&self) -> &'static str {
        if self.is_connected() {
            "connected"
        } else {
            "reconnecting"
        }
    }

    pub fn snapshot(&self) -> ConnectionSnapshot {
        let data = self.data.read();
        ConnectionSnapshot {
            state: data.state,
            since: data.last_state_change,
            connected_since: data.connected_since,
            last_error: data.last_error.clone(),
            connect_attempts: data.connect_attempts,
            transition_count: data.transition_count,
            last_transition: data.last_transition.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let machine = ConnectionStateMachine::new("test");
        assert_eq!(machine.state(), ConnectionState::Disconnected);

        machine.begin_connect().unwrap();
        assert_eq!(machine.state(), ConnectionState::Connecting);

        machine.mark_connected().unwrap();
        let transition = machine.health().snapshot().last_transition.unwrap();
        assert_eq!(transition.from, ConnectionState::Connecting);
        assert_eq!(transition.to, ConnectionState::Connected);
        assert_eq!(transition.reason, "broker reachable");
        assert!(machine.health().is_connected());
    }

    #[test]
    fn test_cannot_skip_connecting() {
        let machine = ConnectionStateMachine::new("test");
        let err = machine.mark_connected().unwrap_err();
        assert!(matches!(
            err,
            MessagingError::InvalidTransition {
                from: ConnectionState::Disconnected,
                to: ConnectionState::Connected
            }
        ));
    }

    #[test]
    fn test_connected_reentry_rejected() {
        let machine = ConnectionStateMachine::new("test");
        machine.begin_connect().unwrap();
        machine.mark_connected().unwrap();
        assert!(machine.begin_connect().is_err());
        assert!(machine.mark_connected().is_err());
        assert_eq!(machine.state(), ConnectionState::Connected);
    }

    #[test]
    fn test_first_failure_lands_in_disconnected() {
        let machine = ConnectionStateMachine::new("test");
        machine.begin_connect().unwrap();
        machine.mark_connect_failed("broker down").unwrap();
        assert_eq!(machine.state(), ConnectionState::Disconnected);
        assert_eq!(
            machine.health().snapshot().last_error.as_deref(),
            Some("broker down")
        );
    }

    #[test]
    fn test_failure_after_connect_routes_through_reconnecting() {
        let machine = ConnectionStateMachine::new("test");
        machine.begin_connect().unwrap();
        machine.mark_connected().unwrap();

        machine.mark_connection_lost("socket closed").unwrap();
        assert_eq!(machine.state(), ConnectionState::Reconnecting);

        machine.begin_connect().unwrap();
        machine.mark_connect_failed("still down").unwrap();
        assert_eq!(machine.state(), ConnectionState::Reconnecting);

        machine.begin_connect().unwrap();
        machine.mark_connected().unwrap();

        let snapshot = machine.health().snapshot();
        assert_eq!(snapshot.state, ConnectionState::Connected);
        assert_eq!(snapshot.connect_attempts, 3);
        assert!(snapshot.last_error.is_none());
        assert!(snapshot.connected_since.is_some());
    }

    #[test]
    fn test_connection_lost_requires_connected() {
        let machine = ConnectionStateMachine::new("test");
        assert!(machine.mark_connection_lost("nothing to lose").is_err());
    }

    #[test]
    fn test_shutdown_from_any_state() {
        let machine = ConnectionStateMachine::new("test");
        assert!(!machine.mark_disconnected());

        machine.begin_connect().unwrap();
        machine.mark_connected().unwrap();
        assert!(machine.mark_disconnected());
        let transition = machine.health().snapshot().last_transition.unwrap();
        assert_eq!(transition.from, ConnectionState::Connected);
        assert_eq!(transition.reason, "shutdown");
        assert_eq!(machine.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_health_labels() {
        let machine = ConnectionStateMachine::new("test");
        let health = machine.health();
        assert_eq!(health.broker_label(), "reconnecting");

        machine.begin_connect().unwrap();
        machine.mark_connected().unwrap();
        assert_eq!(health.broker_label(), "connected");
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ConnectionState::Reconnecting.to_string(), "reconnecting");
        assert_eq!(
            serde_json::to_string(&ConnectionState::Connected).unwrap(),
            "\"connected\""
        );
    }
}
