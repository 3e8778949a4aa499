// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Real OPC UA transport implementation using the `opcua` crate.
//!
//! The `opcua` 0.12 client API is synchronous. Every session call runs on the
//! blocking pool, and the session's publish loop is driven by
//! `Session::run_async`, whose notifications are forwarded into the
//! [`TransportEventSender`] supplied at connect time.
//!
//! # Example
//!
//! ```rust,ignore
//! use presswatch_opcua::client::{transport_channel, OpcUaTransport, RealOpcUaTransport};
//! use presswatch_opcua::types::OpcUaConfig;
//!
//! let config = OpcUaConfig::new("opc.tcp://localhost:4840");
//! config.validate()?;
//!
//! let transport = RealOpcUaTransport::new(config);
//! let (tx, mut rx) = transport_channel();
//! transport.connect(tx).await?;
//! ```

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{oneshot, RwLock};
use tracing::{debug, info, trace, warn};

use opcua::client::prelude::*;
use opcua::sync::RwLock as OpcUaRwLock;

use crate::client::conversion::TypedValue;
use crate::client::transport::{
    DataChangeNotification, MonitoredItemRequest, MonitoredItemResult, OpcUaTransport, OpcUaValue,
    TransportEvent, TransportEventSender, TransportState, WriteResult,
};
use crate::error::{
    ConnectionError, OpcUaError, OpcUaResult, OperationError, SubscriptionError, TimeoutError,
};
use crate::types::{
    DeadbandSettings, NodeId, NodeIdentifier, OpcUaConfig, SecurityMode,
    SubscriptionSettings, UserTokenType,
};

type SharedSession = Arc<OpcUaRwLock<Session>>;

// =============================================================================
// RealOpcUaTransport
// =============================================================================

/// OPC UA transport backed by the `opcua` crate client.
pub struct RealOpcUaTransport {
    /// Configuration for the transport.
    config: OpcUaConfig,

    /// Current connection state.
    state: RwLock<TransportState>,

    /// The live session, if any.
    active: RwLock<Option<ActiveSession>>,
}

struct ActiveSession {
    session: SharedSession,
    events: TransportEventSender,
    stop: oneshot::Sender<SessionCommand>,
}

impl RealOpcUaTransport {
    /// Creates a new transport with the given configuration.
    pub fn new(config: OpcUaConfig) -> Self {
        Self {
            config,
            state: RwLock::new(TransportState::Disconnected),
            active: RwLock::new(None),
        }
    }

    async fn set_state(&self, state: TransportState) {
        *self.state.write().await = state;
    }

    async fn session(&self) -> OpcUaResult<(SharedSession, TransportEventSender)> {
        let guard = self.active.read().await;
        guard
            .as_ref()
            .map(|active| (active.session.clone(), active.events.clone()))
            .ok_or_else(OpcUaError::not_connected)
    }

    /// Runs a synchronous session call on the blocking pool.
    async fn blocking<T, F>(&self, operation: &'static str, f: F) -> OpcUaResult<T>
    where
        T: Send + 'static,
        F: FnOnce(SharedSession, TransportEventSender) -> OpcUaResult<T> + Send + 'static,
    {
        let (session, events) = self.session().await?;
        let call = tokio::task::spawn_blocking(move || f(session, events));
        match tokio::time::timeout(self.config.request_timeout, call).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => Err(OpcUaError::operation(OperationError::write_failed(
                operation,
                format!("blocking task failed: {}", join),
            ))),
            Err(_) => Err(OpcUaError::timeout(TimeoutError::new(
                operation,
                self.config.request_timeout,
            ))),
        }
    }
}

// =============================================================================
// Session setup
// =============================================================================

fn build_client(config: &OpcUaConfig) -> OpcUaResult<Client> {
    let mut builder = ClientBuilder::new()
        .application_name(config.application_name.as_str())
        .application_uri(config.effective_application_uri().as_str())
        .create_sample_keypair(true)
        .session_retry_limit(0)
        .session_timeout(config.session_timeout.as_millis() as u32);

    if let Some(ref pki_dir) = config.pki_dir {
        builder = builder.pki_dir(pki_dir.as_str());
    }

    if config.trust_all_certificates {
        builder = builder.trust_server_certs(true);
    }

    builder.client().ok_or_else(|| {
        OpcUaError::connection(ConnectionError::endpoint_not_found(format!(
            "{}: failed to build OPC UA client",
            config.endpoint
        )))
    })
}

fn message_security_mode(config: &OpcUaConfig) -> MessageSecurityMode {
    match config.security_mode {
        SecurityMode::None => MessageSecurityMode::None,
        SecurityMode::Sign => MessageSecurityMode::Sign,
        SecurityMode::SignAndEncrypt => MessageSecurityMode::SignAndEncrypt,
    }
}

fn identity_token(config: &OpcUaConfig) -> IdentityToken {
    match &config.user_token {
        UserTokenType::Anonymous => IdentityToken::Anonymous,
        UserTokenType::UserName { username, password } => {
            IdentityToken::UserName(username.clone(), password.clone())
        }
        UserTokenType::Certificate {
            certificate_path,
            private_key_path,
        } => IdentityToken::X509(
            std::path::PathBuf::from(certificate_path),
            std::path::PathBuf::from(private_key_path),
        ),
    }
}

fn open_session(config: &OpcUaConfig) -> OpcUaResult<SharedSession> {
    let mut client = build_client(config)?;

    let endpoints = client
        .get_server_endpoints_from_url(config.endpoint.as_str())
        .map_err(|e| {
            OpcUaError::connection(ConnectionError::endpoint_not_found(format!(
                "{}: {}",
                config.endpoint, e
            )))
        })?;

    let policy = config.security_policy.uri();
    let mode = message_security_mode(config);

    let endpoint = endpoints
        .iter()
        .find(|e| e.security_policy_uri.as_ref() == policy && e.security_mode == mode)
        .cloned()
        .ok_or_else(|| {
            OpcUaError::connection(ConnectionError::no_suitable_endpoint(format!(
                "{}/{}",
                config.security_policy, config.security_mode
            )))
        })?;

    debug!(
        security_policy = %endpoint.security_policy_uri,
        security_mode = ?endpoint.security_mode,
        "Found matching endpoint"
    );

    client
        .connect_to_endpoint(endpoint, identity_token(config))
        .map_err(|status| {
            warn!(endpoint = %config.endpoint, status = %status, "Session activation failed");
            OpcUaError::connection(ConnectionError::refused(&config.endpoint))
        })
}

// =============================================================================
// Conversions
// =============================================================================

fn to_opcua_node_id(node_id: &NodeId) -> opcua::types::NodeId {
    match &node_id.identifier {
        NodeIdentifier::Numeric(v) => opcua::types::NodeId::new(node_id.namespace_index, *v),
        NodeIdentifier::String(v) => opcua::types::NodeId::new(node_id.namespace_index, v.clone()),
        NodeIdentifier::Guid(v) => opcua::types::NodeId::new(
            node_id.namespace_index,
            opcua::types::Guid::from(*v),
        ),
        NodeIdentifier::Opaque(v) => opcua::types::NodeId::new(
            node_id.namespace_index,
            opcua::types::ByteString::from(v.as_slice()),
        ),
    }
}

fn from_opcua_variant(variant: &Variant) -> OpcUaValue {
    match variant {
        Variant::Boolean(v) => OpcUaValue::Boolean(*v),
        Variant::SByte(v) => OpcUaValue::SByte(*v),
        Variant::Byte(v) => OpcUaValue::Byte(*v),
        Variant::Int16(v) => OpcUaValue::Int16(*v),
        Variant::UInt16(v) => OpcUaValue::UInt16(*v),
        Variant::Int32(v) => OpcUaValue::Int32(*v),
        Variant::UInt32(v) => OpcUaValue::UInt32(*v),
        Variant::Int64(v) => OpcUaValue::Int64(*v),
        Variant::UInt64(v) => OpcUaValue::UInt64(*v),
        Variant::Float(v) => OpcUaValue::Float(*v),
        Variant::Double(v) => OpcUaValue::Double(*v),
        Variant::String(v) => OpcUaValue::String(v.as_ref().to_string()),
        Variant::DateTime(v) => OpcUaValue::DateTime(v.as_chrono()),
        Variant::ByteString(v) => OpcUaValue::ByteString(v.value.clone().unwrap_or_default()),
        // Arrays and structures never back a catalog tag.
        _ => OpcUaValue::Null,
    }
}

fn to_opcua_variant(value: &OpcUaValue) -> Variant {
    match value {
        OpcUaValue::Null => Variant::Empty,
        OpcUaValue::Boolean(v) => Variant::Boolean(*v),
        OpcUaValue::SByte(v) => Variant::SByte(*v),
        OpcUaValue::Byte(v) => Variant::Byte(*v),
        OpcUaValue::Int16(v) => Variant::Int16(*v),
        OpcUaValue::UInt16(v) => Variant::UInt16(*v),
        OpcUaValue::Int32(v) => Variant::Int32(*v),
        OpcUaValue::UInt32(v) => Variant::UInt32(*v),
        OpcUaValue::Int64(v) => Variant::Int64(*v),
        OpcUaValue::UInt64(v) => Variant::UInt64(*v),
        OpcUaValue::Float(v) => Variant::Float(*v),
        OpcUaValue::Double(v) => Variant::Double(*v),
        OpcUaValue::String(v) => Variant::String(UAString::from(v.as_str())),
        OpcUaValue::DateTime(v) => Variant::DateTime(Box::new(opcua::types::DateTime::from(*v))),
        OpcUaValue::ByteString(v) => Variant::ByteString(ByteString::from(v.as_slice())),
    }
}

fn to_typed_value(data_value: &DataValue) -> TypedValue {
    let value = data_value
        .value
        .as_ref()
        .map(from_opcua_variant)
        .unwrap_or_default();
    let status_code = data_value.status.map(|s| s.bits()).unwrap_or(0);

    TypedValue {
        value,
        status_code,
        source_timestamp: data_value.source_timestamp.map(|t| t.as_chrono()),
        server_timestamp: data_value.server_timestamp.map(|t| t.as_chrono()),
    }
}

fn monitoring_filter(deadband: DeadbandSettings) -> ExtensionObject {
    match deadband {
        DeadbandSettings::None => ExtensionObject::null(),
        DeadbandSettings::Absolute { value } => {
            let filter = DataChangeFilter {
                trigger: DataChangeTrigger::StatusValue,
                deadband_type: DeadbandType::Absolute as u32,
                deadband_value: value,
            };
            ExtensionObject::from_encodable(ObjectId::DataChangeFilter_Encoding_DefaultBinary, &filter)
        }
    }
}

// =============================================================================
// OpcUaTransport
// =============================================================================

#[async_trait]
impl OpcUaTransport for RealOpcUaTransport {
    async fn connect(&self, events: TransportEventSender) -> OpcUaResult<()> {
        self.set_state(TransportState::Connecting).await;
        info!(
            endpoint = %self.config.endpoint,
            secure = self.config.uses_security(),
            "Connecting to OPC UA server"
        );

        let config = self.config.clone();
        let attempt = tokio::task::spawn_blocking(move || open_session(&config));
        let session = match tokio::time::timeout(self.config.connect_timeout, attempt).await {
            Ok(Ok(Ok(session))) => session,
            Ok(Ok(Err(e))) => {
                self.set_state(TransportState::Failed).await;
                return Err(e);
            }
            Ok(Err(join)) => {
                self.set_state(TransportState::Failed).await;
                return Err(OpcUaError::connection(ConnectionError::closed(Some(
                    join.to_string(),
                ))));
            }
            Err(_) => {
                self.set_state(TransportState::Failed).await;
                return Err(OpcUaError::connection(ConnectionError::timed_out(
                    &self.config.endpoint,
                    self.config.connect_timeout,
                )));
            }
        };

        {
            let lost = events.clone();
            let mut session_locked = session.write();
            session_locked.set_connection_status_callback(ConnectionStatusCallback::new(
                move |connected| {
                    if !connected {
                        let _ = lost.send(TransportEvent::ConnectionLost {
                            reason: "session connection lost".to_string(),
                        });
                    }
                },
            ));
        }

        let stop = Session::run_async(session.clone());

        *self.active.write().await = Some(ActiveSession {
            session,
            events,
            stop,
        });
        self.set_state(TransportState::Connected).await;

        info!(endpoint = %self.config.endpoint, "Connected to OPC UA server");
        Ok(())
    }

    async fn disconnect(&self) -> OpcUaResult<()> {
        let active = self.active.write().await.take();

        if let Some(active) = active {
            info!(endpoint = %self.config.endpoint, "Disconnecting from OPC UA server");
            let _ = active.stop.send(SessionCommand::Stop);
            let session = active.session;
            let closed = tokio::task::spawn_blocking(move || session.read().disconnect()).await;
            if let Err(e) = closed {
                warn!(error = %e, "Session disconnect task failed");
            }
        }

        self.set_state(TransportState::Disconnected).await;
        Ok(())
    }

    fn state(&self) -> TransportState {
        self.state
            .try_read()
            .map(|state| *state)
            .unwrap_or(TransportState::Connecting)
    }

    async fn write_value(&self, node_id: &NodeId, value: OpcUaValue) -> OpcUaResult<WriteResult> {
        trace!(node_id = %node_id, value = %value, "Writing node value");

        let target = node_id.clone();
        self.blocking("write", move |session, _| {
            let write_value = WriteValue {
                node_id: to_opcua_node_id(&target),
                attribute_id: AttributeId::Value as u32,
                index_range: UAString::null(),
                value: DataValue::new_now(to_opcua_variant(&value)),
            };

            let results = session.read().write(&[write_value]).map_err(|status| {
                OpcUaError::operation(OperationError::write_failed(
                    target.to_string(),
                    format!("Write service failed: {}", status),
                ))
            })?;

            match results.first() {
                Some(status) if status.is_good() => Ok(WriteResult::success(target)),
                Some(status) => Ok(WriteResult::failure(target, status.bits())),
                None => Ok(WriteResult::failure(target, 0x8000_0000)),
            }
        })
        .await
    }

    async fn create_subscription(&self, settings: &SubscriptionSettings) -> OpcUaResult<u32> {
        let settings = settings.clone();

        let id = self
            .blocking("create_subscription", move |session, events| {
                // The callback needs the id the server is about to assign.
                let assigned = Arc::new(AtomicU32::new(0));
                let callback_id = assigned.clone();
                let callback = DataChangeCallback::new(move |items| {
                    let subscription_id = callback_id.load(Ordering::Acquire);
                    for item in items {
                        let _ = events.send(TransportEvent::DataChange(DataChangeNotification {
                            subscription_id,
                            client_handle: item.client_handle(),
                            value: to_typed_value(item.last_value()),
                        }));
                    }
                });

                let id = session
                    .read()
                    .create_subscription(
                        settings.publishing_interval.as_millis() as f64,
                        settings.lifetime_count,
                        settings.keepalive_count,
                        settings.max_notifications_per_publish,
                        settings.priority,
                        true,
                        callback,
                    )
                    .map_err(|status| {
                        OpcUaError::subscription(SubscriptionError::creation_failed(format!(
                            "CreateSubscription failed: {}",
                            status
                        )))
                    })?;
                assigned.store(id, Ordering::Release);
                Ok(id)
            })
            .await?;

        debug!(subscription_id = id, "Created subscription");
        Ok(id)
    }

    async fn delete_subscription(&self, subscription_id: u32) -> OpcUaResult<()> {
        self.blocking("delete_subscription", move |session, _| {
            session
                .read()
                .delete_subscription(subscription_id)
                .map(|_| ())
                .map_err(|status| {
                    OpcUaError::subscription(SubscriptionError::creation_failed(format!(
                        "DeleteSubscription failed: {}",
                        status
                    )))
                })
        })
        .await
    }

    async fn create_monitored_items(
        &self,
        subscription_id: u32,
        items: &[MonitoredItemRequest],
    ) -> OpcUaResult<Vec<MonitoredItemResult>> {
        let requests: Vec<MonitoredItemCreateRequest> = items
            .iter()
            .map(|item| MonitoredItemCreateRequest {
                item_to_monitor: ReadValueId {
                    node_id: to_opcua_node_id(&item.node_id),
                    attribute_id: AttributeId::Value as u32,
                    index_range: UAString::null(),
                    data_encoding: QualifiedName::null(),
                },
                monitoring_mode: MonitoringMode::Reporting,
                requested_parameters: MonitoringParameters {
                    client_handle: item.client_handle,
                    sampling_interval: item.settings.sampling_interval.as_millis() as f64,
                    filter: monitoring_filter(item.settings.deadband),
                    queue_size: item.settings.queue_size,
                    discard_oldest: item.settings.discard_oldest,
                },
            })
            .collect();
        let handles: Vec<u32> = items.iter().map(|item| item.client_handle).collect();

        trace!(subscription_id, count = requests.len(), "Creating monitored items");

        self.blocking("create_monitored_items", move |session, _| {
            let results = session
                .read()
                .create_monitored_items(subscription_id, TimestampsToReturn::Both, &requests)
                .map_err(|status| {
                    OpcUaError::subscription(SubscriptionError::monitored_item_failed(
                        "batch",
                        format!("CreateMonitoredItems failed: {}", status),
                    ))
                })?;

            Ok(handles
                .into_iter()
                .zip(results)
                .map(|(client_handle, result)| MonitoredItemResult {
                    client_handle,
                    monitored_item_id: result.monitored_item_id,
                    status_code: result.status_code.bits(),
                })
                .collect())
        })
        .await
    }

    fn display_name(&self) -> String {
        format!("RealOpcUaTransport({})", self.config.endpoint)
    }

    fn endpoint(&self) -> &str {
        &self.config.endpoint
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_conversion() {
        let node = to_opcua_node_id(&NodeId::numeric(2, 1001));
        assert_eq!(node, opcua::types::NodeId::new(2, 1001u32));

        let node = to_opcua_node_id(&NodeId::string(2, "Floor5.Bath1.Alarm"));
        assert_eq!(node, opcua::types::NodeId::new(2, "Floor5.Bath1.Alarm"));
    }

    #[test]
    fn test_value_conversion() {
        for value in [
            OpcUaValue::Boolean(true),
            OpcUaValue::Int32(-4),
            OpcUaValue::Double(3.5),
            OpcUaValue::String("ok".to_string()),
        ] {
            assert_eq!(from_opcua_variant(&to_opcua_variant(&value)), value);
        }
    }

    #[test]
    fn test_bad_status_is_kept() {
        let data_value = DataValue {
            value: Some(Variant::Boolean(true)),
            status: Some(StatusCode::BadCommunicationError),
            ..DataValue::null()
        };
        let typed = to_typed_value(&data_value);
        assert!(typed.quality().is_bad());
    }

    #[test]
    fn test_transport_creation() {
        let config = OpcUaConfig::new("opc.tcp://localhost:4840");

        let transport = RealOpcUaTransport::new(config);
        assert_eq!(transport.state(), TransportState::Disconnected);
        assert!(!transport.is_connected());
    }
}
