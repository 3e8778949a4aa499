// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Subscription engine.
//!
//! Builds one monitored item per readable catalog tag and turns the raw
//! notification feed of a session into decoded [`TagValue`]s. A handle lives
//! exactly as long as the session that created it.

use std::collections::HashMap;
use std::sync::Arc;

use presswatch_opcua::{
    DataChangeNotification, DeadbandSettings, MonitoredItemRequest, MonitoredItemSettings,
    SubscriptionSettings,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::catalog::{TagCatalog, TagDataType, TagDefinition};
use crate::config::SubscriptionConfig;
use crate::connection::{ConnectionHandle, SessionId, SubscriptionRequest};
use crate::error::SubscriptionError;
use crate::value::TagValue;

// =============================================================================
// SubscriptionEngine
// =============================================================================

/// Creates per-session subscriptions for a catalog.
#[derive(Debug, Clone)]
pub struct SubscriptionEngine {
    settings: SubscriptionSettings,
    item_settings: MonitoredItemSettings,
    numeric_deadband: f64,
}

impl SubscriptionEngine {
    /// Creates an engine from the subscription section of the config.
    pub fn new(config: &SubscriptionConfig) -> Self {
        Self {
            settings: config.subscription_settings(),
            item_settings: config.item_settings(),
            numeric_deadband: config.numeric_deadband,
        }
    }

    /// Deadband for a tag: none for booleans, strings and alarm points.
    pub fn deadband_for(&self, definition: &TagDefinition) -> DeadbandSettings {
        let numeric = matches!(definition.data_type, TagDataType::Integer | TagDataType::Float);
        if numeric && !definition.is_alarm() && self.numeric_deadband > 0.0 {
            DeadbandSettings::absolute(self.numeric_deadband)
        } else {
            DeadbandSettings::None
        }
    }

    /// Builds the monitored item requests for every readable tag.
    ///
    /// Client handles are the 1-based position in the catalog.
    pub fn requests(&self, catalog: &TagCatalog) -> Vec<MonitoredItemRequest> {
        catalog
            .readable()
            .enumerate()
            .map(|(index, definition)| MonitoredItemRequest {
                node_id: definition.node_id.clone(),
                client_handle: index as u32 + 1,
                settings: self
                    .item_settings
                    .clone()
                    .with_deadband(self.deadband_for(definition)),
            })
            .collect()
    }

    /// Subscribes every readable tag in the current session.
    ///
    /// Rejected items are logged and skipped. Fails when there is no session
    /// or when the server rejects every item.
    pub async fn subscribe(
        &self,
        catalog: Arc<TagCatalog>,
        connection: &ConnectionHandle,
    ) -> Result<SubscriptionHandle, SubscriptionError> {
        let items = self.requests(&catalog);
        let request = SubscriptionRequest {
            settings: self.settings.clone(),
            items,
        };
        let stream = connection.create_subscription(request).await?;

        let mut handles = HashMap::with_capacity(stream.results.len());
        let mut rejected = Vec::new();
        for result in &stream.results {
            let index = result.client_handle as usize;
            let Some(definition) = index.checked_sub(1).and_then(|i| catalog.at(i)) else {
                continue;
            };
            if result.is_good() {
                handles.insert(result.client_handle, index - 1);
            } else {
                warn!(
                    tag = %definition.name,
                    node = %definition.node_id,
                    status = format_args!("0x{:08X}", result.status_code),
                    "Monitored item rejected"
                );
                rejected.push(definition.name.clone());
            }
        }

        info!(
            session = %stream.session,
            monitored = handles.len(),
            rejected = rejected.len(),
            "Catalog subscribed"
        );

        Ok(SubscriptionHandle {
            catalog,
            session: stream.session,
            handles,
            rejected,
            notifications: stream.notifications,
        })
    }
}

impl Default for SubscriptionEngine {
    fn default() -> Self {
        Self::new(&SubscriptionConfig::default())
    }
}

// =============================================================================
// SubscriptionHandle
// =============================================================================

/// Decoded notification feed of one session.
///
/// [`next`](Self::next) returns `None` once the session has ended; the handle
/// cannot be restarted.
#[derive(Debug)]
pub struct SubscriptionHandle {
    catalog: Arc<TagCatalog>,
    session: SessionId,
    handles: HashMap<u32, usize>,
    rejected: Vec<String>,
    notifications: mpsc::UnboundedReceiver<DataChangeNotification>,
}

impl SubscriptionHandle {
    /// Waits for the next value.
    pub async fn next(&mut self) -> Option<TagValue> {
        loop {
            let notification = self.notifications.recv().await?;
            if let Some(value) = self.decode(&notification) {
                return Some(value);
            }
        }
    }

    fn decode(&self, notification: &DataChangeNotification) -> Option<TagValue> {
        let index = self.handles.get(&notification.client_handle)?;
        match self.catalog.at(*index) {
            Some(definition) => Some(TagValue::decode(definition, &notification.value)),
            None => {
                debug!(
                    client_handle = notification.client_handle,
                    "Notification for unknown client handle"
                );
                None
            }
        }
    }

    /// Session this handle belongs to.
    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Number of items the server accepted.
    pub fn monitored(&self) -> usize {
        self.handles.len()
    }

    /// Tags the server refused to monitor.
    pub fn rejected(&self) -> &[String] {
        &self.rejected
    }
}

// =============================================================================
// Tests
// =============================================================================
