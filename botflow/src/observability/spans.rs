//! Tracing setup and turn spans.
//!
//! The core only emits `tracing` events; hosts decide where they go. The
//! helpers here cover the common case of a `fmt` subscriber driven by
//! [`LoggingConfig`].

use crate::config::LoggingConfig;
use crate::context::Activity;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{info_span, Span};
use tracing_subscriber::EnvFilter;

/// Correlation attributes attached to every turn span.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnSpanAttributes {
    /// Channel id.
    pub channel_id: Option<String>,
    /// Conversation id.
    pub conversation_id: Option<String>,
    /// Activity id.
    pub activity_id: Option<String>,
    /// Activity type.
    pub activity_type: Option<String>,
}

impl TurnSpanAttributes {
    /// Extracts the attributes from an activity.
    #[must_use]
    pub fn from_activity(activity: &Activity) -> Self {
        Self {
            channel_id: activity.channel_id().map(String::from),
            conversation_id: activity.conversation_id().map(String::from),
            activity_id: activity.id.clone(),
            activity_type: Some(activity.kind.clone()).filter(|k| !k.is_empty()),
        }
    }

    /// Converts to OpenTelemetry-style attributes.
    #[must_use]
    pub fn to_otel_attributes(&self) -> HashMap<String, String> {
        let mut attrs = HashMap::new();

        if let Some(ref v) = self.channel_id {
            attrs.insert("turn.channel_id".to_string(), v.clone());
        }
        if let Some(ref v) = self.conversation_id {
            attrs.insert("turn.conversation_id".to_string(), v.clone());
        }
        if let Some(ref v) = self.activity_id {
            attrs.insert("turn.activity_id".to_string(), v.clone());
        }
        if let Some(ref v) = self.activity_type {
            attrs.insert("turn.activity_type".to_string(), v.clone());
        }

        attrs
    }
}

/// Creates the span a turn runs inside.
#[must_use]
pub fn turn_span(activity: &Activity) -> Span {
    let attrs = TurnSpanAttributes::from_activity(activity);
    info_span!(
        "turn",
        channel_id = attrs.channel_id.as_deref().unwrap_or(""),
        conversation_id = attrs.conversation_id.as_deref().unwrap_or(""),
        activity_id = attrs.activity_id.as_deref().unwrap_or(""),
        activity_type = attrs.activity_type.as_deref().unwrap_or(""),
    )
}

/// Installs a global `fmt` subscriber.
///
/// `RUST_LOG` takes precedence over `config.filter`. Returns false if a global
/// subscriber was already installed.
pub fn init_tracing(config: &LoggingConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    if config.json {
        builder.json().try_init().is_ok()
    } else {
        builder.try_init().is_ok()
    }
}
