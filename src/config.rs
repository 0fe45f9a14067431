use std::sync::Arc;
use std::time::Duration;

use rustls::ServerConfig as RustlsConfig;

use crate::aggregator::AggregatorLimits;

/// Tunable parameters for the permessage-deflate extension, supplied by the
/// connection owner before a handshake negotiates whether it actually runs.
#[derive(Debug, Clone)]
pub struct PermessageDeflateConfig {
    pub enabled: bool,
    pub client_no_context_takeover: bool,
    pub server_no_context_takeover: bool,
    pub client_max_window_bits: u8,
    pub server_max_window_bits: u8,
    pub compression_level: u32,
}

impl Default for PermessageDeflateConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            client_no_context_takeover: false,
            server_no_context_takeover: false,
            client_max_window_bits: 15,
            server_max_window_bits: 15,
            compression_level: 6,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    pub max_frame_size: usize,
    pub max_message_size: Option<usize>,
    pub aggregator_limits: AggregatorLimitsConfig,
    pub ping_interval: Option<Duration>,
    pub ping_timeout: Duration,
    pub permessage_deflate: Option<PermessageDeflateConfig>,
}

/// Plain-data mirror of [`AggregatorLimits`], kept separate so this module
/// doesn't need `Aggregator`'s internal state to describe the policy.
#[derive(Debug, Clone, Default)]
pub struct AggregatorLimitsConfig {
    pub min_non_final_fragment_size: usize,
    pub max_accumulated_frame_count: Option<usize>,
    pub max_accumulated_frame_size: Option<usize>,
}

impl From<&AggregatorLimitsConfig> for AggregatorLimits {
    fn from(config: &AggregatorLimitsConfig) -> Self {
        AggregatorLimits {
            min_non_final_fragment_size: config.min_non_final_fragment_size,
            max_accumulated_frame_count: config.max_accumulated_frame_count,
            max_accumulated_frame_size: config.max_accumulated_frame_size,
        }
    }
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        WebSocketConfig {
            max_frame_size: 16384,
            max_message_size: None,
            aggregator_limits: AggregatorLimitsConfig::default(),
            ping_interval: Some(Duration::from_secs(30)),
            ping_timeout: Duration::from_secs(10),
            permessage_deflate: None,
        }
    }
}

/// An upstream HTTP proxy a client connection should tunnel through via
/// `CONNECT` before starting the WebSocket handshake.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub host: String,
    pub port: u16,
    pub authorization: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
    pub web_socket_config: WebSocketConfig,
    pub tls_config: Option<Arc<RustlsConfig>>,
}

#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub web_socket_config: WebSocketConfig,
    pub ca_file: Option<String>,
    pub proxy: Option<ProxyConfig>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_websocket_config_matches_documented_defaults() {
        let config = WebSocketConfig::default();
        assert_eq!(config.max_frame_size, 16384);
        assert_eq!(config.max_message_size, None);
        assert!(config.permessage_deflate.is_none());
    }

    #[test]
    fn default_permessage_deflate_config_is_disabled_with_max_window() {
        let config = PermessageDeflateConfig::default();
        assert!(!config.enabled);
        assert_eq!(config.client_max_window_bits, 15);
        assert_eq!(config.server_max_window_bits, 15);
    }
}
