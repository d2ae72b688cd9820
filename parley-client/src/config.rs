use parley_core::IceServerConfig;

pub const DEFAULT_STUN_SERVER: &str = "stun:stun.l.google.com:19302";
pub const DEFAULT_DATA_CHANNEL: &str = "data";

const ICE_SERVERS_VAR: &str = "PARLEY_ICE_SERVERS";
const DATA_CHANNELS_VAR: &str = "PARLEY_DATA_CHANNELS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// STUN/TURN servers handed to the RTC engine for every new connection.
    pub ice_servers: Vec<IceServerConfig>,
    /// Data channels the initiating side opens; opening them triggers negotiation.
    pub data_channels: Vec<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            ice_servers: vec![IceServerConfig {
                urls: vec![DEFAULT_STUN_SERVER.to_owned()],
                username: None,
                credential: None,
            }],
            data_channels: vec![DEFAULT_DATA_CHANNEL.to_owned()],
        }
    }
}

impl ClientConfig {
    /// Reads `PARLEY_ICE_SERVERS` and `PARLEY_DATA_CHANNELS`, comma separated.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(urls) = lookup(ICE_SERVERS_VAR).map(|v| split_list(&v)) {
            if !urls.is_empty() {
                config.ice_servers = vec![IceServerConfig {
                    urls,
                    username: None,
                    credential: None,
                }];
            }
        }

        if let Some(labels) = lookup(DATA_CHANNELS_VAR).map(|v| split_list(&v)) {
            config.data_channels = labels;
        }

        config
    }

    pub fn with_ice_servers(mut self, ice_servers: Vec<IceServerConfig>) -> Self {
        self.ice_servers = ice_servers;
        self
    }

    pub fn with_data_channels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.data_channels = labels.into_iter().map(Into::into).collect();
        self
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}
