// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Network context: carrier registry plus name service.
//!
//! Everything a port needs from "the network" goes through a [`Network`]
//! passed in explicitly. Cloning is cheap and clones share state.

use std::sync::Arc;

use crate::bottle::Bottle;
use crate::carrier::CarrierRegistry;
use crate::config::ProtocolConfig;
use crate::contact::Contact;
use crate::error::ConfigError;
use crate::name::config::advertised_host;
use crate::name::{
    rpc, ContactStyle, NameClient, NameClientCache, NameConfig, NameError, NameMode, NameSpace,
    RosNameSpace, YarpNameSpace,
};

/// Settings for [`Network::init`].
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    pub name: NameConfig,
    pub protocol: ProtocolConfig,

    /// Resolve names from a private in-memory store.
    pub fake: bool,

    /// Host advertised for ports opened on this network; detected when
    /// `None`.
    pub host: Option<String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            name: NameConfig::default(),
            protocol: ProtocolConfig::default(),
            fake: false,
            host: None,
        }
    }
}

impl NetworkConfig {
    /// Same as `default()`: name settings come from the environment.
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Single-process network on loopback with fake name resolution.
    pub fn local() -> Self {
        Self {
            fake: true,
            host: Some("127.0.0.1".to_string()),
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: NameConfig) -> Self {
        self.name = name;
        self
    }

    pub fn with_protocol(mut self, protocol: ProtocolConfig) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn with_host(mut self, host: &str) -> Self {
        self.host = Some(host.to_string());
        self
    }

    pub fn validate(&self) -> Result<(), &'static str> {
        self.name.validate()?;
        self.protocol.validate()
    }
}

/// Explicit network context.
#[derive(Clone)]
pub struct Network {
    config: Arc<NetworkConfig>,
    registry: Arc<CarrierRegistry>,
    clients: NameClientCache,
    name_space: Arc<dyn NameSpace>,
}

impl Network {
    /// Build the registry and the name space selected by the saved mode.
    pub fn init(config: NetworkConfig) -> Result<Self, NameError> {
        Self::with_registry(config, CarrierRegistry::with_defaults())
    }

    /// Like [`Network::init`] with a caller-built registry (extra carriers).
    pub fn with_registry(
        config: NetworkConfig,
        registry: CarrierRegistry,
    ) -> Result<Self, NameError> {
        config
            .validate()
            .map_err(|e| NameError::Config(ConfigError::Invalid(e)))?;
        let registry = Arc::new(registry);
        let clients = NameClientCache::new();

        let mode = if config.fake {
            NameMode::Yarp
        } else {
            config.name.saved_mode()
        };
        let name_space: Arc<dyn NameSpace> = match mode {
            NameMode::Yarp => Arc::new(YarpNameSpace::new(
                config.name.clone(),
                Arc::clone(&registry),
                clients.clone(),
            )),
            NameMode::Ros => {
                let mut master = config.name.address();
                if !master.is_valid() {
                    if let Ok(uri) = std::env::var("ROS_MASTER_URI") {
                        master = Contact::from_string(&uri).with_carrier("xmlrpc");
                    }
                }
                Arc::new(RosNameSpace::new(
                    master.with_name(&config.name.namespace),
                    config.name.clone(),
                    Arc::clone(&registry),
                ))
            }
        };

        let network = Self {
            config: Arc::new(config),
            registry,
            clients,
            name_space,
        };
        if network.config.fake {
            network.name_client().set_fake_mode(true);
        }
        log::debug!(
            "[network] init namespace={} mode={} fake={}",
            network.config.name.namespace,
            mode.as_str(),
            network.config.fake
        );
        Ok(network)
    }

    /// Drop cached name-service state.
    pub fn shutdown(&self) {
        self.remove_name_client();
        log::debug!("[network] shutdown");
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<CarrierRegistry> {
        &self.registry
    }

    pub fn protocol_config(&self) -> &ProtocolConfig {
        &self.config.protocol
    }

    pub fn name_space(&self) -> &Arc<dyn NameSpace> {
        &self.name_space
    }

    /// Host to advertise for ports opened here.
    pub fn host(&self) -> String {
        self.config.host.clone().unwrap_or_else(advertised_host)
    }

    /// The cached name-server client, built on first use.
    pub fn name_client(&self) -> Arc<NameClient> {
        self.clients.get(|| {
            NameClient::new(self.config.name.clone(), Arc::clone(&self.registry))
        })
    }

    /// Forget the cached client; the next use builds a fresh one.
    pub fn remove_name_client(&self) {
        self.clients.remove();
    }

    /// Resolve `name`. A `carrier://host:port` string resolves to itself
    /// and the namespace name to the name server.
    pub fn query_name(&self, name: &str) -> Contact {
        let direct = Contact::from_string(name);
        if direct.is_valid() {
            return direct;
        }
        if name == self.config.name.namespace {
            return self.name_space.name_server_contact();
        }
        self.name_space.query_name(name)
    }

    pub fn register_name(&self, name: &str) -> Contact {
        self.name_space.register_name(name)
    }

    pub fn register_contact(&self, contact: &Contact) -> Contact {
        self.name_space.register_contact(contact)
    }

    pub fn unregister_name(&self, name: &str) -> Contact {
        self.name_space.unregister_name(name)
    }

    /// Send `cmd` to `contact` and return its reply.
    pub fn write(
        &self,
        contact: &Contact,
        cmd: &Bottle,
        style: &ContactStyle,
    ) -> Result<Bottle, NameError> {
        rpc::write_to_contact(&self.registry, contact, cmd, style)
    }
}

impl std::fmt::Debug for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Network")
            .field("namespace", &self.config.name.namespace)
            .field("fake", &self.config.fake)
            .field("carriers", &self.registry.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_network_resolves_from_fake_store() {
        let network = Network::init(NetworkConfig::local()).unwrap();
        assert!(network.name_client().is_fake_mode());
        assert!(!network.query_name("/nope").is_valid());

        let c = network.register_contact(&Contact::new("/here", "tcp", "127.0.0.1", 4567));
        assert_eq!(network.query_name("/here"), c);
        network.unregister_name("/here");
        assert!(!network.query_name("/here").is_valid());
    }

    #[test]
    fn test_direct_address_resolves_to_itself() {
        let network = Network::init(NetworkConfig::local()).unwrap();
        let c = network.query_name("tcp://10.0.0.9:7000");
        assert_eq!(c.host(), "10.0.0.9");
        assert_eq!(c.port(), Some(7000));
    }

    #[test]
    fn test_clones_share_the_name_client() {
        let network = Network::init(NetworkConfig::local()).unwrap();
        let other = network.clone();
        assert!(Arc::ptr_eq(&network.name_client(), &other.name_client()));
        network.register_name("/shared");
        assert!(other.query_name("/shared").is_valid());
    }

    #[test]
    fn test_invalid_namespace_is_rejected() {
        let config = NetworkConfig::local().with_name(NameConfig::default().with_namespace("bad"));
        assert!(matches!(Network::init(config), Err(NameError::Config(_))));
    }
}
