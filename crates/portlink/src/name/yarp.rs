// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! [`NameSpace`] backed by a central portlink name server.

use std::sync::Arc;

use super::client::{NameClient, NameClientCache};
use super::config::{DetectConfig, NameConfig, NameMode};
use super::{detect, ContactStyle, NameError, NameServerDetection, NameSpace};
use crate::bottle::{Bottle, Value};
use crate::carrier::CarrierRegistry;
use crate::contact::Contact;

pub struct YarpNameSpace {
    config: NameConfig,
    registry: Arc<CarrierRegistry>,
    cache: NameClientCache,
    detect: DetectConfig,
}

impl YarpNameSpace {
    pub fn new(config: NameConfig, registry: Arc<CarrierRegistry>, cache: NameClientCache) -> Self {
        Self {
            config,
            registry,
            cache,
            detect: DetectConfig::default(),
        }
    }

    pub fn with_detect(mut self, detect: DetectConfig) -> Self {
        self.detect = detect;
        self
    }

    /// The shared client, created on first use.
    pub fn client(&self) -> Arc<NameClient> {
        self.cache
            .get(|| NameClient::new(self.config.clone(), Arc::clone(&self.registry)))
    }

    fn subscription(
        &self,
        subscribe: bool,
        src: &Contact,
        dest: &Contact,
        style: &ContactStyle,
    ) -> Result<(), NameError> {
        let client = self.client();
        let result = if subscribe {
            client.subscribe(src.name(), dest.name(), &style.carrier)
        } else {
            client.unsubscribe(src.name(), dest.name())
        };
        if let Err(e) = &result {
            if !style.quiet {
                log::error!(
                    "[yarp-ns] {} {} -> {} failed: {}",
                    if subscribe { "subscribe" } else { "unsubscribe" },
                    src.name(),
                    dest.name(),
                    e
                );
            }
        }
        result
    }
}

impl std::fmt::Debug for YarpNameSpace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YarpNameSpace")
            .field("namespace", &self.config.namespace)
            .finish()
    }
}

impl NameSpace for YarpNameSpace {
    fn name_server_contact(&self) -> Contact {
        let address = self.client().address();
        if address.is_valid() {
            address.with_name(&self.config.namespace)
        } else {
            address
        }
    }

    fn query_name(&self, name: &str) -> Contact {
        self.client().query_name(name)
    }

    fn register_name(&self, name: &str) -> Contact {
        self.client().register_name(name)
    }

    fn register_contact(&self, contact: &Contact) -> Contact {
        self.client().register_contact(contact)
    }

    fn unregister_name(&self, name: &str) -> Contact {
        self.client().unregister_name(name)
    }

    fn unregister_contact(&self, contact: &Contact) -> Contact {
        self.client().unregister_name(contact.name())
    }

    fn set_property(&self, name: &str, key: &str, value: &Value) -> Result<(), NameError> {
        self.client().set_property(name, key, value)
    }

    fn get_property(&self, name: &str, key: &str) -> Option<Value> {
        self.client().get_property(name, key)
    }

    fn connect_port_to_topic(
        &self,
        src: &Contact,
        dest: &Contact,
        style: &ContactStyle,
    ) -> Result<(), NameError> {
        self.subscription(true, src, dest, style)
    }

    fn connect_topic_to_port(
        &self,
        src: &Contact,
        dest: &Contact,
        style: &ContactStyle,
    ) -> Result<(), NameError> {
        self.subscription(true, src, dest, style)
    }

    fn disconnect_port_from_topic(
        &self,
        src: &Contact,
        dest: &Contact,
        style: &ContactStyle,
    ) -> Result<(), NameError> {
        self.subscription(false, src, dest, style)
    }

    fn disconnect_topic_from_port(
        &self,
        src: &Contact,
        dest: &Contact,
        style: &ContactStyle,
    ) -> Result<(), NameError> {
        self.subscription(false, src, dest, style)
    }

    fn connect_port_to_port_persistently(
        &self,
        src: &Contact,
        dest: &Contact,
        style: &ContactStyle,
    ) -> Result<(), NameError> {
        self.subscription(true, src, dest, style)
    }

    fn disconnect_port_from_port_persistently(
        &self,
        src: &Contact,
        dest: &Contact,
        style: &ContactStyle,
    ) -> Result<(), NameError> {
        self.subscription(false, src, dest, style)
    }

    fn local_only(&self) -> bool {
        false
    }

    fn uses_central_server(&self) -> bool {
        true
    }

    fn server_allocates_port_numbers(&self) -> bool {
        true
    }

    fn connection_has_name_of_endpoints(&self) -> bool {
        true
    }

    fn detect_name_server(&self, use_detected: bool) -> NameServerDetection {
        let client = self.client();
        let mut detection = NameServerDetection {
            contact: self.config.address(),
            ..Default::default()
        };
        if detection.contact.is_valid() {
            client.set_address(detection.contact.clone());
            if client.query_name(&self.config.namespace).is_valid() {
                return detection;
            }
            log::info!("[yarp-ns] configured name server {} does not answer", detection.contact);
        }

        detection.scan_needed = true;
        log::info!("[yarp-ns] looking for a name server on {}:{}", self.detect.group, self.detect.port);
        let found = match detect::scan(&self.detect, &self.config.namespace) {
            Ok(found) => found,
            Err(e) => {
                log::warn!("[yarp-ns] name server scan failed: {}", e);
                None
            }
        };
        let Some(found) = found else {
            detection.contact = Contact::invalid();
            return detection;
        };

        client.set_address(found.clone());
        if use_detected {
            match self.config.write_saved(&found, NameMode::Yarp) {
                Ok(()) => detection.server_used = true,
                Err(e) => log::warn!("[yarp-ns] could not save name server address: {}", e),
            }
        }
        detection.contact = found;
        detection
    }

    fn write_to_name_server(
        &self,
        cmd: &Bottle,
        style: &ContactStyle,
    ) -> Result<Bottle, NameError> {
        self.client().send_bottle_with(cmd, style)
    }
}
