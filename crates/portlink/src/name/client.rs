// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Client for a central name server.
//!
//! Text commands travel over the `name_ser` carrier, structured ones over
//! `tcp`. In fake mode, or when a query bypass is installed, commands are
//! answered by a [`NameStore`] in this process and nothing touches the
//! network.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::store::{parse_registration, strip_terminator, InMemoryNameStore, NameStore, AUTO};
use super::{rpc, ContactStyle, NameConfig, NameError};
use crate::bottle::{Bottle, Value};
use crate::carrier::CarrierRegistry;
use crate::config::ProtocolConfig;
use crate::contact::Contact;
use crate::protocol::{Protocol, SizedWriter};
use crate::route::Route;
use crate::stream::SocketStream;

/// Sender name used on name-server connections.
pub const CLIENT_NAME: &str = "/portlink/name-client";

/// Host reported to a local store in place of a peer address.
const LOCAL_HOST: &str = "127.0.0.1";

#[derive(Default)]
struct ClientState {
    address: Contact,
    fake: Option<Arc<dyn NameStore>>,
    bypass: Option<Arc<dyn NameStore>>,
}

impl ClientState {
    fn local_store(&self) -> Option<Arc<dyn NameStore>> {
        self.bypass.clone().or_else(|| self.fake.clone())
    }
}

/// Talks to the name server of one namespace.
pub struct NameClient {
    registry: Arc<CarrierRegistry>,
    config: NameConfig,
    timeout: Option<Duration>,
    state: Mutex<ClientState>,
}

impl NameClient {
    pub fn new(config: NameConfig, registry: Arc<CarrierRegistry>) -> Self {
        Self {
            registry,
            config,
            timeout: Some(Duration::from_secs(5)),
            state: Mutex::new(ClientState::default()),
        }
    }

    /// Timeout for each name-server exchange (`None` blocks).
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn config(&self) -> &NameConfig {
        &self.config
    }

    /// Name server contact, looked up from the configuration on first use.
    pub fn address(&self) -> Contact {
        let mut state = self.state.lock();
        if !state.address.is_valid() {
            state.address = self.config.address();
        }
        state.address.clone()
    }

    /// Use `contact` as the name server from now on.
    pub fn set_address(&self, contact: Contact) {
        log::debug!("[name-client] name server set to {}", contact);
        self.state.lock().address = contact;
    }

    /// Answer everything from a private in-memory store.
    pub fn set_fake_mode(&self, fake: bool) {
        let mut state = self.state.lock();
        state.fake = if fake {
            Some(Arc::new(InMemoryNameStore::default()) as Arc<dyn NameStore>)
        } else {
            None
        };
    }

    pub fn is_fake_mode(&self) -> bool {
        self.state.lock().fake.is_some()
    }

    /// Route all commands to `store` instead of the network; `None`
    /// restores normal operation.
    pub fn set_query_bypass(&self, store: Option<Arc<dyn NameStore>>) {
        self.state.lock().bypass = store;
    }

    pub fn query_bypass(&self) -> Option<Arc<dyn NameStore>> {
        self.state.lock().bypass.clone()
    }

    // ========================================================================
    // Raw exchanges
    // ========================================================================

    /// Send one text command; returns the reply without its terminator.
    pub fn send_text(&self, cmd: &str) -> Result<String, NameError> {
        let store = self.state.lock().local_store();
        if let Some(store) = store {
            let reply = store.apply(cmd, LOCAL_HOST);
            return Ok(strip_terminator(&reply).to_string());
        }

        let server = self.address();
        let addr = server
            .socket_address()
            .ok_or_else(|| NameError::Unreachable("no name server address known".into()))?;
        log::trace!("[name-client] {} <- {}", addr, cmd);
        let stream = SocketStream::connect(&addr, self.timeout)
            .map_err(|e| NameError::Unreachable(format!("{}: {}", addr, e)))?;
        let config = ProtocolConfig {
            timeout: self.timeout,
            ..Default::default()
        };
        let mut proto = Protocol::with_config(Box::new(stream), Arc::clone(&self.registry), config);
        let route = Route::new(CLIENT_NAME, &self.config.namespace, "name_ser")
            .with_to_contact(server.clone());
        proto.open_route(route)?;
        let reply = proto.write(&SizedWriter::from_text(cmd).with_reply());
        proto.close();

        match reply? {
            Some(reader) => {
                let text = String::from_utf8_lossy(reader.payload()).into_owned();
                Ok(strip_terminator(&text).to_string())
            }
            None => Err(NameError::BadReply("no reply from name server".into())),
        }
    }

    /// Send one structured command and parse the reply.
    pub fn send_bottle(&self, cmd: &Bottle) -> Result<Bottle, NameError> {
        self.send_bottle_with(cmd, &ContactStyle::default())
    }

    pub fn send_bottle_with(&self, cmd: &Bottle, style: &ContactStyle) -> Result<Bottle, NameError> {
        let store = self.state.lock().local_store();
        if let Some(store) = store {
            return Ok(store.process(cmd, LOCAL_HOST));
        }
        let server = self.address();
        if !server.is_valid() {
            return Err(NameError::Unreachable("no name server address known".into()));
        }
        let mut style = style.clone();
        if style.carrier.is_empty() {
            style.carrier = "tcp".to_string();
        }
        if style.timeout.is_none() {
            style.timeout = self.timeout;
        }
        rpc::write_to_contact(&self.registry, &server, cmd, &style)
    }

    // ========================================================================
    // Registrations
    // ========================================================================

    /// Contact registered under `name`; invalid when unknown or when the
    /// server cannot be reached.
    pub fn query_name(&self, name: &str) -> Contact {
        match self.send_text(&format!("query {}", name)) {
            Ok(reply) => parse_registration(&reply),
            Err(e) => {
                log::debug!("[name-client] query {} failed: {}", name, e);
                Contact::invalid()
            }
        }
    }

    /// Register `name`, letting the server choose everything else.
    /// An empty name asks the server to invent one.
    pub fn register_name(&self, name: &str) -> Contact {
        self.register_contact(&Contact::by_name(name))
    }

    /// Register with whatever parts of `contact` are known; the rest is
    /// filled in by the server.
    pub fn register_contact(&self, contact: &Contact) -> Contact {
        let or_auto = |s: &str| if s.is_empty() { AUTO.to_string() } else { s.to_string() };
        let port = contact
            .port()
            .filter(|p| *p != 0)
            .map(|p| p.to_string())
            .unwrap_or_else(|| AUTO.to_string());
        let cmd = format!(
            "register {} {} {} {}",
            or_auto(contact.name()),
            or_auto(contact.carrier()),
            or_auto(contact.host()),
            port
        );
        match self.send_text(&cmd) {
            Ok(reply) => {
                let registered = parse_registration(&reply);
                if !registered.is_valid() {
                    log::warn!("[name-client] registration of {} refused: {}", contact, reply.trim());
                }
                registered
            }
            Err(e) => {
                log::error!("[name-client] cannot register {}: {}", contact, e);
                Contact::invalid()
            }
        }
    }

    pub fn unregister_name(&self, name: &str) -> Contact {
        if let Err(e) = self.send_text(&format!("unregister {}", name)) {
            log::debug!("[name-client] unregister {} failed: {}", name, e);
        }
        Contact::invalid()
    }

    // ========================================================================
    // Properties and subscriptions
    // ========================================================================

    pub fn set_property(&self, name: &str, key: &str, value: &Value) -> Result<(), NameError> {
        let value = match value {
            Value::List(items) => items.to_text(),
            other => other.to_plain_string(),
        };
        self.send_text(&format!("set {} {} {}", name, key, value))
            .map(|_| ())
    }

    pub fn get_property(&self, name: &str, key: &str) -> Option<Value> {
        let reply = self.send_text(&format!("get {} {}", name, key)).ok()?;
        let (_, value) = reply.lines().next()?.split_once(" = ")?;
        let value = value.trim();
        if value.is_empty() {
            return None;
        }
        let parsed = Bottle::from_text(value).ok()?;
        if parsed.len() == 1 {
            parsed.get(0).cloned()
        } else {
            Some(Value::List(parsed))
        }
    }

    pub fn subscribe(&self, src: &str, dest: &str, carrier: &str) -> Result<(), NameError> {
        let cmd = if carrier.is_empty() {
            format!("subscribe {} {}", src, dest)
        } else {
            format!("subscribe {} {} {}", src, dest, carrier)
        };
        expect_ok(self.send_text(&cmd)?)
    }

    pub fn unsubscribe(&self, src: &str, dest: &str) -> Result<(), NameError> {
        expect_ok(self.send_text(&format!("unsubscribe {} {}", src, dest))?)
    }

    /// Every registration the server knows about.
    pub fn list(&self) -> Result<Vec<Contact>, NameError> {
        let reply = self.send_text("list")?;
        Ok(reply
            .lines()
            .map(parse_registration)
            .filter(Contact::is_valid)
            .collect())
    }
}

fn expect_ok(reply: String) -> Result<(), NameError> {
    if reply.trim() == "ok" {
        Ok(())
    } else {
        Err(NameError::BadReply(reply))
    }
}

impl std::fmt::Debug for NameClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("NameClient")
            .field("namespace", &self.config.namespace)
            .field("address", &state.address)
            .field("fake", &state.fake.is_some())
            .field("bypass", &state.bypass.is_some())
            .finish()
    }
}

// ============================================================================
// NameClientCache
// ============================================================================

/// Lazily created, shared [`NameClient`].
///
/// The first [`get`](NameClientCache::get) builds the client; later calls
/// return the same one until [`remove`](NameClientCache::remove).
#[derive(Clone, Default)]
pub struct NameClientCache {
    inner: Arc<Mutex<Option<Arc<NameClient>>>>,
}

impl NameClientCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, make: impl FnOnce() -> NameClient) -> Arc<NameClient> {
        let mut slot = self.inner.lock();
        match slot.as_ref() {
            Some(client) => Arc::clone(client),
            None => {
                let client = Arc::new(make());
                *slot = Some(Arc::clone(&client));
                client
            }
        }
    }

    /// Existing client, if any.
    pub fn peek(&self) -> Option<Arc<NameClient>> {
        self.inner.lock().clone()
    }

    /// Drop the cached client; the next `get` builds a fresh one.
    pub fn remove(&self) {
        self.inner.lock().take();
    }
}
