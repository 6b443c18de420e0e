// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! ROS master backend.
//!
//! Port names map onto ROS graph names:
//!
//! - `/chatter+@/talker` registers node `/talker` as a publisher of
//!   `/chatter`, `-` as a subscriber, `-1` as a service provider
//! - a plain `/foo` is registered as a node publishing the dummy topic
//!   `/yarp/registration`, which is enough for `lookupNode` to find it
//!
//! ROS forbids `:` in names; it travels as `__`.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;

use super::config::{host_name, is_local_name, NameConfig, NameMode};
use super::{rpc, ContactStyle, NameError, NameServerDetection, NameSpace};
use crate::bottle::{Bottle, Value};
use crate::carrier::CarrierRegistry;
use crate::contact::{Contact, NestedContact};

/// Dummy topic used to make plain ports visible as ROS nodes.
pub const REGISTRATION_TOPIC: &str = "/yarp/registration";

/// Caller id used when pushing `publisherUpdate` to a new subscriber.
const UPDATE_CALLER: &str = "/yarp/RosNameSpace";

/// `:` becomes `__`.
pub fn to_ros_name(name: &str) -> String {
    name.replace(':', "__")
}

/// `__` becomes `:`; a lone `_` is kept.
pub fn from_ros_name(name: &str) -> String {
    if !name.contains("__") {
        return name.to_string();
    }
    let mut out = String::with_capacity(name.len());
    let mut run = 0;
    for c in name.chars() {
        if c == '_' {
            run += 1;
            if run == 2 {
                out.push(':');
                run = 0;
            }
        } else {
            if run > 0 {
                out.push('_');
                run = 0;
            }
            out.push(c);
        }
    }
    if run > 0 {
        out.push('_');
    }
    out
}

pub fn to_ros_node_name(name: &str) -> String {
    to_ros_name(name)
}

pub fn from_ros_node_name(name: &str) -> String {
    from_ros_name(name)
}

/// Contact as a ROS caller API: `rosrpc` stays, anything else is `http`.
/// Host names only meaningful locally are replaced by this machine's name.
pub fn rosify(contact: &Contact) -> Contact {
    let host = if is_local_name(contact.host()) {
        host_name()
    } else {
        contact.host().to_string()
    };
    let carrier = if contact.carrier() == "rosrpc" {
        "rosrpc"
    } else {
        "http"
    };
    match contact.port() {
        Some(port) => Contact::by_socket(carrier, &host, port),
        None => Contact::by_carrier(carrier).with_host(&host),
    }
}

/// Message type as registered with the master.
pub fn ros_type_name(type_name: &str) -> String {
    match type_name {
        "" | "*" => "*".to_string(),
        "yarp/image" => "sensor_msgs/Image".to_string(),
        "yarp/vector" => "std_msgs/Float64MultiArray".to_string(),
        t if !t.contains('/') => format!("yarp/{}", t),
        t => t.to_string(),
    }
}

/// `(code, message)` when the reply carries a non-zero `faultCode`.
fn fault_of(reply: &Bottle) -> Option<(i64, String)> {
    let code = reply.find("faultCode").and_then(Value::as_int)?;
    if code == 0 {
        return None;
    }
    let message = reply
        .find("faultString")
        .map(Value::to_plain_string)
        .unwrap_or_default();
    Some((code, message))
}

// ============================================================================
// Background publisherUpdate pushes
// ============================================================================

struct PendingUpdate {
    target: Contact,
    cmd: Bottle,
}

#[derive(Default)]
struct UpdateWorker {
    tx: Option<Sender<PendingUpdate>>,
    handle: Option<JoinHandle<()>>,
}

fn run_updates(registry: Arc<CarrierRegistry>, rx: Receiver<PendingUpdate>) {
    let style = ContactStyle::default().admin().with_carrier("tcp");
    while let Ok(update) = rx.recv() {
        log::debug!("[ros] pushing {} to {}", update.cmd, update.target);
        let target = update.target.with_name("");
        if let Err(e) = rpc::write_to_contact(&registry, &target, &update.cmd, &style) {
            log::debug!("[ros] publisherUpdate to {} failed: {}", target, e);
        }
    }
    log::trace!("[ros] update worker exiting");
}

// ============================================================================
// RosNameSpace
// ============================================================================

/// [`NameSpace`] backed by a ROS master.
pub struct RosNameSpace {
    master: Mutex<Contact>,
    config: NameConfig,
    registry: Arc<CarrierRegistry>,
    timeout: Option<Duration>,
    registered: Mutex<HashMap<String, Contact>>,
    worker: Mutex<UpdateWorker>,
}

impl RosNameSpace {
    /// Namespace talking to the master at `master` (carrier `xmlrpc`).
    pub fn new(master: Contact, config: NameConfig, registry: Arc<CarrierRegistry>) -> Self {
        Self {
            master: Mutex::new(master),
            config,
            registry,
            timeout: Some(Duration::from_secs(5)),
            registered: Mutex::new(HashMap::new()),
            worker: Mutex::new(UpdateWorker::default()),
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Stop the update worker after it drained its queue.
    pub fn shutdown(&self) {
        let (tx, handle) = {
            let mut worker = self.worker.lock();
            (worker.tx.take(), worker.handle.take())
        };
        drop(tx);
        if let Some(handle) = handle {
            if handle.join().is_err() {
                log::error!("[ros] update worker panicked");
            }
        }
    }

    fn master_call(&self, cmd: Bottle, style: &ContactStyle) -> Result<Bottle, NameError> {
        let master = self.name_server_contact();
        if !master.is_valid() {
            return Err(NameError::Unreachable("no ROS master configured".into()));
        }
        let mut style = style.clone();
        if style.timeout.is_none() {
            style.timeout = self.timeout;
        }
        log::trace!("[ros] -> {}", cmd);
        rpc::write_to_contact(&self.registry, &master, &cmd, &style)
    }

    /// Master call that also treats a `faultCode` reply as an error.
    fn checked_call(&self, cmd: Bottle) -> Result<Bottle, NameError> {
        let reply = self.master_call(cmd, &ContactStyle::default())?;
        match fault_of(&reply) {
            Some((code, message)) => Err(NameError::Fault { code, message }),
            None => Ok(reply),
        }
    }

    fn queue_update(&self, update: PendingUpdate) {
        let mut worker = self.worker.lock();
        if worker.tx.is_none() {
            let (tx, rx) = channel::unbounded();
            let registry = Arc::clone(&self.registry);
            match thread::Builder::new()
                .name("portlink-ros-update".to_string())
                .spawn(move || run_updates(registry, rx))
            {
                Ok(handle) => {
                    worker.tx = Some(tx);
                    worker.handle = Some(handle);
                }
                Err(e) => {
                    log::error!("[ros] cannot start update worker: {}", e);
                    return;
                }
            }
        }
        if let Some(tx) = &worker.tx {
            if tx.send(update).is_err() {
                log::error!("[ros] update worker is gone");
            }
        }
    }

    fn nested_of(contact: &Contact) -> NestedContact {
        let nested = contact.nested();
        if nested.is_nested() {
            nested.clone()
        } else {
            NestedContact::from_string(contact.name())
        }
    }

    fn connect_topic(
        &self,
        cmd: Bottle,
        src_is_topic: bool,
        src: &Contact,
        dest: &Contact,
        style: &ContactStyle,
        active_registration: bool,
    ) -> Result<(), NameError> {
        let mut dynamic_src = src.clone();
        let mut dynamic_dest = dest.clone();
        if !style.carrier.is_empty() {
            if src_is_topic {
                dynamic_dest = dynamic_dest.with_carrier(&style.carrier);
            } else {
                dynamic_src = dynamic_src.with_carrier(&style.carrier);
            }
        }

        let reply = self
            .master_call(cmd, style)
            .and_then(|reply| match fault_of(&reply) {
                Some((code, message)) => Err(NameError::Fault { code, message }),
                None => Ok(reply),
            });
        let reply = match reply {
            Ok(reply) => reply,
            Err(e) => {
                if !style.quiet {
                    log::error!("[ros] name server did not accept connection to topic");
                    match &e {
                        NameError::Fault { message, .. } => log::error!("[ros] cause: {}", message),
                        other => log::error!("[ros] cause: {}", other),
                    }
                }
                return Err(e);
            }
        };

        if active_registration {
            if let Some(publishers) = reply.get(2).and_then(Value::as_list) {
                let update = Bottle::new()
                    .with("publisherUpdate")
                    .with("/yarp")
                    .with(dynamic_src.name())
                    .with(publishers.clone());
                let style = ContactStyle::default().admin();
                if let Err(e) =
                    rpc::write_to_contact(&self.registry, &dynamic_dest, &update, &style)
                {
                    log::debug!("[ros] publisherUpdate to {} failed: {}", dynamic_dest, e);
                }
            }
        }
        Ok(())
    }

    fn detect_with(&self, use_detected: bool, master_uri: Option<String>) -> NameServerDetection {
        let mut detection = NameServerDetection {
            contact: self.config.address(),
            ..Default::default()
        };
        if detection.contact.is_valid() {
            return detection;
        }

        detection.scan_needed = true;
        log::info!("[ros] checking for ROS_MASTER_URI...");
        let contact = Contact::from_string(master_uri.as_deref().unwrap_or(""));
        if !contact.is_valid() {
            return detection;
        }
        let contact = contact
            .with_carrier("xmlrpc")
            .with_name(&self.config.namespace);
        *self.master.lock() = contact.clone();
        if use_detected {
            match self.config.write_saved(&contact, NameMode::Ros) {
                Ok(()) => detection.server_used = true,
                Err(e) => log::warn!("[ros] could not save master address: {}", e),
            }
        }
        detection.contact = contact;
        detection
    }

    fn system_state(&self, style: &ContactStyle) -> Result<Bottle, NameError> {
        let reply = self.master_call(
            Bottle::new().with("getSystemState").with("dummy_id"),
            style,
        )?;
        let mut nodes = BTreeSet::new();
        let mut topics = BTreeSet::new();
        let mut services = BTreeSet::new();
        if let Some(parts) = reply.get(2).and_then(Value::as_list) {
            for (i, part) in parts.iter().take(3).enumerate() {
                let Some(part) = part.as_list() else { continue };
                for unit in part.iter().filter_map(Value::as_list) {
                    let stem = unit.get(0).map(Value::to_plain_string).unwrap_or_default();
                    let Some(links) = unit.get(1).and_then(Value::as_list) else {
                        continue;
                    };
                    if i < 2 {
                        topics.insert(stem);
                    } else {
                        services.insert(stem);
                    }
                    nodes.extend(links.iter().map(Value::to_plain_string));
                }
            }
        }
        let mut out = Bottle::new().with("many");
        for (title, names) in [("node", nodes), ("topic", topics), ("service", services)] {
            for name in names {
                out.push(Bottle::new().with(title).with(name));
            }
        }
        Ok(out)
    }
}

impl Drop for RosNameSpace {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for RosNameSpace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RosNameSpace")
            .field("master", &*self.master.lock())
            .finish()
    }
}

impl NameSpace for RosNameSpace {
    fn name_server_contact(&self) -> Contact {
        self.master.lock().clone()
    }

    fn query_name(&self, name: &str) -> Contact {
        let nc = NestedContact::from_string(name);
        let node = to_ros_node_name(nc.node_name());
        let style = ContactStyle::default();

        let mut reply = None;
        if !nc.category().contains("-1") {
            let cmd = Bottle::new().with("lookupNode").with("dummy_id").with(node.as_str());
            reply = self.master_call(cmd, &style).ok();
        }
        let mut is_service = false;
        if reply.as_ref().and_then(|r| r.get_int(0)) != Some(1) {
            let cmd = Bottle::new()
                .with("lookupService")
                .with("dummy_id")
                .with(node.as_str());
            reply = self.master_call(cmd, &style).ok();
            is_service = true;
        }

        let uri = reply
            .as_ref()
            .and_then(|r| r.get(2))
            .map(Value::to_plain_string)
            .unwrap_or_default();
        let found = Contact::from_string(&uri);
        if !found.is_valid() {
            log::debug!("[ros] {} not known to the master", name);
            return Contact::invalid();
        }
        let found = if found.carrier() == "rosrpc" {
            found.with_carrier(&format!("rossrv+service.{}", name))
        } else {
            found.with_carrier("xmlrpc")
        };
        let found = found.with_name(name);

        if nc.nested_name().is_empty() || !is_service {
            found
        } else {
            Contact::invalid()
        }
    }

    fn register_name(&self, name: &str) -> Contact {
        log::error!(
            "[ros] ROS name server does not do 'raw' registrations of {}; open a port to get a complete registration",
            name
        );
        Contact::invalid()
    }

    fn register_contact(&self, contact: &Contact) -> Contact {
        let nc = Self::nested_of(contact);
        let caller = rosify(contact).to_uri(true);

        if nc.is_nested() {
            let node = to_ros_node_name(nc.node_name());
            let topic = to_ros_name(nc.nested_name());
            match nc.category() {
                "-1" => {
                    let rosrpc = contact.clone().with_carrier("rosrpc").to_uri(true);
                    let cmd = Bottle::new()
                        .with("registerService")
                        .with(node)
                        .with(topic)
                        .with(rosrpc)
                        .with(caller);
                    if let Err(e) = self.checked_call(cmd) {
                        log::error!("[ros] service registration of {} failed: {}", contact.name(), e);
                        return Contact::invalid();
                    }
                }
                category @ ("+" | "-") => {
                    let method = if category == "+" {
                        "registerPublisher"
                    } else {
                        "registerSubscriber"
                    };
                    let cmd = Bottle::new()
                        .with(method)
                        .with(node)
                        .with(topic.as_str())
                        .with(ros_type_name(nc.type_name()))
                        .with(caller);
                    let reply = match self.checked_call(cmd) {
                        Ok(reply) => reply,
                        Err(e) => {
                            log::error!("[ros] registration error: {}", e);
                            return Contact::invalid();
                        }
                    };
                    if category == "-" {
                        if let Some(publishers) = reply.get(2).and_then(Value::as_list) {
                            if !publishers.is_empty() {
                                let cmd = Bottle::new()
                                    .with("publisherUpdate")
                                    .with(UPDATE_CALLER)
                                    .with(topic)
                                    .with(publishers.clone());
                                self.queue_update(PendingUpdate {
                                    target: contact.clone(),
                                    cmd,
                                });
                            }
                        }
                    }
                }
                other => {
                    log::debug!("[ros] category {:?} of {} needs no registration", other, contact.name());
                }
            }
            self.registered
                .lock()
                .insert(contact.name().to_string(), contact.clone());
            return contact.clone();
        }

        let cmd = Bottle::new()
            .with("registerPublisher")
            .with(to_ros_node_name(contact.name()))
            .with(REGISTRATION_TOPIC)
            .with("*")
            .with(caller);
        if let Err(e) = self.checked_call(cmd) {
            log::error!("[ros] registration of {} failed: {}", contact.name(), e);
            return Contact::invalid();
        }
        self.registered
            .lock()
            .insert(contact.name().to_string(), contact.clone());
        contact.clone()
    }

    fn unregister_name(&self, name: &str) -> Contact {
        let known = self.registered.lock().get(name).cloned();
        let contact = match known {
            Some(contact) => contact,
            None => self.query_name(name),
        };
        if !contact.is_valid() {
            log::debug!("[ros] nothing to unregister for {}", name);
            return Contact::invalid();
        }
        self.unregister_contact(&contact.with_name(name))
    }

    fn unregister_contact(&self, contact: &Contact) -> Contact {
        self.registered.lock().remove(contact.name());
        let nc = Self::nested_of(contact);
        let cmd = if nc.is_nested() {
            let node = to_ros_node_name(nc.node_name());
            match nc.category() {
                "-1" => Bottle::new()
                    .with("unregisterService")
                    .with(node)
                    .with(nc.nested_name())
                    .with(rosify(&contact.clone().with_carrier("rosrpc")).to_uri(true)),
                "+" => Bottle::new()
                    .with("unregisterPublisher")
                    .with(node)
                    .with(nc.nested_name())
                    .with(rosify(contact).to_uri(true)),
                "-" => Bottle::new()
                    .with("unregisterSubscriber")
                    .with(node)
                    .with(nc.nested_name())
                    .with(rosify(contact).to_uri(true)),
                _ => return Contact::invalid(),
            }
        } else {
            Bottle::new()
                .with("unregisterPublisher")
                .with(to_ros_node_name(contact.name()))
                .with(REGISTRATION_TOPIC)
                .with(rosify(contact).to_uri(true))
        };
        if let Err(e) = self.checked_call(cmd) {
            log::debug!("[ros] unregister of {} failed: {}", contact.name(), e);
        }
        Contact::invalid()
    }

    fn set_property(&self, _name: &str, _key: &str, _value: &Value) -> Result<(), NameError> {
        Err(NameError::Unsupported("properties on a ROS master".into()))
    }

    fn get_property(&self, _name: &str, _key: &str) -> Option<Value> {
        None
    }

    fn connect_port_to_topic(
        &self,
        src: &Contact,
        dest: &Contact,
        style: &ContactStyle,
    ) -> Result<(), NameError> {
        let cmd = Bottle::new()
            .with("registerPublisher")
            .with(to_ros_node_name(src.name()))
            .with(dest.name())
            .with("*")
            .with(rosify(src).to_uri(true));
        self.connect_topic(cmd, false, src, dest, style, false)
    }

    fn connect_topic_to_port(
        &self,
        src: &Contact,
        dest: &Contact,
        style: &ContactStyle,
    ) -> Result<(), NameError> {
        let cmd = Bottle::new()
            .with("registerSubscriber")
            .with(to_ros_node_name(dest.name()))
            .with(src.name())
            .with("*")
            .with(rosify(dest).to_uri(true));
        self.connect_topic(cmd, true, src, dest, style, true)
    }

    fn disconnect_port_from_topic(
        &self,
        src: &Contact,
        dest: &Contact,
        style: &ContactStyle,
    ) -> Result<(), NameError> {
        let cmd = Bottle::new()
            .with("unregisterPublisher")
            .with(to_ros_node_name(src.name()))
            .with(dest.name())
            .with(rosify(src).to_uri(true));
        self.connect_topic(cmd, false, src, dest, style, false)
    }

    fn disconnect_topic_from_port(
        &self,
        src: &Contact,
        dest: &Contact,
        style: &ContactStyle,
    ) -> Result<(), NameError> {
        let cmd = Bottle::new()
            .with("unregisterSubscriber")
            .with(to_ros_node_name(dest.name()))
            .with(src.name())
            .with(rosify(dest).to_uri(true));
        self.connect_topic(cmd, true, src, dest, style, false)
    }

    fn local_only(&self) -> bool {
        false
    }

    fn uses_central_server(&self) -> bool {
        true
    }

    fn server_allocates_port_numbers(&self) -> bool {
        false
    }

    fn connection_has_name_of_endpoints(&self) -> bool {
        false
    }

    fn detect_name_server(&self, use_detected: bool) -> NameServerDetection {
        self.detect_with(use_detected, std::env::var("ROS_MASTER_URI").ok())
    }

    fn write_to_name_server(
        &self,
        cmd: &Bottle,
        style: &ContactStyle,
    ) -> Result<Bottle, NameError> {
        let key = cmd.get(0).map(Value::to_plain_string).unwrap_or_default();
        match key.as_str() {
            "query" => {
                let name = cmd.get(1).map(Value::to_plain_string).unwrap_or_default();
                let contact = self.query_name(&name).with_name("");
                Ok(Bottle::new().with(name).with(contact.to_string()))
            }
            "list" => self.system_state(style),
            other => Err(NameError::Unsupported(format!("{:?} on a ROS master", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::name::xmlrpc;
    use crate::protocol::Protocol;
    use crate::stream::SocketStream;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;

    /// Serve one canned XML-RPC response per connection; returns the
    /// method names called.
    fn fake_master(responses: Vec<String>) -> (Contact, thread::JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = thread::spawn(move || {
            let mut methods = Vec::new();
            for response in responses {
                let (stream, _) = listener.accept().unwrap();
                let mut reader = BufReader::new(stream.try_clone().unwrap());
                let mut len = 0;
                loop {
                    let mut line = String::new();
                    reader.read_line(&mut line).unwrap();
                    if line == "\r\n" {
                        break;
                    }
                    if let Some(v) = line.strip_prefix("Content-Length: ") {
                        len = v.trim().parse().unwrap();
                    }
                }
                let mut body = vec![0u8; len];
                reader.read_exact(&mut body).unwrap();
                let body = String::from_utf8(body).unwrap();
                let start = body.find("<methodName>").unwrap() + "<methodName>".len();
                let end = body.find("</methodName>").unwrap();
                methods.push(body[start..end].to_string());
                let mut stream = stream;
                write!(
                    stream,
                    "HTTP/1.0 200 OK\r\nContent-Type: text/xml\r\nContent-Length: {}\r\n\r\n{}",
                    response.len(),
                    response
                )
                .unwrap();
            }
            methods
        });
        (Contact::new("/root", "xmlrpc", "127.0.0.1", port), handle)
    }

    /// Accept one portlink connection as `name` and return the first
    /// message with its admin flag.
    fn fake_port(name: &str) -> (Contact, thread::JoinHandle<(Bottle, bool)>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let name = name.to_string();
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut proto = Protocol::new(
                Box::new(SocketStream::new(stream)),
                Arc::new(CarrierRegistry::with_defaults()),
            );
            proto.open_name(&name).unwrap();
            let reader = proto.begin_read().unwrap();
            let got = (reader.to_bottle().unwrap(), reader.is_admin());
            proto.end_read().unwrap();
            proto.close();
            got
        });
        (Contact::new("/in", "tcp", "127.0.0.1", port), handle)
    }

    fn publishers_reply() -> String {
        xmlrpc::encode_response(
            &Bottle::new()
                .with(1)
                .with("subscribed")
                .with(Bottle::new().with("http://10.0.0.9:4000/")),
        )
    }

    fn assert_publisher_update(update: &Bottle, caller: &str, topic: &str) {
        assert_eq!(update.get_str(0), Some("publisherUpdate"));
        assert_eq!(update.get_str(1), Some(caller));
        assert_eq!(update.get_str(2), Some(topic));
        let publishers = update.get(3).and_then(Value::as_list).expect("publisher list");
        assert_eq!(publishers.get_str(0), Some("http://10.0.0.9:4000/"));
    }

    fn ns(master: Contact) -> RosNameSpace {
        RosNameSpace::new(
            master,
            NameConfig::default(),
            Arc::new(CarrierRegistry::with_defaults()),
        )
        .with_timeout(Some(Duration::from_secs(5)))
    }

    #[test]
    fn test_ros_name_encoding() {
        assert_eq!(to_ros_name("/a:b"), "/a__b");
        assert_eq!(from_ros_name("/a__b"), "/a:b");
        assert_eq!(from_ros_name("/a_b"), "/a_b");
        assert_eq!(from_ros_name("/a___b"), "/a:_b");
        for name in ["/plain", "/with:colon", "/x_y", "/tcp://host:1/z"] {
            assert_eq!(from_ros_name(&to_ros_name(name)), name);
        }
    }

    #[test]
    fn test_rosify() {
        let c = rosify(&Contact::by_socket("tcp", "10.0.0.3", 4000));
        assert_eq!(c.to_uri(true), "http://10.0.0.3:4000/");
        let c = rosify(&Contact::by_socket("rosrpc", "10.0.0.3", 4001));
        assert_eq!(c.carrier(), "rosrpc");
        let c = rosify(&Contact::by_socket("tcp", "127.0.0.1", 4000));
        assert_eq!(c.host(), host_name());
    }

    #[test]
    fn test_type_mapping() {
        assert_eq!(ros_type_name("yarp/image"), "sensor_msgs/Image");
        assert_eq!(ros_type_name("Bottle"), "yarp/Bottle");
        assert_eq!(ros_type_name("std_msgs/String"), "std_msgs/String");
        assert_eq!(ros_type_name(""), "*");
    }

    #[test]
    fn test_capabilities() {
        let ns = ns(Contact::invalid());
        assert!(!ns.local_only());
        assert!(ns.uses_central_server());
        assert!(!ns.server_allocates_port_numbers());
        assert!(!ns.connection_has_name_of_endpoints());
        assert!(ns.set_property("/a", "k", &Value::Int(1)).is_err());
        assert!(ns.get_property("/a", "k").is_none());
        assert!(!ns.register_name("/raw").is_valid());
        assert!(!ns.query_name("/anything").is_valid());
    }

    #[test]
    fn test_query_node() {
        let reply = xmlrpc::encode_response(
            &Bottle::new().with(1).with("node api").with("http://10.0.0.3:4000/"),
        );
        let (master, handle) = fake_master(vec![reply]);
        let ns = ns(master);
        let c = ns.query_name("/talker");
        assert_eq!(c.carrier(), "xmlrpc");
        assert_eq!(c.host(), "10.0.0.3");
        assert_eq!(c.port(), Some(4000));
        assert_eq!(c.name(), "/talker");
        assert_eq!(handle.join().unwrap(), vec!["lookupNode"]);
    }

    #[test]
    fn test_query_falls_back_to_service() {
        let miss = xmlrpc::encode_response(&Bottle::new().with(-1).with("unknown node").with(""));
        let hit = xmlrpc::encode_response(
            &Bottle::new().with(1).with("ok").with("rosrpc://10.0.0.4:5000"),
        );
        let (master, handle) = fake_master(vec![miss, hit]);
        let c = ns(master).query_name("/add_two");
        assert_eq!(c.carrier(), "rossrv+service./add_two");
        assert_eq!(c.port(), Some(5000));
        assert_eq!(handle.join().unwrap(), vec!["lookupNode", "lookupService"]);
    }

    #[test]
    fn test_register_plain_port() {
        let ok = xmlrpc::encode_response(&Bottle::new().with(1).with("ok").with(Bottle::new()));
        let (master, handle) = fake_master(vec![ok.clone(), ok]);
        let ns = ns(master);
        let c = Contact::new("/foo", "tcp", "10.0.0.5", 4100);
        assert_eq!(ns.register_contact(&c), c);
        assert!(!ns.unregister_name("/foo").is_valid());
        assert_eq!(
            handle.join().unwrap(),
            vec!["registerPublisher", "unregisterPublisher"]
        );
    }

    #[test]
    fn test_connect_topic_fault() {
        let fault = xmlrpc::encode_fault(-1, "bad caller");
        let (master, handle) = fake_master(vec![fault]);
        let ns = ns(master);
        let err = ns
            .connect_port_to_topic(
                &Contact::new("/out", "tcp", "10.0.0.5", 4100),
                &Contact::by_name("/chatter"),
                &ContactStyle::default().quiet(),
            )
            .unwrap_err();
        assert!(matches!(err, NameError::Fault { code: -1, .. }));
        assert_eq!(handle.join().unwrap(), vec!["registerPublisher"]);
    }

    #[test]
    fn test_subscribing_port_is_told_about_publishers() {
        let (master, methods) = fake_master(vec![publishers_reply()]);
        let (dest, pushed) = fake_port("/in");
        ns(master)
            .connect_topic_to_port(&Contact::by_name("/chatter"), &dest, &ContactStyle::default())
            .unwrap();

        let (update, admin) = pushed.join().unwrap();
        assert!(admin);
        assert_publisher_update(&update, "/yarp", "/chatter");
        assert_eq!(methods.join().unwrap(), vec!["registerSubscriber"]);
    }

    #[test]
    fn test_subscriber_registration_queues_update() {
        let (master, methods) = fake_master(vec![publishers_reply()]);
        let (port, pushed) = fake_port("/chatter-@/node");
        let subscriber = Contact::new(
            "/chatter-@/node",
            "tcp",
            "127.0.0.1",
            port.port().unwrap(),
        );
        let ns = ns(master);
        assert_eq!(ns.register_contact(&subscriber), subscriber);
        ns.shutdown();

        let (update, admin) = pushed.join().unwrap();
        assert!(admin);
        assert_publisher_update(&update, UPDATE_CALLER, "/chatter");
        assert_eq!(methods.join().unwrap(), vec!["registerSubscriber"]);
    }

    #[test]
    fn test_system_state_listing() {
        let state = Bottle::from_text(
            "((/chatter (/talker))) ((/chatter (/listener /echo))) ((/add (/server)))",
        )
        .unwrap();
        let reply = xmlrpc::encode_response(&Bottle::new().with(1).with("state").with(state));
        let (master, handle) = fake_master(vec![reply]);
        let out = ns(master)
            .write_to_name_server(&Bottle::new().with("list"), &ContactStyle::default())
            .unwrap();
        assert_eq!(
            out.to_text(),
            "many (node /echo) (node /listener) (node /server) (node /talker) (topic /chatter) (service /add)"
        );
        handle.join().unwrap();
    }

    #[test]
    fn test_detect_from_master_uri() {
        let dir = tempfile::tempdir().unwrap();
        let config = NameConfig::default().with_conf_dir(dir.path());
        let ns = RosNameSpace::new(
            Contact::invalid(),
            config.clone(),
            Arc::new(CarrierRegistry::with_defaults()),
        );

        let none = ns.detect_with(true, None);
        assert!(none.scan_needed && !none.contact.is_valid() && !none.server_used);

        let found = ns.detect_with(true, Some("http://10.0.0.1:11311/".into()));
        assert!(found.scan_needed && found.server_used);
        assert_eq!(found.contact.carrier(), "xmlrpc");
        assert_eq!(found.contact.port(), Some(11311));
        assert_eq!(config.saved_mode(), NameMode::Ros);

        // Saved now, so no scan.
        let again = ns.detect_with(true, None);
        assert!(!again.scan_needed);
        assert_eq!(again.contact.port(), Some(11311));
    }
}
