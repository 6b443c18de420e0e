// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Name records and the command interpreter shared by the in-process name
//! server and fake-mode clients.
//!
//! Every text reply ends with [`END_OF_MESSAGE`]. Structured (`bot`)
//! replies are rendered as bottle text followed by the same terminator.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use parking_lot::Mutex;

use crate::bottle::Bottle;
use crate::carrier::END_OF_MESSAGE;
use crate::contact::Contact;

/// Placeholder meaning "pick a value for me".
pub const AUTO: &str = "...";

/// Name registry backend.
pub trait NameStore: Send + Sync {
    /// Registered contact for `name`, invalid when unknown.
    fn query(&self, name: &str) -> Contact;

    /// Register `name`. Fields of `suggestion` that are empty or `...`
    /// are filled in; `remote_host` stands in for an unknown host.
    fn register(&self, name: &str, suggestion: &Contact, remote_host: &str) -> Contact;

    /// Remove `name`. Returns the (now invalid) contact; unknown names
    /// are not an error.
    fn unregister(&self, name: &str) -> Contact;

    /// Interpret one text command (without the `NAME_SERVER` prefix) and
    /// return the terminated reply. Unknown commands give an empty string.
    fn apply(&self, command: &str, remote_host: &str) -> String;

    /// Structured form of [`NameStore::apply`].
    fn process(&self, command: &Bottle, remote_host: &str) -> Bottle {
        let reply = self.apply(&command.to_text(), remote_host);
        parse_reply(&reply)
    }
}

/// Drop the terminator and parse the rest of a reply as a bottle.
pub fn parse_reply(reply: &str) -> Bottle {
    let body = strip_terminator(reply);
    Bottle::from_text(body.trim()).unwrap_or_else(|_| Bottle::new().with(body.trim()))
}

/// Reply text without the `*** end of message` line.
pub fn strip_terminator(reply: &str) -> &str {
    reply
        .strip_suffix(END_OF_MESSAGE)
        .unwrap_or(reply)
        .trim_end_matches(['\r', '\n'])
}

fn terminate(text: impl Into<String>) -> String {
    let mut text = text.into();
    text.push_str(END_OF_MESSAGE);
    text
}

/// `registration name N ip H port P type C`, empty for an invalid contact.
pub fn textify(contact: &Contact) -> String {
    match contact.port() {
        Some(port) => format!(
            "registration name {} ip {} port {} type {}\n",
            contact.name(),
            contact.host(),
            port,
            contact.carrier()
        ),
        None => String::new(),
    }
}

/// Parse a `registration ...` line back into a contact.
pub fn parse_registration(text: &str) -> Contact {
    for line in text.lines() {
        let words: Vec<&str> = line.split_whitespace().collect();
        if words.first() != Some(&"registration") {
            continue;
        }
        let field = |key: &str| {
            words
                .windows(2)
                .find(|w| w[0] == key)
                .map(|w| w[1])
        };
        let (Some(name), Some(host), Some(port), Some(carrier)) =
            (field("name"), field("ip"), field("port"), field("type"))
        else {
            continue;
        };
        let Ok(port) = port.parse::<u16>() else {
            continue;
        };
        return Contact::new(name, carrier, host, port);
    }
    Contact::invalid()
}

/// `port (name ..) (ip ..) (port_number ..) (carrier ..)`.
pub fn botify(contact: &Contact) -> Bottle {
    let mut out = Bottle::new().with("port");
    match contact.port() {
        Some(port) => {
            out.push_pair("name", contact.name())
                .push_pair("ip", contact.host())
                .push_pair("port_number", i64::from(port))
                .push_pair("carrier", contact.carrier());
        }
        None => {
            out.push(Bottle::new().with("error").with(-2).with("port not known"));
        }
    }
    out
}

/// Inverse of [`botify`]; invalid for error replies.
pub fn unbotify(reply: &Bottle) -> Contact {
    let port = reply
        .find("port_number")
        .and_then(|v| v.as_int())
        .and_then(|p| u16::try_from(p).ok());
    let text = |key: &str| reply.find(key).map(|v| v.to_plain_string()).unwrap_or_default();
    match port {
        Some(port) => Contact::new(&text("name"), &text("carrier"), &text("ip"), port),
        None => Contact::invalid(),
    }
}

// ============================================================================
// InMemoryNameStore
// ============================================================================

#[derive(Debug, Default)]
struct NameRecord {
    contact: Contact,
    reusable_port: bool,
    props: BTreeMap<String, Vec<String>>,
}

impl NameRecord {
    fn prop(&self, key: &str) -> String {
        self.props.get(key).map(|v| v.join(" ")).unwrap_or_default()
    }

    fn check_prop(&self, key: &str, value: &str) -> bool {
        self.props
            .get(key)
            .is_some_and(|v| v.iter().any(|x| x == value))
    }

    fn match_prop(&self, key: &str, prefix: &str) -> String {
        self.props
            .get(key)
            .and_then(|v| v.iter().find(|x| x.starts_with(prefix)))
            .cloned()
            .unwrap_or_default()
    }
}

/// Ports handed out on one host.
#[derive(Debug)]
struct HostRecord {
    base: u16,
    range: u16,
    in_use: BTreeSet<u16>,
}

impl HostRecord {
    fn allocate(&mut self) -> Option<u16> {
        let port = (0..self.range)
            .filter_map(|offset| self.base.checked_add(offset))
            .find(|p| !self.in_use.contains(p))?;
        self.in_use.insert(port);
        Some(port)
    }

    fn release(&mut self, port: u16) {
        self.in_use.remove(&port);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Subscription {
    src: String,
    dest: String,
    carrier: String,
}

#[derive(Debug, Default)]
struct StoreState {
    names: BTreeMap<String, NameRecord>,
    hosts: HashMap<String, HostRecord>,
    subscriptions: Vec<Subscription>,
    tmp_counter: u32,
}

/// Name registry kept in memory.
#[derive(Debug)]
pub struct InMemoryNameStore {
    base_port: u16,
    port_range: u16,
    state: Mutex<StoreState>,
}

impl Default for InMemoryNameStore {
    fn default() -> Self {
        Self::new(
            super::config::DEFAULT_NAME_SERVER_PORT + 2,
            1000,
        )
    }
}

impl InMemoryNameStore {
    /// Store allocating ports from `base_port` up to `base_port + port_range`.
    pub fn new(base_port: u16, port_range: u16) -> Self {
        Self {
            base_port,
            port_range,
            state: Mutex::new(StoreState::default()),
        }
    }

    /// Number of valid registrations.
    pub fn len(&self) -> usize {
        self.state
            .lock()
            .names
            .values()
            .filter(|r| r.contact.is_valid())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn host_record<'a>(&self, state: &'a mut StoreState, host: &str) -> &'a mut HostRecord {
        let (base, range) = (self.base_port, self.port_range);
        state
            .hosts
            .entry(host.to_string())
            .or_insert_with(|| HostRecord {
                base,
                range,
                in_use: BTreeSet::new(),
            })
    }

    fn unregister_locked(&self, state: &mut StoreState, name: &str) {
        let Some(record) = state.names.get_mut(name) else {
            return;
        };
        let contact = std::mem::take(&mut record.contact);
        let reusable = record.reusable_port;
        record.reusable_port = false;
        record.props.clear();
        if let (true, Some(port)) = (reusable, contact.port()) {
            self.host_record(state, contact.host()).release(port);
        }
        if contact.is_valid() {
            log::debug!("[name-store] unregistered {}", name);
        }
    }

    fn register_locked(
        &self,
        state: &mut StoreState,
        name: &str,
        suggestion: &Contact,
        remote_host: &str,
    ) -> Contact {
        let name = if name == AUTO {
            state.tmp_counter += 1;
            format!("/tmp/port/{}", state.tmp_counter)
        } else {
            self.unregister_locked(state, name);
            name.to_string()
        };

        let carrier = match suggestion.carrier() {
            "" | AUTO => "tcp",
            c => c,
        };
        let host = match suggestion.host() {
            "" | AUTO => {
                if remote_host.is_empty() || remote_host == AUTO {
                    log::error!("[name-store] remote host unknown, assuming local");
                    "127.0.0.1".to_string()
                } else {
                    remote_host.to_string()
                }
            }
            h => h.to_string(),
        };

        let (port, reusable) = match suggestion.port() {
            Some(p) if p != 0 => (p, false),
            _ => match self.host_record(state, &host).allocate() {
                Some(p) => (p, true),
                None => {
                    log::error!("[name-store] no free port left on {}", host);
                    return Contact::invalid();
                }
            },
        };

        let contact = Contact::new(&name, carrier, &host, port);
        log::debug!("[name-store] registered {}", contact);
        let record = state.names.entry(name).or_default();
        record.contact = contact.clone();
        record.reusable_port = reusable;
        contact
    }

    // ------------------------------------------------------------------------
    // Text commands
    // ------------------------------------------------------------------------

    fn text_command(
        &self,
        state: &mut StoreState,
        key: &str,
        args: &[&str],
        remote_host: &str,
    ) -> Option<String> {
        let reply = match key {
            "register" => {
                let Some(name) = args.first() else {
                    return Some(terminate("need at least one argument\n"));
                };
                let carrier = args.get(1).copied().unwrap_or(AUTO);
                let host = args.get(2).copied().unwrap_or(AUTO);
                let port = match args.get(3) {
                    None => 0,
                    Some(&AUTO) => 0,
                    Some(p) => p.parse::<u16>().unwrap_or(0),
                };
                let suggestion = Contact::by_socket(carrier, host, port);
                let contact = self.register_locked(state, name, &suggestion, remote_host);
                terminate(textify(&contact))
            }
            "unregister" => {
                let Some(name) = args.first() else {
                    return Some(terminate("need at least one argument\n"));
                };
                self.unregister_locked(state, name);
                terminate(String::new())
            }
            "query" => {
                let Some(name) = args.first() else {
                    return Some(terminate("need at least one argument\n"));
                };
                terminate(textify(&query_locked(state, name)))
            }
            "announce" => terminate("ok\n"),
            "gc" => terminate("No cleaning done.\n"),
            "help" => terminate(HELP_TEXT),
            "list" => {
                let lines: Vec<String> = state
                    .names
                    .values()
                    .map(|r| textify(&r.contact))
                    .filter(|l| !l.is_empty())
                    .collect();
                terminate(lines.concat())
            }
            "set" => {
                let [target, key, values @ ..] = args else {
                    return Some(terminate("need at least two arguments: the port name, and a key\n"));
                };
                let record = state.names.entry(target.to_string()).or_default();
                record
                    .props
                    .insert(key.to_string(), values.iter().map(|v| v.to_string()).collect());
                terminate(format!("port {} property {} = {}\n", target, key, record.prop(key)))
            }
            "get" => {
                let [target, key, ..] = args else {
                    return Some(terminate("need exactly two arguments: the port name, and a key\n"));
                };
                let value = state.names.get(*target).map(|r| r.prop(key)).unwrap_or_default();
                terminate(format!("port {} property {} = {}\n", target, key, value))
            }
            "match" => {
                let [target, key, prefix, ..] = args else {
                    return Some(terminate(
                        "need exactly three arguments: the port name, a key, and a prefix\n",
                    ));
                };
                let value = state
                    .names
                    .get(*target)
                    .map(|r| r.match_prop(key, prefix))
                    .unwrap_or_default();
                terminate(format!("port {} property {} = {}\n", target, key, value))
            }
            "check" => {
                let [target, key, values @ ..] = args else {
                    return Some(terminate("need at least two arguments: the port name, and a key\n"));
                };
                let record = state.names.get(*target);
                let lines: Vec<String> = values
                    .iter()
                    .map(|v| {
                        let present = record.is_some_and(|r| r.check_prop(key, v));
                        format!("port {} property {} value {} present {}", target, key, v, present)
                    })
                    .collect();
                terminate(format!("{}\n", lines.join("\n")))
            }
            "route" => {
                let [src, dest, carriers @ ..] = args else {
                    return Some(terminate(
                        "need at least two arguments: the source port and the target port\n",
                    ));
                };
                let defaults = ["udp", "tcp", "text"];
                let carriers: Vec<&str> = if carriers.is_empty() {
                    defaults.to_vec()
                } else {
                    carriers.to_vec()
                };
                let chosen = carriers.into_iter().find(|c| {
                    let offers = state.names.get(*src).is_some_and(|r| r.check_prop("offers", c));
                    let accepts = state.names.get(*dest).is_some_and(|r| r.check_prop("accepts", c));
                    offers && accepts
                });
                let pref = match chosen {
                    Some(c) => format!("{}:/{}", c, dest),
                    None => dest.to_string(),
                };
                terminate(format!("port {} route {} = {}\n", src, dest, pref))
            }
            "subscribe" => match args {
                [] => {
                    let lines: Vec<String> = state
                        .subscriptions
                        .iter()
                        .map(|s| format!("subscription {} {} {}\n", s.src, s.dest, s.carrier))
                        .collect();
                    terminate(lines.concat())
                }
                [src, dest, rest @ ..] => {
                    let sub = Subscription {
                        src: src.to_string(),
                        dest: dest.to_string(),
                        carrier: rest.first().copied().unwrap_or("tcp").to_string(),
                    };
                    state
                        .subscriptions
                        .retain(|s| !(s.src == sub.src && s.dest == sub.dest));
                    log::debug!("[name-store] subscribe {} -> {}", sub.src, sub.dest);
                    state.subscriptions.push(sub);
                    terminate("ok\n")
                }
                _ => terminate("need two arguments: the source and the destination\n"),
            },
            "unsubscribe" => {
                let [src, dest, ..] = args else {
                    return Some(terminate("need two arguments: the source and the destination\n"));
                };
                state
                    .subscriptions
                    .retain(|s| !(s.src == *src && s.dest == *dest));
                terminate("ok\n")
            }
            "bot" => {
                let (sub, rest) = args.split_first()?;
                let reply = bot_command(state, sub, rest)?;
                terminate(format!("{}\n", reply))
            }
            _ => return None,
        };
        Some(reply)
    }
}

const HELP_TEXT: &str = "Here are some ways to use the name server:\n\
+ help\n\
+ list\n\
+ register $portname\n\
+ register $portname $carrier $ipAddress $portNumber\n\
  (if you want a field set automatically, write '...')\n\
+ unregister $portname\n\
+ query $portname\n\
+ set $portname $property $value\n\
+ get $portname $property\n\
+ check $portname $property\n\
+ match $portname $property $prefix\n\
+ route $port1 $port2\n\
+ subscribe $port1 $port2 [$carrier]\n\
+ unsubscribe $port1 $port2\n\
+ gc\n";

fn query_locked(state: &StoreState, name: &str) -> Contact {
    state
        .names
        .get(name)
        .map(|r| r.contact.clone())
        .unwrap_or_default()
}

/// Structured commands, reachable as `bot <cmd>` or directly when no text
/// command matches.
fn bot_command(state: &mut StoreState, key: &str, args: &[&str]) -> Option<Bottle> {
    match key {
        "list" => {
            let prefix = args.first().copied().unwrap_or("");
            let mut out = Bottle::new().with("ports");
            for record in state.names.values() {
                let name = record.contact.name();
                let under_prefix = name.starts_with(prefix)
                    && (name.len() == prefix.len()
                        || prefix.is_empty()
                        || prefix.ends_with('/')
                        || name[prefix.len()..].starts_with('/'));
                if under_prefix && record.contact.is_valid() {
                    out.push(botify(&record.contact));
                }
            }
            Some(out)
        }
        "query" => {
            let [name] = args else { return Some(Bottle::new()) };
            Some(botify(&query_locked(state, name)))
        }
        "version" => Some(
            Bottle::new()
                .with("version")
                .with(env!("CARGO_PKG_VERSION")),
        ),
        "set" => {
            let [target, key, values @ ..] = args else {
                return Some(Bottle::new());
            };
            let record = state.names.entry(target.to_string()).or_default();
            record
                .props
                .insert(key.to_string(), values.iter().map(|v| v.to_string()).collect());
            Some(Bottle::new().with("ok"))
        }
        "get" => {
            let [target, key] = args else { return Some(Bottle::new()) };
            let value = state.names.get(*target).map(|r| r.prop(key)).unwrap_or_default();
            Some(Bottle::from_text(&value).unwrap_or_else(|_| Bottle::new().with(value)))
        }
        _ => None,
    }
}

fn tokenize(command: &str) -> Vec<&str> {
    command
        .split(|c: char| c == '"' || c.is_whitespace())
        .filter(|t| !t.is_empty())
        .collect()
}

impl NameStore for InMemoryNameStore {
    fn query(&self, name: &str) -> Contact {
        query_locked(&self.state.lock(), name)
    }

    fn register(&self, name: &str, suggestion: &Contact, remote_host: &str) -> Contact {
        let mut state = self.state.lock();
        self.register_locked(&mut state, name, suggestion, remote_host)
    }

    fn unregister(&self, name: &str) -> Contact {
        let mut state = self.state.lock();
        self.unregister_locked(&mut state, name);
        query_locked(&state, name)
    }

    fn apply(&self, command: &str, remote_host: &str) -> String {
        let tokens = tokenize(command);
        let Some((key, args)) = tokens.split_first() else {
            return terminate("no command given\n");
        };
        let mut state = self.state.lock();
        if let Some(reply) = self.text_command(&mut state, key, args, remote_host) {
            log::trace!("[name-store] {} -> {:?}", command, reply);
            return reply;
        }
        match bot_command(&mut state, key, args) {
            Some(bottle) if !bottle.is_empty() => terminate(format!("{}\n", bottle)),
            _ => String::new(),
        }
    }
}
