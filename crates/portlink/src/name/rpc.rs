// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! One-shot command/reply exchanges with a contact.

use std::sync::Arc;

use super::store::parse_reply;
use super::{xmlrpc, ContactStyle, NameError};
use crate::bottle::Bottle;
use crate::carrier::CarrierRegistry;
use crate::config::ProtocolConfig;
use crate::contact::Contact;
use crate::protocol::{Protocol, SizedWriter, DEFAULT_CARRIER};
use crate::route::Route;
use crate::stream::SocketStream;

/// Sender name used for administrative exchanges.
pub const RPC_SENDER: &str = "/portlink/rpc";

/// Carrier to use for `contact` under `style`.
pub fn effective_carrier<'a>(contact: &'a Contact, style: &'a ContactStyle) -> &'a str {
    if !style.carrier.is_empty() {
        &style.carrier
    } else if !contact.carrier().is_empty() {
        contact.carrier()
    } else {
        DEFAULT_CARRIER
    }
}

/// Send `cmd` to `contact` and wait for the reply.
///
/// `xmlrpc` and `http` contacts get an XML-RPC call whose method is the
/// first element of `cmd`; everything else goes through a [`Protocol`]
/// using the style's carrier, or the contact's, or `tcp`.
pub fn write_to_contact(
    registry: &Arc<CarrierRegistry>,
    contact: &Contact,
    cmd: &Bottle,
    style: &ContactStyle,
) -> Result<Bottle, NameError> {
    let Some(port) = contact.port() else {
        return Err(NameError::Unreachable(format!("{} has no port", contact)));
    };
    let timeout = style.timeout.or(contact.timeout());
    let carrier = effective_carrier(contact, style);

    if matches!(carrier, "xmlrpc" | "http") {
        let method = cmd
            .get(0)
            .map(|v| v.to_plain_string())
            .ok_or_else(|| NameError::BadReply("empty XML-RPC command".into()))?;
        return xmlrpc::call(contact.host(), port, &method, &cmd.tail(1), timeout);
    }

    let addr = format!("{}:{}", contact.host(), port);
    let stream = SocketStream::connect(&addr, timeout)
        .map_err(|e| NameError::Unreachable(format!("{}: {}", addr, e)))?;
    let config = ProtocolConfig {
        timeout,
        ..Default::default()
    };
    let mut proto = Protocol::with_config(Box::new(stream), Arc::clone(registry), config);

    let route = Route::new(RPC_SENDER, contact.name(), carrier).with_to_contact(contact.clone());
    proto.open_route(route)?;

    let mut writer = SizedWriter::from_bottle(cmd);
    if style.expect_reply {
        writer = writer.with_reply();
    }
    if style.admin {
        writer = writer.with_admin();
    }
    let reply = proto.write(&writer);
    proto.close();

    match reply? {
        Some(reader) => Ok(parse_reply(&String::from_utf8_lossy(reader.payload()))),
        None => Ok(Bottle::new()),
    }
}
