// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Route: the (from, to, carrier) triple naming one logical connection.

use std::fmt;

use crate::contact::Contact;

/// One logical connection between two named endpoints.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Route {
    from_name: String,
    to_name: String,
    carrier_name: String,
    to_contact: Option<Contact>,
}

impl Route {
    pub fn new(from_name: &str, to_name: &str, carrier_name: &str) -> Self {
        Self {
            from_name: from_name.to_string(),
            to_name: to_name.to_string(),
            carrier_name: carrier_name.to_string(),
            to_contact: None,
        }
    }

    pub fn from_name(&self) -> &str {
        &self.from_name
    }

    pub fn to_name(&self) -> &str {
        &self.to_name
    }

    pub fn carrier_name(&self) -> &str {
        &self.carrier_name
    }

    pub fn to_contact(&self) -> Option<&Contact> {
        self.to_contact.as_ref()
    }

    pub fn set_from_name(&mut self, name: &str) {
        self.from_name = name.to_string();
    }

    pub fn set_to_name(&mut self, name: &str) {
        self.to_name = name.to_string();
    }

    pub fn set_carrier_name(&mut self, name: &str) {
        self.carrier_name = name.to_string();
    }

    pub fn set_to_contact(&mut self, contact: Contact) {
        self.to_contact = Some(contact);
    }

    /// Builder: attach the resolved destination contact.
    pub fn with_to_contact(mut self, contact: Contact) -> Self {
        self.to_contact = Some(contact);
        self
    }

    /// Exchange from and to names. Applying it twice is a no-op.
    pub fn swap_names(&mut self) {
        std::mem::swap(&mut self.from_name, &mut self.to_name);
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}->{}", self.from_name, self.carrier_name, self.to_name)
    }
}
