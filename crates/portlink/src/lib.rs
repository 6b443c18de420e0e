// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # portlink - port connection and carrier protocol layer
//!
//! Named ports connect to each other over pluggable *carriers*. A connection
//! is driven by a [`Protocol`] that performs the carrier handshake, frames
//! messages and exchanges acknowledgements. Names are resolved through a
//! [`NameSpace`], backed either by a central name server or by a ROS master.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use portlink::{Network, NetworkConfig, Port, SizedWriter};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let network = Network::init(NetworkConfig::local())?;
//!
//!     let input = Port::open(&network, "/in")?;
//!     let output = Port::open(&network, "/out")?;
//!     output.add_output("/in", "tcp")?;
//!
//!     output.write(SizedWriter::from_bytes(b"hello".to_vec()))?;
//!     let msg = input.read().expect("message");
//!     assert_eq!(msg.payload(), b"hello");
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +---------------------------------------------------------------------+
//! |                           Port Layer                                |
//! |   Port -> output connections (writer threads) | reader threads      |
//! |   PortCorePackets: one logical write shared by N connections        |
//! +---------------------------------------------------------------------+
//! |                         Protocol Layer                              |
//! |   handshake state machine | index frames | ack | recv/send delegates |
//! +---------------------------------------------------------------------+
//! |                          Carriers                                   |
//! |   tcp | fast_tcp | udp | text | text_ack | name_ser | mariah | tcpros|
//! |   zlib (modifier)                                                   |
//! +---------------------------------------------------------------------+
//! |                           Streams                                   |
//! |   TcpStream | UdpSocket datagrams | in-memory mock (tests)          |
//! +---------------------------------------------------------------------+
//!
//!            NameSpace (YARP name server | ROS master over XML-RPC)
//! ```
//!
//! ## Modules Overview
//!
//! - [`carrier`] - carrier trait, variants and the carrier registry
//! - [`protocol`] - per-connection handshake and framing
//! - [`packet`] - reference-counted outbound packet pool
//! - [`name`] - name resolution and registration backends
//! - [`network`] - explicit context tying registry and name service together
//! - [`port`] - minimal port owning connections

pub mod bottle;
pub mod carrier;
pub mod config;
pub mod contact;
pub mod error;
pub mod name;
pub mod network;
pub mod packet;
pub mod port;
pub mod protocol;
pub mod route;
pub mod stream;

pub use bottle::{Bottle, Value};
pub use carrier::{Carrier, CarrierRegistry};
pub use config::ProtocolConfig;
pub use contact::{Contact, NestedContact};
pub use error::{PacketError, ProtocolError};
pub use name::{ContactStyle, NameClient, NameError, NameSpace};
pub use network::{Network, NetworkConfig};
pub use packet::{PacketId, PacketRef, PortCorePackets, SharedPackets};
pub use port::{Message, Port};
pub use protocol::{ConnectionReader, Protocol, ProtocolPhase, SizedWriter};
pub use route::Route;
pub use stream::{StreamInterrupter, TwoWayStream};
