//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use tracing::{error, warn};

use crate::packet::DecodeError;

// PIM-DM errors.
#[derive(Debug)]
pub enum Error {
    // Packet input
    PacketDecodeError(String, Ipv4Addr, DecodeError),
    InterfaceNotFound(String),
    InterfaceInactive(String),
    UnexpectedGraftAck(String, Ipv4Addr),
    GraftNotForUs(String, Ipv4Addr, Ipv4Addr),
    // Configuration
    ConfigReadError(String, std::io::Error),
    ConfigParseError(toml::de::Error),
}

// ===== impl Error =====

impl Error {
    pub(crate) fn log(&self) {
        match self {
            Error::PacketDecodeError(ifname, source, error) => {
                warn!(interface = %ifname, %source, %error, "{}", self);
            }
            Error::InterfaceNotFound(ifname)
            | Error::InterfaceInactive(ifname) => {
                warn!(interface = %ifname, "{}", self);
            }
            Error::UnexpectedGraftAck(ifname, source) => {
                warn!(interface = %ifname, %source, "{}", self);
            }
            Error::GraftNotForUs(ifname, source, upstream_nbr) => {
                warn!(
                    interface = %ifname, %source, %upstream_nbr,
                    "{}", self
                );
            }
            Error::ConfigReadError(path, error) => {
                error!(%path, error = %with_source(error), "{}", self);
            }
            Error::ConfigParseError(error) => {
                error!(error = %with_source(error), "{}", self);
            }
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::PacketDecodeError(..) => {
                write!(f, "failed to decode packet")
            }
            Error::InterfaceNotFound(..) => {
                write!(f, "interface not found")
            }
            Error::InterfaceInactive(..) => {
                write!(f, "interface is not operational")
            }
            Error::UnexpectedGraftAck(..) => {
                write!(f, "unexpected Graft-Ack")
            }
            Error::GraftNotForUs(..) => {
                write!(f, "Graft addressed to another router")
            }
            Error::ConfigReadError(..) => {
                write!(f, "failed to read configuration file")
            }
            Error::ConfigParseError(..) => {
                write!(f, "failed to parse configuration")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::PacketDecodeError(_, _, error) => Some(error),
            Error::ConfigReadError(_, error) => Some(error),
            Error::ConfigParseError(error) => Some(error),
            _ => None,
        }
    }
}

// ===== global functions =====

fn with_source<E: std::error::Error>(error: E) -> String {
    if let Some(source) = error.source() {
        format!("{} ({})", error, with_source(source))
    } else {
        error.to_string()
    }
}
