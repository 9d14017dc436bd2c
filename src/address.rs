//! The client-facing address header: `ATYP || DST.ADDR || DST.PORT`.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use crate::error::Error;

const ATYP_IPV4: u8 = 1;
const ATYP_DOMAIN: u8 = 3;
const ATYP_IPV6: u8 = 4;

/// The destination a client asked to be relayed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    Ipv4(Ipv4Addr, u16),
    Domain(String, u16),
    Ipv6(Ipv6Addr, u16),
}

impl Address {
    pub fn port(&self) -> u16 {
        match self {
            Address::Ipv4(_, port) => *port,
            Address::Domain(_, port) => *port,
            Address::Ipv6(_, port) => *port,
        }
    }

    /// A `host:port` string suitable for `TcpStream::connect` and for
    /// logging.
    pub fn host_port(&self) -> (String, u16) {
        let host = match self {
            Address::Ipv4(addr, _) => addr.to_string(),
            Address::Domain(name, _) => name.clone(),
            Address::Ipv6(addr, _) => addr.to_string(),
        };
        (host, self.port())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Address::Ipv4(addr, port) => write!(f, "{}:{}", addr, port),
            Address::Domain(name, port) => write!(f, "{}:{}", name, port),
            Address::Ipv6(addr, port) => write!(f, "[{}]:{}", addr, port),
        }
    }
}

/// The result of attempting to parse a header out of an accumulated, already
/// decrypted byte buffer.
pub enum ParseOutcome {
    /// A complete header was found. `consumed` is the number of bytes (out
    /// of the input slice) the header occupied; anything after that in the
    /// same read is payload and must be preserved for the client→upstream
    /// buffer.
    Complete { address: Address, consumed: usize },

    /// Not enough bytes yet; the caller should read more and try again.
    Incomplete,
}

/// Attempts to parse a complete address header from the front of `buf`.
///
/// `buf` must already be plaintext (decrypted). Returns
/// [`ParseOutcome::Incomplete`] if `buf` is a valid prefix of some header but
/// doesn't yet contain it in full; returns `Err` only for data that can
/// never become a valid header (bad ATYP, or a domain length that would
/// require more bytes than the header cap allows — checked by the caller).
pub fn parse(buf: &[u8]) -> Result<ParseOutcome, Error> {
    if buf.is_empty() {
        return Ok(ParseOutcome::Incomplete);
    }

    let atyp = buf[0];
    match atyp {
        ATYP_IPV4 => {
            const LEN: usize = 1 + 4 + 2;
            if buf.len() < LEN {
                return Ok(ParseOutcome::Incomplete);
            }
            let octets = [buf[1], buf[2], buf[3], buf[4]];
            let port = u16::from_be_bytes([buf[5], buf[6]]);
            Ok(ParseOutcome::Complete {
                address: Address::Ipv4(Ipv4Addr::from(octets), port),
                consumed: LEN,
            })
        }
        ATYP_DOMAIN => {
            if buf.len() < 2 {
                return Ok(ParseOutcome::Incomplete);
            }
            let name_len = buf[1] as usize;
            if name_len == 0 {
                return Err(Error::Protocol("zero-length domain name"));
            }
            let len = 1 + 1 + name_len + 2;
            if buf.len() < len {
                return Ok(ParseOutcome::Incomplete);
            }
            let name_bytes = &buf[2..2 + name_len];
            let name = std::str::from_utf8(name_bytes)
                .map_err(|_| Error::Protocol("domain name is not valid UTF-8"))?
                .to_string();
            let port_off = 2 + name_len;
            let port = u16::from_be_bytes([buf[port_off], buf[port_off + 1]]);
            Ok(ParseOutcome::Complete {
                address: Address::Domain(name, port),
                consumed: len,
            })
        }
        ATYP_IPV6 => {
            const LEN: usize = 1 + 16 + 2;
            if buf.len() < LEN {
                return Ok(ParseOutcome::Incomplete);
            }
            let mut octets = [0u8; 16];
            octets.copy_from_slice(&buf[1..17]);
            let port = u16::from_be_bytes([buf[17], buf[18]]);
            Ok(ParseOutcome::Complete {
                address: Address::Ipv6(Ipv6Addr::from(octets), port),
                consumed: LEN,
            })
        }
        other => Err(Error::Protocol(match other {
            2 => "ATYP 2 is reserved",
            _ => "unsupported address type",
        })),
    }
}
