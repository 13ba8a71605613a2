//! Relay addresses: IPv4 or IPv6 plus port, with textual and wire codecs.
//!
//! The wire form is a fixed 19 bytes: one tag byte followed by 16 bytes of
//! address payload and the port, little-endian. IPv4 uses the first 4 payload
//! bytes then the port then 12 zero bytes; IPv6 uses eight 16-bit groups in
//! host byte order then the port; the none variant zeroes the trailing 18.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::str::FromStr;

use crate::error::{RelayError, Result};
use crate::wire::{WireReader, WireWriter};

pub const ADDRESS_BYTES: usize = 19;
pub const MAX_ADDRESS_STRING_LENGTH: usize = 256;

const ADDRESS_NONE: u8 = 0;
const ADDRESS_IPV4: u8 = 1;
const ADDRESS_IPV6: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressData {
    None,
    Ipv4([u8; 4]),
    /// Eight 16-bit groups in host byte order.
    Ipv6([u16; 8]),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayAddress {
    pub data: AddressData,
    pub port: u16,
}

impl Default for RelayAddress {
    fn default() -> Self {
        Self { data: AddressData::None, port: 0 }
    }
}

impl RelayAddress {
    pub const NONE: RelayAddress = RelayAddress { data: AddressData::None, port: 0 };

    pub fn ipv4(octets: [u8; 4], port: u16) -> Self {
        Self { data: AddressData::Ipv4(octets), port }
    }

    pub fn ipv6(groups: [u16; 8], port: u16) -> Self {
        Self { data: AddressData::Ipv6(groups), port }
    }

    pub fn is_none(&self) -> bool {
        self.data == AddressData::None
    }

    pub fn to_socket_addr(&self) -> Option<SocketAddr> {
        match self.data {
            AddressData::None => None,
            AddressData::Ipv4(octets) => {
                Some(SocketAddr::new(IpAddr::V4(Ipv4Addr::from(octets)), self.port))
            }
            AddressData::Ipv6(groups) => {
                Some(SocketAddr::new(IpAddr::V6(Ipv6Addr::from(groups)), self.port))
            }
        }
    }

    pub fn write(&self, writer: &mut WireWriter<'_>) -> Result<()> {
        match self.data {
            AddressData::Ipv4(octets) => {
                writer.write_u8(ADDRESS_IPV4)?;
                writer.write_bytes(&octets)?;
                writer.write_u16(self.port)?;
                writer.write_bytes(&[0u8; 12])?;
            }
            AddressData::Ipv6(groups) => {
                writer.write_u8(ADDRESS_IPV6)?;
                for group in groups {
                    writer.write_u16(group)?;
                }
                writer.write_u16(self.port)?;
            }
            AddressData::None => {
                writer.write_bytes(&[0u8; ADDRESS_BYTES])?;
            }
        }
        Ok(())
    }

    pub fn read(reader: &mut WireReader<'_>) -> Result<Self> {
        let tag = reader.read_u8()?;
        match tag {
            ADDRESS_IPV4 => {
                let bytes = reader.read_bytes(4)?;
                let octets = [bytes[0], bytes[1], bytes[2], bytes[3]];
                let port = reader.read_u16()?;
                reader.read_bytes(12)?;
                Ok(Self::ipv4(octets, port))
            }
            ADDRESS_IPV6 => {
                let mut groups = [0u16; 8];
                for group in &mut groups {
                    *group = reader.read_u16()?;
                }
                let port = reader.read_u16()?;
                Ok(Self::ipv6(groups, port))
            }
            ADDRESS_NONE => {
                reader.read_bytes(ADDRESS_BYTES - 1)?;
                Ok(Self::NONE)
            }
            _ => Err(RelayError::Address(format!("unknown address tag {tag}"))),
        }
    }
}

impl From<SocketAddr> for RelayAddress {
    fn from(addr: SocketAddr) -> Self {
        match addr.ip() {
            IpAddr::V4(ip) => Self::ipv4(ip.octets(), addr.port()),
            IpAddr::V6(ip) => Self::ipv6(ip.segments(), addr.port()),
        }
    }
}

impl FromStr for RelayAddress {
    type Err = RelayError;

    /// Accepts `a.b.c.d`, `a.b.c.d:port`, `[v6]`, `[v6]:port` and bare `v6`.
    fn from_str(input: &str) -> Result<Self> {
        if input.len() >= MAX_ADDRESS_STRING_LENGTH {
            return Err(RelayError::Address(format!("address too long ({})", input.len())));
        }

        if let Some(rest) = input.strip_prefix('[') {
            let (inner, tail) = rest
                .split_once(']')
                .ok_or_else(|| RelayError::Address(input.to_string()))?;
            let port = match tail.strip_prefix(':') {
                Some(port_text) => port_text
                    .parse::<u16>()
                    .map_err(|_| RelayError::Address(input.to_string()))?,
                None if tail.is_empty() => 0,
                None => return Err(RelayError::Address(input.to_string())),
            };
            let ip = Ipv6Addr::from_str(inner)
                .map_err(|_| RelayError::Address(input.to_string()))?;
            return Ok(Self::ipv6(ip.segments(), port));
        }

        // a bare IPv6 literal has no port
        if let Ok(ip) = Ipv6Addr::from_str(input) {
            return Ok(Self::ipv6(ip.segments(), 0));
        }

        let (host, port) = match input.rsplit_once(':') {
            Some((host, port_text)) => {
                let port = port_text
                    .parse::<u16>()
                    .map_err(|_| RelayError::Address(input.to_string()))?;
                (host, port)
            }
            None => (input, 0),
        };

        let ip = Ipv4Addr::from_str(host)
            .map_err(|_| RelayError::Address(input.to_string()))?;
        Ok(Self::ipv4(ip.octets(), port))
    }
}

impl fmt::Display for RelayAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.data {
            AddressData::Ipv4(octets) => {
                let ip = Ipv4Addr::from(octets);
                if self.port != 0 {
                    write!(f, "{ip}:{}", self.port)
                } else {
                    write!(f, "{ip}")
                }
            }
            AddressData::Ipv6(groups) => {
                let ip = Ipv6Addr::from(groups);
                if self.port != 0 {
                    write!(f, "[{ip}]:{}", self.port)
                } else {
                    write!(f, "{ip}")
                }
            }
            AddressData::None => write!(f, "NONE"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_ipv4_with_port() {
        let address: RelayAddress = "107.77.207.77:40000".parse().unwrap();
        assert_eq!(address.data, AddressData::Ipv4([107, 77, 207, 77]));
        assert_eq!(address.port, 40000);
        assert_eq!(address.to_string(), "107.77.207.77:40000");
    }

    #[test]
    fn parse_ipv4_without_port() {
        let address: RelayAddress = "127.0.0.1".parse().unwrap();
        assert_eq!(address.data, AddressData::Ipv4([127, 0, 0, 1]));
        assert_eq!(address.port, 0);
        assert_eq!(address.to_string(), "127.0.0.1");
    }

    #[test]
    fn parse_ipv6_with_port() {
        let address: RelayAddress = "[fe80::202:b3ff:fe1e:8329]:40000".parse().unwrap();
        assert_eq!(
            address.data,
            AddressData::Ipv6([0xfe80, 0, 0, 0, 0x0202, 0xb3ff, 0xfe1e, 0x8329])
        );
        assert_eq!(address.port, 40000);
        assert_eq!(address.to_string(), "[fe80::202:b3ff:fe1e:8329]:40000");
    }

    #[test]
    fn parse_bare_ipv6() {
        let address: RelayAddress = "::1".parse().unwrap();
        assert_eq!(address.data, AddressData::Ipv6([0, 0, 0, 0, 0, 0, 0, 1]));
        assert_eq!(address.port, 0);
        assert_eq!(address.to_string(), "::1");
    }

    #[test]
    fn parse_bracketed_ipv6_without_port() {
        let address: RelayAddress = "[::1]".parse().unwrap();
        assert_eq!(address.data, AddressData::Ipv6([0, 0, 0, 0, 0, 0, 0, 1]));
        assert_eq!(address.port, 0);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!("not an address".parse::<RelayAddress>().is_err());
        assert!("300.1.2.3:80".parse::<RelayAddress>().is_err());
        assert!("[::1]:notaport".parse::<RelayAddress>().is_err());
    }

    #[test]
    fn display_none() {
        assert_eq!(RelayAddress::NONE.to_string(), "NONE");
    }

    fn wire_round_trip(address: RelayAddress) -> RelayAddress {
        let mut buf = [0u8; ADDRESS_BYTES];
        let mut writer = WireWriter::new(&mut buf);
        address.write(&mut writer).unwrap();
        assert_eq!(writer.position(), ADDRESS_BYTES);
        RelayAddress::read(&mut WireReader::new(&buf)).unwrap()
    }

    #[test]
    fn wire_form_round_trips() {
        for address in [
            RelayAddress::NONE,
            RelayAddress::ipv4([127, 0, 0, 1], 40000),
            RelayAddress::ipv6([0xfe80, 0, 0, 0, 0x0202, 0xb3ff, 0xfe1e, 0x8329], 40000),
        ] {
            assert_eq!(wire_round_trip(address), address);
        }
    }

    #[test]
    fn wire_form_is_19_bytes_for_every_variant() {
        let mut buf = [0u8; ADDRESS_BYTES];
        let address = RelayAddress::ipv4([1, 2, 3, 4], 0x1234);
        address.write(&mut WireWriter::new(&mut buf)).unwrap();
        // tag, 4 octets, port little-endian, 12 zero bytes
        assert_eq!(&buf[..7], &[1, 1, 2, 3, 4, 0x34, 0x12]);
        assert!(buf[7..].iter().all(|&b| b == 0));
    }

    #[test]
    fn socket_addr_conversion() {
        let address: RelayAddress = "127.0.0.1:9000".parse().unwrap();
        let socket = address.to_socket_addr().unwrap();
        assert_eq!(RelayAddress::from(socket), address);
        assert!(RelayAddress::NONE.to_socket_addr().is_none());
    }
}
