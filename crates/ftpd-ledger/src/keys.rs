use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Raw network-order source address: 4 bytes for IPv4 peers, 16 for IPv6.
///
/// The width is fixed per listener, so all keys in one ledger compare with
/// the same length.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawAddr {
    len: u8,
    octets: [u8; 16],
}

impl RawAddr {
    pub fn v4(octets: [u8; 4]) -> Self {
        let mut buf = [0u8; 16];
        buf[..4].copy_from_slice(&octets);
        Self {
            len: 4,
            octets: buf,
        }
    }

    pub fn v6(octets: [u8; 16]) -> Self {
        Self { len: 16, octets }
    }

    pub fn from_ip(ip: IpAddr) -> Self {
        match ip {
            IpAddr::V4(v4) => Self::v4(v4.octets()),
            IpAddr::V6(v6) => Self::v6(v6.octets()),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.octets[..self.len as usize]
    }

    pub fn to_ip(&self) -> IpAddr {
        if self.len == 4 {
            let [a, b, c, d, ..] = self.octets;
            IpAddr::V4(Ipv4Addr::new(a, b, c, d))
        } else {
            IpAddr::V6(Ipv6Addr::from(self.octets))
        }
    }
}

impl From<IpAddr> for RawAddr {
    fn from(ip: IpAddr) -> Self {
        Self::from_ip(ip)
    }
}

impl fmt::Display for RawAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.to_ip(), f)
    }
}

impl fmt::Debug for RawAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawAddr({})", self.to_ip())
    }
}

/// Process id of a launched worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(pub u32);

impl WorkerId {
    pub fn from_pid(pid: i32) -> Self {
        WorkerId(pid as u32)
    }

    pub fn as_pid(self) -> i32 {
        self.0 as i32
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// XORs the address bytes into a 32-bit accumulator, shifting each byte by
/// 24, 16, 8, 0 in turn, then reduces modulo the bucket count.
pub fn hash_address(buckets: u32, addr: &RawAddr) -> u32 {
    let mut val: u32 = 0;
    let mut shift: i32 = 24;
    for &b in addr.as_bytes() {
        val ^= u32::from(b) << shift;
        shift -= 8;
        if shift < 0 {
            shift = 24;
        }
    }
    val % buckets.max(1)
}

pub fn hash_worker_id(buckets: u32, id: &WorkerId) -> u32 {
    id.0 % buckets.max(1)
}
