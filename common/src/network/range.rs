use std::net::{IpAddr, Ipv4Addr};

use pnet::ipnetwork::Ipv4Network;

use crate::error::Error;

/// Inclusive IPv4 address interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ipv4Range {
    pub start_addr: Ipv4Addr,
    pub end_addr: Ipv4Addr,
}

impl Ipv4Range {
    pub fn new(start_addr: Ipv4Addr, end_addr: Ipv4Addr) -> Self {
        Self {
            start_addr,
            end_addr,
        }
    }

    pub fn from_network(network: Ipv4Network) -> Self {
        Self::new(network.network(), network.broadcast())
    }

    pub fn len(&self) -> u64 {
        let start: u32 = self.start_addr.into();
        let end: u32 = self.end_addr.into();
        if end < start {
            0
        } else {
            u64::from(end - start) + 1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        self.start_addr <= addr && addr <= self.end_addr
    }

    pub fn to_iter(self) -> impl Iterator<Item = IpAddr> {
        let start: u32 = self.start_addr.into();
        let end: u32 = self.end_addr.into();
        (start..=end).map(|ip| IpAddr::V4(Ipv4Addr::from(ip)))
    }

    /// Smallest set of CIDR blocks covering exactly this range.
    pub fn to_cidrs(&self) -> Vec<Ipv4Network> {
        let mut blocks = Vec::new();
        let mut start = u64::from(u32::from(self.start_addr));
        let end = u64::from(u32::from(self.end_addr));

        while start <= end {
            let align = if start == 0 { 32 } else { start.trailing_zeros().min(32) };
            let mut size_bits = align;
            while size_bits > 0 && start + (1u64 << size_bits) - 1 > end {
                size_bits -= 1;
            }
            let prefix = (32 - size_bits) as u8;
            if let Ok(net) = Ipv4Network::new(Ipv4Addr::from(start as u32), prefix) {
                blocks.push(net);
            }
            start += 1u64 << size_bits;
        }
        blocks
    }

    /// Removes every address covered by `holes`, returning what is left in
    /// ascending order.
    pub fn subtract(&self, holes: &[Ipv4Range]) -> Vec<Ipv4Range> {
        let mut cuts: Vec<(u32, u32)> = holes
            .iter()
            .filter(|hole| hole.end_addr >= self.start_addr && hole.start_addr <= self.end_addr)
            .map(|hole| {
                (
                    u32::from(hole.start_addr.max(self.start_addr)),
                    u32::from(hole.end_addr.min(self.end_addr)),
                )
            })
            .collect();
        cuts.sort_unstable();

        let mut remaining = Vec::new();
        let mut cursor = u64::from(u32::from(self.start_addr));
        let end = u64::from(u32::from(self.end_addr));

        for (cut_start, cut_end) in cuts {
            let (cut_start, cut_end) = (u64::from(cut_start), u64::from(cut_end));
            if cut_start > cursor {
                remaining.push(Ipv4Range::new(
                    Ipv4Addr::from(cursor as u32),
                    Ipv4Addr::from((cut_start - 1) as u32),
                ));
            }
            cursor = cursor.max(cut_end + 1);
        }
        if cursor <= end {
            remaining.push(Ipv4Range::new(
                Ipv4Addr::from(cursor as u32),
                Ipv4Addr::from(end as u32),
            ));
        }
        remaining
    }
}

pub fn cidr_range(ip: Ipv4Addr, prefix: u8) -> Result<Ipv4Range, Error> {
    let network = Ipv4Network::new(ip, prefix)
        .map_err(|e| Error::config(format!("invalid network {ip}/{prefix}: {e}")))?;
    Ok(Ipv4Range::from_network(network))
}

/// Splits `network` into consecutive subnets of `prefix`. Networks that are
/// already that size or smaller come back unchanged.
pub fn split_network(network: Ipv4Network, prefix: u8) -> Vec<Ipv4Network> {
    if network.prefix() >= prefix || prefix > 32 {
        return vec![network];
    }
    let base = u32::from(network.network());
    let step = 1u64 << (32 - prefix);
    let count = 1u64 << (prefix - network.prefix());

    (0..count)
        .filter_map(|i| {
            let addr = Ipv4Addr::from((u64::from(base) + i * step) as u32);
            Ipv4Network::new(addr, prefix).ok()
        })
        .collect()
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
