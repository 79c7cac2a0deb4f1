//! Static configuration of a stack.
//!
//! Capacities are not configured here. The number of arp entries, sessions and ports, as well as
//! the MTU, are simply the lengths of the memory handed to [`Stack::new`].
//!
//! [`Stack::new`]: ../layer/struct.Stack.html#method.new
use crate::wire::Ipv4Address;

/// Addresses and protocol tuning of one interface.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Config {
    /// Our own address, unspecified until configured or leased.
    pub ip: Ipv4Address,
    /// The netmask of the local subnet.
    pub netmask: Ipv4Address,
    /// The single default gateway, for all destinations outside the local subnet.
    pub gateway: Ipv4Address,
    /// The time-to-live set on all outgoing ip packets.
    pub ttl: u8,
    /// Seconds after which an unrefreshed arp entry is evicted.
    pub arp_lifetime: u16,
    /// Milliseconds between two retransmissions of arp, dhcp, dns and ntp requests.
    pub retransmit_interval: u16,
    /// The name server queried by the dns resolver.
    pub dns_server: Ipv4Address,
    /// The time server queried by the ntp client.
    pub ntp_server: Ipv4Address,
    /// Hours added to the ntp time, for local time.
    pub timezone_offset: i8,
    /// Seed of the generator for ports, transaction ids and sequence number keys.
    pub random_seed: u64,
}

impl Config {
    /// Default time-to-live of outgoing packets.
    pub const DEFAULT_TTL: u8 = 128;

    /// Default arp entry lifetime, in seconds.
    pub const DEFAULT_ARP_LIFETIME: u16 = 30;

    /// Default retransmission interval, in milliseconds.
    pub const DEFAULT_RETRANSMIT: u16 = 500;

    /// A statically configured interface.
    pub fn new(ip: Ipv4Address, netmask: Ipv4Address, gateway: Ipv4Address) -> Self {
        Config {
            ip,
            netmask,
            gateway,
            ..Config::default()
        }
    }

    /// Set the name server.
    pub fn with_dns_server(self, dns_server: Ipv4Address) -> Self {
        Config { dns_server, ..self }
    }

    /// Set the time server and the offset of local time.
    pub fn with_ntp_server(self, ntp_server: Ipv4Address, timezone_offset: i8) -> Self {
        Config { ntp_server, timezone_offset, ..self }
    }

    /// Change the arp entry lifetime.
    pub fn with_arp_lifetime(self, arp_lifetime: u16) -> Self {
        Config { arp_lifetime, ..self }
    }

    /// Change the random seed.
    ///
    /// Should be different on every boot, e.g. taken from an adc noise reading.
    pub fn with_random_seed(self, random_seed: u64) -> Self {
        Config { random_seed, ..self }
    }

    /// Query whether an address is in our subnet.
    pub fn is_local(&self, addr: Ipv4Address) -> bool {
        addr.mask(self.netmask) == self.ip.mask(self.netmask)
    }

    /// The address whose hardware address must be resolved to reach `addr`.
    ///
    /// Everything outside the local subnet goes through the gateway.
    pub fn next_hop(&self, addr: Ipv4Address) -> Ipv4Address {
        if addr.is_broadcast() || self.is_local(addr) {
            addr
        } else {
            self.gateway
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            ip: Ipv4Address::UNSPECIFIED,
            netmask: Ipv4Address::UNSPECIFIED,
            gateway: Ipv4Address::UNSPECIFIED,
            ttl: Config::DEFAULT_TTL,
            arp_lifetime: Config::DEFAULT_ARP_LIFETIME,
            retransmit_interval: Config::DEFAULT_RETRANSMIT,
            dns_server: Ipv4Address::UNSPECIFIED,
            ntp_server: Ipv4Address::UNSPECIFIED,
            timezone_offset: 0,
            random_seed: 0x5eed,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn gateway_redirection() {
        let config = Config::new(
            Ipv4Address::new(192, 168, 1, 20),
            Ipv4Address::new(255, 255, 255, 0),
            Ipv4Address::new(192, 168, 1, 1));

        let neighbor = Ipv4Address::new(192, 168, 1, 77);
        let remote = Ipv4Address::new(10, 0, 0, 1);
        assert_eq!(config.next_hop(neighbor), neighbor);
        assert_eq!(config.next_hop(remote), config.gateway);
        assert_eq!(config.next_hop(Ipv4Address::BROADCAST), Ipv4Address::BROADCAST);
    }
}
