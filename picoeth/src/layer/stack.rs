use crate::config::Config;
use crate::nic::Device;
use crate::rand::Xoroshiro256;
use crate::time::{Delay, Instant, Ticker};
use super::{arp, dhcp, dns, ntp, tcp, udp};
use super::{Error, Result};

/// The memory of a stack, provided by the caller.
///
/// The length of each slice is the capacity of the respective table, and the buffer should be
/// able to hold a complete frame of the link. Previous content is discarded.
///
/// ```rust
/// use picoeth::config::Config;
/// use picoeth::layer::{udp, tcp, Stack, Storage};
/// use picoeth::nic::external::External;
/// use picoeth::time::Ticker;
/// use picoeth::wire::EthernetAddress;
///
/// let ticker = Ticker::new();
/// let mut delay = |_: u32| ticker.tick_millisecond();
/// let mut buffer = [0; 1514];
/// let mut neighbors = [None; 8];
/// let mut udp_sessions = [None; 4];
/// let mut udp_applications: [Option<&mut dyn udp::Application<_>>; 2] = Default::default();
/// let mut udp_ports = [None; 4];
/// let mut tcp_sessions = [None; 4];
/// let mut tcp_applications: [Option<&mut dyn tcp::Application<_>>; 2] = Default::default();
/// let mut tcp_ports = [None; 4];
///
/// let nic = External::new(EthernetAddress([2, 0, 0, 0, 0, 1]));
/// let stack = Stack::new(nic, Config::default(), Storage {
///     buffer: &mut buffer[..],
///     neighbors: &mut neighbors[..],
///     udp_sessions: &mut udp_sessions[..],
///     udp_applications: &mut udp_applications[..],
///     udp_ports: &mut udp_ports[..],
///     tcp_sessions: &mut tcp_sessions[..],
///     tcp_applications: &mut tcp_applications[..],
///     tcp_ports: &mut tcp_ports[..],
///     ticker: &ticker,
///     delay: &mut delay,
/// });
/// # drop(stack);
/// ```
pub struct Storage<'a, D> {
    /// The single frame buffer.
    pub buffer: &'a mut [u8],
    /// The arp cache.
    pub neighbors: &'a mut [Option<arp::Neighbor>],
    /// The udp sessions.
    pub udp_sessions: &'a mut [Option<udp::Session>],
    /// The registered udp applications.
    pub udp_applications: &'a mut [Option<&'a mut dyn udp::Application<D>>],
    /// The udp port registry, the dhcp, dns and ntp clients occupy entries while they work.
    pub udp_ports: &'a mut [Option<udp::Port>],
    /// The tcp sessions.
    pub tcp_sessions: &'a mut [Option<tcp::Session>],
    /// The registered tcp applications.
    pub tcp_applications: &'a mut [Option<&'a mut dyn tcp::Application<D>>],
    /// The tcp port registry.
    pub tcp_ports: &'a mut [Option<tcp::Port>],
    /// The time source, fed by a timer interrupt.
    pub ticker: &'a Ticker,
    /// Waiting between two polls in blocking operations.
    pub delay: &'a mut dyn Delay,
}

/// The socket a packet is currently staged for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Target {
    Nothing,
    Udp(udp::Socket),
    Tcp(tcp::Socket),
}

/// A complete network stack on one device.
///
/// Holds all protocol state. The stack does nothing by itself, the owner must call [`update`]
/// frequently to process received frames and timers.
///
/// [`update`]: #method.update
pub struct Stack<'a, D> {
    pub(crate) device: D,
    pub(crate) config: Config,
    pub(crate) buffer: &'a mut [u8],
    pub(crate) arp: arp::Cache<'a>,
    pub(crate) udp: udp::Table<'a, D>,
    pub(crate) tcp: tcp::Table<'a, D>,
    pub(crate) dhcp: dhcp::Client<'a>,
    pub(crate) dns: dns::Resolver,
    pub(crate) ntp: ntp::Clock,
    pub(crate) ident: u16,
    pub(crate) prng: Xoroshiro256,
    pub(crate) isn: tcp::IsnGenerator,
    pub(crate) ticker: &'a Ticker,
    pub(crate) delay: &'a mut dyn Delay,
    pub(crate) target: Target,
}

impl<'a, D: Device> Stack<'a, D> {
    /// Assemble a stack from a device, its configuration and memory.
    pub fn new(device: D, config: Config, storage: Storage<'a, D>) -> Self {
        let mut prng = Xoroshiro256::new(config.random_seed);
        let isn = tcp::IsnGenerator::from_rng(&mut prng);
        let ident = prng.next() as u16;

        Stack {
            device,
            config,
            buffer: storage.buffer,
            arp: arp::Cache::new(storage.neighbors, config.arp_lifetime),
            udp: udp::Table::new(storage.udp_sessions, storage.udp_applications, storage.udp_ports),
            tcp: tcp::Table::new(storage.tcp_sessions, storage.tcp_applications, storage.tcp_ports),
            dhcp: dhcp::Client::new(),
            dns: dns::Resolver::new(),
            ntp: ntp::Clock::new(),
            ident,
            prng,
            isn,
            ticker: storage.ticker,
            delay: storage.delay,
            target: Target::Nothing,
        }
    }

    /// Process timers and all frames queued at the device.
    ///
    /// An elapsed second is applied before any frame, first to the arp cache, then to the dhcp
    /// lease and the clock. Frames are then received and dispatched one by one until the device
    /// has none left. A device reporting corruption is reinitialized and the rest of its queue is
    /// left for the next call.
    pub fn update(&mut self) {
        if self.ticker.take_second() {
            self.tick_second();
        }

        loop {
            match self.device.receive(self.buffer) {
                Ok(0) => break,
                Ok(len) => {
                    // The received frame overwrote anything that was staged.
                    self.target = Target::Nothing;
                    let len = len.min(self.buffer.len());
                    self.dispatch(len);
                },
                Err(Error::Corrupted) => {
                    net_warn!("device corrupted, reinitializing");
                    self.target = Target::Nothing;
                    self.device.reinitialize();
                    break;
                },
                Err(err) => {
                    net_trace!("receive failed: {}", err);
                    break;
                },
            }
        }
    }

    fn tick_second(&mut self) {
        self.arp.tick();
        self.dhcp_tick();
        self.ntp_tick();
    }

    /// Poll the link status every millisecond until it is up.
    ///
    /// A `timeout` of zero waits forever.
    pub fn wait_for_link(&mut self, timeout: u32) -> Result<()> {
        let mut timer = 0;
        while !self.device.link_status() {
            if timeout != 0 && timer >= timeout {
                return Err(Error::Timeout);
            }
            self.delay.delay_ms(1);
            timer += 1;
        }
        Ok(())
    }

    /// Query the link status of the device.
    pub fn link_status(&mut self) -> bool {
        self.device.link_status()
    }

    /// The current configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Change the configuration.
    ///
    /// The arp lifetime applies to entries learned from now on.
    pub fn set_config(&mut self, config: Config) {
        self.arp.set_lifetime(config.arp_lifetime);
        self.config = config;
    }

    /// The device.
    pub fn device(&self) -> &D {
        &self.device
    }

    /// The device, mutably.
    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// The arp cache.
    pub fn arp(&self) -> &arp::Cache<'a> {
        &self.arp
    }

    /// The arp cache, mutably, e.g. for static entries.
    pub fn arp_mut(&mut self) -> &mut arp::Cache<'a> {
        &mut self.arp
    }

    /// The udp tables.
    pub fn udp(&self) -> &udp::Table<'a, D> {
        &self.udp
    }

    /// The tcp tables.
    pub fn tcp(&self) -> &tcp::Table<'a, D> {
        &self.tcp
    }

    /// The dhcp client state.
    pub fn dhcp(&self) -> &dhcp::Client<'a> {
        &self.dhcp
    }

    /// The tick source of the stack.
    pub fn ticker(&self) -> &'a Ticker {
        self.ticker
    }

    /// The current time.
    pub fn now(&self) -> Instant {
        self.ticker.now()
    }

    /// One round of a blocking helper: poll, then wait a millisecond.
    pub(crate) fn pump(&mut self) {
        self.update();
        self.delay.delay_ms(1);
    }
}
