//! Leases an address on a tap interface, then resolves a name and asks for the time.
//!
//! # Usage
//!
//! Needs a dhcp server on the other side of the tap, e.g. `dnsmasq` bound to the host end.
//!
//! 1. Setup the tap interface, named `tap0` here:
//!
//!   > $ ip tuntap add mode tap name tap0
//! 2. Assign an address on the host system and bring it up
//!
//!   > $ ip addr add 10.0.0.1/24 dev tap0
//!   > $ ip link set up dev tap0
//! 3. Serve addresses on it
//!
//!   > $ dnsmasq -d -i tap0 --dhcp-range=10.0.0.100,10.0.0.150,1h
//! 4. Start the example.
//!
//!   > $ cargo run --example dhcp_tap -- tap0 02:00:00:00:00:01 --resolve example.com
use std::time::Instant;

use structopt::StructOpt;

use picoeth::config::Config;
use picoeth::layer::{tcp, udp, Stack, Storage};
use picoeth::nic::tap::TapInterface;
use picoeth::time::{Delay, ThreadSleep, Ticker};
use picoeth::wire::EthernetAddress;

fn main() {
    let Options {
        name,
        mac,
        hostname,
        resolve,
        seed,
    } = Options::from_args();

    let interface = TapInterface::new(&name, mac)
        .expect("Couldn't initialize interface");

    let ticker = Ticker::new();
    let start = Instant::now();
    let mut delay = |ms: u32| {
        ThreadSleep.delay_ms(ms);
        catch_up(&ticker, start);
    };

    let mut buffer = [0; 1514];
    let mut neighbors = [None; 8];
    let mut udp_sessions = [None; 4];
    let mut udp_applications: [Option<&mut dyn udp::Application<_>>; 1] = Default::default();
    let mut udp_ports = [None; 4];
    let mut tcp_sessions = [None; 1];
    let mut tcp_applications: [Option<&mut dyn tcp::Application<_>>; 1] = Default::default();
    let mut tcp_ports = [None; 1];

    let config = Config::default().with_random_seed(seed);
    let mut stack = Stack::new(interface, config, Storage {
        buffer: &mut buffer[..],
        neighbors: &mut neighbors[..],
        udp_sessions: &mut udp_sessions[..],
        udp_applications: &mut udp_applications[..],
        udp_ports: &mut udp_ports[..],
        tcp_sessions: &mut tcp_sessions[..],
        tcp_applications: &mut tcp_applications[..],
        tcp_ports: &mut tcp_ports[..],
        ticker: &ticker,
        delay: &mut delay,
    });

    let hostname: &'static str = Box::leak(hostname.into_boxed_str());
    let lease = match stack.configure_via_dhcp(Some(hostname), 10_000) {
        Ok(lease) => lease,
        Err(err) => panic!("No lease: {} {:?}", err, stack.device_mut().last_err()),
    };
    println!("Leased {} from {} for {:?} seconds", lease.address, lease.server, lease.duration);
    println!("  netmask {}", lease.netmask);
    println!("  router  {}", lease.router);
    println!("  dns     {}", lease.dns_server);

    if let Some(name) = resolve {
        match stack.dns_query(&name, 2_000) {
            Ok(address) => println!("{} is at {}", name, address),
            Err(err) => println!("Could not resolve {}: {}", name, err),
        }
    }

    if stack.ntp_server().is_some() {
        stack.ntp_refresh().expect("Couldn't ask for the time");
    }

    loop {
        stack.update();
        if let Some(date) = stack.ntp_time() {
            println!("It is {:04}-{:02}-{:02} {:02}:{:02}:{:02}",
                date.year, date.month, date.day, date.hour, date.minute, date.second);
            break;
        }
        if !stack.ntp_is_querying() {
            break;
        }
        ThreadSleep.delay_ms(10);
        catch_up(stack.ticker(), start);
    }

    stack.deinitialize().expect("Couldn't release the lease");
}

/// Feed the ticker with the time that really passed.
fn catch_up(ticker: &Ticker, start: Instant) {
    let now = start.elapsed().as_millis() as i64;
    while ticker.now().total_millis() < now {
        ticker.tick_millisecond();
    }
}

#[derive(StructOpt)]
struct Options {
    /// The tap interface.
    name: String,
    /// Our hardware address.
    mac: EthernetAddress,
    /// The hostname sent to the server.
    #[structopt(long = "hostname", default_value = "picoeth")]
    hostname: String,
    /// A name to resolve once leased.
    #[structopt(long = "resolve")]
    resolve: Option<String>,
    #[structopt(long = "seed", default_value = "1")]
    seed: u64,
}
