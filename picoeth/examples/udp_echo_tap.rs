//! Echoes udp datagrams and tcp data on a tap interface.
//!
//! # Usage
//!
//! 1. Setup the tap interface, named `tap0` here:
//!
//!   > $ ip tuntap add mode tap name tap0
//! 2. Assign an address on the host system
//!
//!   > $ ip addr add 10.0.0.2/24 dev tap0
//! 3. Bring up the interface on the host
//!
//!   > $ ip link set up dev tap0
//! 4. Start the example with an address in the same subnet.
//!
//!   > $ cargo run --example udp_echo_tap -- tap0 02:00:00:00:00:01 10.0.0.1 255.255.255.0 10.0.0.2
//! 5. Talk to it, answers arrive on the echo port.
//!
//!   > $ nc -u 10.0.0.1 7
//!   > $ nc 10.0.0.1 7
//!
//! Each datagram is answered on its own, the udp session of a peer ends with the answer.
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use structopt::StructOpt;

use picoeth::config::Config;
use picoeth::layer::{tcp, udp, Stack, Storage};
use picoeth::nic::Device;
use picoeth::nic::tap::TapInterface;
use picoeth::time::{Delay, ThreadSleep, Ticker};
use picoeth::wire::{EthernetAddress, Ipv4Address};

/// The echo protocol of RFC 862.
const ECHO_PORT: u16 = 7;

struct Echo;

impl<D: Device> udp::Application<D> for Echo {
    fn on_open(&mut self, _: udp::Socket, remote_addr: Ipv4Address) {
        println!("udp: new peer {}", remote_addr);
    }

    fn on_handle(&mut self, mut packet: udp::Packet<D>) {
        let socket = packet.socket();
        let len = packet.payload().len();
        let stack = packet.stack();

        // The payload is already in place for the answer.
        let started = stack.udp_start_packet(socket).map(|_| ());
        if let Err(err) = started.and_then(|()| stack.udp_send(len)) {
            println!("udp: echo failed: {}", err);
        }
        // Free the slot for the next peer.
        let _ = stack.udp_disconnect(socket);
    }
}

struct StreamEcho;

impl<D: Device> tcp::Application<D> for StreamEcho {
    fn on_open(&mut self, socket: tcp::Socket, remote_addr: Ipv4Address) {
        println!("tcp: {:?} connected from {}", socket, remote_addr);
    }

    fn on_close(&mut self, socket: tcp::Socket) {
        println!("tcp: {:?} closed", socket);
    }

    fn on_handle(&mut self, packet: tcp::Packet<D>) {
        let len = packet.payload().len();
        if let Err(err) = packet.reply(len) {
            println!("tcp: echo failed: {}", err);
        }
    }
}

fn main() {
    let Options {
        name,
        mac,
        host,
        netmask,
        gateway,
    } = Options::from_args();

    let interface = TapInterface::new(&name, mac)
        .expect("Couldn't initialize interface");

    let ticker = Ticker::new();
    let start = Instant::now();
    let mut delay = |ms: u32| ThreadSleep.delay_ms(ms);

    let mut echo = Echo;
    let mut stream_echo = StreamEcho;

    let mut buffer = [0; 1514];
    let mut neighbors = [None; 8];
    let mut udp_sessions = [None; 8];
    let mut udp_applications: [Option<&mut dyn udp::Application<_>>; 1] = Default::default();
    let mut udp_ports = [None; 2];
    let mut tcp_sessions = [None; 4];
    let mut tcp_applications: [Option<&mut dyn tcp::Application<_>>; 1] = Default::default();
    let mut tcp_ports = [None; 2];

    let seed = SystemTime::now().duration_since(UNIX_EPOCH)
        .map(|time| time.as_nanos() as u64)
        .unwrap_or(0) ^ u64::from(mac.0[5]);
    let config = Config::new(host, netmask, gateway).with_random_seed(seed);
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

    let echo = stack.udp_register(&mut echo)
        .expect("Couldn't register the udp echo");
    stack.udp_open_port(ECHO_PORT, 1000, echo)
        .expect("Couldn't open the udp port");
    let stream_echo = stack.tcp_register(&mut stream_echo)
        .expect("Couldn't register the tcp echo");
    stack.tcp_open_port(ECHO_PORT, 1000, stream_echo)
        .expect("Couldn't open the tcp port");
    println!("Echoing on {}:{}", host, ECHO_PORT);

    let mut last_second = 0;
    loop {
        let now = start.elapsed().as_millis() as i64;
        while stack.ticker().now().total_millis() < now {
            stack.ticker().tick_millisecond();
        }

        stack.update();
        if let Some(err) = stack.device_mut().last_err() {
            panic!("Error during receive {:?}", err);
        }

        let second = now / 1000;
        if second != last_second {
            last_second = second;
            println!("{} udp sessions, {} tcp sessions",
                stack.udp().session_count(), stack.tcp().session_count());
        }
        ThreadSleep.delay_ms(1);
    }
}

#[derive(StructOpt)]
struct Options {
    /// The tap interface.
    name: String,
    /// Our hardware address.
    mac: EthernetAddress,
    /// Our address.
    host: Ipv4Address,
    netmask: Ipv4Address,
    /// The gateway for everything outside the subnet.
    gateway: Ipv4Address,
}
