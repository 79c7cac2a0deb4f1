//! A wall clock set by a time server.
//!
//! The clock counts whole seconds since 1900, in local time. It is set from the transmit
//! timestamp of a server response and advanced by the per-second tick of the stack in between.
//! Round trip delay is ignored, the result is good to about a second on a local network.
use core::ops::Range;

use crate::nic::Device;
use crate::time::Countdown;
use crate::wire::{ntp, Ipv4Address};
use super::udp::{self, Service};
use super::{Error, Result, Stack};

/// Seconds until an unanswered request is given up.
const QUERY_LIFETIME: u32 = 5;

/// Milliseconds to wait for the hardware address of the server.
const SERVER_TIMEOUT: u32 = 1000;

/// Days between 1900-01-01 and 1970-01-01.
const UNIX_EPOCH_DAYS: i64 = 25_567;

/// The ntp client and the clock it sets.
pub struct Clock {
    seconds: Option<u32>,
    socket: Option<udp::Socket>,
    query: Countdown,
}

/// A calendar date and time of day.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Date {
    pub year: u16,
    /// From 1 to 12.
    pub month: u8,
    /// From 1 to 31.
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl Clock {
    pub(crate) fn new() -> Self {
        Clock {
            seconds: None,
            socket: None,
            query: Countdown::Disarmed,
        }
    }

    /// Seconds since 1900 in local time, if the clock was ever set.
    pub fn seconds(&self) -> Option<u32> {
        self.seconds
    }

    /// The current date, if the clock was ever set.
    pub fn date(&self) -> Option<Date> {
        self.seconds.map(Date::from_ntp_seconds)
    }

    /// Query whether a request is outstanding.
    pub fn is_querying(&self) -> bool {
        self.query.is_armed()
    }
}

impl Date {
    /// Convert seconds since 1900-01-01 00:00:00 into a date of the proleptic Gregorian calendar.
    pub fn from_ntp_seconds(seconds: u32) -> Self {
        let days = i64::from(seconds / 86_400) - UNIX_EPOCH_DAYS;
        let time = seconds % 86_400;

        // Days to civil, after Howard Hinnant's algorithm.
        let z = days + 719_468;
        let era = (if z >= 0 { z } else { z - 146_096 }) / 146_097;
        let doe = z - era * 146_097;
        let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
        let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
        let mp = (5 * doy + 2) / 153;
        let day = doy - (153 * mp + 2) / 5 + 1;
        let month = if mp < 10 { mp + 3 } else { mp - 9 };
        let year = yoe + era * 400 + if month <= 2 { 1 } else { 0 };

        Date {
            year: year as u16,
            month: month as u8,
            day: day as u8,
            hour: (time / 3600) as u8,
            minute: (time / 60 % 60) as u8,
            second: (time % 60) as u8,
        }
    }
}

impl<'a, D: Device> Stack<'a, D> {
    /// The time server in use, configured or leased.
    pub fn ntp_server(&self) -> Option<Ipv4Address> {
        if !self.config.ntp_server.is_unspecified() {
            return Some(self.config.ntp_server);
        }
        self.dhcp.lease()
            .map(|lease| lease.ntp_server)
            .filter(|addr| !addr.is_unspecified())
    }

    /// Ask the time server for the time.
    ///
    /// Returns after sending, the answer sets the clock from within [`update`]. An unanswered
    /// request is dropped after a few seconds.
    ///
    /// [`update`]: #method.update
    pub fn ntp_refresh(&mut self) -> Result<()> {
        let server = self.ntp_server().ok_or(Error::Unreachable)?;
        if udp::DATA_OFFSET + ntp::PACKET_LEN > self.buffer.len() {
            return Err(Error::BadSize);
        }

        self.ntp_close();
        let socket = self.udp_connect_service(server, ntp::SERVER_PORT, SERVER_TIMEOUT, Service::Ntp, 0)?;
        self.ntp.socket = Some(socket);

        let sent = self.udp_start_packet(socket).and_then(|payload| {
            ntp::ntp::new_unchecked_mut(&mut payload[..ntp::PACKET_LEN]).fill_request();
            Ok(())
        }).and_then(|()| self.udp_send(ntp::PACKET_LEN));

        match sent {
            Ok(()) => {
                net_debug!("ntp: asking {}", server);
                self.ntp.query = Countdown::Seconds(QUERY_LIFETIME - 1);
                Ok(())
            },
            Err(err) => {
                self.ntp_close();
                Err(err)
            },
        }
    }

    /// The current local time.
    pub fn ntp_time(&self) -> Option<Date> {
        self.ntp.date()
    }

    /// Seconds since 1900, local time.
    pub fn ntp_seconds(&self) -> Option<u32> {
        self.ntp.seconds()
    }

    /// Query whether a request is outstanding.
    pub fn ntp_is_querying(&self) -> bool {
        self.ntp.is_querying()
    }

    pub(crate) fn ntp_tick(&mut self) {
        if let Some(seconds) = self.ntp.seconds.as_mut() {
            *seconds = seconds.wrapping_add(1);
        }
        if self.ntp.query.tick() {
            net_debug!("ntp: no answer");
            self.ntp_close();
        }
    }

    pub(crate) fn ntp_receive(&mut self, payload: Range<usize>) {
        let packet = match ntp::ntp::new_checked(&self.buffer[payload]) {
            Ok(packet) => packet,
            Err(err) => {
                net_trace!("ntp: dropped response: {}", err);
                return;
            },
        };

        // Server mode, and a zero timestamp means the server is not synchronized.
        let transmit = packet.transmit_seconds();
        if packet.mode() != 4 || transmit == 0 {
            net_trace!("ntp: ignoring mode {} response", packet.mode());
            return;
        }

        let offset = i64::from(self.config.timezone_offset) * 3600;
        let local = (i64::from(transmit) + offset) as u32;
        self.ntp.seconds = Some(local);
        self.ntp.query = Countdown::Disarmed;
        net_debug!("ntp: clock set to {:?}", Date::from_ntp_seconds(local));
        self.ntp_close();
    }

    fn ntp_close(&mut self) {
        self.ntp.query = Countdown::Disarmed;
        let socket = match self.ntp.socket.take() {
            Some(socket) => socket,
            None => return,
        };
        let ours = match self.udp.get(socket) {
            Some(session) => session.remote_port == ntp::SERVER_PORT
                && matches!(self.udp.ports.find(session.local_port),
                    Some(port) if matches!(port.handler, udp::Binding::Service(Service::Ntp))),
            None => false,
        };
        if ours {
            let _ = self.udp_disconnect(socket);
        }
    }
}

#[cfg(test)]
mod test {
    use crate::wire::{ntp, Ipv4Address};
    use crate::layer::test_util::*;
    use super::*;

    const TIME_SERVER: Ipv4Address = Ipv4Address::new(192, 168, 1, 123);

    /// 2024-01-01 00:00:00.
    const NEW_YEAR_2024: u32 = 3_913_056_000;

    fn server_response(seconds: u32) -> Vec<u8> {
        let mut response = vec![0; ntp::PACKET_LEN];
        response[0] = 0x24;
        response[1] = 2;
        response[40..44].copy_from_slice(&seconds.to_be_bytes());
        response
    }

    #[test]
    fn calendar() {
        assert_eq!(Date::from_ntp_seconds(0), Date {
            year: 1900, month: 1, day: 1, hour: 0, minute: 0, second: 0,
        });
        assert_eq!(Date::from_ntp_seconds(NEW_YEAR_2024), Date {
            year: 2024, month: 1, day: 1, hour: 0, minute: 0, second: 0,
        });
        let leap_day = NEW_YEAR_2024 + 59 * 86_400 + 12 * 3600 + 34 * 60 + 56;
        assert_eq!(Date::from_ntp_seconds(leap_day), Date {
            year: 2024, month: 2, day: 29, hour: 12, minute: 34, second: 56,
        });
    }

    #[test]
    fn refresh_sets_local_time() {
        let config = config().with_ntp_server(TIME_SERVER, 2);
        test_stack!(stack, nic, config);
        stack.arp_mut().add(MAC_ADDR_PEER, TIME_SERVER);

        assert_eq!(stack.ntp_refresh(), Ok(()));
        assert!(stack.ntp_is_querying());

        let sent = stack.device_mut().take_sent();
        assert_eq!(sent.len(), 1);
        let (ip, request, payload) = parse_udp(&sent[0]).unwrap();
        assert_eq!(ip.dst_addr, TIME_SERVER);
        assert_eq!(request.dst_port, ntp::SERVER_PORT);
        assert_eq!(payload.len(), ntp::PACKET_LEN);
        assert_eq!(payload[0], ntp::CLIENT_FLAGS);

        stack.device_mut().push_frame(udp_frame(MAC_ADDR_PEER, MAC_ADDR_HOST,
            TIME_SERVER, IP_ADDR_HOST, ntp::SERVER_PORT, request.src_port,
            &server_response(NEW_YEAR_2024)));
        stack.update();

        assert!(!stack.ntp_is_querying());
        assert_eq!(stack.ntp_seconds(), Some(NEW_YEAR_2024 + 2 * 3600));
        assert_eq!(stack.ntp_time().map(|date| date.hour), Some(2));
        assert_eq!(stack.udp().session_count(), 0);

        stack.ticker().tick_second();
        stack.update();
        assert_eq!(stack.ntp_seconds(), Some(NEW_YEAR_2024 + 2 * 3600 + 1));
    }

    #[test]
    fn unanswered_request_expires() {
        let config = config().with_ntp_server(TIME_SERVER, 0);
        test_stack!(stack, nic, config);
        stack.arp_mut().add(MAC_ADDR_PEER, TIME_SERVER);

        assert_eq!(stack.ntp_refresh(), Ok(()));
        for _ in 0..4 {
            stack.ticker().tick_second();
            stack.update();
            assert!(stack.ntp_is_querying());
        }
        stack.ticker().tick_second();
        stack.update();
        assert!(!stack.ntp_is_querying());
        assert_eq!(stack.ntp_seconds(), None);
        assert_eq!(stack.udp().session_count(), 0);
    }
}
