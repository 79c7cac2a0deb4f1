// Copyright (C) 2016 whitequark@whitequark.org
// Copyright (C) 2019 Andreas Molzer <andreas.molzer@tum.de>
//
// in large parts from `smoltcp` originally distributed under 0-clause BSD
//! A Linux tap interface as a device, to run the stack against a host kernel.
#![allow(unsafe_code)]
use std::os::unix::io::{AsRawFd, RawFd};

use crate::wire::EthernetAddress;
use super::{Device, Error, Result};

/// An errno value, as returned by failed libc calls.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct Errno(pub libc::c_int);

impl Errno {
    fn last() -> Errno {
        Errno(unsafe { *libc::__errno_location() })
    }
}

impl From<Errno> for std::io::Error {
    fn from(err: Errno) -> std::io::Error {
        std::io::Error::from_raw_os_error(err.0)
    }
}

/// Base for an if ioctl request, the name of the interface.
#[repr(C)]
#[allow(non_camel_case_types)]
#[derive(Clone, Copy, Debug)]
struct ifreq {
    ifr_name: [libc::c_char; libc::IF_NAMESIZE],
}

impl ifreq {
    const TUNSETIFF: libc::Ioctl = 0x400454CA;
    const IFF_TAP:   libc::c_int = 0x0002;
    const IFF_NO_PI: libc::c_int = 0x1000;

    fn new(name: &str) -> Self {
        let mut ifr_name = [0; libc::IF_NAMESIZE];
        // Keep the terminating zero.
        for (slot, byte) in ifr_name.iter_mut().zip(name.bytes().take(libc::IF_NAMESIZE - 1)) {
            *slot = byte as libc::c_char;
        }
        ifreq { ifr_name }
    }

    /// Attach the file descriptor to the named tap, creating it if necessary.
    fn tun_set_tap(&mut self, fd: libc::c_int) -> std::result::Result<(), Errno> {
        #[repr(C)]
        struct Request {
            interface: ifreq,
            kind: libc::c_int,
        }

        let mut request = Request {
            interface: *self,
            kind: Self::IFF_TAP | Self::IFF_NO_PI,
        };

        let res = unsafe {
            libc::ioctl(fd, Self::TUNSETIFF, &mut request as *mut _)
        };

        if res == -1 {
            return Err(Errno::last());
        }
        Ok(())
    }
}

/// A tap interface with a fixed hardware address for our side.
///
/// Receiving is non-blocking, a read without a queued frame is reported as no frame. The link is
/// always up.
#[derive(Debug)]
pub struct TapInterface {
    lower: libc::c_int,
    ifreq: ifreq,
    mac: EthernetAddress,
    last_err: Option<Errno>,
}

static TAP_PATH: &[u8] = b"/dev/net/tun\0";

impl TapInterface {
    /// Open the named tap, our frames will carry the given source address.
    pub fn new(name: &str, mac: EthernetAddress) -> std::result::Result<Self, Errno> {
        let mut ifreq = ifreq::new(name);
        let lower = Self::open()?;
        if let Err(err) = ifreq.tun_set_tap(lower) {
            unsafe { libc::close(lower); }
            return Err(err);
        }

        Ok(TapInterface {
            lower,
            ifreq,
            mac,
            last_err: None,
        })
    }

    /// Take the last io error returned by the OS.
    pub fn last_err(&mut self) -> Option<Errno> {
        self.last_err.take()
    }

    fn open() -> std::result::Result<libc::c_int, Errno> {
        let lower = unsafe {
            libc::open(
                TAP_PATH.as_ptr() as *const libc::c_char,
                libc::O_RDWR | libc::O_NONBLOCK)
        };
        if lower == -1 {
            return Err(Errno::last());
        }
        Ok(lower)
    }

    fn store_err(&mut self, err: Errno) -> Error {
        self.last_err = Some(err);
        // The os error is kept for inspection, the stack only needs to know it failed.
        Error::Illegal
    }
}

impl AsRawFd for TapInterface {
    fn as_raw_fd(&self) -> RawFd {
        self.lower
    }
}

impl Drop for TapInterface {
    fn drop(&mut self) {
        unsafe { libc::close(self.lower); }
    }
}

impl Device for TapInterface {
    fn send(&mut self, frame: &[u8]) -> Result<()> {
        let len = unsafe {
            libc::write(
                self.lower,
                frame.as_ptr() as *const libc::c_void,
                frame.len())
        };
        if len == -1 {
            let err = Errno::last();
            return Err(self.store_err(err));
        }
        Ok(())
    }

    fn receive(&mut self, buffer: &mut [u8]) -> Result<usize> {
        let len = unsafe {
            libc::read(
                self.lower,
                buffer.as_mut_ptr() as *mut libc::c_void,
                buffer.len())
        };
        if len == -1 {
            let err = Errno::last();
            if err.0 == libc::EWOULDBLOCK {
                return Ok(0);
            }
            return Err(self.store_err(err));
        }
        Ok(len as usize)
    }

    fn mac_address(&self) -> EthernetAddress {
        self.mac
    }

    fn link_status(&mut self) -> bool {
        true
    }

    /// Reopen the file descriptor on the same interface.
    fn reinitialize(&mut self) {
        let lower = match Self::open() {
            Ok(lower) => lower,
            Err(err) => {
                self.last_err = Some(err);
                return;
            },
        };

        match self.ifreq.tun_set_tap(lower) {
            Ok(()) => {
                unsafe { libc::close(self.lower); }
                self.lower = lower;
            },
            Err(err) => {
                unsafe { libc::close(lower); }
                self.last_err = Some(err);
            },
        }
    }
}
