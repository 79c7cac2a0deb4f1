//! Fixed capacity tables shared by the udp and tcp layer.
//!
//! Both protocols keep a session table, indexed by the socket handle, a registry of applications
//! and a port registry naming the application bound to each listening port. The memory of all of
//! them is handed in by the caller, the length of the slice is the capacity.
use crate::wire::Ipv4Address;
use super::{Error, Result};

/// The fields identifying a session among all others of its protocol.
pub(crate) trait Endpoint {
    fn remote_addr(&self) -> Ipv4Address;
    fn local_port(&self) -> u16;
    fn remote_port(&self) -> u16;
}

pub(crate) struct Sessions<'a, S> {
    slots: &'a mut [Option<S>],
}

/// A port registration.
///
/// Entries are managed by the stack, the memory for them is provided through [`Storage`].
///
/// [`Storage`]: struct.Storage.html
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Port<H> {
    pub(crate) port: u16,
    pub(crate) timeout: u32,
    pub(crate) handler: H,
}

pub(crate) struct Ports<'a, H> {
    slots: &'a mut [Option<Port<H>>],
}

/// Applications registered for the lifetime of the stack.
///
/// Registrations are never undone, so an index handed out stays valid. An entry is `None` only
/// while the application is lent out to one of its own callbacks.
pub(crate) struct Applications<'a, T: ?Sized> {
    slots: &'a mut [Option<&'a mut T>],
    registered: usize,
}

impl<'a, S: Endpoint> Sessions<'a, S> {
    pub(crate) fn new(slots: &'a mut [Option<S>]) -> Self {
        slots.iter_mut().for_each(|slot| *slot = None);
        Sessions { slots }
    }

    /// Put the session into the first free slot.
    pub(crate) fn insert(&mut self, session: S) -> Result<usize> {
        let index = self.slots.iter()
            .position(Option::is_none)
            .ok_or(Error::Exhausted)?;
        self.slots[index] = Some(session);
        Ok(index)
    }

    pub(crate) fn remove(&mut self, index: usize) -> Option<S> {
        self.slots.get_mut(index)?.take()
    }

    pub(crate) fn get(&self, index: usize) -> Option<&S> {
        self.slots.get(index)?.as_ref()
    }

    pub(crate) fn get_mut(&mut self, index: usize) -> Option<&mut S> {
        self.slots.get_mut(index)?.as_mut()
    }

    /// Find the session of a tuple, as seen from our side.
    pub(crate) fn find(&self, remote_addr: Ipv4Address, local_port: u16, remote_port: u16)
        -> Option<usize>
    {
        self.slots.iter().position(|slot| match slot {
            Some(session) => session.remote_addr() == remote_addr
                && session.local_port() == local_port
                && session.remote_port() == remote_port,
            None => false,
        })
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }
}

impl<H> Port<H> {
    /// The registered port number.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// The timeout of sessions accepted on this port, in milliseconds.
    pub fn timeout(&self) -> u32 {
        self.timeout
    }
}

impl<'a, H> Ports<'a, H> {
    pub(crate) fn new(slots: &'a mut [Option<Port<H>>]) -> Self {
        slots.iter_mut().for_each(|slot| *slot = None);
        Ports { slots }
    }

    /// Register a handler, the first registration of a port wins.
    pub(crate) fn open(&mut self, port: u16, timeout: u32, handler: H) -> Result<()> {
        if port == 0 {
            return Err(Error::Illegal);
        }
        if self.is_open(port) {
            return Err(Error::InUse);
        }
        let slot = self.slots.iter_mut()
            .find(|slot| slot.is_none())
            .ok_or(Error::Exhausted)?;
        *slot = Some(Port { port, timeout, handler });
        Ok(())
    }

    pub(crate) fn close(&mut self, port: u16) -> Option<Port<H>> {
        self.slots.iter_mut()
            .find(|slot| matches!(slot, Some(entry) if entry.port == port))?
            .take()
    }

    pub(crate) fn find(&self, port: u16) -> Option<&Port<H>> {
        self.slots.iter()
            .filter_map(Option::as_ref)
            .find(|entry| entry.port == port)
    }

    pub(crate) fn find_mut(&mut self, port: u16) -> Option<&mut Port<H>> {
        self.slots.iter_mut()
            .filter_map(Option::as_mut)
            .find(|entry| entry.port == port)
    }

    pub(crate) fn is_open(&self, port: u16) -> bool {
        self.find(port).is_some()
    }
}

impl<'a, T: ?Sized> Applications<'a, T> {
    pub(crate) fn new(slots: &'a mut [Option<&'a mut T>]) -> Self {
        slots.iter_mut().for_each(|slot| *slot = None);
        Applications { slots, registered: 0 }
    }

    pub(crate) fn register(&mut self, application: &'a mut T) -> Result<usize> {
        let index = self.registered;
        let slot = self.slots.get_mut(index).ok_or(Error::Exhausted)?;
        *slot = Some(application);
        self.registered += 1;
        Ok(index)
    }

    pub(crate) fn is_registered(&self, index: usize) -> bool {
        index < self.registered
    }

    /// Take an application out for a call, `None` if it is already lent.
    pub(crate) fn take(&mut self, index: usize) -> Option<&'a mut T> {
        self.slots.get_mut(index)?.take()
    }

    /// Return a lent application to its slot.
    pub(crate) fn restore(&mut self, index: usize, application: &'a mut T) {
        if let Some(slot) = self.slots.get_mut(index) {
            *slot = Some(application);
        }
    }
}
