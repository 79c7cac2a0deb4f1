//! The udp layer.
//!
//! Datagrams are correlated into sessions by their tuple of remote address, local port and remote
//! port. A session is created either by connecting to a peer or when a datagram arrives at a port
//! with a registered [`Application`], in which case `on_open` is called before the first
//! `on_handle`.
//!
//! Applications are registered once with [`Stack::udp_register`] and referred to by their
//! [`Handler`] afterwards, so the same application can serve any number of ports and connections
//! one after another.
//!
//! The dhcp, dns and ntp clients of the stack also bind udp ports while they wait for an answer.
//! Their datagrams are handled directly and never create sessions.
//!
//! [`Application`]: trait.Application.html
//! [`Handler`]: struct.Handler.html
//! [`Stack::udp_register`]: ../struct.Stack.html#method.udp_register
use core::ops::Range;

use crate::nic::Device;
use crate::wire::{ipv4, udp, Ipv4Address};
use crate::wire::ipv4::Protocol;
use super::eth::TRANSPORT_OFFSET;
use super::stack::Target;
use super::table::{self, Applications, Endpoint, Ports, Sessions};
use super::{Error, Result, Stack};

/// Start of the udp payload in the buffer.
pub(crate) const DATA_OFFSET: usize = TRANSPORT_OFFSET + udp::HEADER_LEN;

/// A handle to a udp session.
///
/// Handles are reused: after a session has been removed, its handle may refer to a new session
/// that was added later.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Socket(pub(crate) usize);

/// A registered application.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Handler(pub(crate) usize);

/// A udp session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Session {
    /// The address of the peer.
    pub remote_addr: Ipv4Address,
    /// Our port, zero for sessions that only send.
    pub local_port: u16,
    /// The port of the peer.
    pub remote_port: u16,
    /// Milliseconds to wait for address resolution.
    pub timeout: u32,
    /// Whether removing this session also unregisters its local port.
    pub close_port_on_termination: bool,
}

/// A user program bound to a udp port.
///
/// A datagram from an unknown peer creates a session, and that session keeps its slot in the
/// table until it is disconnected. Applications that answer single datagrams should call
/// [`Stack::udp_disconnect`] once they are done with a peer.
///
/// [`Stack::udp_disconnect`]: ../struct.Stack.html#method.udp_disconnect
pub trait Application<D> {
    /// A datagram from a new peer arrived.
    ///
    /// Not called for sessions created by connecting.
    fn on_open(&mut self, _socket: Socket, _remote_addr: Ipv4Address) { }

    /// The session is being disconnected.
    ///
    /// Not called when the application disconnects from within its own callback.
    fn on_close(&mut self, _socket: Socket) { }

    /// A datagram arrived on a session.
    fn on_handle(&mut self, packet: Packet<'_, '_, D>);
}

/// The stack internal clients that use udp.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Service {
    /// The dhcp client.
    Dhcp,
    /// The dns resolver.
    Dns,
    /// The ntp client.
    Ntp,
}

/// The receiver of datagrams to a port.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Binding {
    /// A client of the stack itself.
    Service(Service),
    /// A user application.
    Application(Handler),
}

/// A port registration, see [`Storage`].
///
/// [`Storage`]: ../struct.Storage.html
pub type Port = table::Port<Binding>;

/// The udp session table, application and port registry.
pub struct Table<'a, D> {
    pub(crate) sessions: Sessions<'a, Session>,
    pub(crate) applications: Applications<'a, dyn Application<D> + 'a>,
    pub(crate) ports: Ports<'a, Binding>,
}

/// A received datagram, handed to an application.
///
/// The payload lives in the buffer of the stack. Building a reply with [`reply`] reuses it in
/// place, everything else done through [`stack`] may overwrite it.
///
/// [`reply`]: #method.reply
/// [`stack`]: #method.stack
pub struct Packet<'p, 'a, D> {
    stack: &'p mut Stack<'a, D>,
    socket: Socket,
    remote_addr: Ipv4Address,
    remote_port: u16,
    payload: Range<usize>,
}

impl Socket {
    /// The index of the session in its table.
    pub fn index(self) -> usize {
        self.0
    }
}

impl Endpoint for Session {
    fn remote_addr(&self) -> Ipv4Address {
        self.remote_addr
    }

    fn local_port(&self) -> u16 {
        self.local_port
    }

    fn remote_port(&self) -> u16 {
        self.remote_port
    }
}

impl<'a, D> Table<'a, D> {
    /// Create the tables over some storage, discarding its content.
    pub fn new(
        sessions: &'a mut [Option<Session>],
        applications: &'a mut [Option<&'a mut dyn Application<D>>],
        ports: &'a mut [Option<Port>],
    ) -> Self {
        Table {
            sessions: Sessions::new(sessions),
            applications: Applications::new(applications),
            ports: Ports::new(ports),
        }
    }

    /// Insert a session into the first free slot.
    ///
    /// Fails with `InUse` if a session of the same tuple exists and with `Exhausted` if the table
    /// is full.
    pub fn add_session(&mut self, session: Session) -> Result<Socket> {
        if self.find(session.remote_addr, session.local_port, session.remote_port).is_some() {
            return Err(Error::InUse);
        }
        self.sessions.insert(session).map(Socket)
    }

    /// Remove a session, without any callbacks.
    ///
    /// This does not close the port of the session.
    pub fn remove_session(&mut self, socket: Socket) -> Option<Session> {
        self.sessions.remove(socket.0)
    }

    /// The session of a handle.
    pub fn get(&self, socket: Socket) -> Option<&Session> {
        self.sessions.get(socket.0)
    }

    /// Find the session of a tuple.
    pub fn find(&self, remote_addr: Ipv4Address, local_port: u16, remote_port: u16)
        -> Option<Socket>
    {
        self.sessions.find(remote_addr, local_port, remote_port).map(Socket)
    }

    /// Number of active sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Register an application for the lifetime of the table.
    ///
    /// Fails with `Exhausted` when the application registry is full.
    pub fn register(&mut self, application: &'a mut dyn Application<D>) -> Result<Handler> {
        self.applications.register(application).map(Handler)
    }

    /// Bind a registered application to a port.
    ///
    /// Fails with `InUse` if the port already has a registration, which is left unchanged, with
    /// `Exhausted` if the registry is full and with `Illegal` for an unknown handler.
    pub fn open_port(&mut self, port: u16, timeout: u32, handler: Handler) -> Result<()> {
        if !self.applications.is_registered(handler.0) {
            return Err(Error::Illegal);
        }
        self.ports.open(port, timeout, Binding::Application(handler))
    }

    /// Unregister a port.
    ///
    /// Sessions on the port are kept but nothing will be delivered to them.
    pub fn close_port(&mut self, port: u16) -> bool {
        self.ports.close(port).is_some()
    }

    /// Query whether a port is registered.
    pub fn is_open(&self, port: u16) -> bool {
        self.ports.is_open(port)
    }
}

impl<'p, 'a, D: Device> Packet<'p, 'a, D> {
    /// The session the datagram arrived on.
    pub fn socket(&self) -> Socket {
        self.socket
    }

    /// The source address of the datagram.
    pub fn remote_addr(&self) -> Ipv4Address {
        self.remote_addr
    }

    /// The source port of the datagram.
    pub fn remote_port(&self) -> u16 {
        self.remote_port
    }

    /// The received data.
    pub fn payload(&self) -> &[u8] {
        &self.stack.buffer[self.payload.clone()]
    }

    /// The received data, to be modified into a reply.
    pub fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.stack.buffer[self.payload.clone()]
    }

    /// Send the first `len` bytes at the start of the payload back to the sender.
    ///
    /// The reply may be longer than the received data, up to the end of the buffer.
    pub fn reply(self, len: usize) -> Result<()> {
        if DATA_OFFSET + len > self.stack.buffer.len() {
            return Err(Error::BadSize);
        }
        self.stack.udp_start_packet(self.socket)?;
        self.stack.udp_send(len)
    }

    /// Write a reply to the sender, the closure returns its length.
    pub fn reply_with<F>(self, f: F) -> Result<()>
        where F: FnOnce(&mut [u8]) -> usize
    {
        let payload = self.stack.udp_start_packet(self.socket)?;
        let len = f(payload);
        self.stack.udp_send(len)
    }

    /// Access the stack, e.g. to send to another peer.
    ///
    /// The received payload is lost as soon as something is sent or received.
    pub fn stack(&mut self) -> &mut Stack<'a, D> {
        self.stack
    }
}

impl<'a, D: Device> Stack<'a, D> {
    /// Register a udp application, to be bound to ports and connections by its handler.
    pub fn udp_register(&mut self, application: &'a mut dyn Application<D>) -> Result<Handler> {
        self.udp.register(application)
    }

    /// Bind a registered application to a udp port.
    pub fn udp_open_port(&mut self, port: u16, timeout: u32, handler: Handler) -> Result<()> {
        self.udp.open_port(port, timeout, handler)
    }

    /// Unregister a udp port.
    pub fn udp_close_port(&mut self, port: u16) -> bool {
        self.udp.close_port(port)
    }

    /// Connect to a peer from an ephemeral port.
    ///
    /// With an application handler, a random free port is bound to it for the answers and closed
    /// again when the session is disconnected. The application itself stays registered. Without one, datagrams are sent from port zero. The
    /// hardware address of the peer is resolved before this returns.
    pub fn udp_connect(
        &mut self,
        remote_addr: Ipv4Address,
        remote_port: u16,
        timeout: u32,
        handler: Option<Handler>,
    ) -> Result<Socket> {
        self.udp_connect_ex(remote_addr, remote_port, timeout, handler, 0)
    }

    /// Connect to a peer from a chosen local port.
    ///
    /// A `local_port` of zero picks a random one. Fails with `InUse` if the port is already
    /// registered and with `Illegal` for an unknown handler.
    pub fn udp_connect_ex(
        &mut self,
        remote_addr: Ipv4Address,
        remote_port: u16,
        timeout: u32,
        handler: Option<Handler>,
        local_port: u16,
    ) -> Result<Socket> {
        if let Some(handler) = handler {
            if !self.udp.applications.is_registered(handler.0) {
                return Err(Error::Illegal);
            }
        }
        let binding = handler.map(Binding::Application);
        self.connect_binding(remote_addr, remote_port, timeout, binding, local_port)
    }

    pub(crate) fn udp_connect_service(
        &mut self,
        remote_addr: Ipv4Address,
        remote_port: u16,
        timeout: u32,
        service: Service,
        local_port: u16,
    ) -> Result<Socket> {
        let binding = Some(Binding::Service(service));
        self.connect_binding(remote_addr, remote_port, timeout, binding, local_port)
    }

    fn connect_binding(
        &mut self,
        remote_addr: Ipv4Address,
        remote_port: u16,
        timeout: u32,
        binding: Option<Binding>,
        local_port: u16,
    ) -> Result<Socket> {
        let local_port = match binding {
            Some(binding) => {
                if local_port != 0 && self.udp.ports.is_open(local_port) {
                    return Err(Error::InUse);
                }
                let port = match local_port {
                    0 => self.free_udp_port(),
                    port => port,
                };
                self.udp.ports.open(port, timeout, binding)?;
                port
            },
            None => 0,
        };

        let session = Session {
            remote_addr,
            local_port,
            remote_port,
            timeout,
            close_port_on_termination: true,
        };

        let socket = match self.udp.add_session(session) {
            Ok(socket) => socket,
            Err(err) => {
                if local_port != 0 {
                    self.udp.ports.close(local_port);
                }
                return Err(err);
            },
        };

        if let Err(err) = self.ensure_neighbor(remote_addr, timeout) {
            self.udp_remove(socket);
            return Err(err);
        }

        net_debug!("udp: {:?} connected {}:{} from port {}",
            socket, remote_addr, remote_port, local_port);
        Ok(socket)
    }

    /// Close a session.
    ///
    /// Calls `on_close` of the application on the local port and unregisters the port if the
    /// session was created by connecting.
    pub fn udp_disconnect(&mut self, socket: Socket) -> Result<()> {
        let session = *self.udp.get(socket).ok_or(Error::Illegal)?;
        self.call_udp_application(session.local_port, |app, _| app.on_close(socket));

        // The application may have disconnected on its own.
        if self.udp.get(socket) == Some(&session) {
            self.udp_remove(socket);
        }
        Ok(())
    }

    fn udp_remove(&mut self, socket: Socket) -> Option<Session> {
        let session = self.udp.remove_session(socket)?;
        if session.close_port_on_termination && session.local_port != 0 {
            self.udp.ports.close(session.local_port);
        }
        if self.target == Target::Udp(socket) {
            self.target = Target::Nothing;
        }
        net_debug!("udp: {:?} removed", socket);
        Some(session)
    }

    /// Start a datagram to the peer of a session, returning the payload buffer.
    ///
    /// Resolves the peer first. When that fails the session is disconnected. Complete the packet
    /// with [`udp_send`].
    ///
    /// [`udp_send`]: #method.udp_send
    pub fn udp_start_packet(&mut self, socket: Socket) -> Result<&mut [u8]> {
        let session = *self.udp.get(socket).ok_or(Error::Illegal)?;
        if let Err(err) = self.ensure_neighbor(session.remote_addr, session.timeout) {
            net_debug!("udp: {:?} peer {} unreachable", socket, session.remote_addr);
            let _ = self.udp_disconnect(socket);
            return Err(err);
        }

        self.target = Target::Udp(socket);
        self.buffer.get_mut(DATA_OFFSET..).ok_or(Error::BadSize)
    }

    /// Send the started datagram with `len` bytes of payload.
    pub fn udp_send(&mut self, len: usize) -> Result<()> {
        let socket = match self.target {
            Target::Udp(socket) => socket,
            _ => return Err(Error::Illegal),
        };
        self.target = Target::Nothing;

        let session = *self.udp.get(socket).ok_or(Error::Illegal)?;
        let repr = udp::Repr {
            src_port: session.local_port,
            dst_port: session.remote_port,
            payload_len: len,
        };
        let end = TRANSPORT_OFFSET + repr.buffer_len();
        if end > self.buffer.len() || repr.buffer_len() > usize::from(u16::max_value()) {
            return Err(Error::BadSize);
        }

        repr.emit(
            udp::udp::new_unchecked_mut(&mut self.buffer[TRANSPORT_OFFSET..end]),
            self.config.ip,
            session.remote_addr);
        self.send_ipv4(session.remote_addr, Protocol::Udp, repr.buffer_len())
    }

    /// Send a complete datagram.
    pub fn udp_send_slice(&mut self, socket: Socket, data: &[u8]) -> Result<()> {
        if DATA_OFFSET + data.len() > self.buffer.len() {
            return Err(Error::BadSize);
        }
        let payload = self.udp_start_packet(socket)?;
        payload[..data.len()].copy_from_slice(data);
        self.udp_send(data.len())
    }

    pub(crate) fn receive_udp(&mut self, ip: ipv4::Repr) -> crate::wire::Result<()> {
        let end = TRANSPORT_OFFSET + ip.payload_len;
        let packet = udp::udp::new_checked(&self.buffer[TRANSPORT_OFFSET..end])?;
        let repr = udp::Repr::parse(packet, ip.src_addr, ip.dst_addr)?;
        let payload = DATA_OFFSET..DATA_OFFSET + repr.payload_len;

        let (timeout, service) = match self.udp.ports.find(repr.dst_port) {
            Some(port) => match port.handler {
                Binding::Service(service) => (port.timeout, Some(service)),
                Binding::Application(_) => (port.timeout, None),
            },
            None => {
                net_trace!("udp: nothing on port {}", repr.dst_port);
                return Ok(());
            },
        };

        if let Some(service) = service {
            match service {
                Service::Dhcp => self.dhcp_receive(payload),
                Service::Dns => self.dns_receive(payload),
                Service::Ntp => self.ntp_receive(payload),
            }
            return Ok(());
        }

        let socket = match self.udp.find(ip.src_addr, repr.dst_port, repr.src_port) {
            Some(socket) => socket,
            None => {
                let session = Session {
                    remote_addr: ip.src_addr,
                    local_port: repr.dst_port,
                    remote_port: repr.src_port,
                    timeout,
                    close_port_on_termination: false,
                };
                let socket = match self.udp.add_session(session) {
                    Ok(socket) => socket,
                    Err(err) => {
                        net_trace!("udp: no session for {}: {}", ip.src_addr, err);
                        return Ok(());
                    },
                };

                net_debug!("udp: {:?} accepted from {}:{}", socket, ip.src_addr, repr.src_port);
                let remote_addr = ip.src_addr;
                self.call_udp_application(repr.dst_port, |app, _| app.on_open(socket, remote_addr));
                if self.udp.get(socket) != Some(&session) {
                    return Ok(());
                }
                socket
            },
        };

        let (remote_addr, remote_port) = (ip.src_addr, repr.src_port);
        self.call_udp_application(repr.dst_port, |app, stack| app.on_handle(Packet {
            stack,
            socket,
            remote_addr,
            remote_port,
            payload,
        }));
        Ok(())
    }

    /// Lend the application of a port to a callback.
    ///
    /// The application is taken out of the registry for the duration, datagrams arriving for it
    /// in the meantime are dropped.
    fn call_udp_application<F>(&mut self, port: u16, f: F)
        where F: FnOnce(&mut (dyn Application<D> + 'a), &mut Self)
    {
        let handler = match self.udp.ports.find(port) {
            Some(entry) => match entry.handler {
                Binding::Application(handler) => handler,
                Binding::Service(_) => return,
            },
            None => return,
        };
        let application = match self.udp.applications.take(handler.0) {
            Some(application) => application,
            None => return,
        };

        f(&mut *application, self);
        self.udp.applications.restore(handler.0, application);
    }

    fn free_udp_port(&mut self) -> u16 {
        loop {
            let port = self.prng.ephemeral_port();
            if !self.udp.ports.is_open(port) {
                return port;
            }
        }
    }
}

#[cfg(test)]
mod tests;
