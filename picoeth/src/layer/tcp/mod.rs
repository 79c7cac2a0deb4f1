//! A minimal tcp.
//!
//! There are no retransmissions and no send queue. A segment is sent directly from the frame
//! buffer and forgotten, received data is only accepted in order and handed to the application
//! immediately. This is enough for request and response protocols on a local network where the
//! peer does the heavy lifting of recovery.
//!
//! Sessions move through the states of [`State`]. Incoming connections are accepted on ports bound
//! to a registered [`Application`], outgoing ones are started with [`Stack::tcp_connect`]. The
//! application is registered once and then named by its [`Handler`].
//!
//! [`State`]: enum.State.html
//! [`Handler`]: struct.Handler.html
//! [`Application`]: trait.Application.html
//! [`Stack::tcp_connect`]: ../struct.Stack.html#method.tcp_connect
use core::ops::Range;

use crate::nic::Device;
use crate::wire::{ipv4, tcp, Ipv4Address};
use crate::wire::ipv4::Protocol;
use crate::wire::tcp::Flags;
use super::eth::TRANSPORT_OFFSET;
use super::stack::Target;
use super::table::{self, Applications, Endpoint, Ports, Sessions};
use super::{Error, Result, Stack};

mod siphash;

pub use self::siphash::IsnGenerator;

/// Start of the tcp payload in the buffer, we never send options with data.
pub(crate) const DATA_OFFSET: usize = TRANSPORT_OFFSET + tcp::HEADER_LEN;

/// A handle to a tcp session.
///
/// Like udp handles these are reused once the session is gone.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Socket(pub(crate) usize);

/// A registered application.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Handler(pub(crate) usize);

/// The state of a tcp session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum State {
    /// We sent a SYN and wait for the SYN-ACK.
    HandshakeOutgoing,
    /// We answered a SYN and wait for the final ACK.
    HandshakeIncoming,
    /// Data flows.
    Connected,
    /// We sent a FIN and wait for the peer's FIN.
    TerminationOutgoing,
    /// We answered the peer's FIN with ours and wait for its ACK.
    TerminationIncoming,
}

/// A tcp session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Session {
    /// The address of the peer.
    pub remote_addr: Ipv4Address,
    /// Our port, ephemeral for outgoing connections.
    pub local_port: u16,
    /// The port of the peer.
    pub remote_port: u16,
    /// Milliseconds to wait for address resolution and the handshake.
    pub timeout: u32,
    /// Whether removing this session also unregisters its local port.
    pub close_port_on_termination: bool,
    /// Where in its lifecycle the connection is.
    pub state: State,
    /// The sequence number of our next byte.
    pub seq_number: u32,
    /// The next sequence number we expect from the peer.
    pub ack_number: u32,
    /// Received data has not been acknowledged yet.
    pub ack_pending: bool,
    /// The peer acknowledged something since our last push.
    pub push_pending: bool,
}

/// A user program bound to a tcp port.
pub trait Application<D> {
    /// A connection was established, in either direction.
    fn on_open(&mut self, _socket: Socket, _remote_addr: Ipv4Address) { }

    /// The connection is being closed, by us or by the peer.
    fn on_close(&mut self, _socket: Socket) { }

    /// In-order data arrived.
    fn on_handle(&mut self, packet: Packet<'_, '_, D>);
}

/// A port registration, see [`Storage`].
///
/// [`Storage`]: ../struct.Storage.html
pub type Port = table::Port<Handler>;

/// The tcp session table, application and port registry.
pub struct Table<'a, D> {
    pub(crate) sessions: Sessions<'a, Session>,
    pub(crate) applications: Applications<'a, dyn Application<D> + 'a>,
    pub(crate) ports: Ports<'a, Handler>,
}

/// Received data, handed to an application.
///
/// Same as for udp the payload is in the stack buffer and only survives until the next send or
/// receive.
pub struct Packet<'p, 'a, D> {
    stack: &'p mut Stack<'a, D>,
    socket: Socket,
    remote_addr: Ipv4Address,
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

impl Session {
    fn same_tuple(&self, other: &Session) -> bool {
        self.remote_addr == other.remote_addr
            && self.local_port == other.local_port
            && self.remote_port == other.remote_port
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

    /// Insert a session, `InUse` for a duplicate tuple and `Exhausted` when full.
    pub fn add_session(&mut self, session: Session) -> Result<Socket> {
        if self.find(session.remote_addr, session.local_port, session.remote_port).is_some() {
            return Err(Error::InUse);
        }
        self.sessions.insert(session).map(Socket)
    }

    /// Remove a session without callbacks or segments.
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

    /// Number of sessions in any state.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Register an application for the lifetime of the table.
    pub fn register(&mut self, application: &'a mut dyn Application<D>) -> Result<Handler> {
        self.applications.register(application).map(Handler)
    }

    /// Bind a registered application to accept connections on a port.
    pub fn open_port(&mut self, port: u16, timeout: u32, handler: Handler) -> Result<()> {
        if !self.applications.is_registered(handler.0) {
            return Err(Error::Illegal);
        }
        self.ports.open(port, timeout, handler)
    }

    /// Stop accepting on a port, established sessions are kept.
    pub fn close_port(&mut self, port: u16) -> bool {
        self.ports.close(port).is_some()
    }

    /// Query whether a port is bound.
    pub fn is_open(&self, port: u16) -> bool {
        self.ports.is_open(port)
    }

    fn same_session(&self, socket: Socket, session: &Session) -> bool {
        match self.get(socket) {
            Some(current) => current.same_tuple(session),
            None => false,
        }
    }
}

impl<'p, 'a, D: Device> Packet<'p, 'a, D> {
    /// The connection the data arrived on.
    pub fn socket(&self) -> Socket {
        self.socket
    }

    /// The address of the peer.
    pub fn remote_addr(&self) -> Ipv4Address {
        self.remote_addr
    }

    /// The received data.
    pub fn payload(&self) -> &[u8] {
        &self.stack.buffer[self.payload.clone()]
    }

    /// The received data, to be modified into a reply.
    pub fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.stack.buffer[self.payload.clone()]
    }

    /// Send the first `len` bytes at the start of the payload on the same connection.
    ///
    /// The acknowledgment of the received data is piggybacked.
    pub fn reply(self, len: usize) -> Result<()> {
        if DATA_OFFSET + len > self.stack.buffer.len() {
            return Err(Error::BadSize);
        }
        self.stack.tcp_start_packet(self.socket)?;
        self.stack.tcp_send(len)
    }

    /// Write a reply, the closure returns its length.
    pub fn reply_with<F>(self, f: F) -> Result<()>
        where F: FnOnce(&mut [u8]) -> usize
    {
        let payload = self.stack.tcp_start_packet(self.socket)?;
        let len = f(payload);
        self.stack.tcp_send(len)
    }

    /// Access the stack, invalidating the received payload.
    pub fn stack(&mut self) -> &mut Stack<'a, D> {
        self.stack
    }
}

impl<'a, D: Device> Stack<'a, D> {
    /// Register a tcp application, to be bound to ports and connections by its handler.
    pub fn tcp_register(&mut self, application: &'a mut dyn Application<D>) -> Result<Handler> {
        self.tcp.register(application)
    }

    /// Bind a registered application to accept connections on a port.
    pub fn tcp_open_port(&mut self, port: u16, timeout: u32, handler: Handler) -> Result<()> {
        self.tcp.open_port(port, timeout, handler)
    }

    /// Stop accepting connections on a port.
    pub fn tcp_close_port(&mut self, port: u16) -> bool {
        self.tcp.close_port(port)
    }

    /// Connect to a peer and wait for the handshake to complete.
    ///
    /// Returns `Timeout` if the peer did not answer within `timeout` milliseconds and
    /// `Unreachable` if it reset the connection. The session is gone in both cases.
    pub fn tcp_connect(
        &mut self,
        remote_addr: Ipv4Address,
        remote_port: u16,
        timeout: u32,
        handler: Handler,
    ) -> Result<Socket> {
        let socket = self.tcp_connect_start(remote_addr, remote_port, timeout, handler)?;
        let session = *self.tcp.get(socket).ok_or(Error::Illegal)?;

        for _ in 0..timeout {
            match self.tcp.get(socket) {
                Some(current) if current.same_tuple(&session)
                    && current.state == State::HandshakeOutgoing => self.pump(),
                _ => break,
            }
        }

        match self.tcp.get(socket) {
            Some(current) if current.same_tuple(&session) => match current.state {
                State::HandshakeOutgoing => {
                    net_debug!("tcp: {:?} handshake timed out", socket);
                    self.tcp_remove(socket);
                    Err(Error::Timeout)
                },
                _ => Ok(socket),
            },
            _ => Err(Error::Unreachable),
        }
    }

    /// Start connecting to a peer without waiting for the answer.
    ///
    /// The application gets `on_open` when the handshake completes, poll [`tcp_state`] to find
    /// out in the meantime.
    ///
    /// [`tcp_state`]: #method.tcp_state
    pub fn tcp_connect_start(
        &mut self,
        remote_addr: Ipv4Address,
        remote_port: u16,
        timeout: u32,
        handler: Handler,
    ) -> Result<Socket> {
        if !self.tcp.applications.is_registered(handler.0) {
            return Err(Error::Illegal);
        }
        let local_port = self.free_tcp_port();
        self.tcp.ports.open(local_port, timeout, handler)?;

        let session = Session {
            remote_addr,
            local_port,
            remote_port,
            timeout,
            close_port_on_termination: true,
            state: State::HandshakeOutgoing,
            seq_number: self.isn.get_isn(self.config.ip, remote_addr, local_port, remote_port, self.now()),
            ack_number: 0,
            ack_pending: false,
            push_pending: false,
        };

        let socket = match self.tcp.add_session(session) {
            Ok(socket) => socket,
            Err(err) => {
                self.tcp.ports.close(local_port);
                return Err(err);
            },
        };

        let sent = self.ensure_neighbor(remote_addr, timeout)
            .and_then(|()| self.send_segment(socket, Flags::SYN, 0, true));
        if let Err(err) = sent {
            self.tcp_remove(socket);
            return Err(err);
        }
        self.tcp_advance(socket, 1);

        net_debug!("tcp: {:?} connecting {}:{} from port {}",
            socket, remote_addr, remote_port, local_port);
        Ok(socket)
    }

    /// The state of a session, `None` if the handle is unused.
    pub fn tcp_state(&self, socket: Socket) -> Option<State> {
        self.tcp.get(socket).map(|session| session.state)
    }

    /// Close a connection.
    ///
    /// Calls `on_close`. An established connection sends its FIN and lingers until the peer's FIN
    /// arrives, a session in any other state is removed right away.
    pub fn tcp_disconnect(&mut self, socket: Socket) -> Result<()> {
        let session = *self.tcp.get(socket).ok_or(Error::Illegal)?;
        self.call_tcp_application(session.local_port, |app, _| app.on_close(socket));

        let session = match self.tcp.get(socket) {
            Some(current) if current.same_tuple(&session) => *current,
            _ => return Ok(()),
        };

        if session.state != State::Connected {
            self.tcp_remove(socket);
            return Ok(());
        }

        self.tcp_set_state(socket, State::TerminationOutgoing);
        if let Err(err) = self.send_segment(socket, Flags::FIN | Flags::ACK, 0, false) {
            self.tcp_remove(socket);
            return Err(err);
        }
        self.tcp_advance(socket, 1);
        net_debug!("tcp: {:?} closing", socket);
        Ok(())
    }

    /// Start a data segment on an established connection, returning the payload buffer.
    ///
    /// If the peer can not be resolved the connection is dropped.
    pub fn tcp_start_packet(&mut self, socket: Socket) -> Result<&mut [u8]> {
        let session = *self.tcp.get(socket).ok_or(Error::Illegal)?;
        if session.state != State::Connected {
            return Err(Error::Illegal);
        }

        if let Err(err) = self.ensure_neighbor(session.remote_addr, session.timeout) {
            net_debug!("tcp: {:?} peer {} unreachable", socket, session.remote_addr);
            self.call_tcp_application(session.local_port, |app, _| app.on_close(socket));
            if self.tcp.same_session(socket, &session) {
                self.tcp_remove(socket);
            }
            return Err(err);
        }

        self.target = Target::Tcp(socket);
        self.buffer.get_mut(DATA_OFFSET..).ok_or(Error::BadSize)
    }

    /// Send the started segment with `len` bytes of data.
    pub fn tcp_send(&mut self, len: usize) -> Result<()> {
        let socket = match self.target {
            Target::Tcp(socket) => socket,
            _ => return Err(Error::Illegal),
        };
        self.target = Target::Nothing;
        self.send_segment(socket, Flags::PSH | Flags::ACK, len, false)
    }

    /// Send some data as one segment.
    pub fn tcp_send_slice(&mut self, socket: Socket, data: &[u8]) -> Result<()> {
        if DATA_OFFSET + data.len() > self.buffer.len() {
            return Err(Error::BadSize);
        }
        let payload = self.tcp_start_packet(socket)?;
        payload[..data.len()].copy_from_slice(data);
        self.tcp_send(data.len())
    }

    pub(crate) fn receive_tcp(&mut self, ip: ipv4::Repr) -> crate::wire::Result<()> {
        let end = TRANSPORT_OFFSET + ip.payload_len;
        let packet = tcp::tcp::new_checked(&self.buffer[TRANSPORT_OFFSET..end])?;
        let repr = tcp::Repr::parse(packet, ip.src_addr, ip.dst_addr)?;
        let header_len = usize::from(packet.header_len());

        let timeout = match self.tcp.ports.find(repr.dst_port) {
            Some(port) => port.timeout,
            None => {
                net_trace!("tcp: nothing on port {}", repr.dst_port);
                return Ok(());
            },
        };

        if header_len != tcp::HEADER_LEN {
            let start = TRANSPORT_OFFSET + header_len;
            self.buffer.copy_within(start..start + repr.payload_len, DATA_OFFSET);
        }

        let socket = match self.tcp.find(ip.src_addr, repr.dst_port, repr.src_port) {
            Some(socket) => socket,
            None => {
                self.tcp_accept(ip.src_addr, &repr, timeout);
                return Ok(());
            },
        };

        if repr.flags.rst() {
            net_debug!("tcp: {:?} reset by peer", socket);
            self.tcp_remove(socket);
            return Ok(());
        }

        let session = match self.tcp.get(socket) {
            Some(session) => *session,
            None => return Ok(()),
        };

        match session.state {
            State::HandshakeOutgoing => self.tcp_handshake_outgoing(socket, session, &repr),
            State::HandshakeIncoming => {
                if repr.flags.ack()
                    && repr.seq_number == session.ack_number
                    && repr.ack_number == session.seq_number
                {
                    self.tcp_set_state(socket, State::Connected);
                    net_debug!("tcp: {:?} accepted from {}", socket, session.remote_addr);
                    let remote_addr = session.remote_addr;
                    self.call_tcp_application(session.local_port, |app, _| app.on_open(socket, remote_addr));
                    if repr.payload_len > 0 || repr.flags.fin() {
                        if let Some(session) = self.tcp.get(socket).copied() {
                            self.tcp_connected(socket, session, &repr);
                        }
                    }
                }
            },
            State::Connected => self.tcp_connected(socket, session, &repr),
            State::TerminationOutgoing => {
                if repr.flags.fin() && repr.ack_number == session.seq_number {
                    let ack_number = repr.seq_number
                        .wrapping_add(repr.payload_len as u32)
                        .wrapping_add(1);
                    if let Some(current) = self.tcp.sessions.get_mut(socket.0) {
                        current.ack_number = ack_number;
                    }
                    if let Err(err) = self.send_segment(socket, Flags::ACK, 0, false) {
                        net_trace!("tcp: {:?} final ack failed: {}", socket, err);
                    }
                    self.tcp_remove(socket);
                }
            },
            State::TerminationIncoming => {
                if repr.flags.ack()
                    && repr.seq_number == session.ack_number
                    && repr.ack_number == session.seq_number
                {
                    self.tcp_remove(socket);
                }
            },
        }

        Ok(())
    }

    /// A segment for an unknown tuple on a listening port.
    fn tcp_accept(&mut self, remote_addr: Ipv4Address, repr: &tcp::Repr, timeout: u32) {
        if !repr.flags.syn() || repr.flags.ack() || repr.flags.rst() {
            net_trace!("tcp: no session for {}:{}", remote_addr, repr.src_port);
            return;
        }

        let local_port = repr.dst_port;
        let session = Session {
            remote_addr,
            local_port,
            remote_port: repr.src_port,
            timeout,
            close_port_on_termination: false,
            state: State::HandshakeIncoming,
            seq_number: self.isn.get_isn(self.config.ip, remote_addr, local_port, repr.src_port, self.now()),
            ack_number: repr.seq_number.wrapping_add(1),
            ack_pending: false,
            push_pending: false,
        };

        let socket = match self.tcp.add_session(session) {
            Ok(socket) => socket,
            Err(err) => {
                net_debug!("tcp: refusing {}: {}", remote_addr, err);
                return;
            },
        };

        if let Err(err) = self.send_segment(socket, Flags::SYN | Flags::ACK, 0, true) {
            net_trace!("tcp: {:?} syn-ack failed: {}", socket, err);
        }
        self.tcp_advance(socket, 1);
    }

    fn tcp_handshake_outgoing(&mut self, socket: Socket, session: Session, repr: &tcp::Repr) {
        if !repr.flags.syn() || (repr.flags.ack() && repr.ack_number != session.seq_number) {
            return;
        }

        if let Some(current) = self.tcp.sessions.get_mut(socket.0) {
            current.ack_number = repr.seq_number.wrapping_add(1);
            current.state = State::Connected;
        }
        if let Err(err) = self.send_segment(socket, Flags::ACK, 0, false) {
            net_trace!("tcp: {:?} handshake ack failed: {}", socket, err);
        }

        net_debug!("tcp: {:?} connected to {}", socket, session.remote_addr);
        let remote_addr = session.remote_addr;
        self.call_tcp_application(session.local_port, |app, _| app.on_open(socket, remote_addr));
    }

    fn tcp_connected(&mut self, socket: Socket, session: Session, repr: &tcp::Repr) {
        if repr.flags.ack() {
            if let Some(current) = self.tcp.sessions.get_mut(socket.0) {
                current.push_pending = true;
            }
        }

        if repr.seq_number != session.ack_number {
            if repr.payload_len > 0 || repr.flags.fin() {
                // Duplicate or out of order, repeat where we are.
                net_trace!("tcp: {:?} unexpected seq {}", socket, repr.seq_number);
                if let Err(err) = self.send_segment(socket, Flags::ACK, 0, false) {
                    net_trace!("tcp: {:?} ack failed: {}", socket, err);
                }
            }
            return;
        }

        if repr.payload_len > 0 {
            if let Some(current) = self.tcp.sessions.get_mut(socket.0) {
                current.ack_number = current.ack_number.wrapping_add(repr.payload_len as u32);
                current.ack_pending = true;
            }

            let payload = DATA_OFFSET..DATA_OFFSET + repr.payload_len;
            let remote_addr = session.remote_addr;
            self.call_tcp_application(session.local_port, |app, stack| app.on_handle(Packet {
                stack,
                socket,
                remote_addr,
                payload,
            }));

            let current = match self.tcp.get(socket) {
                Some(current) if current.same_tuple(&session) => *current,
                _ => return,
            };
            if current.state != State::Connected {
                return;
            }
            if current.ack_pending && !repr.flags.fin() {
                if let Err(err) = self.send_segment(socket, Flags::ACK, 0, false) {
                    net_trace!("tcp: {:?} ack failed: {}", socket, err);
                }
            }
        }

        if repr.flags.fin() {
            net_debug!("tcp: {:?} closed by peer", socket);
            if let Some(current) = self.tcp.sessions.get_mut(socket.0) {
                current.ack_number = current.ack_number.wrapping_add(1);
                current.state = State::TerminationIncoming;
            }
            self.call_tcp_application(session.local_port, |app, _| app.on_close(socket));
            if !self.tcp.same_session(socket, &session) {
                return;
            }
            if let Err(err) = self.send_segment(socket, Flags::FIN | Flags::ACK, 0, false) {
                net_trace!("tcp: {:?} fin failed: {}", socket, err);
            }
            self.tcp_advance(socket, 1);
        }
    }

    /// Emit a segment of `payload_len` bytes already at `DATA_OFFSET` and send it.
    ///
    /// Adds the ACK flag while data is unacknowledged and drops PSH unless the peer acknowledged
    /// something since the last push. The sequence number advances by the payload, the caller
    /// accounts for SYN and FIN.
    fn send_segment(&mut self, socket: Socket, flags: Flags, payload_len: usize, announce_mss: bool)
        -> Result<()>
    {
        let header_len = tcp::HEADER_LEN + if announce_mss { 4 } else { 0 };
        let end = TRANSPORT_OFFSET + header_len + payload_len;
        if end > self.buffer.len() || header_len + payload_len > usize::from(u16::max_value()) {
            return Err(Error::BadSize);
        }
        let window = self.window_len();

        let session = self.tcp.sessions.get_mut(socket.0).ok_or(Error::Illegal)?;
        let mut flags = flags;
        if session.ack_pending {
            flags = flags | Flags::ACK;
        }
        if flags.ack() {
            session.ack_pending = false;
        }
        if flags.psh() {
            flags.set_psh(session.push_pending);
            session.push_pending = false;
        }

        let seq_number = session.seq_number;
        session.seq_number = seq_number.wrapping_add(payload_len as u32);

        let repr = tcp::Repr {
            src_port: session.local_port,
            dst_port: session.remote_port,
            flags,
            seq_number,
            ack_number: if flags.ack() { session.ack_number } else { 0 },
            window_len: window,
            max_seg_size: if announce_mss { Some(window) } else { None },
            payload_len,
        };
        let remote_addr = session.remote_addr;

        repr.emit(
            tcp::tcp::new_unchecked_mut(&mut self.buffer[TRANSPORT_OFFSET..end]),
            self.config.ip,
            remote_addr);
        net_trace!("tcp: {:?} sending {}", socket, repr);
        self.send_ipv4(remote_addr, Protocol::Tcp, repr.buffer_len())
    }

    /// Our receive window and segment size, what fits into the buffer behind the headers.
    fn window_len(&self) -> u16 {
        let room = self.buffer.len().saturating_sub(DATA_OFFSET);
        room.min(usize::from(u16::max_value())) as u16
    }

    fn tcp_advance(&mut self, socket: Socket, by: u32) {
        if let Some(session) = self.tcp.sessions.get_mut(socket.0) {
            session.seq_number = session.seq_number.wrapping_add(by);
        }
    }

    fn tcp_set_state(&mut self, socket: Socket, state: State) {
        if let Some(session) = self.tcp.sessions.get_mut(socket.0) {
            session.state = state;
        }
    }

    fn tcp_remove(&mut self, socket: Socket) -> Option<Session> {
        let session = self.tcp.remove_session(socket)?;
        if session.close_port_on_termination {
            self.tcp.ports.close(session.local_port);
        }
        if self.target == Target::Tcp(socket) {
            self.target = Target::Nothing;
        }
        net_debug!("tcp: {:?} removed", socket);
        Some(session)
    }

    /// Lend the application of a port to a callback, as for udp.
    fn call_tcp_application<F>(&mut self, port: u16, f: F)
        where F: FnOnce(&mut (dyn Application<D> + 'a), &mut Self)
    {
        let handler = match self.tcp.ports.find(port) {
            Some(entry) => entry.handler,
            None => return,
        };
        let application = match self.tcp.applications.take(handler.0) {
            Some(application) => application,
            None => return,
        };

        f(&mut *application, self);
        self.tcp.applications.restore(handler.0, application);
    }

    fn free_tcp_port(&mut self) -> u16 {
        loop {
            let port = self.prng.ephemeral_port();
            if !self.tcp.ports.is_open(port) {
                return port;
            }
        }
    }
}
