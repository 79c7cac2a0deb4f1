//! A heapless network stack for controllers with a few kilobytes of memory.
//!
//! ## Table of contents
//!
//! 1. [Design](#design-and-relevant-core-concepts)
//! 2. [The wire module](wire/index.html)
//! 3. [The layers](layer/index.html)
//!    1. [The stack object](layer/struct.Stack.html)
//!    1. [Arp](layer/arp/index.html)
//!    1. [Udp](layer/udp/index.html)
//!    1. [Tcp](layer/tcp/index.html)
//!    1. [Dhcp](layer/dhcp/index.html)
//! 4. [Network interfaces](nic/index.html)
//! 5. [Time and ticks](time/index.html)
//!
//! ## Design and relevant core concepts
//!
//! The whole stack works on a single frame buffer. A received frame is dispatched from it, and the
//! next outgoing frame is staged in it. There is never a second packet in flight inside the
//! library, which is what makes the memory requirement predictable: one buffer of link MTU size
//! plus a handful of small fixed-size tables.
//!
//! Nothing within `picoeth` *ever* dynamically allocates memory. All tables (the arp cache, the
//! udp and tcp session tables, the port registries) are slices handed in by the caller at setup,
//! see [`Storage`]. Their length is the capacity; running out of a table is an ordinary error that
//! the operation reports, never a panic.
//!
//! Protocol work only happens when the caller polls [`Stack::update`]. A timer interrupt is
//! expected to feed a [`Ticker`] with millisecond ticks and the stack picks up elapsed seconds on
//! its next poll. Operations that have to wait for the network, such as connecting or acquiring a
//! DHCP lease, are offered as blocking helpers that pump `update` themselves, bounded by a timeout,
//! and as non-blocking variants for callers that run their own event loop.
//!
//! [`Storage`]: layer/struct.Storage.html
//! [`Stack::update`]: layer/struct.Stack.html#method.update
//! [`Ticker`]: time/struct.Ticker.html
#![warn(missing_docs)]
#![warn(unreachable_pub)]

// tests should be able to use `std`
#![cfg_attr(all(
    not(feature = "std"),
    not(test)),
no_std)]

#[macro_use] mod macros;
pub mod config;
pub mod layer;
pub mod nic;
pub mod rand;
pub mod time;
pub mod wire;
