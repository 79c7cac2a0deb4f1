/*! Low-level packet access and construction.

# An overview over packet representations

The `wire` module deals with the packet *representation*. It provides two levels of functionality.

 * First, it provides functions to extract fields from sequences of octets, and to insert fields
   into sequences of octets. This happens in the lowercase structures e.g. [`ethernet`] or
   [`udp`]. These are dynamically sized wrappers around `[u8]`, so a header is viewed in place
   inside the single frame buffer of the stack without any copy.
 * Second, it provides a compact, high-level representation of header data that can be created
   from parsing and emitted into a sequence of octets. This happens through the `Repr` structs,
   e.g. [`arp::Repr`] or [`ipv4::Repr`].

[`ethernet`]: ethernet/struct.ethernet.html
[`udp`]: udp/struct.udp.html
[`arp::Repr`]: arp/struct.Repr.html
[`ipv4::Repr`]: ipv4/struct.Repr.html

The lowercase wrappers guarantee that, if `check_len()` returned `Ok(())`, then no field accessor
or setter method will panic; however, the guarantee only holds while the length fields are not
mutated. `new_checked` is a shorthand for `new_unchecked` followed by `check_len`. When parsing
untrusted input it is *necessary* to use the checked constructor. When emitting output into a
reused buffer it is *incorrect* to use it, the length fields still contain data of the previous
frame; use `new_unchecked_mut` on a correctly sized slice instead.

In the `Repr` family of data structures, the `Repr::parse()` method never panics and the
`Repr::emit()` method never panics as long as the underlying buffer is at least
`Repr::buffer_len()` octets long.

All multi-octet fields are big-endian on the wire and are accessed through `byteorder`.

# Examples

To emit an IP packet header into an octet buffer, and then parse it back:

```rust
use picoeth::wire::{ipv4, Ipv4Address};

let repr = ipv4::Repr {
    src_addr:    Ipv4Address::new(10, 0, 0, 1),
    dst_addr:    Ipv4Address::new(10, 0, 0, 2),
    protocol:    ipv4::Protocol::Udp,
    payload_len: 10,
    ttl:         64,
    ident:       7,
};
let mut buffer = [0; 30];
repr.emit(ipv4::ipv4::new_unchecked_mut(&mut buffer));

let packet = ipv4::ipv4::new_checked(&buffer).expect("truncated packet");
let parsed = ipv4::Repr::parse(packet).expect("malformed packet");
assert_eq!(repr, parsed);
```
*/
// Copyright (C) 2016 whitequark@whitequark.org
// Copyright (C) 2019 Andreas Molzer <andreas.molzer@tum.de>
//
// in large parts from `smoltcp` originally distributed under 0-clause BSD
//
// Applies to files in this folder unless otherwise noted. These are:
// * `arp.rs`
// * `error.rs`
// * `ethernet.rs`
// * `icmpv4.rs`
// * `ipv4.rs`
// * `mod.rs` (this file)
// * `tcp.rs`
// * `udp.rs`

// FIXME: Most fields should be self-explanatory and there is the general guide but enable once the
// other issues have been resolved.
#![allow(missing_docs)]

mod field {
    pub(crate) type Field = ::core::ops::Range<usize>;
    pub(crate) type Rest  = ::core::ops::RangeFrom<usize>;
}

mod error;

pub mod arp;
pub mod dhcp;
pub mod dns;
pub mod ethernet;
pub mod icmpv4;
pub mod ipv4;
pub mod ntp;
pub mod tcp;
pub mod udp;

pub use self::error::{Error, Result};

pub use self::ethernet::Address as EthernetAddress;
pub use self::ipv4::Address as Ipv4Address;
