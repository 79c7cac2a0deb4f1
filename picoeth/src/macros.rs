/// Define an enumeration with known variants and an unknown representation.
///
/// Protocol fields such as the ethertype or the DHCP message type only have a few standardized
/// values but can carry any bit-pattern on the wire. The generated enum has one variant per known
/// value and an `Unknown` variant preserving everything else, together with lossless conversions
/// from and into the underlying integer.
///
/// # Example
///
/// ```
/// # use picoeth::enum_with_unknown;
/// enum_with_unknown! {
///     /// The version nibble of an ip header.
///     pub enum IpVersion(u8) {
///         IpV4 = 4,
///         IpV6 = 6,
///     }
/// }
///
/// assert_eq!(IpVersion::from(4), IpVersion::IpV4);
/// assert_eq!(u8::from(IpVersion::Unknown(5)), 5);
/// ```
#[macro_export]
macro_rules! enum_with_unknown {
    (
        $( #[$enum_attr:meta] )*
        pub enum $name:ident($ty:ty) {
            $(
              $( #[$variant_attr:meta] )*
              $variant:ident = $value:expr
            ),+ $(,)*
        }
    ) => {
        #[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash)]
        $( #[$enum_attr] )*
        pub enum $name {
            $(
              $( #[$variant_attr] )*
              #[allow(missing_docs)]
              $variant
            ),*,
            /// A value without a known interpretation, preserved as is.
            Unknown($ty)
        }

        impl ::core::convert::From<$ty> for $name {
            fn from(value: $ty) -> Self {
                match value {
                    $( $value => $name::$variant ),*,
                    other => $name::Unknown(other)
                }
            }
        }

        impl ::core::convert::From<$name> for $ty {
            fn from(value: $name) -> Self {
                match value {
                    $( $name::$variant => $value ),*,
                    $name::Unknown(other) => other
                }
            }
        }
    }
}

/// Declare a dynamically sized byte wrapper.
///
/// The wrapper is a `repr(transparent)` newtype around `[u8]` so that a byte slice can be viewed
/// as a particular header without copying. The macro defines two private constructors which the
/// wire module wraps into its `new_unchecked` and `new_checked` functions:
///
/// * `fn __from_macro_new_unchecked(&[u8]) -> &Self`
/// * `fn __from_macro_new_unchecked_mut(&mut [u8]) -> &mut Self`
///
/// ```
/// # use picoeth::byte_wrapper;
/// byte_wrapper! {
///     /// A udp header.
///     pub struct udp([u8]);
/// }
///
/// impl udp {
///     pub fn from_slice(slice: &[u8]) -> &Self {
///         Self::__from_macro_new_unchecked(slice)
///     }
/// }
///
/// let data = [0x20, 0x00, 0x00, 0x20, 0x00, 0x08, 0x00, 0x00];
/// let _ = udp::from_slice(&data);
/// ```
#[macro_export]
macro_rules! byte_wrapper {
    (
        $( #[$attr:meta] )*
        pub struct $name:ident([u8])$(;)*
    ) => {
        #[allow(non_camel_case_types)]
        #[repr(transparent)]
        $( #[$attr] )*
        pub struct $name([u8]);

        impl $name {
            #[allow(dead_code)]
            fn __from_macro_new_unchecked(data: &[u8]) -> &Self {
                // SAFETY: this is safe due to repr(transparent)
                unsafe { &*(data as *const [u8] as *const Self) }
            }

            #[allow(dead_code)]
            fn __from_macro_new_unchecked_mut(data: &mut [u8]) -> &mut Self {
                // SAFETY: this is safe due to repr(transparent)
                unsafe { &mut *(data as *mut [u8] as *mut Self) }
            }
        }
    }
}

#[cfg(feature = "log")]
#[macro_use]
mod logging {
    macro_rules! net_log {
        (trace, $($arg:expr),*) => { ::log::trace!($($arg),*) };
        (debug, $($arg:expr),*) => { ::log::debug!($($arg),*) };
        (warn, $($arg:expr),*) => { ::log::warn!($($arg),*) };
    }
}

#[cfg(not(feature = "log"))]
#[macro_use]
mod logging {
    macro_rules! net_log {
        ($level:ident, $($arg:expr),*) => { { $( let _ = &$arg; )* } }
    }
}

macro_rules! net_trace {
    ($($arg:expr),* $(,)*) => (net_log!(trace, $($arg),*));
}

macro_rules! net_debug {
    ($($arg:expr),* $(,)*) => (net_log!(debug, $($arg),*));
}

macro_rules! net_warn {
    ($($arg:expr),* $(,)*) => (net_log!(warn, $($arg),*));
}
