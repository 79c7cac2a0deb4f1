/*! Time structures.

The stack has no clock of its own. A timer interrupt drives a [`Ticker`] which the stack samples
whenever it is polled, and blocking helpers wait through a caller supplied [`Delay`].

 - [Instant] is used to represent absolute time.
 - [Countdown] is a per-second timer that can be disarmed.

[`Ticker`]: struct.Ticker.html
[`Delay`]: trait.Delay.html
[Instant]: struct.Instant.html
[Countdown]: enum.Countdown.html
*/
use core::fmt;
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// A representation of an absolute time value.
///
/// The `Instant` type is a wrapper around a `i64` value that represents a number of milliseconds,
/// monotonically increasing since an arbitrary moment in time, such as system startup.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Instant {
    /// Milliseconds since the arbitrary start.
    pub millis: i64,
}

impl Instant {
    /// Create a new `Instant` from a number of milliseconds.
    pub fn from_millis<T: Into<i64>>(millis: T) -> Instant {
        Instant { millis: millis.into() }
    }

    /// Create a new `Instant` from a number of seconds.
    pub fn from_secs<T: Into<i64>>(secs: T) -> Instant {
        Instant { millis: secs.into() * 1000 }
    }

    /// The fractional number of milliseconds that have passed since the beginning of time.
    pub fn millis(&self) -> i64 {
        self.millis % 1000
    }

    /// The number of whole seconds that have passed since the beginning of time.
    pub fn secs(&self) -> i64 {
        self.millis / 1000
    }

    /// The total number of milliseconds that have passed since the beginning of time.
    pub fn total_millis(&self) -> i64 {
        self.millis
    }
}

impl fmt::Display for Instant {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{:03}s", self.secs(), self.millis())
    }
}

/// A countdown in whole seconds, inversion of a plain counter with a magic 'off' value.
///
/// Zero is a legitimate armed value: it means the timer fires on the next tick. That is why the
/// disarmed state is a separate variant rather than some reserved number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Countdown {
    /// The timer will never fire.
    Disarmed,
    /// The timer fires once this many more seconds have passed.
    Seconds(u32),
}

impl Countdown {
    /// Advance by one second.
    ///
    /// Returns `true` exactly once, on the tick where an armed timer at zero fires. The timer is
    /// disarmed afterwards.
    pub fn tick(&mut self) -> bool {
        match *self {
            Countdown::Disarmed => false,
            Countdown::Seconds(0) => {
                *self = Countdown::Disarmed;
                true
            },
            Countdown::Seconds(left) => {
                *self = Countdown::Seconds(left - 1);
                false
            },
        }
    }

    /// Query whether the timer will fire at some point.
    pub fn is_armed(&self) -> bool {
        *self != Countdown::Disarmed
    }
}

impl Default for Countdown {
    fn default() -> Self {
        Countdown::Disarmed
    }
}

/// The shared tick source.
///
/// All methods take `&self` so that a `static` instance can be fed from an interrupt handler while
/// the stack holds a shared reference. The interrupt performs no protocol work, it only counts.
#[derive(Debug, Default)]
pub struct Ticker {
    millis: AtomicU32,
    second: AtomicBool,
}

impl Ticker {
    /// A ticker at time zero.
    pub const fn new() -> Self {
        Ticker {
            millis: AtomicU32::new(0),
            second: AtomicBool::new(false),
        }
    }

    /// Count one millisecond, flagging a second every thousand calls.
    pub fn tick_millisecond(&self) {
        let now = self.millis.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        if now % 1000 == 0 {
            self.second.store(true, Ordering::Release);
        }
    }

    /// Flag that a second has elapsed.
    ///
    /// For tick sources that only have a coarse second interrupt.
    pub fn tick_second(&self) {
        self.second.store(true, Ordering::Release);
    }

    /// The current time according to the millisecond counter.
    pub fn now(&self) -> Instant {
        Instant::from_millis(self.millis.load(Ordering::Relaxed))
    }

    /// Consume the 'second elapsed' flag.
    pub fn take_second(&self) -> bool {
        self.second.swap(false, Ordering::Acquire)
    }
}

/// Busy waiting, used by the blocking helpers between two polls of the stack.
pub trait Delay {
    /// Wait for roughly the given number of milliseconds.
    fn delay_ms(&mut self, ms: u32);
}

impl<F: FnMut(u32)> Delay for F {
    fn delay_ms(&mut self, ms: u32) {
        self(ms)
    }
}

/// A delay that sleeps the current thread.
#[cfg(feature = "std")]
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleep;

#[cfg(feature = "std")]
impl Delay for ThreadSleep {
    fn delay_ms(&mut self, ms: u32) {
        std::thread::sleep(std::time::Duration::from_millis(ms.into()))
    }
}
