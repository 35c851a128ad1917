#![deny(missing_docs)]
//! A token bucket which admits waiting tasks strictly in the order they
//! arrived.
//!
//! The bucket holds up to `capacity` tokens and is refilled with `rate` tokens
//! every refill interval (one second by default). Callers ask for a volume of
//! tokens through [`RateBucket::get`]. If enough tokens are available the call
//! completes immediately through a fast path. Otherwise the task is suspended
//! in a line of waiters until enough tokens have accrued.
//!
//! Waiters are served *first come, first served*. A later caller asking for a
//! single token will never overtake an earlier caller that is still waiting
//! for a hundred. Only the waiter at the head of the line evaluates whether it
//! can be admitted. When it leaves, it wakes up the next waiter in line.
//!
//! Tokens can also be returned or credited with [`RateBucket::put`], which
//! wakes the head of the line so that it can re-check without waiting for the
//! next refill.
//!
//! Since this crate uses timing facilities from tokio it has to be used within
//! a Tokio runtime with the [`time` feature] enabled.
//!
//! <br>
//!
//! ## Usage
//!
//! ```
//! use fcfs_bucket::RateBucket;
//! use tokio::time::{Duration, Instant};
//!
//! # #[tokio::main(flavor="current_thread", start_paused=true)] async fn main() -> Result<(), fcfs_bucket::Error> {
//! // Holds up to 100 tokens and gains 2 tokens every second. The bucket
//! // starts out empty.
//! let bucket = RateBucket::new(100, 2)?;
//!
//! let start = Instant::now();
//! bucket.get(10).await;
//! assert_eq!(Instant::now().duration_since(start), Duration::from_secs(5));
//! # Ok(()) }
//! ```
//!
//! <br>
//!
//! ## Fair admission
//!
//! ```
//! use std::sync::Arc;
//!
//! use fcfs_bucket::RateBucket;
//! use tokio::time::{self, Duration};
//!
//! # #[tokio::main(flavor="current_thread", start_paused=true)] async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let bucket = Arc::new(RateBucket::new(100, 1)?);
//!
//! let big = tokio::spawn({
//!     let bucket = bucket.clone();
//!     async move { bucket.get(10).await }
//! });
//!
//! time::sleep(Duration::from_millis(10)).await;
//!
//! // Could be satisfied after a second, but has to wait for `big`.
//! let small = tokio::spawn({
//!     let bucket = bucket.clone();
//!     async move { bucket.get(1).await }
//! });
//!
//! time::sleep(Duration::from_secs(5)).await;
//! assert!(!small.is_finished());
//!
//! big.await?;
//! small.await?;
//! # Ok(()) }
//! ```
//!
//! <br>
//!
//! ## Requests that can never be satisfied
//!
//! A request for more tokens than the capacity of the bucket can never be
//! admitted. Such a call to [`get`] suspends forever, and since it sits at the
//! head of the line it blocks everyone who arrived after it. Use
//! [`checked_get`] to reject such requests up front instead.
//!
//! <br>
//!
//! ## Cancellation
//!
//! Dropping a [`Get`] future before it completes removes it from the line. If
//! it was at the head of the line, the next waiter takes over. This means that
//! [`tokio::time::timeout`] and `tokio::select!` can be used to bound waits.
//!
//! <br>
//!
//! ## Features
//!
//! * `tracing` - Emit `trace`-level events and spans describing admission,
//!   refill and baton passing through the [`tracing`] crate.
//!
//! [`checked_get`]: RateBucket::checked_get
//! [`get`]: RateBucket::get
//! [`time` feature]: https://docs.rs/tokio/1/tokio/#feature-flags
//! [`tracing`]: https://docs.rs/tracing

use core::fmt;
use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll};
use core::time::Duration;
use std::sync::Arc;

use pin_project_lite::pin_project;
use tokio::time::{self, Instant, Sleep};

#[cfg(feature = "tracing")]
macro_rules! trace {
    ($($arg:tt)*) => {
        tracing::trace!($($arg)*)
    };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace {
    ($($arg:tt)*) => {};
}

mod counter;
mod error;
mod line;

use self::counter::{Admission, RefillCounter};
pub use self::error::Error;
use self::line::{AdmissionLine, Waiter};

/// Default factor for how to calculate capacity when it is not configured.
const DEFAULT_CAPACITY_FACTOR: u64 = 10;

/// A token bucket with first-come-first-served admission.
///
/// See the [crate-level documentation](crate) for details.
pub struct RateBucket {
    counter: RefillCounter,
    line: AdmissionLine,
}

impl RateBucket {
    /// Construct a bucket holding up to `capacity` tokens which is refilled
    /// with `rate` tokens per second.
    ///
    /// The bucket starts out empty. Use [`RateBucket::builder`] to configure
    /// an initial volume or a different refill interval.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::InvalidConfiguration`] if `capacity` or `rate` is
    /// zero.
    ///
    /// # Examples
    ///
    /// ```
    /// use fcfs_bucket::{Error, RateBucket};
    ///
    /// let bucket = RateBucket::new(100, 2)?;
    /// assert_eq!(bucket.capacity(), 100);
    /// assert_eq!(bucket.rate(), 2);
    ///
    /// assert!(RateBucket::new(0, 2).is_err());
    /// # Ok::<_, Error>(())
    /// ```
    pub fn new(capacity: u64, rate: u64) -> Result<Self, Error> {
        Self::builder().capacity(capacity).rate(rate).build()
    }

    /// Construct a new [`Builder`] for a [`RateBucket`].
    ///
    /// # Examples
    ///
    /// ```
    /// use fcfs_bucket::RateBucket;
    /// use tokio::time::Duration;
    ///
    /// let bucket = RateBucket::builder()
    ///     .capacity(1000)
    ///     .rate(100)
    ///     .initial(100)
    ///     .interval(Duration::from_millis(250))
    ///     .build()?;
    /// # Ok::<_, fcfs_bucket::Error>(())
    /// ```
    pub fn builder() -> Builder {
        Builder::default()
    }

    /// Wait until `volume` tokens have been admitted.
    ///
    /// The returned future completes once the tokens have been deducted from
    /// the bucket. Callers are admitted in the order in which their futures
    /// were first polled.
    ///
    /// If `volume` is larger than [`capacity`], the future never completes
    /// and holds up every waiter behind it. See [`checked_get`].
    ///
    /// Dropping the future before it completes gives up its place in line.
    ///
    /// # Examples
    ///
    /// ```
    /// use fcfs_bucket::RateBucket;
    ///
    /// # #[tokio::main(flavor="current_thread", start_paused=true)] async fn main() -> Result<(), fcfs_bucket::Error> {
    /// let bucket = RateBucket::builder().capacity(100).initial(10).build()?;
    ///
    /// bucket.get(10).await;
    /// assert_eq!(bucket.volume(), 0);
    /// # Ok(()) }
    /// ```
    ///
    /// [`capacity`]: RateBucket::capacity
    /// [`checked_get`]: RateBucket::checked_get
    pub fn get(&self, volume: u64) -> Get<'_> {
        trace!(volume, "get");

        Get {
            bucket: self,
            volume,
            state: State::Init,
        }
    }

    /// Like [`get`], but rejects requests which could never be satisfied.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::InvalidRequest`] if `volume` is larger than the
    /// capacity of the bucket.
    ///
    /// # Examples
    ///
    /// ```
    /// use fcfs_bucket::{Error, RateBucket};
    ///
    /// let bucket = RateBucket::new(10, 1)?;
    ///
    /// assert!(bucket.checked_get(10).is_ok());
    /// assert!(matches!(bucket.checked_get(11), Err(Error::InvalidRequest { .. })));
    /// # Ok::<_, Error>(())
    /// ```
    ///
    /// [`get`]: RateBucket::get
    pub fn checked_get(&self, volume: u64) -> Result<Get<'_>, Error> {
        let capacity = self.counter.capacity();

        if volume > capacity {
            return Err(Error::InvalidRequest {
                requested: volume,
                capacity,
            });
        }

        Ok(self.get(volume))
    }

    /// Try to get `volume` tokens without waiting, returning `true` if they
    /// were admitted.
    ///
    /// If there are tasks waiting in line this returns `false`, since they
    /// have priority.
    ///
    /// # Examples
    ///
    /// ```
    /// use fcfs_bucket::RateBucket;
    /// use tokio::time;
    ///
    /// # #[tokio::main(flavor="current_thread", start_paused=true)] async fn main() -> Result<(), fcfs_bucket::Error> {
    /// let bucket = RateBucket::builder().capacity(10).rate(1).initial(1).build()?;
    ///
    /// assert!(bucket.try_get(1));
    /// assert!(!bucket.try_get(1));
    /// assert!(bucket.try_get(0));
    ///
    /// time::sleep(bucket.interval() * 2).await;
    ///
    /// assert!(bucket.try_get(1));
    /// assert!(bucket.try_get(1));
    /// assert!(!bucket.try_get(1));
    /// # Ok(()) }
    /// ```
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "trace", skip(self)))]
    pub fn try_get(&self, volume: u64) -> bool {
        // Linearized at the emptiness check. A waiter which joins the line
        // after it and loses the tokens to us only sleeps again.
        if !self.line.is_empty() {
            return false;
        }

        matches!(
            self.counter.try_admit(volume, Instant::now()),
            Admission::Admitted
        )
    }

    /// Credit `volume` tokens to the bucket, saturating at its capacity.
    ///
    /// The waiter at the head of the line, if any, is woken up to re-check
    /// admission immediately.
    ///
    /// # Examples
    ///
    /// ```
    /// use fcfs_bucket::RateBucket;
    ///
    /// # #[tokio::main(flavor="current_thread", start_paused=true)] async fn main() -> Result<(), fcfs_bucket::Error> {
    /// let bucket = RateBucket::new(10, 1)?;
    ///
    /// bucket.put(4);
    /// assert_eq!(bucket.volume(), 4);
    ///
    /// bucket.put(100);
    /// assert_eq!(bucket.volume(), 10);
    /// # Ok(()) }
    /// ```
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "trace", skip(self)))]
    pub fn put(&self, volume: u64) {
        self.counter.credit(volume, Instant::now());
        self.line.notify_head();
    }

    /// Get the capacity of the bucket.
    #[inline]
    pub fn capacity(&self) -> u64 {
        self.counter.capacity()
    }

    /// Get the number of tokens added every [`interval`].
    ///
    /// [`interval`]: RateBucket::interval
    #[inline]
    pub fn rate(&self) -> u64 {
        self.counter.rate()
    }

    /// Get the refill interval of the bucket.
    ///
    /// # Examples
    ///
    /// ```
    /// use fcfs_bucket::RateBucket;
    /// use tokio::time::Duration;
    ///
    /// let bucket = RateBucket::new(10, 1)?;
    /// assert_eq!(bucket.interval(), Duration::from_secs(1));
    /// # Ok::<_, fcfs_bucket::Error>(())
    /// ```
    #[inline]
    pub fn interval(&self) -> Duration {
        self.counter.interval()
    }

    /// Get the number of tokens currently in the bucket.
    ///
    /// This is a snapshot. Tokens might be taken by a waiter at any moment.
    ///
    /// Reading the volume applies any pending refill, as does formatting the
    /// bucket with [`Debug`]. Refilling twice at the same instant is a no-op,
    /// so neither changes what a later [`get`] observes.
    ///
    /// [`get`]: RateBucket::get
    pub fn volume(&self) -> u64 {
        self.counter.volume(Instant::now())
    }

    /// Get the number of tasks currently waiting in line.
    pub fn waiting(&self) -> usize {
        self.line.len()
    }
}

impl fmt::Debug for RateBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateBucket")
            .field("capacity", &self.capacity())
            .field("rate", &self.rate())
            .field("interval", &self.interval())
            .field("volume", &self.volume())
            .field("waiting", &self.waiting())
            .finish()
    }
}

/// A builder for a [`RateBucket`].
#[derive(Debug, Clone)]
pub struct Builder {
    /// The max number of tokens.
    capacity: Option<u64>,
    /// Tokens to add every `interval`.
    rate: u64,
    /// The initial number of tokens.
    initial: u64,
    /// Interval between refills.
    interval: Duration,
}

impl Builder {
    /// Configure the max number of tokens the bucket can hold.
    ///
    /// If unspecified, this defaults to 10 times the [`rate`] or the
    /// [`initial`] value, whichever is largest.
    ///
    /// [`rate`]: Builder::rate
    /// [`initial`]: Builder::initial
    pub fn capacity(&mut self, capacity: u64) -> &mut Self {
        self.capacity = Some(capacity);
        self
    }

    /// Configure the number of tokens added every [`interval`]. The default
    /// value is `1`.
    ///
    /// [`interval`]: Builder::interval
    pub fn rate(&mut self, rate: u64) -> &mut Self {
        self.rate = rate;
        self
    }

    /// Configure the number of tokens the bucket starts with. The default
    /// value is `0`.
    ///
    /// Values larger than the capacity are truncated to the capacity.
    pub fn initial(&mut self, initial: u64) -> &mut Self {
        self.initial = initial;
        self
    }

    /// Configure the time between refills. The default is one second.
    ///
    /// Refill only ever happens in whole intervals. Any time left over
    /// counts towards the next refill.
    pub fn interval(&mut self, interval: Duration) -> &mut Self {
        self.interval = interval;
        self
    }

    /// Construct a new [`RateBucket`].
    ///
    /// # Errors
    ///
    /// Fails with [`Error::InvalidConfiguration`] if the capacity, the rate
    /// or the interval is zero.
    ///
    /// # Examples
    ///
    /// ```
    /// use fcfs_bucket::{Error, RateBucket};
    /// use tokio::time::Duration;
    ///
    /// let bucket = RateBucket::builder().rate(5).build()?;
    /// assert_eq!(bucket.capacity(), 50);
    ///
    /// let error = RateBucket::builder().interval(Duration::ZERO).build();
    /// assert!(matches!(error, Err(Error::InvalidConfiguration(..))));
    /// # Ok::<_, Error>(())
    /// ```
    pub fn build(&self) -> Result<RateBucket, Error> {
        let Self {
            capacity,
            rate,
            initial,
            interval,
        } = *self;

        if rate == 0 {
            return Err(Error::InvalidConfiguration("rate must be positive"));
        }

        if interval.is_zero() {
            return Err(Error::InvalidConfiguration(
                "refill interval must be non-zero",
            ));
        }

        let capacity = match capacity {
            Some(capacity) => capacity,
            None => rate.max(initial).saturating_mul(DEFAULT_CAPACITY_FACTOR),
        };

        if capacity == 0 {
            return Err(Error::InvalidConfiguration("capacity must be positive"));
        }

        trace!(capacity, rate, initial, ?interval, "build");

        Ok(RateBucket {
            counter: RefillCounter::new(capacity, rate, interval, initial, Instant::now()),
            line: AdmissionLine::new(),
        })
    }
}

/// Construct a new builder with default options.
///
/// # Examples
///
/// ```
/// use fcfs_bucket::Builder;
///
/// let bucket = Builder::default().build()?;
/// assert_eq!(bucket.capacity(), 10);
/// # Ok::<_, fcfs_bucket::Error>(())
/// ```
impl Default for Builder {
    fn default() -> Self {
        Self {
            capacity: None,
            rate: 1,
            initial: 0,
            interval: Duration::from_secs(1),
        }
    }
}

pin_project! {
    #[project = StateProj]
    enum State {
        // Not yet in line.
        Init,
        // In line behind someone else, waiting for the baton.
        Parked {
            waiter: Arc<Waiter>,
        },
        // At the head of the line, waiting for refill or a signal.
        Sleeping {
            waiter: Arc<Waiter>,
            #[pin]
            sleep: Sleep,
        },
        Done,
    }
}

impl State {
    fn waiter(&self) -> Option<&Arc<Waiter>> {
        match self {
            State::Parked { waiter } | State::Sleeping { waiter, .. } => Some(waiter),
            State::Init | State::Done => None,
        }
    }
}

pin_project! {
    /// The future returned by [`RateBucket::get`].
    ///
    /// The future takes its place in line when it is first polled.
    #[must_use = "futures do nothing unless you `.await` or poll them"]
    pub struct Get<'a> {
        bucket: &'a RateBucket,
        volume: u64,
        #[pin]
        state: State,
    }

    impl<'a> PinnedDrop for Get<'a> {
        fn drop(this: Pin<&mut Self>) {
            let this = this.project();

            if let Some(waiter) = this.state.as_ref().get_ref().waiter() {
                trace!(volume = *this.volume, "get cancelled");
                this.bucket.line.remove(waiter);
            }
        }
    }
}

impl Get<'_> {
    /// Test if this future has taken a place in line and is waiting to be
    /// admitted.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::future::Future;
    /// use std::pin::pin;
    /// use std::task::Context;
    ///
    /// use fcfs_bucket::RateBucket;
    ///
    /// # #[tokio::main(flavor="current_thread", start_paused=true)] async fn main() -> Result<(), fcfs_bucket::Error> {
    /// let bucket = RateBucket::new(10, 1)?;
    ///
    /// let waker = futures::task::noop_waker();
    /// let mut cx = Context::from_waker(&waker);
    ///
    /// let mut get = pin!(bucket.get(1));
    /// assert!(!get.is_queued());
    /// assert!(get.as_mut().poll(&mut cx).is_pending());
    /// assert!(get.is_queued());
    /// # Ok(()) }
    /// ```
    pub fn is_queued(&self) -> bool {
        self.state.waiter().is_some()
    }

    /// Test if this future is at the head of the line, which means that it
    /// is the one evaluating admission.
    pub fn is_head(&self) -> bool {
        match self.state.waiter() {
            Some(waiter) => self.bucket.line.is_head(waiter),
            None => false,
        }
    }
}

impl fmt::Debug for Get<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Get")
            .field("volume", &self.volume)
            .field("queued", &self.is_queued())
            .finish()
    }
}

impl Future for Get<'_> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut this = self.project();
        let bucket: &RateBucket = *this.bucket;
        let volume = *this.volume;

        loop {
            let waiter = match this.state.as_mut().project() {
                StateProj::Init => None,
                StateProj::Parked { waiter } => {
                    if !waiter.poll_notified(cx) {
                        return Poll::Pending;
                    }

                    Some(waiter.clone())
                }
                StateProj::Sleeping { waiter, sleep } => {
                    // Either a signal or the refill timeout prompts a re-check.
                    if !waiter.poll_notified(cx) && sleep.poll(cx).is_pending() {
                        return Poll::Pending;
                    }

                    Some(waiter.clone())
                }
                StateProj::Done => panic!("`Get` polled after completion"),
            };

            let waiter = match waiter {
                Some(waiter) => waiter,
                None => {
                    let (waiter, sole) = bucket.line.enqueue(volume);

                    if !sole {
                        this.state.set(State::Parked { waiter });
                        continue;
                    }

                    waiter
                }
            };

            match bucket.counter.try_admit(volume, Instant::now()) {
                Admission::Admitted => {
                    bucket.line.remove(&waiter);
                    this.state.set(State::Done);
                    trace!(volume, "get admitted");
                    return Poll::Ready(());
                }
                Admission::Wait(hint) => {
                    this.state.set(State::Sleeping {
                        waiter,
                        sleep: time::sleep(hint),
                    });
                }
            }
        }
    }
}
