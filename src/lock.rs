//! Bounded-wait, timeout-capable exclusive lock with strict FIFO grant order.
//!
//! [`QueuedMutex`] serializes refresh work for one subject. Waiters queue behind the
//! current holder in arrival order; each waiter may carry a deadline, and the queue is
//! bounded so a stalled holder surfaces as fast failures instead of unbounded memory.
//! Releasing hands the lock to the longest-waiting queued request.

// std
use std::sync::atomic::AtomicU8;
// crates.io
use tokio::sync::oneshot;
// self
use crate::{_prelude::*, error::LockError};

const WAITING: u8 = 0;
const GRANTED: u8 = 1;
const CANCELLED: u8 = 2;

/// Configuration for [`QueuedMutex`].
#[derive(Clone, Copy, Debug)]
pub struct MutexConfig {
	/// Maximum time a waiter may spend queued before failing with
	/// [`LockError::Timeout`]; [`Duration::ZERO`] disables the deadline entirely.
	pub timeout: Duration,
	/// Maximum number of queued waiters; further acquisitions fail immediately with
	/// [`LockError::QueueFull`].
	pub max_queue: usize,
}
impl Default for MutexConfig {
	fn default() -> Self {
		Self { timeout: Duration::from_secs(30), max_queue: 1_000 }
	}
}

struct Waiter {
	id: u64,
	status: Arc<AtomicU8>,
	tx: oneshot::Sender<()>,
}

struct State {
	locked: bool,
	next_id: u64,
	queue: VecDeque<Waiter>,
}

struct Inner {
	config: MutexConfig,
	state: Mutex<State>,
}
impl Inner {
	/// Hands the lock to the earliest live waiter, or unlocks when none remains.
	///
	/// The status CAS is the grant's source of truth; the oneshot send is only a wakeup
	/// and may fail when the granted waiter is mid-cancellation, in which case that
	/// waiter's cleanup passes the grant on.
	fn release_locked(state: &mut State) {
		while let Some(waiter) = state.queue.pop_front() {
			if waiter
				.status
				.compare_exchange(WAITING, GRANTED, Ordering::AcqRel, Ordering::Acquire)
				.is_ok()
			{
				let _ = waiter.tx.send(());

				return;
			}
		}

		state.locked = false;
	}

	fn release(&self) {
		Self::release_locked(&mut self.state.lock());
	}

	/// Withdraws a waiter that is giving up (deadline elapsed or future dropped).
	///
	/// If the grant raced ahead of the withdrawal, the lock is already this waiter's and
	/// must be passed on rather than leaked.
	fn abandon(&self, id: u64, status: &AtomicU8) {
		let mut state = self.state.lock();

		if status.swap(CANCELLED, Ordering::AcqRel) == GRANTED {
			Self::release_locked(&mut state);
		} else {
			state.queue.retain(|waiter| waiter.id != id);
		}
	}
}

/// Exclusive async lock with a bounded FIFO wait queue and per-waiter deadlines.
#[derive(Clone)]
pub struct QueuedMutex {
	inner: Arc<Inner>,
}
impl QueuedMutex {
	/// Creates a mutex with the provided configuration.
	pub fn new(config: MutexConfig) -> Self {
		Self {
			inner: Arc::new(Inner {
				config,
				state: Mutex::new(State { locked: false, next_id: 0, queue: VecDeque::new() }),
			}),
		}
	}

	/// Acquires the lock, yielding a release capability once granted.
	///
	/// Grants immediately when unheld. Otherwise the caller queues behind earlier
	/// waiters; it fails with [`LockError::QueueFull`] before waiting when the queue is
	/// at capacity, and with [`LockError::Timeout`] when its deadline elapses while still
	/// queued.
	pub async fn acquire(&self) -> Result<LockPermit, LockError> {
		let (id, status, rx) = {
			let mut state = self.inner.state.lock();

			if !state.locked {
				state.locked = true;

				return Ok(LockPermit::new(self.inner.clone()));
			}
			if state.queue.len() >= self.inner.config.max_queue {
				return Err(LockError::QueueFull { capacity: self.inner.config.max_queue });
			}

			let (tx, rx) = oneshot::channel();
			let id = state.next_id;
			let status = Arc::new(AtomicU8::new(WAITING));

			state.next_id += 1;
			state.queue.push_back(Waiter { id, status: status.clone(), tx });

			(id, status, rx)
		};
		let mut slot = QueueSlot { inner: &self.inner, id, status: &status, armed: true };
		let deadline = self.inner.config.timeout;

		if deadline.is_zero() {
			match rx.await {
				Ok(()) => {
					slot.armed = false;

					Ok(LockPermit::new(self.inner.clone()))
				},
				// The sender is dropped only when the waiter itself withdraws, which this
				// path never does; fail closed rather than panic.
				Err(_) => {
					slot.armed = false;

					Err(LockError::Timeout { waited: deadline })
				},
			}
		} else {
			match tokio::time::timeout(deadline, rx).await {
				Ok(Ok(())) => {
					slot.armed = false;

					Ok(LockPermit::new(self.inner.clone()))
				},
				Ok(Err(_)) => {
					slot.armed = false;

					Err(LockError::Timeout { waited: deadline })
				},
				Err(_) => {
					slot.armed = false;
					self.inner.abandon(id, &status);

					Err(LockError::Timeout { waited: deadline })
				},
			}
		}
	}

	/// Acquires the lock, runs `f`, and releases on every exit path before surfacing
	/// `f`'s output; a panic or cancellation inside `f` releases via the permit's `Drop`.
	pub async fn run_exclusive<F, Fut, T>(&self, f: F) -> Result<T, LockError>
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = T>,
	{
		let permit = self.acquire().await?;
		let output = f().await;

		permit.release();

		Ok(output)
	}

	/// Reports whether any holder currently holds the lock.
	pub fn is_locked(&self) -> bool {
		self.inner.state.lock().locked
	}
}
impl Default for QueuedMutex {
	fn default() -> Self {
		Self::new(MutexConfig::default())
	}
}
impl Debug for QueuedMutex {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let state = self.inner.state.lock();

		f.debug_struct("QueuedMutex")
			.field("locked", &state.locked)
			.field("queued", &state.queue.len())
			.finish()
	}
}

/// Unqueues the waiter when the acquire future is dropped before resolving.
struct QueueSlot<'a> {
	inner: &'a Inner,
	id: u64,
	status: &'a AtomicU8,
	armed: bool,
}
impl Drop for QueueSlot<'_> {
	fn drop(&mut self) {
		if self.armed {
			self.inner.abandon(self.id, self.status);
		}
	}
}

/// Release capability returned by [`QueuedMutex::acquire`].
///
/// Dropping the permit releases the lock; calling [`release`](LockPermit::release) more
/// than once has no additional effect.
pub struct LockPermit {
	inner: Arc<Inner>,
	released: AtomicBool,
}
impl LockPermit {
	fn new(inner: Arc<Inner>) -> Self {
		Self { inner, released: AtomicBool::new(false) }
	}

	/// Releases the lock, granting it to the earliest queued waiter. Idempotent.
	pub fn release(&self) {
		if !self.released.swap(true, Ordering::AcqRel) {
			self.inner.release();
		}
	}
}
impl Drop for LockPermit {
	fn drop(&mut self) {
		self.release();
	}
}
impl Debug for LockPermit {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("LockPermit").field("released", &self.released.load(Ordering::Acquire)).finish()
	}
}
