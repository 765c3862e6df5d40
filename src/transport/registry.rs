//! Interrupt handler registry keyed by DMA channel.
//!
//! Interrupt vectors carry no context, so the DMA interrupt looks up which channels raised it
//! and calls the handler registered for each one. Registration happens when a transport is
//! built and is undone when its [`Registration`] is dropped.

use core::ptr;

use embassy_sync::once_lock::OnceLock;
use portable_atomic::{AtomicBool, AtomicPtr, Ordering};

use crate::{Error, Result};

/// DMA channels covered by the registry (RP2350 has 16, RP2040 uses the first 12).
pub const CHANNEL_COUNT: usize = 16;

/// The registry the DMA interrupt dispatches through.
pub static HANDLERS: HandlerRegistry = HandlerRegistry::new();

/// Called from interrupt context when a registered channel finishes a transfer.
pub trait DrainHandler: Sync {
    /// Handle one completion. Must be short and must not block.
    fn on_drained(&self);
}

/// A `'static` home for a handler reference, so the registry can store a thin pointer.
pub struct HandlerSlot {
    handler: &'static dyn DrainHandler,
}

impl HandlerSlot {
    /// Wrap `handler`.
    #[must_use]
    pub const fn new(handler: &'static dyn DrainHandler) -> Self {
        Self { handler }
    }
}

/// A [`HandlerSlot`] owned by one transport at a time and claimable again once released.
///
/// The slot is built on the first claim and keeps that handler, so always claim it with the
/// same handler (usually the static that contains it).
pub struct ReusableSlot {
    in_use: AtomicBool,
    slot: OnceLock<HandlerSlot>,
}

impl ReusableSlot {
    /// Unclaimed slot.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            in_use: AtomicBool::new(false),
            slot: OnceLock::new(),
        }
    }

    /// Take the slot for `handler` until the returned claim is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ResourceExhausted`] while another claim is alive.
    pub fn claim(&'static self, handler: &'static dyn DrainHandler) -> Result<SlotClaim> {
        self.in_use
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| Error::ResourceExhausted)?;
        let slot = self.slot.get_or_init(|| HandlerSlot::new(handler));
        Ok(SlotClaim { owner: self, slot })
    }

    /// Whether a claim is alive.
    #[must_use]
    pub fn is_claimed(&self) -> bool {
        self.in_use.load(Ordering::Acquire)
    }
}

impl Default for ReusableSlot {
    fn default() -> Self {
        Self::new()
    }
}

/// Exclusive use of a [`ReusableSlot`]. Dropping it releases the slot.
#[must_use = "dropping the claim releases the slot"]
pub struct SlotClaim {
    owner: &'static ReusableSlot,
    slot: &'static HandlerSlot,
}

impl SlotClaim {
    /// The claimed slot, ready for [`HandlerRegistry::register`].
    #[must_use]
    pub const fn slot(&self) -> &'static HandlerSlot {
        self.slot
    }
}

impl Drop for SlotClaim {
    fn drop(&mut self) {
        self.owner.in_use.store(false, Ordering::Release);
    }
}

/// Table from channel number to handler.
pub struct HandlerRegistry {
    slots: [AtomicPtr<HandlerSlot>; CHANNEL_COUNT],
}

impl HandlerRegistry {
    /// Empty registry.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slots: [const { AtomicPtr::new(ptr::null_mut()) }; CHANNEL_COUNT],
        }
    }

    /// Claim `channel` for `slot`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ResourceExhausted`] when the channel is out of range or already
    /// claimed.
    pub fn register(
        &self,
        channel: u8,
        slot: &'static HandlerSlot,
    ) -> Result<Registration<'_>> {
        let entry = self
            .slots
            .get(usize::from(channel))
            .ok_or(Error::ResourceExhausted)?;
        entry
            .compare_exchange(
                ptr::null_mut(),
                ptr::from_ref(slot).cast_mut(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map_err(|_| Error::ResourceExhausted)?;
        Ok(Registration {
            registry: self,
            channel,
        })
    }

    /// Whether a handler is registered for `channel`.
    #[must_use]
    pub fn is_registered(&self, channel: u8) -> bool {
        self.slots
            .get(usize::from(channel))
            .is_some_and(|entry| !entry.load(Ordering::Acquire).is_null())
    }

    /// Run the handler for `channel`. Returns `false` when none is registered.
    pub fn dispatch(&self, channel: u8) -> bool {
        let Some(entry) = self.slots.get(usize::from(channel)) else {
            return false;
        };
        let slot = entry.load(Ordering::Acquire);
        if slot.is_null() {
            return false;
        }
        // SAFETY: only `&'static HandlerSlot` references are ever stored, so a non-null
        // pointer is valid for the rest of the program.
        #[expect(unsafe_code, reason = "thin pointer back to a 'static reference")]
        let slot = unsafe { &*slot };
        slot.handler.on_drained();
        true
    }

    /// Dispatch every channel whose bit is set in `mask`. Returns the bits that were handled.
    pub fn dispatch_mask(&self, mask: u32) -> u32 {
        let mut handled = 0;
        for (index, channel) in (0..CHANNEL_COUNT).zip(0_u8..) {
            let bit = 1_u32 << index;
            if mask & bit != 0 && self.dispatch(channel) {
                handled |= bit;
            }
        }
        handled
    }

    fn release(&self, channel: u8) {
        if let Some(entry) = self.slots.get(usize::from(channel)) {
            entry.store(ptr::null_mut(), Ordering::Release);
        }
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Proof that a channel is claimed. Dropping it frees the channel.
#[must_use = "dropping the registration unregisters the handler"]
pub struct Registration<'r> {
    registry: &'r HandlerRegistry,
    channel: u8,
}

impl Registration<'_> {
    /// The claimed channel.
    #[must_use]
    pub const fn channel(&self) -> u8 {
        self.channel
    }
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.registry.release(self.channel);
    }
}
