//! Per-device synchronization domain.
//!
//! The daemon's startup code builds one [`DeviceTable`] and hands references
//! to the threads that need it. Every slot is an independent concurrency
//! domain with three fair queue locks:
//!
//! - `data`: the [`UsbDevice`] state (features, firmware, activity);
//! - `input`: the latest [`InputFrame`] read from the device;
//! - `command`: ordering of outbound packets, shared by macro playback and
//!   every other sender.
//!
//! When more than one is needed they must be taken in that order
//! (data → input → command); [`DeviceSlot::lock_all`] does so.
//!
//! Slot 0 is reserved and never handed out for a device.

use std::sync::Condvar;
use std::time::Duration;

use crate::device::UsbDevice;
use crate::queued_mutex::{QueuedGuard, QueuedMutex, WaitOutcome};
use crate::wake::WakeChannel;

/// Number of slots in a table, including the reserved slot 0.
pub const DEV_MAX: usize = 9;

/// Bytes in the key-state bitmap of an input frame.
pub const KEYMAP_BYTES: usize = 32;

/// Latest decoded input report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InputFrame {
    /// One bit per key, set while held.
    pub keys: [u8; KEYMAP_BYTES],
    pub rel_x: i16,
    pub rel_y: i16,
}

impl InputFrame {
    pub fn is_pressed(&self, scancode: usize) -> bool {
        self.keys
            .get(scancode / 8)
            .is_some_and(|b| b & (1 << (scancode % 8)) != 0)
    }

    pub fn set_pressed(&mut self, scancode: usize, pressed: bool) {
        if let Some(b) = self.keys.get_mut(scancode / 8) {
            let mask = 1 << (scancode % 8);
            if pressed {
                *b |= mask;
            } else {
                *b &= !mask;
            }
        }
    }
}

/// Outbound command stream state, serialized by the command lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CommandStream {
    /// Packets handed to the transport since attach.
    pub sent: u64,
}

/// Locks and wake channels for one device slot.
#[derive(Debug, Default)]
pub struct DeviceSlot {
    pub data: QueuedMutex<UsbDevice>,
    pub input: QueuedMutex<InputFrame>,
    pub command: QueuedMutex<CommandStream>,
    /// Stops and wakes macro playback threads.
    pub macro_wake: WakeChannel,
    /// Signals completion of interrupt transfers.
    pub interrupt: WakeChannel,
    /// Timed sleeps that give up the command lock meanwhile (macro delays).
    /// Only ever waited on through [`DeviceSlot::command_sleep`].
    command_delay: Condvar,
}

/// All three locks of a slot, taken in order.
pub struct SlotGuards<'a> {
    pub data: QueuedGuard<'a, UsbDevice>,
    pub input: QueuedGuard<'a, InputFrame>,
    pub command: QueuedGuard<'a, CommandStream>,
}

impl DeviceSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take data, input and command locks in the program-wide order.
    pub fn lock_all(&self) -> SlotGuards<'_> {
        let data = self.data.lock();
        let input = self.input.lock();
        let command = self.command.lock();
        SlotGuards {
            data,
            input,
            command,
        }
    }

    /// Sleep up to `timeout` while letting other senders use the command
    /// lock, then queue for it again. Interrupted early by
    /// [`wake_command_sleepers`](Self::wake_command_sleepers).
    ///
    /// `guard` must come from this slot's command lock. A guard from any
    /// other lock is left untouched and `None` is returned without sleeping.
    pub fn command_sleep(
        &self,
        guard: &mut QueuedGuard<'_, CommandStream>,
        timeout: Duration,
    ) -> Option<WaitOutcome> {
        if !guard.is_guard_of(&self.command) {
            log::warn!("command sleep with a guard from another slot, ignored");
            return None;
        }
        Some(guard.cond_nanosleep(&self.command_delay, timeout))
    }

    pub fn wake_command_sleepers(&self) {
        self.command_delay.notify_all();
    }

    /// Clear every dynamic field after the device is gone and wake anything
    /// still waiting on it.
    pub fn reset(&self) {
        let mut g = self.lock_all();
        g.data.reset();
        *g.input = InputFrame::default();
        *g.command = CommandStream::default();
        drop(g);
        self.macro_wake.notify_all();
        self.interrupt.notify_all();
        self.wake_command_sleepers();
    }
}

/// Fixed-capacity table of device slots.
#[derive(Debug)]
pub struct DeviceTable {
    slots: Vec<DeviceSlot>,
}

impl Default for DeviceTable {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceTable {
    /// A table of [`DEV_MAX`] empty slots.
    pub fn new() -> Self {
        Self::with_capacity(DEV_MAX)
    }

    /// A table with `capacity` slots (slot 0 included).
    pub fn with_capacity(capacity: usize) -> Self {
        DeviceTable {
            slots: (0..capacity).map(|_| DeviceSlot::new()).collect(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Slot by index. `None` for slot 0 and out-of-range indices.
    pub fn slot(&self, index: usize) -> Option<&DeviceSlot> {
        if index == 0 {
            return None;
        }
        self.slots.get(index)
    }

    /// Device slots with their indices, slot 0 excluded.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &DeviceSlot)> {
        self.slots.iter().enumerate().skip(1)
    }

    /// Index and product id of every occupied slot.
    ///
    /// Takes each data lock in turn; the caller must not hold any of them.
    pub fn attached(&self) -> Vec<(usize, u16)> {
        self.iter()
            .filter_map(|(index, slot)| {
                let data = slot.data.lock();
                data.is_attached().then_some((index, data.product))
            })
            .collect()
    }

    /// Place a device in the first free slot and return its index.
    ///
    /// Slots busy with another thread are skipped rather than waited on.
    pub fn attach(&self, device: UsbDevice) -> Option<usize> {
        for (index, slot) in self.iter() {
            let Some(mut data) = slot.data.try_lock() else {
                continue;
            };
            if !data.is_attached() {
                *data = device;
                log::debug!("device {:04x}:{:04x} in slot {index}", data.vendor, data.product);
                return Some(index);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{P_K70, P_M65, VENDOR_ID};

    #[test]
    fn slot_zero_is_reserved() {
        let table = DeviceTable::new();
        assert_eq!(table.capacity(), DEV_MAX);
        assert!(table.slot(0).is_none());
        assert!(table.slot(1).is_some());
        assert!(table.slot(DEV_MAX).is_none());
    }

    #[test]
    fn iter_skips_slot_zero() {
        let table = DeviceTable::with_capacity(3);
        let indices: Vec<usize> = table.iter().map(|(i, _)| i).collect();
        assert_eq!(indices, vec![1, 2]);
    }

    #[test]
    fn attach_fills_first_free_slot() {
        let table = DeviceTable::with_capacity(3);
        assert_eq!(table.attach(UsbDevice::attach(VENDOR_ID, P_K70)), Some(1));
        assert_eq!(table.attach(UsbDevice::attach(VENDOR_ID, P_M65)), Some(2));
        assert_eq!(table.attach(UsbDevice::attach(VENDOR_ID, P_M65)), None);
        assert_eq!(table.slot(2).unwrap().data.lock().product, P_M65);
    }

    #[test]
    fn attached_lists_occupied_slots() {
        let table = DeviceTable::with_capacity(4);
        assert!(table.attached().is_empty());
        table.attach(UsbDevice::attach(VENDOR_ID, P_K70));
        table.attach(UsbDevice::attach(VENDOR_ID, P_M65));
        table.slot(1).unwrap().reset();
        assert_eq!(table.attached(), vec![(2, P_M65)]);
    }

    #[test]
    fn attach_reuses_reset_slot() {
        let table = DeviceTable::with_capacity(2);
        assert_eq!(table.attach(UsbDevice::attach(VENDOR_ID, P_K70)), Some(1));
        table.slot(1).unwrap().reset();
        assert_eq!(table.attach(UsbDevice::attach(VENDOR_ID, P_M65)), Some(1));
    }

    #[test]
    fn slots_are_independent() {
        let table = DeviceTable::with_capacity(3);
        let _held = table.slot(1).unwrap().data.lock();
        assert!(table.slot(2).unwrap().data.try_lock().is_some());
    }

    #[test]
    fn lock_all_holds_every_lock() {
        let slot = DeviceSlot::new();
        let g = slot.lock_all();
        assert!(slot.data.try_lock().is_none());
        assert!(slot.input.try_lock().is_none());
        assert!(slot.command.try_lock().is_none());
        drop(g);
        assert!(slot.command.try_lock().is_some());
    }

    #[test]
    fn reset_clears_dynamic_state() {
        let slot = DeviceSlot::new();
        {
            let mut g = slot.lock_all();
            *g.data = UsbDevice::attach(VENDOR_ID, P_K70);
            g.input.set_pressed(5, true);
            g.command.sent = 3;
        }
        slot.reset();
        assert!(!slot.data.lock().is_attached());
        assert!(!slot.input.lock().is_pressed(5));
        assert_eq!(slot.command.lock().sent, 0);
        assert_eq!(slot.macro_wake.generation(), 1);
    }

    #[test]
    fn input_frame_key_bits() {
        let mut frame = InputFrame::default();
        frame.set_pressed(9, true);
        assert!(frame.is_pressed(9));
        assert!(!frame.is_pressed(8));
        frame.set_pressed(9, false);
        assert!(!frame.is_pressed(9));
        // Out of range is ignored.
        frame.set_pressed(KEYMAP_BYTES * 8, true);
        assert!(!frame.is_pressed(KEYMAP_BYTES * 8));
    }

    #[test]
    fn command_sleep_keeps_lock_afterwards() {
        let slot = DeviceSlot::new();
        let mut g = slot.command.lock();
        let outcome = slot.command_sleep(&mut g, Duration::from_millis(1));
        assert!(matches!(
            outcome,
            Some(WaitOutcome::Signaled | WaitOutcome::TimedOut)
        ));
        g.sent += 1;
        assert!(slot.command.try_lock().is_none());
        drop(g);
        assert_eq!(slot.command.lock().sent, 1);
    }

    #[test]
    fn command_sleep_rejects_guard_of_other_slot() {
        let table = DeviceTable::with_capacity(3);
        let (a, b) = (table.slot(1).unwrap(), table.slot(2).unwrap());
        let mut g = b.command.lock();
        let before = b.command.tickets();
        assert_eq!(a.command_sleep(&mut g, Duration::from_millis(1)), None);
        // Still held, no ticket drawn or released.
        assert_eq!(b.command.tickets(), before);
        assert!(b.command.try_lock().is_none());
        assert!(a.command.try_lock().is_some());
    }
}
