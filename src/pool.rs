use std::fmt::Display;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};

use crate::lex::Op;
use crate::store::EquationId;

/// Identity of one simulated compute unit. Ids are assigned by the pool,
/// start at 1, and are never reused after a unit is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UnitId(u32);

impl UnitId {
    pub fn get(self) -> u32 {
        self.0
    }
}

impl Display for UnitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy)]
enum SlotState {
    Free,
    Held { owner: Option<EquationId> },
}

#[derive(Debug)]
struct Slot {
    id: UnitId,
    state: SlotState,
}

/// Point-in-time view of one unit, for display.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitView {
    pub id: UnitId,
    pub held: bool,
    /// The equation holding the unit, when one is known.
    pub owner: Option<EquationId>,
}

/// The process-wide set of compute units.
///
/// Every operator application runs on exactly one unit. Finding a free
/// unit and binding it are a single critical section, so two racing
/// evaluations can never claim the same unit; capacity changes go through
/// [`UnitPool::add_unit`] and [`UnitPool::remove_idle_unit`] under the
/// same lock.
pub struct UnitPool {
    slots: Mutex<Slots>,
}

#[derive(Default)]
struct Slots {
    units: Vec<Slot>,
    next_id: u32,
}

impl UnitPool {
    /// A pool seeded with `capacity` units.
    pub fn new(capacity: usize) -> Self {
        let pool = Self::empty();
        for _ in 0..capacity {
            pool.add_unit();
        }
        pool
    }

    /// A pool with no units yet; callers add them out of band. Note that
    /// no operator can complete until at least one unit exists.
    pub fn empty() -> Self {
        UnitPool { slots: Mutex::new(Slots::default()) }
    }

    /// Registers one more unit and reports its id.
    pub fn add_unit(&self) -> UnitId {
        let mut slots = self.slots.lock();
        slots.next_id += 1;
        let id = UnitId(slots.next_id);
        slots.units.push(Slot { id, state: SlotState::Free });
        id
    }

    /// Detaches one currently free unit, if any. A held unit is never
    /// removed out from under the evaluation using it.
    pub fn remove_idle_unit(&self) -> Option<UnitId> {
        let mut slots = self.slots.lock();
        let at = slots.units.iter().position(|slot| matches!(slot.state, SlotState::Free))?;
        Some(slots.units.remove(at).id)
    }

    /// Claims a free unit for `owner`, or reports that none is free right
    /// now. Never blocks.
    pub fn try_acquire(&self, owner: Option<EquationId>) -> Option<UnitId> {
        let mut slots = self.slots.lock();
        let slot = slots.units.iter_mut().find(|slot| matches!(slot.state, SlotState::Free))?;
        slot.state = SlotState::Held { owner };
        Some(slot.id)
    }

    /// Frees a held unit. Reports whether the unit existed and was held.
    pub fn release(&self, id: UnitId) -> bool {
        let mut slots = self.slots.lock();
        match slots.units.iter_mut().find(|slot| slot.id == id) {
            Some(slot) if matches!(slot.state, SlotState::Held { .. }) => {
                slot.state = SlotState::Free;
                true
            }
            _ => false,
        }
    }

    /// Number of units currently registered, held or not.
    pub fn capacity(&self) -> usize {
        self.slots.lock().units.len()
    }

    /// Number of units currently held.
    pub fn in_flight(&self) -> usize {
        self.slots
            .lock()
            .units
            .iter()
            .filter(|slot| matches!(slot.state, SlotState::Held { .. }))
            .count()
    }

    pub fn snapshot(&self) -> Vec<UnitView> {
        self.slots
            .lock()
            .units
            .iter()
            .map(|slot| UnitView {
                id: slot.id,
                held: matches!(slot.state, SlotState::Held { .. }),
                owner: match slot.state {
                    SlotState::Held { owner } => owner,
                    SlotState::Free => None,
                },
            })
            .collect()
    }
}

/// Configured artificial cost per operator, modeling compute time.
///
/// Reads and writes serialize against each other, so a reconfiguration is
/// either fully visible to an evaluation or not at all.
pub struct LatencyTable {
    durations: RwLock<[Duration; 4]>,
}

impl LatencyTable {
    /// Every operator costs one millisecond until configured otherwise.
    pub const DEFAULT_MS: u64 = 1;

    pub fn new(per_op: Duration) -> Self {
        LatencyTable { durations: RwLock::new([per_op; 4]) }
    }

    /// A table that charges nothing; handy for latency-free runs.
    pub fn zero() -> Self {
        Self::new(Duration::ZERO)
    }

    pub fn get(&self, op: Op) -> Duration {
        self.durations.read()[slot_of(op)]
    }

    pub fn set(&self, op: Op, latency: Duration) {
        self.durations.write()[slot_of(op)] = latency;
    }
}

impl Default for LatencyTable {
    fn default() -> Self {
        Self::new(Duration::from_millis(Self::DEFAULT_MS))
    }
}

fn slot_of(op: Op) -> usize {
    match op {
        Op::Plus => 0,
        Op::Minus => 1,
        Op::Star => 2,
        Op::Slash => 3,
    }
}
