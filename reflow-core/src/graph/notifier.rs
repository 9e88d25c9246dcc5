//! Notifier Arena
//!
//! Every node of the dataflow graph owns one notifier. A notifier knows who
//! observes it and carries a *priority*: its depth in the graph. Observers are
//! always strictly deeper than what they observe, so draining the update queue
//! in priority order services ancestors before descendants.
//!
//! Notifiers live in a generational arena. A [`NotifierId`] stays valid until
//! its slot is freed; after that the slot's generation moves on and every
//! stale id is simply dead. Observers reference each other by id only, so a
//! dropped node never leaves a dangling edge behind: it is pruned the next
//! time its source fires.

use std::rc::{Rc, Weak};

use indexmap::{IndexMap, IndexSet};
use serde::Serialize;
use smallvec::{smallvec, SmallVec};

use super::observer::Observer;
use crate::error::ReactiveError;

/// Handle to a notifier in a [`NotifierGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NotifierId {
    index: u32,
    generation: u32,
}

impl NotifierId {
    /// Get the raw slot index.
    pub fn index(&self) -> u32 {
        self.index
    }
}

/// Diagnostics for one notifier.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NotifierStats {
    pub name: String,
    pub priority: u32,
    pub observers: usize,
    /// How many times this notifier fired.
    pub notifications: u64,
    /// How many times the refresher ran its update.
    pub updates: u64,
    /// Updates that returned an error.
    pub failures: u64,
    pub last_error: Option<String>,
}

struct Notifier {
    name: Rc<str>,
    priority: u32,
    observers: IndexSet<NotifierId>,
    handler: Option<Weak<dyn Observer>>,
    notifications: u64,
    updates: u64,
    failures: u64,
    last_error: Option<String>,
}

impl Notifier {
    fn is_alive(&self) -> bool {
        self.handler
            .as_ref()
            .map_or(true, |handler| handler.strong_count() > 0)
    }
}

struct Slot {
    generation: u32,
    notifier: Option<Notifier>,
}

/// The arena holding every notifier of one runtime.
#[derive(Default)]
pub struct NotifierGraph {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

impl NotifierGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a notifier with priority 0 and no observers.
    ///
    /// `handler` is the observer the refresher updates when this notifier is
    /// notified as an observer of something else. It can be attached later
    /// with [`set_handler`](Self::set_handler).
    pub fn insert(
        &mut self,
        name: impl Into<Rc<str>>,
        handler: Option<Weak<dyn Observer>>,
    ) -> NotifierId {
        let notifier = Notifier {
            name: name.into(),
            priority: 0,
            observers: IndexSet::new(),
            handler,
            notifications: 0,
            updates: 0,
            failures: 0,
            last_error: None,
        };
        self.live += 1;

        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.notifier = Some(notifier);
            return NotifierId {
                index,
                generation: slot.generation,
            };
        }

        let index = u32::try_from(self.slots.len()).expect("notifier arena exhausted");
        self.slots.push(Slot {
            generation: 0,
            notifier: Some(notifier),
        });
        NotifierId {
            index,
            generation: 0,
        }
    }

    pub fn set_handler(&mut self, id: NotifierId, handler: Weak<dyn Observer>) {
        if let Some(notifier) = self.get_mut(id) {
            notifier.handler = Some(handler);
        }
    }

    /// Free the slot. Edges pointing at `id` die with it.
    pub fn remove(&mut self, id: NotifierId) -> bool {
        let Some(slot) = self.slots.get_mut(id.index as usize) else {
            return false;
        };
        if slot.generation != id.generation || slot.notifier.is_none() {
            return false;
        }
        slot.notifier = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.live -= 1;
        true
    }

    pub fn contains(&self, id: NotifierId) -> bool {
        self.get(id).is_some()
    }

    fn get(&self, id: NotifierId) -> Option<&Notifier> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.notifier.as_ref()
    }

    fn get_mut(&mut self, id: NotifierId) -> Option<&mut Notifier> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.notifier.as_mut()
    }

    pub fn priority(&self, id: NotifierId) -> Option<u32> {
        self.get(id).map(|notifier| notifier.priority)
    }

    pub fn name(&self, id: NotifierId) -> Option<Rc<str>> {
        self.get(id).map(|notifier| notifier.name.clone())
    }

    /// Upgrade the update handler of `id`, if it is still around.
    pub fn handler(&self, id: NotifierId) -> Option<Rc<dyn Observer>> {
        self.get(id)?.handler.as_ref()?.upgrade()
    }

    /// Number of live notifiers.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Register `observer` on `source` and restore the priority invariant.
    ///
    /// Adding an edge that closes a cycle fails with
    /// [`ReactiveError::Cycle`] and leaves the edge out.
    pub fn add_observer(
        &mut self,
        source: NotifierId,
        observer: NotifierId,
    ) -> Result<(), ReactiveError> {
        if source == observer {
            return Err(self.cycle(source, observer));
        }
        let Some(base) = self.priority(source) else {
            return Ok(());
        };
        if !self.contains(observer) {
            return Ok(());
        }

        self.raise(observer, base + 1, source)
            .map_err(|_| self.cycle(source, observer))?;

        if let Some(notifier) = self.get_mut(source) {
            notifier.observers.insert(observer);
        }
        Ok(())
    }

    pub fn remove_observer(&mut self, source: NotifierId, observer: NotifierId) -> bool {
        self.get_mut(source)
            .map_or(false, |notifier| notifier.observers.shift_remove(&observer))
    }

    /// Make sure `id` sits at `at_least` or deeper, pushing its observers
    /// down as needed. `guard` must never be reached while doing so.
    pub fn raise_priority(
        &mut self,
        id: NotifierId,
        at_least: u32,
        guard: NotifierId,
    ) -> Result<(), ReactiveError> {
        self.raise(id, at_least, guard)
            .map_err(|_| self.cycle(guard, id))
    }

    /// Plan every raise first and apply them only once the walk is known
    /// not to reach `guard`, so a rejected edge leaves priorities untouched.
    fn raise(&mut self, start: NotifierId, at_least: u32, guard: NotifierId) -> Result<(), ()> {
        let mut planned: IndexMap<NotifierId, u32> = IndexMap::new();
        let mut work: SmallVec<[(NotifierId, u32); 8]> = smallvec![(start, at_least)];

        while let Some((id, minimum)) = work.pop() {
            let Some(notifier) = self.get(id) else {
                continue;
            };
            let current = planned.get(&id).copied().unwrap_or(notifier.priority);
            if current >= minimum {
                continue;
            }
            if id == guard {
                return Err(());
            }
            planned.insert(id, minimum);
            work.extend(
                notifier
                    .observers
                    .iter()
                    .map(|&observer| (observer, minimum + 1)),
            );
        }

        for (id, priority) in planned {
            if let Some(notifier) = self.get_mut(id) {
                notifier.priority = priority;
            }
        }
        Ok(())
    }

    fn cycle(&self, observed: NotifierId, observer: NotifierId) -> ReactiveError {
        let name = |id| {
            self.name(id)
                .map_or_else(|| "<dropped>".to_string(), |name| name.to_string())
        };
        ReactiveError::Cycle {
            observed: name(observed),
            observer: name(observer),
        }
    }

    /// Collect the live observers of `source` together with their
    /// priorities. Dead observers are pruned on the way.
    pub fn fire(&mut self, source: NotifierId) -> SmallVec<[(u32, NotifierId); 8]> {
        let Some(notifier) = self.get(source) else {
            return SmallVec::new();
        };

        let mut live = SmallVec::new();
        let mut dead: SmallVec<[NotifierId; 4]> = SmallVec::new();
        for &observer in &notifier.observers {
            match self.get(observer) {
                Some(target) if target.is_alive() => live.push((target.priority, observer)),
                _ => dead.push(observer),
            }
        }

        if let Some(notifier) = self.get_mut(source) {
            notifier.notifications += 1;
            for observer in dead {
                notifier.observers.shift_remove(&observer);
            }
        }
        live
    }

    pub fn record_update(&mut self, id: NotifierId, error: Option<String>) {
        if let Some(notifier) = self.get_mut(id) {
            notifier.updates += 1;
            if error.is_some() {
                notifier.failures += 1;
                notifier.last_error = error;
            }
        }
    }

    pub fn stats(&self, id: NotifierId) -> Option<NotifierStats> {
        let notifier = self.get(id)?;
        Some(NotifierStats {
            name: notifier.name.to_string(),
            priority: notifier.priority,
            observers: notifier.observers.len(),
            notifications: notifier.notifications,
            updates: notifier.updates,
            failures: notifier.failures,
            last_error: notifier.last_error.clone(),
        })
    }
}

// ---- Tests ----
