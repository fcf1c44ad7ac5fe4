//! Append-only stock ledger.
//!
//! The ledger exclusively owns stock levels and movement history. Each
//! (product, location) key has its own slot mutex; the read-compute-write of
//! an append happens entirely under that slot's lock, so movements for one key
//! form a gap-free chain while unrelated keys proceed in parallel.
//!
//! Lock order is always: key slots (sorted by key) -> batch references ->
//! history. Nothing acquires them in the reverse direction.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, TryLockError};
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use tirestock_core::{Actor, LocationId, MovementId, ProductId};
use tirestock_events::{Event, EventBus, InMemoryEventBus, Subscription};

use crate::error::LedgerError;
use crate::event::{InventoryEvent, MinimumConfigured};
use crate::movement::{
    ExpectedQuantity, MovementKind, MovementRequest, StockKey, StockLevel, StockMovement,
};
use crate::query::MovementFilter;

const LOCK_POLL_INTERVAL: Duration = Duration::from_micros(100);

/// Ledger tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Upper bound on waiting for a held per-key lock.
    pub lock_timeout: Duration,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_millis(250),
        }
    }
}

#[derive(Debug, Default)]
struct KeyState {
    level: Option<StockLevel>,
    sequence: u64,
}

impl KeyState {
    fn quantity(&self) -> i64 {
        self.level.as_ref().map(|l| l.quantity).unwrap_or(0)
    }
}

type Slot = Arc<Mutex<KeyState>>;

/// Stock ledger store, constructed once and shared via `Arc`.
#[derive(Debug)]
pub struct StockLedger {
    config: LedgerConfig,
    slots: RwLock<HashMap<StockKey, Slot>>,
    history: RwLock<Vec<StockMovement>>,
    references: Mutex<HashSet<String>>,
    bus: InMemoryEventBus<InventoryEvent>,
}

impl Default for StockLedger {
    fn default() -> Self {
        Self::new(LedgerConfig::default())
    }
}

impl StockLedger {
    pub fn new(config: LedgerConfig) -> Self {
        Self {
            config,
            slots: RwLock::new(HashMap::new()),
            history: RwLock::new(Vec::new()),
            references: Mutex::new(HashSet::new()),
            bus: InMemoryEventBus::new(),
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Current on-hand quantity; 0 for a key that was never stocked.
    pub fn current_quantity(&self, product_id: ProductId, location_id: LocationId) -> i64 {
        self.level(product_id, location_id)
            .map(|l| l.quantity)
            .unwrap_or(0)
    }

    pub fn level(&self, product_id: ProductId, location_id: LocationId) -> Option<StockLevel> {
        let slot = self.existing_slot(StockKey::new(product_id, location_id))?;
        let state = slot.lock().unwrap_or_else(PoisonError::into_inner);
        state.level.clone()
    }

    /// Every stock level at a location, ordered by product id.
    pub fn levels(&self, location_id: LocationId) -> Vec<StockLevel> {
        let mut levels: Vec<StockLevel> = self
            .slots_snapshot()
            .into_iter()
            .filter(|(key, _)| key.location_id == location_id)
            .filter_map(|(_, slot)| {
                let state = slot.lock().unwrap_or_else(PoisonError::into_inner);
                state.level.clone()
            })
            .collect();
        levels.sort_by_key(|l| l.product_id);
        levels
    }

    /// Levels at a location whose quantity is strictly below their minimum.
    pub fn below_minimum(&self, location_id: LocationId) -> Vec<StockLevel> {
        self.levels(location_id)
            .into_iter()
            .filter(StockLevel::is_below_minimum)
            .collect()
    }

    /// Movement history in append order.
    pub fn movements(&self, filter: &MovementFilter) -> Vec<StockMovement> {
        let history = self.history.read().unwrap_or_else(PoisonError::into_inner);
        history.iter().filter(|m| filter.matches(m)).cloned().collect()
    }

    /// Whether a batch was already committed under `reference`.
    pub fn has_reference(&self, reference: &str) -> bool {
        let references = self.references.lock().unwrap_or_else(PoisonError::into_inner);
        references.contains(reference)
    }

    /// Stream of facts published after each commit.
    pub fn subscribe(&self) -> Subscription<InventoryEvent> {
        self.bus.subscribe()
    }

    /// Append one movement.
    pub fn append(&self, request: MovementRequest) -> Result<StockMovement, LedgerError> {
        validate_request(&request)?;

        let key = request.key();
        let slot = self.slot(key)?;
        let mut state = lock_slot(&slot, self.deadline())?;

        let movement = self.commit(&mut state, key, request)?;
        drop(state);

        self.publish(InventoryEvent::MovementAppended(movement.clone()));
        Ok(movement)
    }

    /// Record a physical count: appends the adjustment that brings the level
    /// to `counted`.
    pub fn adjust_to(
        &self,
        product_id: ProductId,
        location_id: LocationId,
        counted: i64,
        actor: Actor,
        reason: Option<String>,
        occurred_at: DateTime<Utc>,
    ) -> Result<StockMovement, LedgerError> {
        let key = StockKey::new(product_id, location_id);
        let slot = self.slot(key)?;
        let mut state = lock_slot(&slot, self.deadline())?;

        let delta = counted
            .checked_sub(state.quantity())
            .ok_or(LedgerError::Overflow)?;
        let mut request = MovementRequest::new(
            product_id,
            location_id,
            MovementKind::Adjustment,
            delta,
            actor,
            occurred_at,
        )
        .expecting(state.quantity());
        request.reason = reason;
        validate_request(&request)?;

        let movement = self.commit(&mut state, key, request)?;
        drop(state);

        self.publish(InventoryEvent::MovementAppended(movement.clone()));
        Ok(movement)
    }

    /// Configure the low-stock threshold. Never touches the quantity.
    pub fn set_minimum(
        &self,
        product_id: ProductId,
        location_id: LocationId,
        minimum: i64,
        occurred_at: DateTime<Utc>,
    ) -> Result<StockLevel, LedgerError> {
        if minimum < 0 {
            return Err(LedgerError::InvalidMinimum(minimum));
        }

        let key = StockKey::new(product_id, location_id);
        let slot = self.slot(key)?;
        let mut state = lock_slot(&slot, self.deadline())?;

        let level = state.level.get_or_insert_with(|| StockLevel::empty(key));
        level.minimum = minimum;
        let level = level.clone();
        drop(state);

        self.publish(InventoryEvent::MinimumConfigured(MinimumConfigured {
            product_id,
            location_id,
            minimum,
            occurred_at,
        }));
        Ok(level)
    }

    /// Append several movements atomically under one reference.
    ///
    /// All involved keys are locked (in key order) and every request is
    /// validated against the locked state before anything is written. Either
    /// every movement is appended and `reference` is recorded, or nothing
    /// changes. A reference can be committed only once.
    pub fn append_batch(
        &self,
        reference: &str,
        requests: Vec<MovementRequest>,
    ) -> Result<Vec<StockMovement>, LedgerError> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(LedgerError::EmptyReference);
        }
        for (index, request) in requests.iter().enumerate() {
            validate_request(request).map_err(|e| batch_error(index, e))?;
        }

        // Key -> index of the first request touching it, for error attribution.
        let mut first_index: BTreeMap<StockKey, usize> = BTreeMap::new();
        for (index, request) in requests.iter().enumerate() {
            first_index.entry(request.key()).or_insert(index);
        }

        let mut slots = Vec::with_capacity(first_index.len());
        for (key, index) in &first_index {
            let slot = self.slot(*key).map_err(|e| batch_error(*index, e))?;
            slots.push((*key, *index, slot));
        }

        let deadline = self.deadline();
        let mut guards: BTreeMap<StockKey, MutexGuard<'_, KeyState>> = BTreeMap::new();
        for (key, index, slot) in &slots {
            let guard = lock_slot(slot, deadline).map_err(|e| batch_error(*index, e))?;
            guards.insert(*key, guard);
        }

        let mut references = self.references.lock().map_err(|_| LedgerError::Poisoned)?;
        if references.contains(reference) {
            return Err(LedgerError::DuplicateReference(reference.to_string()));
        }

        // Dry run against the locked state; nothing is written yet.
        let mut running: HashMap<StockKey, (i64, u64)> = guards
            .iter()
            .map(|(key, state)| (*key, (state.quantity(), state.sequence)))
            .collect();
        let mut movements = Vec::with_capacity(requests.len());
        for (index, mut request) in requests.into_iter().enumerate() {
            request.reference = Some(reference.to_string());
            let key = request.key();
            let (previous, sequence) = running.get(&key).copied().unwrap_or((0, 0));
            let movement =
                build_movement(previous, sequence, request).map_err(|e| batch_error(index, e))?;
            running.insert(key, (movement.new_quantity, movement.sequence));
            movements.push(movement);
        }

        let mut history = self.history.write().map_err(|_| LedgerError::Poisoned)?;
        for movement in &movements {
            if let Some(state) = guards.get_mut(&movement.key()) {
                apply_movement(state, movement);
            }
            history.push(movement.clone());
        }
        references.insert(reference.to_string());
        drop(history);
        drop(references);
        drop(guards);

        tracing::info!(
            reference,
            movement_count = movements.len(),
            key_count = slots.len(),
            "stock batch committed"
        );

        for movement in &movements {
            self.publish(InventoryEvent::MovementAppended(movement.clone()));
        }
        Ok(movements)
    }

    fn commit(
        &self,
        state: &mut KeyState,
        key: StockKey,
        request: MovementRequest,
    ) -> Result<StockMovement, LedgerError> {
        debug_assert_eq!(key, request.key());
        let movement = build_movement(state.quantity(), state.sequence, request)?;

        let mut history = self.history.write().map_err(|_| LedgerError::Poisoned)?;
        apply_movement(state, &movement);
        history.push(movement.clone());
        drop(history);

        tracing::debug!(
            product_id = %movement.product_id,
            location_id = %movement.location_id,
            kind = ?movement.kind,
            quantity = movement.quantity,
            previous = movement.previous_quantity,
            new = movement.new_quantity,
            "stock movement appended"
        );
        Ok(movement)
    }

    fn deadline(&self) -> Instant {
        Instant::now() + self.config.lock_timeout
    }

    fn existing_slot(&self, key: StockKey) -> Option<Slot> {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        slots.get(&key).cloned()
    }

    fn slot(&self, key: StockKey) -> Result<Slot, LedgerError> {
        if let Some(slot) = self.existing_slot(key) {
            return Ok(slot);
        }
        let mut slots = self.slots.write().map_err(|_| LedgerError::Poisoned)?;
        Ok(slots.entry(key).or_default().clone())
    }

    fn slots_snapshot(&self) -> Vec<(StockKey, Slot)> {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        slots.iter().map(|(k, s)| (*k, s.clone())).collect()
    }

    fn publish(&self, event: InventoryEvent) {
        let event_type = event.event_type();
        let occurred_at = event.occurred_at();
        if let Err(err) = self.bus.publish(event) {
            tracing::warn!(event_type, %occurred_at, error = %err, "failed to publish inventory event");
        }
    }
}

fn validate_request(request: &MovementRequest) -> Result<(), LedgerError> {
    if !request.kind.accepts(request.quantity) {
        return Err(LedgerError::InvalidQuantity {
            kind: request.kind,
            quantity: request.quantity,
        });
    }
    Ok(())
}

/// Derive the movement a request produces on top of `previous`.
fn build_movement(
    previous: i64,
    sequence: u64,
    request: MovementRequest,
) -> Result<StockMovement, LedgerError> {
    if let ExpectedQuantity::Exact(expected) = request.expected_previous {
        if expected != previous {
            return Err(LedgerError::StaleChain {
                expected,
                actual: previous,
            });
        }
    }

    let new_quantity = previous
        .checked_add(request.quantity)
        .ok_or(LedgerError::Overflow)?;
    if new_quantity < 0 && !request.kind.may_go_negative() {
        return Err(LedgerError::NegativeStock {
            available: previous,
            requested: request.quantity,
        });
    }

    Ok(StockMovement {
        id: MovementId::new(),
        product_id: request.product_id,
        location_id: request.location_id,
        kind: request.kind,
        quantity: request.quantity,
        previous_quantity: previous,
        new_quantity,
        reason: request.reason,
        reference: request.reference,
        actor: request.actor,
        occurred_at: request.occurred_at,
        sequence: sequence + 1,
    })
}

fn apply_movement(state: &mut KeyState, movement: &StockMovement) {
    let level = state
        .level
        .get_or_insert_with(|| StockLevel::empty(movement.key()));
    level.quantity = movement.new_quantity;
    level.updated_at = Some(movement.occurred_at);
    state.sequence = movement.sequence;
}

fn batch_error(index: usize, source: LedgerError) -> LedgerError {
    LedgerError::BatchRejected {
        index,
        source: Box::new(source),
    }
}

/// Bounded wait for a key slot.
fn lock_slot(slot: &Mutex<KeyState>, deadline: Instant) -> Result<MutexGuard<'_, KeyState>, LedgerError> {
    loop {
        match slot.try_lock() {
            Ok(guard) => return Ok(guard),
            Err(TryLockError::WouldBlock) => {
                if Instant::now() >= deadline {
                    return Err(LedgerError::LockTimeout);
                }
                thread::sleep(LOCK_POLL_INTERVAL);
            }
            Err(TryLockError::Poisoned(_)) => return Err(LedgerError::Poisoned),
        }
    }
}
