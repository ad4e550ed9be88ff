//! The shared wireless medium: active-transmitter bookkeeping, the two
//! contention resources, and the cumulative counters statistics are derived
//! from.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use super::resources::{MutexResource, PriorityResource};
use super::scheduler::{Handle, TaskId};

/// Station-count-independent Wi-Fi parameters, shared by every Wi-Fi station
/// in a run.
#[derive(Debug, Clone, Copy)]
pub struct WiFiConfig {
    pub data_size_bytes: u64,
    pub min_cw: u32,
    pub max_cw: u32,
    pub retry_limit: u32,
    pub mcs: u8,
}

/// Station-count-independent NR-U parameters, shared by every gNB in a run.
#[derive(Debug, Clone, Copy)]
pub struct NruConfig {
    pub prioritization_period_us: u64,
    pub observation_slot_us: u64,
    pub sync_slot_duration_us: u64,
    pub min_sync_desync_us: u64,
    pub max_sync_desync_us: u64,
    pub m_observation_slots: u32,
    pub min_cw: u32,
    pub max_cw: u32,
    pub mcot_ms: u64,
}

impl NruConfig {
    pub fn prioritization_period_total_us(&self) -> u64 {
        self.prioritization_period_us + self.m_observation_slots as u64 * self.observation_slot_us
    }
}

/// `request(priority)` is compared as `MAX_PRIORITY - air_time_us`, so a
/// shorter intended transmission wins a same-instant contention tiebreak.
pub const MAX_PRIORITY: i64 = 1_000_000_000;

/// DCF/LBT exponential backoff window: `min(2^retries * (min_cw+1) - 1, max_cw)`.
/// Shared by the Wi-Fi and NR-U state machines, which differ only in the
/// slot duration and prioritization-period offset applied afterward.
pub fn exponential_backoff_upper_limit(retries_in_a_row: u32, min_cw: u32, max_cw: u32) -> u64 {
    let grown = (min_cw as u64 + 1)
        .saturating_mul(1u64 << retries_in_a_row.min(32))
        .saturating_sub(1);
    grown.min(max_cw as u64)
}

/// Technology discriminator used for cumulative counters and statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Technology {
    WiFi,
    Nru,
}

/// An insertion-ordered set of task ids. Iteration order is reproducible
/// given a seed, which a `HashSet` would not guarantee; the medium's
/// deferring/active-transmitter sets are iterated whenever interrupts fan
/// out, so their order is observable in simulation outcomes.
#[derive(Debug, Default, Clone)]
pub struct OrderedSet {
    order: Vec<TaskId>,
}

impl OrderedSet {
    pub fn new() -> Self {
        OrderedSet::default()
    }

    pub fn insert(&mut self, id: TaskId) {
        if !self.order.contains(&id) {
            self.order.push(id);
        }
    }

    pub fn remove(&mut self, id: TaskId) {
        self.order.retain(|&x| x != id);
    }

    pub fn clear(&mut self) {
        self.order.clear();
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.order.iter().copied()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NodeCounters {
    pub data_airtime_us: u64,
    pub control_airtime_us: u64,
}

/// Cumulative statistics the medium accumulates across the whole run.
#[derive(Debug, Default)]
pub struct MediumStats {
    pub per_node: HashMap<TaskId, NodeCounters>,
    pub succeeded: HashMap<Technology, u64>,
    pub failed: HashMap<Technology, u64>,
    pub bytes_sent: u64,
    /// `backoff_counts[slots][node_count]`, the backoff-slot histogram the
    /// sweep drivers plot against contention-window choices.
    pub backoff_counts: HashMap<u64, HashMap<u32, u64>>,
}

impl MediumStats {
    pub fn record_backoff(&mut self, slots: u64, node_count: u32) {
        *self
            .backoff_counts
            .entry(slots)
            .or_default()
            .entry(node_count)
            .or_insert(0) += 1;
    }

    pub fn add_data_airtime(&mut self, node: TaskId, us: u64) {
        self.per_node.entry(node).or_default().data_airtime_us += us;
    }

    pub fn add_control_airtime(&mut self, node: TaskId, us: u64) {
        self.per_node.entry(node).or_default().control_airtime_us += us;
    }

    pub fn record_success(&mut self, tech: Technology) {
        *self.succeeded.entry(tech).or_insert(0) += 1;
    }

    pub fn record_failure(&mut self, tech: Technology) {
        *self.failed.entry(tech).or_insert(0) += 1;
    }

    pub fn total_data_airtime_us(&self, nodes: &[TaskId]) -> u64 {
        nodes
            .iter()
            .map(|n| self.per_node.get(n).map(|c| c.data_airtime_us).unwrap_or(0))
            .sum()
    }

    pub fn total_control_airtime_us(&self, nodes: &[TaskId]) -> u64 {
        nodes
            .iter()
            .map(|n| {
                self.per_node
                    .get(n)
                    .map(|c| c.control_airtime_us)
                    .unwrap_or(0)
            })
            .sum()
    }
}

/// The rendezvous point every station task holds a reference to. Stations
/// never reference each other directly — only the medium.
pub struct WirelessMedium {
    pub handle: Handle,
    pub active_wifi: RefCell<OrderedSet>,
    pub active_nru: RefCell<OrderedSet>,
    pub deferring_wifi: RefCell<OrderedSet>,
    pub deferring_nru: RefCell<OrderedSet>,
    pub priority_queue: PriorityResource,
    pub access_lock: MutexResource,
    pub stats: RefCell<MediumStats>,
}

impl WirelessMedium {
    pub fn new(handle: Handle) -> Rc<Self> {
        Rc::new(WirelessMedium {
            access_lock: MutexResource::new(handle.clone()),
            priority_queue: PriorityResource::new(),
            handle,
            active_wifi: RefCell::new(OrderedSet::new()),
            active_nru: RefCell::new(OrderedSet::new()),
            deferring_wifi: RefCell::new(OrderedSet::new()),
            deferring_nru: RefCell::new(OrderedSet::new()),
            stats: RefCell::new(MediumStats::default()),
        })
    }

    /// Number of simultaneous on-air transmitters, across both technologies.
    pub fn active_transmitter_count(&self) -> usize {
        self.active_wifi.borrow().len() + self.active_nru.borrow().len()
    }

    /// Interrupt every station currently deferring (backing off), both
    /// technologies, in deterministic insertion order. Called once a station
    /// has won the channel and is about to go on-air, since every deferring
    /// station's backoff budget is now stale.
    pub fn interrupt_all_deferring(&self) {
        let wifi: Vec<_> = self.deferring_wifi.borrow().iter().collect();
        let nru: Vec<_> = self.deferring_nru.borrow().iter().collect();
        for id in wifi.into_iter().chain(nru) {
            self.handle.interrupt(id);
        }
    }
}
