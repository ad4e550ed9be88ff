//! NR-U Release-16 Category-4 LBT gNB: prioritization period + M observation
//! slots, exponential backoff, MCOT-bounded transmission in either `rs`
//! (reservation-signal) or `gap` sub-mode, and the per-gNB sync-slot
//! boundary counter both sub-modes rely on.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use embassy_futures::select::{Either, select};
use log::{debug, warn};
use rand::Rng;
use rand::rngs::StdRng;

use super::medium::{MAX_PRIORITY, NruConfig, Technology, WirelessMedium, exponential_backoff_upper_limit};
use super::scheduler::{Handle, TaskId};

/// Retransmission count above which a gNB resets its exponential-backoff
/// history. Distinct from Wi-Fi's configurable `retry_limit`: NR-U never
/// drops the pending transmission here, it only forgets its backoff streak.
pub const NRU_RETRANSMISSION_CAP: u32 = 7;

/// Shared per-gNB synchronisation boundary, written by [`nru_sync_slot_task`]
/// and read by [`nru_station_task`] for the same gNB.
pub type SyncBoundary = Rc<Cell<u64>>;

/// Runs for the lifetime of the simulation: draws a one-time desync offset,
/// then advances `next_boundary` by `sync_slot_duration_us` forever.
pub async fn nru_sync_slot_task(
    id: TaskId,
    handle: Handle,
    config: NruConfig,
    next_boundary: SyncBoundary,
    rng: Rc<RefCell<StdRng>>,
) {
    let desync = rng
        .borrow_mut()
        .gen_range(config.min_sync_desync_us..=config.max_sync_desync_us);
    next_boundary.set(desync);
    handle.timeout(id, desync).await;

    loop {
        let next = next_boundary.get() + config.sync_slot_duration_us;
        next_boundary.set(next);
        handle.timeout(id, config.sync_slot_duration_us).await;
    }
}

pub async fn nru_station_task(
    id: TaskId,
    handle: Handle,
    medium: Rc<WirelessMedium>,
    config: NruConfig,
    gap_mode: bool,
    next_boundary: SyncBoundary,
    wifi_node_count: u32,
    rng: Rc<RefCell<StdRng>>,
) {
    let interrupt_signal = handle.interrupt_signal(id);
    let mut retries_in_a_row: u32 = 0;
    let pp = config.prioritization_period_total_us();

    loop {
        let upper = exponential_backoff_upper_limit(retries_in_a_row, config.min_cw, config.max_cw);
        let slots = if upper == 0 {
            0
        } else {
            rng.borrow_mut().gen_range(0..=upper)
        };
        medium
            .stats
            .borrow_mut()
            .record_backoff(slots, wifi_node_count);
        debug!("nru[{id}] drew {slots} backoff slots (retries_in_a_row={retries_in_a_row})");

        if gap_mode {
            // Gap mode folds PP into the backoff budget once, up front, because
            // the sync-slot gap placement below needs the PP-inclusive total to
            // pick a boundary with enough headroom. An interrupt during the
            // inner timeout only ever consumes whole observation slots (or, if
            // it lands inside the PP window itself, consumes nothing) — PP is
            // restored afterward rather than re-added at the top of the loop.
            let mut backoff_us = slots * config.observation_slot_us + pp;
            'defer: loop {
                medium.access_lock.request(id).await;
                medium.access_lock.release(id);

                let mut time_to_boundary = next_boundary.get().saturating_sub(handle.now_us());
                while backoff_us >= time_to_boundary {
                    time_to_boundary += config.sync_slot_duration_us;
                }
                handle.timeout(id, time_to_boundary - backoff_us).await;

                if medium.active_transmitter_count() > 0 {
                    continue 'defer;
                }

                medium.deferring_nru.borrow_mut().insert(id);
                let defer_start = handle.now_us();
                match select(handle.timeout(id, backoff_us), interrupt_signal.wait()).await {
                    Either::First(()) => {
                        medium.deferring_nru.borrow_mut().remove(id);
                        break 'defer;
                    }
                    Either::Second(()) => {
                        medium.deferring_nru.borrow_mut().remove(id);
                        let waited = handle.now_us() - defer_start;
                        backoff_us = if waited <= pp {
                            backoff_us.saturating_sub(pp)
                        } else {
                            let whole = (waited - pp) / config.observation_slot_us;
                            backoff_us.saturating_sub(whole * config.observation_slot_us + pp)
                        };
                        backoff_us = backoff_us.saturating_add(pp);
                        debug!("nru[{id}] backoff interrupted, {backoff_us}us remaining");
                    }
                }
            }
        } else {
            // RS mode re-adds PP at the top of every pass, same as Wi-Fi's DIFS:
            // the loop's own baseline is the raw slot budget, with PP drained
            // and restored transiently around each timeout attempt.
            let mut backoff_us = slots * config.observation_slot_us;
            loop {
                medium.access_lock.request(id).await;
                medium.access_lock.release(id);

                backoff_us += pp;
                medium.deferring_nru.borrow_mut().insert(id);
                let defer_start = handle.now_us();
                match select(handle.timeout(id, backoff_us), interrupt_signal.wait()).await {
                    Either::First(()) => {
                        medium.deferring_nru.borrow_mut().remove(id);
                        break;
                    }
                    Either::Second(()) => {
                        medium.deferring_nru.borrow_mut().remove(id);
                        let waited = handle.now_us() - defer_start;
                        backoff_us = if waited <= pp {
                            backoff_us.saturating_sub(pp)
                        } else {
                            let whole = (waited - pp) / config.observation_slot_us;
                            backoff_us.saturating_sub(whole * config.observation_slot_us + pp)
                        };
                        debug!("nru[{id}] backoff interrupted, {backoff_us}us remaining");
                    }
                }
            }
        }

        medium.active_nru.borrow_mut().insert(id);
        let total_time_us = config.mcot_ms * 1000;
        let rs_time_us = if gap_mode {
            0
        } else {
            next_boundary.get().saturating_sub(handle.now_us())
        };
        let data_time_us = total_time_us.saturating_sub(rs_time_us);

        let priority = MAX_PRIORITY - total_time_us as i64;
        let won = medium.priority_queue.try_acquire(id, priority);
        if won {
            medium.access_lock.request(id).await;
            medium.interrupt_all_deferring();
        }

        handle.timeout(id, total_time_us).await;

        let success = medium.active_transmitter_count() == 1;
        // Both resources are released together, right after the collision
        // check — unlike Wi-Fi, NR-U has no trailing ack/ack-timeout wait
        // to hold them through (spec 4.4: "No ACK timeout; collision
        // directly returns to backoff"). Only the winner clears the shared
        // active-transmitter state, and it clears both technologies' sets
        // wholesale rather than removing just itself — mirroring
        // `clear_transmission_state`, so a same-instant co-transmitter that
        // checks after this station does sees the cleared state instead of
        // a lone leftover entry.
        if won {
            medium.active_wifi.borrow_mut().clear();
            medium.active_nru.borrow_mut().clear();
            medium.priority_queue.release(id);
            medium.access_lock.release(id);
        }

        debug!("nru[{id}] transmission {}", if success { "succeeded" } else { "collided" });
        if success {
            let mut stats = medium.stats.borrow_mut();
            stats.add_control_airtime(id, rs_time_us);
            stats.add_data_airtime(id, data_time_us);
            stats.record_success(Technology::Nru);
            drop(stats);
            retries_in_a_row = 0;
        } else {
            medium.stats.borrow_mut().record_failure(Technology::Nru);
            retries_in_a_row += 1;
            if retries_in_a_row > NRU_RETRANSMISSION_CAP {
                warn!("nru[{id}] hit retransmission cap ({NRU_RETRANSMISSION_CAP}), resetting backoff history");
                retries_in_a_row = 0;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prioritization_period_is_pp_plus_m_observation_slots() {
        let config = NruConfig {
            prioritization_period_us: 16,
            observation_slot_us: 9,
            sync_slot_duration_us: 1000,
            min_sync_desync_us: 0,
            max_sync_desync_us: 0,
            m_observation_slots: 3,
            min_cw: 15,
            max_cw: 63,
            mcot_ms: 6,
        };
        assert_eq!(config.prioritization_period_total_us(), 43);
    }

    // Mirrors the interrupt-restore arithmetic inline in `nru_station_task`.
    // RS mode's loop re-adds PP at the top of every pass (same shape as
    // Wi-Fi's DIFS), so the restore step only ever needs to strip it back off.
    fn rs_restore(backoff_us: u64, waited: u64, pp: u64, observation_slot_us: u64) -> u64 {
        if waited <= pp {
            backoff_us.saturating_sub(pp)
        } else {
            let whole = (waited - pp) / observation_slot_us;
            backoff_us.saturating_sub(whole * observation_slot_us + pp)
        }
    }

    // Gap mode folds PP into the baseline once, so the restore step must add
    // it back after stripping it off, or two consecutive interrupts would
    // silently erase the prioritization period from the remaining budget.
    fn gap_restore(backoff_us: u64, waited: u64, pp: u64, observation_slot_us: u64) -> u64 {
        rs_restore(backoff_us, waited, pp, observation_slot_us).saturating_add(pp)
    }

    #[test]
    fn rs_restore_interrupted_within_pp_discards_only_pp() {
        let pp = 43;
        let backoff_us = 5 * 9 + pp; // 3 slots plus PP, freshly added this pass
        let remaining = rs_restore(backoff_us, 10, pp, 9);
        assert_eq!(remaining, 5 * 9); // back to the raw slot budget, PP stripped
    }

    #[test]
    fn rs_restore_interrupted_past_pp_keeps_leftover_whole_slots() {
        let pp = 43;
        let backoff_us = 10 * 9 + pp;
        let remaining = rs_restore(backoff_us, pp + 9 * 2 + 3, pp, 9); // 2 whole slots elapsed, 3us into a third
        assert_eq!(remaining, 8 * 9);
    }

    #[test]
    fn gap_restore_interrupted_within_pp_leaves_budget_unchanged() {
        let pp = 43;
        let backoff_us = 5 * 9 + pp;
        assert_eq!(gap_restore(backoff_us, 10, pp, 9), backoff_us);
    }

    #[test]
    fn gap_restore_interrupted_past_pp_only_consumes_whole_slots() {
        let pp = 43;
        let backoff_us = 10 * 9 + pp;
        let remaining = gap_restore(backoff_us, pp + 9 * 2 + 3, pp, 9);
        assert_eq!(remaining, 8 * 9 + pp);
    }
}
