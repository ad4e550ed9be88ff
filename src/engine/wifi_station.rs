//! Wi-Fi 802.11 DCF station: saturated-backlog contention, exponential
//! backoff, ACK-or-collision retry.

use std::cell::RefCell;
use std::rc::Rc;

use embassy_futures::select::{Either, select};
use log::debug;
use rand::Rng;
use rand::rngs::StdRng;

use super::medium::{MAX_PRIORITY, Technology, WiFiConfig, WirelessMedium, exponential_backoff_upper_limit};
use super::scheduler::{Handle, TaskId};
use super::timings::{ACK_TIMEOUT_US, DIFS_US, RadioTimings, SLOT_US};

/// Fixed baseline air time for a Wi-Fi data frame in this model. Kept as a
/// literal rather than derived from `RadioTimings::ppdu_time_us` — the
/// statistics every sweep in this repository is calibrated against assume
/// this constant, and wiring the two together is a deliberate future
/// variant, not a silent default change.
pub const WIFI_AIR_TIME_US: u64 = 5400;

pub async fn wifi_station_task(
    id: TaskId,
    handle: Handle,
    medium: Rc<WirelessMedium>,
    config: WiFiConfig,
    wifi_node_count: u32,
    rng: Rc<RefCell<StdRng>>,
) {
    let timings = RadioTimings::new(config.data_size_bytes, config.mcs);
    let interrupt_signal = handle.interrupt_signal(id);
    let mut retries_in_a_row: u32 = 0;
    let mut frame_retransmissions: u32 = 0;

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
        let mut backoff_us = slots * SLOT_US;
        debug!("wifi[{id}] drew {slots} backoff slots (retries_in_a_row={retries_in_a_row})");

        loop {
            medium.access_lock.request(id).await;
            medium.access_lock.release(id);

            backoff_us += DIFS_US;
            medium.deferring_wifi.borrow_mut().insert(id);
            let defer_start = handle.now_us();

            match select(handle.timeout(id, backoff_us), interrupt_signal.wait()).await {
                Either::First(()) => {
                    medium.deferring_wifi.borrow_mut().remove(id);
                    break;
                }
                Either::Second(()) => {
                    medium.deferring_wifi.borrow_mut().remove(id);
                    let waited = handle.now_us() - defer_start;
                    backoff_us = if waited <= DIFS_US {
                        backoff_us.saturating_sub(DIFS_US)
                    } else {
                        let whole_slots = (waited - DIFS_US) / SLOT_US;
                        backoff_us.saturating_sub(whole_slots * SLOT_US + DIFS_US)
                    };
                    debug!("wifi[{id}] backoff interrupted, {backoff_us}us remaining");
                }
            }
        }

        medium.active_wifi.borrow_mut().insert(id);
        let priority = MAX_PRIORITY - WIFI_AIR_TIME_US as i64;
        let won = medium.priority_queue.try_acquire(id, priority);
        if won {
            medium.access_lock.request(id).await;
            medium.interrupt_all_deferring();
        }

        handle.timeout(id, WIFI_AIR_TIME_US).await;

        let success = medium.active_transmitter_count() == 1;
        // Only the station that actually won contention clears the shared
        // active-transmitter state, and it clears both technologies' sets
        // wholesale rather than removing just itself — mirroring
        // `clear_transmission_state`. A same-instant preemption loser never
        // touches these sets on its own completion; the winner's clear (on
        // whichever side of the loser's own check it happens to run) is what
        // keeps a genuine collision from reading back as a lone success.
        if won {
            medium.active_wifi.borrow_mut().clear();
            medium.active_nru.borrow_mut().clear();
        }
        debug!("wifi[{id}] transmission {}", if success { "succeeded" } else { "collided" });

        // `access_lock`/`priority_queue` are released only once the trailing
        // ack/ack-timeout wait below completes, not right after the
        // collision check — a same-instant contender that loses the
        // priority tiebreak must see this station still holding both
        // resources, or it would wrongly also "win" and block on
        // `access_lock` instead of taking the preemption branch straight
        // into its own air-time timeout.
        if success {
            medium
                .stats
                .borrow_mut()
                .add_control_airtime(id, timings.ack_time_us());
            handle.timeout(id, timings.ack_time_us()).await;
            if won {
                medium.priority_queue.release(id);
                medium.access_lock.release(id);
            }
            let mut stats = medium.stats.borrow_mut();
            stats.add_data_airtime(id, WIFI_AIR_TIME_US);
            stats.bytes_sent += config.data_size_bytes;
            stats.record_success(Technology::WiFi);
            drop(stats);
            retries_in_a_row = 0;
            frame_retransmissions = 0;
        } else {
            medium.stats.borrow_mut().record_failure(Technology::WiFi);
            retries_in_a_row += 1;
            frame_retransmissions += 1;
            if frame_retransmissions > config.retry_limit {
                debug!("wifi[{id}] retry limit exceeded, dropping frame");
                frame_retransmissions = 0;
                retries_in_a_row = 0;
            }
            handle.timeout(id, ACK_TIMEOUT_US).await;
            if won {
                medium.priority_queue.release(id);
                medium.access_lock.release(id);
            }
        }
    }
}
