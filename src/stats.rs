//! Pure statistics derived from a completed run's cumulative airtime and
//! success/failure counters: channel occupancy, efficiency, collision
//! probability, and the two fairness measures used to compare Wi-Fi and
//! NR-U's shares of the medium.

/// Fraction of total simulation time a technology's stations held the
/// channel, data plus control airtime combined.
pub fn channel_occupancy(data_airtime_us: u64, control_airtime_us: u64, total_time_us: u64) -> f64 {
    if total_time_us == 0 {
        return 0.0;
    }
    (data_airtime_us + control_airtime_us) as f64 / total_time_us as f64
}

/// Fraction of total simulation time spent carrying user data specifically
/// (excludes ACK/reservation-signal control overhead).
pub fn channel_efficiency(data_airtime_us: u64, total_time_us: u64) -> f64 {
    if total_time_us == 0 {
        return 0.0;
    }
    data_airtime_us as f64 / total_time_us as f64
}

/// Fraction of attempts that collided. Zero attempts is defined as zero
/// collision probability rather than undefined.
pub fn collision_probability(failed: u64, succeeded: u64) -> f64 {
    let total = failed + succeeded;
    if total == 0 {
        0.0
    } else {
        failed as f64 / total as f64
    }
}

/// Jain's fairness index between two technologies' channel occupancy
/// shares. Defined as perfectly fair (1.0) when both shares are zero, since
/// there is nothing to be unfair about.
pub fn jain_fairness(occupancy_wifi: f64, occupancy_nru: f64) -> f64 {
    let sum = occupancy_wifi + occupancy_nru;
    let sum_sq = occupancy_wifi.powi(2) + occupancy_nru.powi(2);
    if sum_sq == 0.0 {
        1.0
    } else {
        sum.powi(2) / (2.0 * sum_sq)
    }
}

/// Jain's fairness weighted by how much of the medium was actually used, so
/// a "fair" split of near-zero occupancy doesn't look as good as a fair
/// split of a heavily contended channel.
pub fn joint_airtime_fairness(occupancy_wifi: f64, occupancy_nru: f64) -> f64 {
    jain_fairness(occupancy_wifi, occupancy_nru) * (occupancy_wifi + occupancy_nru)
}
