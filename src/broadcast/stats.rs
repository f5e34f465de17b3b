//! Broadcaster statistics

/// Point-in-time counters of a [`Broadcaster`](super::Broadcaster)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastStats {
    /// Number of registered subscribers
    pub subscribers: usize,
    /// Non-empty frames accepted by `publish`
    pub frames_published: u64,
    /// Frames placed into a subscriber's delivery slot
    pub frames_delivered: u64,
    /// Frames skipped because the subscriber's slot was occupied
    pub frames_dropped: u64,
    /// Size of the last encoded frame, header included
    pub last_frame_size: usize,
}

impl BroadcastStats {
    /// Fraction of delivery attempts that were dropped (0.0 when none were made)
    pub fn drop_ratio(&self) -> f64 {
        let attempts = self.frames_delivered + self.frames_dropped;
        if attempts == 0 {
            0.0
        } else {
            self.frames_dropped as f64 / attempts as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drop_ratio() {
        let stats = BroadcastStats::default();
        assert_eq!(stats.drop_ratio(), 0.0);

        let stats = BroadcastStats {
            frames_delivered: 3,
            frames_dropped: 1,
            ..Default::default()
        };
        assert_eq!(stats.drop_ratio(), 0.25);
    }
}
