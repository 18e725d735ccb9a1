use tracing::warn;

/// Sequence numbers of requests on one connection.
///
/// Requests are numbered from 1 in submission order. Server packets carry only low 16 bits, which
/// are widened against the last sequence read, as packets arrive in request order.
#[derive(Default, Debug)]
pub struct SequenceTracker {
    last_sent: u64,
    last_read: u64,
}

impl SequenceTracker {
    pub fn next(&mut self) -> u64 {
        self.last_sent += 1;
        self.last_sent
    }

    pub fn last_sent(&self) -> u64 {
        self.last_sent
    }

    #[cfg(test)]
    pub fn last_read(&self) -> u64 {
        self.last_read
    }

    pub fn widen(&mut self, wire: u16) -> u64 {
        let mut sequence = (self.last_read & !0xffff) | wire as u64;
        if sequence < self.last_read {
            sequence += 0x10000;
        }
        if sequence > self.last_sent {
            warn!(sequence, last_sent = self.last_sent, "server packet refers to request not yet sent");
        }
        self.last_read = sequence;
        sequence
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::SequenceTracker;

    #[test]
    fn test_next() {
        let mut tracker = SequenceTracker::default();
        assert_eq!(tracker.next(), 1);
        assert_eq!(tracker.next(), 2);
        assert_eq!(tracker.last_sent(), 2);
    }

    #[test]
    fn test_widen() {
        let mut tracker = SequenceTracker::default();
        for _ in 0..0x2_0010 {
            tracker.next();
        }
        assert_eq!(tracker.widen(5), 5);
        assert_eq!(tracker.widen(5), 5);
        assert_eq!(tracker.widen(0xfffe), 0xfffe);
        assert_eq!(tracker.widen(0x0003), 0x1_0003);
        assert_eq!(tracker.widen(0xffff), 0x1_ffff);
        assert_eq!(tracker.widen(0), 0x2_0000);
        assert_eq!(tracker.widen(0x10), 0x2_0010);
        assert_eq!(tracker.last_read(), 0x2_0010);
    }
}
