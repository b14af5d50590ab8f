/// Fixed-period timer driven by an external clock. Fires on the first poll,
/// then once per period. A caller that falls more than a whole period behind
/// gets a single catch-up tick instead of a burst.
#[derive(Debug, Clone)]
pub struct TickTimer {
    period_ms: u64,
    next_due: Option<u64>,
    ticks: u64,
}

impl TickTimer {
    pub fn new(period_ms: u64) -> Self {
        Self {
            period_ms: period_ms.max(1),
            next_due: None,
            ticks: 0,
        }
    }

    pub fn period_ms(&self) -> u64 {
        self.period_ms
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn next_due(&self) -> Option<u64> {
        self.next_due
    }

    pub fn poll(&mut self, now: u64) -> bool {
        let fire = match self.next_due {
            None => true,
            Some(due) => now >= due,
        };

        if fire {
            let next = match self.next_due {
                Some(due) if now - due < self.period_ms => due + self.period_ms,
                _ => now + self.period_ms,
            };
            self.next_due = Some(next);
            self.ticks += 1;
        }

        fire
    }

    pub fn reset(&mut self) {
        self.next_due = None;
    }
}
