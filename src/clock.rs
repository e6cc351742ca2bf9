use time::{Date, OffsetDateTime, UtcOffset};

/// Source of "now" for anything that reasons about calendar days.
pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;

    /// Offset that defines where a local calendar day starts.
    fn offset(&self) -> UtcOffset;

    fn today(&self) -> Date {
        self.now().to_offset(self.offset()).date()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    offset: UtcOffset,
}

impl SystemClock {
    pub fn new(offset: UtcOffset) -> Self {
        Self { offset }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }

    fn offset(&self) -> UtcOffset {
        self.offset
    }
}

#[cfg(test)]
pub struct FixedClock {
    pub now: OffsetDateTime,
    pub offset: UtcOffset,
}

#[cfg(test)]
impl FixedClock {
    pub fn on(date: Date) -> Self {
        Self {
            now: date.with_hms(12, 0, 0).unwrap().assume_utc(),
            offset: UtcOffset::UTC,
        }
    }
}

#[cfg(test)]
impl Clock for FixedClock {
    fn now(&self) -> OffsetDateTime {
        self.now
    }

    fn offset(&self) -> UtcOffset {
        self.offset
    }
}
