use chrono::{Local, NaiveDateTime};

/// Source of the wall-clock time used to pick an upload's bucket.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// Local time of the running process.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

#[cfg(test)]
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(NaiveDateTime);

#[cfg(test)]
impl FixedClock {
    pub fn new(at: NaiveDateTime) -> Self {
        Self(at)
    }
}

#[cfg(test)]
impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}
