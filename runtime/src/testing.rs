//! Deterministic doubles for engine tests: a virtual clock and a scripted bus
//! that both append to one shared event log.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;
use std::time::Duration;

use crate::bus::{MotorBus, Register};
use crate::calibration::{Calibration, CalibrationTable};
use crate::clock::{CancelHandle, CancelToken, Clock, Wake};
use crate::error::{Error, Result};
use crate::roster::{Joint, NormMode, Roster};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Event {
    Read { joint: String },
    Write { joint: String, register: Register, value: i32 },
    Sleep(Duration),
}

impl Event {
    pub(crate) fn read(joint: &str) -> Self {
        Event::Read {
            joint: joint.to_string(),
        }
    }

    pub(crate) fn write(joint: &str, register: Register, value: i32) -> Self {
        Event::Write {
            joint: joint.to_string(),
            register,
            value,
        }
    }
}

pub(crate) type EventLog = Rc<RefCell<Vec<Event>>>;
pub(crate) type VirtualTime = Rc<Cell<Duration>>;

/// Roster `a` (id 1, centered) and `b` (id 2, one-sided).
pub(crate) fn two_joint_roster() -> Roster {
    Roster::new(vec![
        Joint::new("a", 1, NormMode::RangeM100_100),
        Joint::new("b", 2, NormMode::Range0_100),
    ])
    .unwrap()
}

/// Calibration for [`two_joint_roster`]: `a` spans 1000..=3000, `b` 2000..=3000.
pub(crate) fn calibrated_table() -> CalibrationTable {
    let mut entries = BTreeMap::new();
    entries.insert(
        "a".to_string(),
        Calibration { id: 1, drive_mode: 0, homing_offset: 0, range_min: 1000, range_max: 3000 },
    );
    entries.insert(
        "b".to_string(),
        Calibration { id: 2, drive_mode: 0, homing_offset: 0, range_min: 2000, range_max: 3000 },
    );
    CalibrationTable::new(entries).unwrap()
}

/// Clock that only moves when slept on or when a bus charges time to it.
pub(crate) struct ManualClock {
    now: VirtualTime,
    log: EventLog,
    sleeps: usize,
    cancel_on_sleep: Option<(usize, CancelHandle)>,
}

impl ManualClock {
    pub(crate) fn new(log: EventLog) -> Self {
        Self {
            now: Rc::new(Cell::new(Duration::ZERO)),
            log,
            sleeps: 0,
            cancel_on_sleep: None,
        }
    }

    /// Fire `handle` while the `n`-th sleep (1-based) is in progress.
    pub(crate) fn cancel_on_sleep(mut self, n: usize, handle: CancelHandle) -> Self {
        self.cancel_on_sleep = Some((n, handle));
        self
    }

    pub(crate) fn time(&self) -> VirtualTime {
        self.now.clone()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.now.get()
    }

    fn sleep_until(&mut self, deadline: Duration, cancel: &CancelToken) -> Wake {
        let now = self.now.get();
        self.log
            .borrow_mut()
            .push(Event::Sleep(deadline.saturating_sub(now)));

        self.sleeps += 1;
        if let Some((n, handle)) = &self.cancel_on_sleep {
            if self.sleeps == *n {
                handle.cancel();
            }
        }
        if cancel.is_cancelled() {
            return Wake::Cancelled;
        }

        self.now.set(now.max(deadline));
        Wake::Elapsed
    }
}

/// Bus returning fixed present positions and logging every access.
pub(crate) struct ScriptedBus {
    positions: HashMap<u8, i32>,
    calibration: Option<CalibrationTable>,
    log: EventLog,
    read_cost: Option<(VirtualTime, Duration)>,
    fail_after: Option<usize>,
    ops: usize,
}

impl ScriptedBus {
    pub(crate) fn new() -> Self {
        Self {
            positions: HashMap::new(),
            calibration: None,
            log: Rc::new(RefCell::new(Vec::new())),
            read_cost: None,
            fail_after: None,
            ops: 0,
        }
    }

    pub(crate) fn log(&self) -> EventLog {
        self.log.clone()
    }

    pub(crate) fn with_position(mut self, id: u8, ticks: i32) -> Self {
        self.positions.insert(id, ticks);
        self
    }

    pub(crate) fn with_calibration(mut self, table: CalibrationTable) -> Self {
        self.calibration = Some(table);
        self
    }

    /// Every read advances `time` by `cost`.
    pub(crate) fn with_read_cost(mut self, time: VirtualTime, cost: Duration) -> Self {
        self.read_cost = Some((time, cost));
        self
    }

    /// Bus operations after the first `ops` fail with `NoResponse`.
    pub(crate) fn failing_after(mut self, ops: usize) -> Self {
        self.fail_after = Some(ops);
        self
    }

    fn tick(&mut self, joint: &Joint) -> Result<()> {
        self.ops += 1;
        match self.fail_after {
            Some(limit) if self.ops > limit => Err(Error::NoResponse { id: joint.id }),
            _ => Ok(()),
        }
    }
}

impl MotorBus for ScriptedBus {
    fn read_raw(&mut self, register: Register, joint: &Joint) -> Result<i32> {
        self.tick(joint)?;
        if let Some((time, cost)) = &self.read_cost {
            time.set(time.get() + *cost);
        }
        self.log.borrow_mut().push(Event::read(&joint.name));

        Ok(match register {
            Register::PresentPosition => self.positions.get(&joint.id).copied().unwrap_or(2048),
            _ => 0,
        })
    }

    fn write_raw(&mut self, register: Register, joint: &Joint, value: i32) -> Result<()> {
        self.tick(joint)?;
        self.log
            .borrow_mut()
            .push(Event::write(&joint.name, register, value));
        Ok(())
    }

    fn calibration(&self) -> Option<&CalibrationTable> {
        self.calibration.as_ref()
    }
}
