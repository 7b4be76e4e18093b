// Race sequencer.
//
// Finite state machine stepping through a `Course`. Each call to
// `RaceSequencer::tick` evaluates the active segment's exit condition and,
// when it is met, runs one generic transition: stop, reset distance, settle,
// issue the next command.
//
// Nothing here sleeps. Settle intervals and timed segments are deadlines in
// ticks, so the caller keeps polling the safety monitor at the normal rate.

use std::time::Duration;

use tracing::{debug, info};

use crate::course::{Course, ExitPolicy, SegmentSpec};
use crate::distance::DistanceTracker;
use crate::hal::{Actuator, Result, StopMode, WheelEncoders};
use crate::messages::{RaceEvent, RaceHealth};
use crate::motor::MotionController;

/// Control tick counter
pub type Tick = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RaceState {
    Ready,
    /// Index into the course table
    Segment(usize),
    Finished,
    /// Abandoned after an emergency stop under the halt policy
    Halted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    /// Stopped, waiting before the segment command goes out
    Settling { until: Tick },
    /// Command issued; `deadline` is set for duration-gated segments
    Active { deadline: Option<Tick> },
}

/// Timing knobs for the sequencer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SequencerSettings {
    pub tick_period: Duration,
    /// Ticks between a segment's stop and the next segment's command
    pub settle_ticks: u64,
    /// Ticks spent stopped in `Ready` before the first segment
    pub start_settle_ticks: u64,
}

impl Default for SequencerSettings {
    fn default() -> Self {
        Self {
            tick_period: Duration::from_millis(10),
            settle_ticks: 10,
            start_settle_ticks: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RaceResult {
    pub start: Tick,
    pub end: Tick,
    pub elapsed: Duration,
}

/// Start and end ticks, each set once and consumed by a single report
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RaceTiming {
    start: Option<Tick>,
    end: Option<Tick>,
}

impl RaceTiming {
    pub fn start(&self) -> Option<Tick> {
        self.start
    }

    pub fn end(&self) -> Option<Tick> {
        self.end
    }

    fn mark_start(&mut self, now: Tick) {
        if self.start.is_none() {
            self.start = Some(now);
        }
    }

    fn mark_end(&mut self, now: Tick) {
        if self.end.is_none() {
            self.end = Some(now);
        }
    }

    /// Build the report and clear both marks
    fn take_result(&mut self, tick_period: Duration) -> Option<RaceResult> {
        let (start, end) = (self.start.take()?, self.end.take()?);
        let ticks = end.saturating_sub(start);
        Some(RaceResult {
            start,
            end,
            elapsed: tick_period.saturating_mul(u32::try_from(ticks).unwrap_or(u32::MAX)),
        })
    }
}

pub struct RaceSequencer {
    course: Course,
    settings: SequencerSettings,
    state: RaceState,
    phase: Phase,
    timing: RaceTiming,
    result: Option<RaceResult>,
}

impl RaceSequencer {
    pub fn new(course: Course, settings: SequencerSettings) -> Self {
        Self {
            course,
            settings,
            state: RaceState::Ready,
            phase: Phase::Idle,
            timing: RaceTiming::default(),
            result: None,
        }
    }

    pub fn state(&self) -> RaceState {
        self.state
    }

    pub fn course(&self) -> &Course {
        &self.course
    }

    pub fn timing(&self) -> RaceTiming {
        self.timing
    }

    /// Final result, present once the race has finished
    pub fn result(&self) -> Option<RaceResult> {
        self.result
    }

    pub fn current_segment(&self) -> Option<&SegmentSpec> {
        match self.state {
            RaceState::Segment(i) => Some(self.course.segment(i)),
            _ => None,
        }
    }

    /// True while the active segment is waiting out its settle interval
    pub fn is_settling(&self) -> bool {
        matches!(self.phase, Phase::Settling { .. })
    }

    pub fn health(&self) -> RaceHealth {
        match self.state {
            RaceState::Ready => RaceHealth::Ready,
            RaceState::Segment(_) => RaceHealth::Racing,
            RaceState::Finished => RaceHealth::Finished,
            RaceState::Halted => RaceHealth::Halted,
        }
    }

    /// Advance the state machine by one control tick
    pub fn tick<A: Actuator, E: WheelEncoders>(
        &mut self,
        now: Tick,
        motion: &mut MotionController<A>,
        distance: &mut DistanceTracker<E>,
    ) -> Result<Option<RaceEvent>> {
        match self.state {
            RaceState::Ready => self.tick_ready(now, motion, distance),
            RaceState::Segment(i) => self.tick_segment(i, now, motion, distance),
            RaceState::Finished | RaceState::Halted => {
                motion.stop(StopMode::Brake)?;
                Ok(None)
            }
        }
    }

    /// Abandon the race and hold the brakes
    ///
    /// No-op once finished or already halted.
    pub fn halt<A: Actuator>(
        &mut self,
        now: Tick,
        motion: &mut MotionController<A>,
    ) -> Result<Option<RaceEvent>> {
        if matches!(self.state, RaceState::Finished | RaceState::Halted) {
            return Ok(None);
        }
        let segment = self.current_segment().map(|s| s.id.clone());
        motion.stop(StopMode::Brake)?;
        self.state = RaceState::Halted;
        self.phase = Phase::Idle;
        info!(tick = now, segment = ?segment, "Race halted");
        Ok(Some(RaceEvent::Halted { tick: now, segment }))
    }

    fn tick_ready<A: Actuator, E: WheelEncoders>(
        &mut self,
        now: Tick,
        motion: &mut MotionController<A>,
        distance: &mut DistanceTracker<E>,
    ) -> Result<Option<RaceEvent>> {
        let until = match self.phase {
            Phase::Settling { until } => until,
            _ => {
                motion.stop(StopMode::Coast)?;
                let until = now.saturating_add(self.settings.start_settle_ticks);
                self.phase = Phase::Settling { until };
                until
            }
        };
        if now < until {
            return Ok(None);
        }

        self.timing.mark_start(now);
        distance.reset()?;
        self.state = RaceState::Segment(0);
        self.engage(0, now, motion)?;

        let segment = self.course.segment(0).id.clone();
        info!(tick = now, "Race started -> {}", segment);
        Ok(Some(RaceEvent::Started { tick: now, segment }))
    }

    fn tick_segment<A: Actuator, E: WheelEncoders>(
        &mut self,
        index: usize,
        now: Tick,
        motion: &mut MotionController<A>,
        distance: &mut DistanceTracker<E>,
    ) -> Result<Option<RaceEvent>> {
        let deadline = match self.phase {
            Phase::Settling { until } => {
                if now >= until {
                    self.engage(index, now, motion)?;
                }
                return Ok(None);
            }
            Phase::Active { deadline } => deadline,
            // Only reachable if the state was set without engaging; treat as entry
            Phase::Idle => {
                self.engage(index, now, motion)?;
                return Ok(None);
            }
        };

        let segment = self.course.segment(index);
        let complete = match segment.exit {
            ExitPolicy::Distance { threshold } => distance.read()? >= threshold,
            ExitPolicy::Duration { .. } => deadline.is_some_and(|d| now >= d),
        };

        if complete {
            return self.advance(index, now, motion, distance);
        }

        // Something else stopped the wheels (emergency stop); pick the segment back up
        if motion.is_stopped() && !segment.command.is_zero() {
            debug!(tick = now, segment = %segment.id, "re-issuing segment command");
            motion.issue(segment.command)?;
        }
        Ok(None)
    }

    fn advance<A: Actuator, E: WheelEncoders>(
        &mut self,
        index: usize,
        now: Tick,
        motion: &mut MotionController<A>,
        distance: &mut DistanceTracker<E>,
    ) -> Result<Option<RaceEvent>> {
        let Some(next) = self.course.next_of(index) else {
            return self.finish(index, now, motion);
        };

        motion.stop(StopMode::Coast)?;
        distance.reset()?;
        self.state = RaceState::Segment(next);
        if self.settings.settle_ticks == 0 {
            self.engage(next, now, motion)?;
        } else {
            self.phase = Phase::Settling {
                until: now.saturating_add(self.settings.settle_ticks),
            };
        }

        let from = self.course.segment(index).id.clone();
        let to = self.course.segment(next).id.clone();
        info!(tick = now, "{} complete -> {}", from, to);
        Ok(Some(RaceEvent::SegmentChanged { tick: now, from, to }))
    }

    fn finish<A: Actuator>(
        &mut self,
        index: usize,
        now: Tick,
        motion: &mut MotionController<A>,
    ) -> Result<Option<RaceEvent>> {
        motion.stop(StopMode::Brake)?;
        self.timing.mark_end(now);
        self.state = RaceState::Finished;
        self.phase = Phase::Idle;

        let Some(result) = self.timing.take_result(self.settings.tick_period) else {
            return Ok(None);
        };
        self.result = Some(result);

        let elapsed_ms = u64::try_from(result.elapsed.as_millis()).unwrap_or(u64::MAX);
        info!(
            tick = now,
            "{} complete -> finished in {:.2}s",
            self.course.segment(index).id,
            result.elapsed.as_secs_f64()
        );
        Ok(Some(RaceEvent::Finished {
            tick: now,
            elapsed_ms,
        }))
    }

    /// Issue the segment command and arm its exit condition
    fn engage<A: Actuator>(
        &mut self,
        index: usize,
        now: Tick,
        motion: &mut MotionController<A>,
    ) -> Result<()> {
        let segment = self.course.segment(index);
        motion.issue(segment.command)?;
        let deadline = match segment.exit {
            ExitPolicy::Duration { ticks } => Some(now.saturating_add(ticks)),
            ExitPolicy::Distance { .. } => None,
        };
        self.phase = Phase::Active { deadline };
        debug!(tick = now, segment = %segment.id, ?deadline, "segment engaged");
        Ok(())
    }
}
