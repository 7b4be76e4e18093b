// Race course table.
//
// A course is an ordered list of `SegmentSpec`s. Each segment carries its
// own exit policy and commanded velocity, and names the segment that follows
// it. Transitions only ever move forward through the table.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::motor::kinematics::VelocityCommand;

/// When a segment is complete
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExitPolicy {
    /// Averaged encoder distance (pulses) reaches the threshold, inclusive
    Distance { threshold: f64 },
    /// Fixed number of control ticks after the command is issued
    Duration { ticks: u64 },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NextSegment {
    /// The next entry in the table, or the finish after the last one
    #[default]
    Following,
    Finish,
    Segment(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentSpec {
    pub id: String,
    pub exit: ExitPolicy,
    pub command: VelocityCommand,
    #[serde(default)]
    pub next: NextSegment,
}

impl SegmentSpec {
    pub fn distance(id: &str, threshold: f64, command: VelocityCommand) -> Self {
        Self {
            id: id.to_string(),
            exit: ExitPolicy::Distance { threshold },
            command,
            next: NextSegment::Following,
        }
    }

    pub fn duration(id: &str, ticks: u64, command: VelocityCommand) -> Self {
        Self {
            id: id.to_string(),
            exit: ExitPolicy::Duration { ticks },
            command,
            next: NextSegment::Following,
        }
    }

    pub fn then(mut self, next: NextSegment) -> Self {
        self.next = next;
        self
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum CourseError {
    #[error("course has no segments")]
    Empty,
    #[error("duplicate segment id '{0}'")]
    DuplicateId(String),
    #[error("segment '{from}' continues to unknown segment '{to}'")]
    UnknownNext { from: String, to: String },
    #[error("segment '{from}' continues backwards to '{to}'")]
    BackwardNext { from: String, to: String },
}

/// Validated course with resolved successor indices
#[derive(Debug, Clone)]
pub struct Course {
    segments: Vec<SegmentSpec>,
    next: Vec<Option<usize>>,
}

impl Course {
    /// Resolve `next` links. Thresholds and durations are not range-checked.
    pub fn new(segments: Vec<SegmentSpec>) -> Result<Self, CourseError> {
        if segments.is_empty() {
            return Err(CourseError::Empty);
        }

        let mut index = HashMap::with_capacity(segments.len());
        for (i, seg) in segments.iter().enumerate() {
            if index.insert(seg.id.as_str(), i).is_some() {
                return Err(CourseError::DuplicateId(seg.id.clone()));
            }
        }

        let mut next = Vec::with_capacity(segments.len());
        for (i, seg) in segments.iter().enumerate() {
            let resolved = match &seg.next {
                NextSegment::Following => (i + 1 < segments.len()).then_some(i + 1),
                NextSegment::Finish => None,
                NextSegment::Segment(to) => {
                    let j = *index.get(to.as_str()).ok_or_else(|| CourseError::UnknownNext {
                        from: seg.id.clone(),
                        to: to.clone(),
                    })?;
                    if j <= i {
                        return Err(CourseError::BackwardNext {
                            from: seg.id.clone(),
                            to: to.clone(),
                        });
                    }
                    Some(j)
                }
            };
            next.push(resolved);
        }

        Ok(Self { segments, next })
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segment(&self, index: usize) -> &SegmentSpec {
        &self.segments[index]
    }

    pub fn segments(&self) -> &[SegmentSpec] {
        &self.segments
    }

    /// Index of the segment after `index`, `None` for the finish
    pub fn next_of(&self, index: usize) -> Option<usize> {
        self.next[index]
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.segments.iter().position(|s| s.id == id)
    }
}

// Straights: pulses, measured on the practice track
const STRAIGHT_01: f64 = 50_000.0;
const STRAIGHT_02: f64 = 15_000.0;
const STRAIGHT_03: f64 = 10_000.0;
const STRAIGHT_04: f64 = 10_000.0;
const STRAIGHT_HOME: f64 = 10_000.0;

const STRAIGHT_SPEED: f32 = 0.6;
const TURN_SPEED: f32 = 0.3;
const TURN_RATE: f32 = 2.0;

/// The fixed eleven-segment course
///
/// Straight runs are distance-gated. The turns are timed at a fixed
/// angular rate because the encoders are too coarse for short arcs.
pub fn default_course() -> Vec<SegmentSpec> {
    let straight = VelocityCommand::straight(STRAIGHT_SPEED);
    let right = VelocityCommand::arc(TURN_SPEED, -TURN_RATE);
    let left = VelocityCommand::arc(TURN_SPEED, TURN_RATE);

    vec![
        SegmentSpec::distance("straight_01", STRAIGHT_01, straight),
        SegmentSpec::duration("turn_right_150", 165, right),
        SegmentSpec::distance("straight_02", STRAIGHT_02, straight),
        SegmentSpec::duration("turn_right_90_a", 100, right),
        SegmentSpec::duration("turn_left_60", 68, left),
        SegmentSpec::distance("straight_03", STRAIGHT_03, straight),
        SegmentSpec::duration("turn_left_63", 72, left),
        SegmentSpec::duration("turn_right_153", 170, right),
        SegmentSpec::distance("straight_04", STRAIGHT_04, straight),
        SegmentSpec::duration("turn_right_90_b", 100, right),
        SegmentSpec::distance("straight_home", STRAIGHT_HOME, straight),
    ]
}
