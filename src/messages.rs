// Message types emitted by the race runtime

use serde::{Deserialize, Serialize};

/// Something that happened on a given control tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RaceEvent {
    /// Battery voltage sampled once before the start
    Battery { volts: f32 },
    /// Ready -> first segment
    Started { tick: u64, segment: String },
    SegmentChanged { tick: u64, from: String, to: String },
    /// Reported exactly once per race
    Finished { tick: u64, elapsed_ms: u64 },
    EmergencyStop { tick: u64, segment: Option<String> },
    Halted { tick: u64, segment: Option<String> },
}

/// Health status published every tick
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RaceHealth {
    Ready,
    Racing,
    EmergencyStop,
    Finished,
    Halted,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_format() {
        let event = RaceEvent::SegmentChanged {
            tick: 42,
            from: "straight_01".into(),
            to: "turn_right_150".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "segment_changed");
        assert_eq!(json["tick"], 42);
        assert_eq!(json["to"], "turn_right_150");
    }

    #[test]
    fn test_health_wire_format() {
        let json = serde_json::to_string(&RaceHealth::EmergencyStop).unwrap();
        assert_eq!(json, "\"emergency_stop\"");
    }
}
