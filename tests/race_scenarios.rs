// End-to-end race scenarios driven through Runtime::step with recording fakes

mod common;

use common::{settings, Call, Harness};
use omni_race_runtime::course::{default_course, ExitPolicy, SegmentSpec};
use omni_race_runtime::hal::StopMode;
use omni_race_runtime::messages::{RaceEvent, RaceHealth};
use omni_race_runtime::motor::{mix, VelocityCommand};
use omni_race_runtime::safety::EstopPolicy;
use omni_race_runtime::sequencer::RaceState;

fn step_until(
    h: &mut Harness,
    limit: usize,
    mut done: impl FnMut(&Harness) -> bool,
) -> Vec<RaceEvent> {
    let mut events = Vec::new();
    for _ in 0..limit {
        events.extend(h.runtime.step().unwrap());
        if done(h) {
            return events;
        }
    }
    panic!("condition not reached in {} ticks", limit);
}

fn reads(log: &[Call]) -> Vec<i64> {
    log.iter()
        .filter_map(|c| match c {
            Call::ReadDistance(d) => Some(*d),
            _ => None,
        })
        .collect()
}

#[test]
fn first_straight_exits_on_first_reading_past_threshold() {
    let mut course = default_course();
    course[0].exit = ExitPolicy::Distance { threshold: 15530.0 };
    let mut h = Harness::new(course, settings(10, 1), 500);

    let events = step_until(&mut h, 10, |h| {
        h.runtime.sequencer().state() == RaceState::Segment(0)
    });
    assert_eq!(
        events,
        vec![RaceEvent::Started {
            tick: 1,
            segment: "straight_01".into()
        }]
    );
    assert_eq!(h.runtime.sequencer().timing().start(), Some(1));
    h.take_log();

    let events = step_until(&mut h, 100, |h| {
        h.runtime.sequencer().state() == RaceState::Segment(1)
    });
    let log = h.take_log();
    let samples = reads(&log);

    // 31 * 500 = 15500 is short, 32 * 500 = 16000 crosses
    assert_eq!(samples.len(), 32);
    assert_eq!(samples[30], 15500);
    assert_eq!(samples[31], 16000);
    assert_eq!(
        events,
        vec![RaceEvent::SegmentChanged {
            tick: 33,
            from: "straight_01".into(),
            to: "turn_right_150".into(),
        }]
    );

    // stop (coast) then reset after the crossing sample
    let tail = &log[log.len() - 2..];
    assert_eq!(tail, &[Call::Stop(StopMode::Coast), Call::ResetDistance]);

    // Start tick is not touched by later transitions
    step_until(&mut h, 1000, |h| h.runtime.sequencer().state() == RaceState::Segment(3));
    assert_eq!(h.runtime.sequencer().timing().start(), Some(1));
}

#[test]
fn distance_exit_fires_on_exact_threshold() {
    let fwd = VelocityCommand::straight(0.5);
    let mut h = Harness::new(
        vec![
            SegmentSpec::distance("a", 15500.0, fwd),
            SegmentSpec::distance("b", 1e9, fwd),
        ],
        settings(0, 0),
        500,
    );
    step_until(&mut h, 100, |h| h.runtime.sequencer().state() == RaceState::Segment(1));
    let samples = reads(&h.take_log());
    assert_eq!(samples.last(), Some(&15500));
    assert_eq!(samples.len(), 31);
}

#[test]
fn emergency_stop_mid_segment_keeps_segment() {
    let mut h = Harness::new(default_course(), settings(0, 0), 500);
    step_until(&mut h, 10_000, |h| h.runtime.sequencer().state() == RaceState::Segment(3));
    for _ in 0..5 {
        h.runtime.step().unwrap();
    }
    h.take_log();

    h.button.set(true);
    let events = h.runtime.step().unwrap();

    assert_eq!(
        h.take_log(),
        vec![Call::Stop(StopMode::Brake), Call::ResetDistance]
    );
    assert!(matches!(
        &events[..],
        [RaceEvent::EmergencyStop { segment: Some(id), .. }] if id == "turn_right_90_a"
    ));
    assert_eq!(h.runtime.sequencer().state(), RaceState::Segment(3));
    assert_eq!(h.runtime.health(), RaceHealth::EmergencyStop);

    // Released: same segment, its command goes out again
    h.button.set(false);
    h.runtime.step().unwrap();
    let command = h.runtime.sequencer().course().segment(3).command;
    assert_eq!(
        h.take_log(),
        vec![Call::SetWheels(mix(command, h.runtime.motion().half_track()))]
    );
    assert_eq!(h.runtime.sequencer().state(), RaceState::Segment(3));
}

#[test]
fn emergency_stop_with_halt_policy_ends_race() {
    let mut h = Harness::with_policy(default_course(), settings(0, 0), 500, EstopPolicy::Halt);
    step_until(&mut h, 10_000, |h| h.runtime.sequencer().state() == RaceState::Segment(3));

    h.button.set(true);
    let events = h.runtime.step().unwrap();
    assert!(matches!(events.last(), Some(RaceEvent::Halted { .. })));

    h.button.set(false);
    for _ in 0..500 {
        assert!(h.runtime.step().unwrap().is_empty());
    }
    assert_eq!(h.runtime.sequencer().state(), RaceState::Halted);
    assert!(h.runtime.motion().is_stopped());
    assert!(h.runtime.sequencer().result().is_none());
}

#[test]
fn full_course_finishes_exactly_once() {
    let mut h = Harness::new(default_course(), settings(10, 10), 500);

    let events = step_until(&mut h, 50_000, |h| {
        h.runtime.sequencer().state() == RaceState::Finished
    });

    let started = events
        .iter()
        .filter(|e| matches!(e, RaceEvent::Started { .. }))
        .count();
    let changes = events
        .iter()
        .filter(|e| matches!(e, RaceEvent::SegmentChanged { .. }))
        .count();
    let finished: Vec<_> = events
        .iter()
        .filter(|e| matches!(e, RaceEvent::Finished { .. }))
        .collect();
    assert_eq!(started, 1);
    assert_eq!(changes, 10);
    assert_eq!(finished.len(), 1);
    assert_eq!(events.last(), finished.last().copied());

    let result = h.runtime.sequencer().result().expect("result recorded");
    assert_eq!(
        finished[0],
        &RaceEvent::Finished {
            tick: result.end,
            elapsed_ms: result.elapsed.as_millis() as u64,
        }
    );
    h.take_log();

    // Absorbing: no new events, only brake re-applied
    for _ in 0..1000 {
        assert!(h.runtime.step().unwrap().is_empty());
    }
    assert_eq!(h.runtime.sequencer().state(), RaceState::Finished);
    assert!(
        h.take_log()
            .iter()
            .all(|c| *c == Call::Stop(StopMode::Brake))
    );
    assert_eq!(h.runtime.health(), RaceHealth::Finished);
}

#[test]
fn timed_turn_ignores_encoders() {
    let mut h = Harness::new(
        vec![
            SegmentSpec::duration("turn", 40, VelocityCommand::arc(0.0, 2.0)),
            SegmentSpec::duration("after", 40, VelocityCommand::arc(0.0, -2.0)),
        ],
        settings(0, 0),
        500,
    );
    step_until(&mut h, 200, |h| h.runtime.sequencer().state() == RaceState::Finished);
    assert!(reads(&h.take_log()).is_empty());
}

#[test]
fn emergency_stop_restarts_distance_count() {
    let fwd = VelocityCommand::straight(0.5);
    let mut h = Harness::new(
        vec![
            SegmentSpec::distance("a", 3000.0, fwd),
            SegmentSpec::distance("b", 1e9, fwd),
        ],
        settings(0, 0),
        500,
    );
    step_until(&mut h, 10, |h| {
        h.runtime.sequencer().state() == RaceState::Segment(0)
    });
    for _ in 0..4 {
        h.runtime.step().unwrap();
    }
    assert_eq!(reads(&h.take_log()), vec![500, 1000, 1500, 2000]);

    h.button.set(true);
    h.runtime.step().unwrap();
    assert_eq!(
        h.take_log(),
        vec![Call::Stop(StopMode::Brake), Call::ResetDistance]
    );

    // The 2000 pulses before the stop no longer count
    h.button.set(false);
    let events = step_until(&mut h, 100, |h| {
        h.runtime.sequencer().state() == RaceState::Segment(1)
    });
    let log = h.take_log();
    assert_eq!(log[1], Call::SetWheels(mix(fwd, h.runtime.motion().half_track())));
    assert_eq!(reads(&log), vec![500, 1000, 1500, 2000, 2500, 3000]);
    assert!(matches!(
        &events[..],
        [RaceEvent::SegmentChanged { from, to, .. }] if from == "a" && to == "b"
    ));
}

#[test]
fn emergency_stop_during_settle() {
    let fwd = VelocityCommand::straight(0.5);
    let side = VelocityCommand::new(0.0, 0.4, 0.0);
    let mut h = Harness::new(
        vec![
            SegmentSpec::distance("a", 1000.0, fwd),
            SegmentSpec::distance("b", 1e9, side),
        ],
        settings(5, 0),
        500,
    );
    step_until(&mut h, 10, |h| {
        h.runtime.sequencer().state() == RaceState::Segment(1)
    });
    assert!(h.runtime.sequencer().is_settling());
    h.take_log();

    h.button.set(true);
    let events = h.runtime.step().unwrap();
    assert!(matches!(
        &events[..],
        [RaceEvent::EmergencyStop { segment: Some(id), .. }] if id == "b"
    ));

    // Held past the end of the settle interval: nothing is commanded
    for _ in 0..10 {
        assert!(h.runtime.step().unwrap().is_empty());
    }
    assert!(
        h.take_log()
            .iter()
            .all(|c| matches!(c, Call::Stop(StopMode::Brake) | Call::ResetDistance))
    );
    assert!(h.runtime.motion().is_stopped());

    h.button.set(false);
    assert!(h.runtime.step().unwrap().is_empty());
    assert_eq!(
        h.take_log(),
        vec![Call::SetWheels(mix(side, h.runtime.motion().half_track()))]
    );
    assert!(!h.runtime.sequencer().is_settling());

    h.runtime.step().unwrap();
    assert_eq!(reads(&h.take_log()), vec![500]);
}

#[test]
fn unbounded_timed_hold_stays_active() {
    let mut h = Harness::new(
        vec![
            SegmentSpec::duration("hold", u64::MAX, VelocityCommand::arc(0.0, 1.0)),
            SegmentSpec::distance("b", 1e9, VelocityCommand::straight(0.5)),
        ],
        settings(0, 1),
        500,
    );
    for _ in 0..5 {
        h.runtime.step().unwrap();
    }
    assert_eq!(h.runtime.sequencer().state(), RaceState::Segment(0));
    assert!(reads(&h.take_log()).is_empty());
}
