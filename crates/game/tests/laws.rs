//! Cross-crate laws of the time core, driven through the public API.

use std::sync::Arc;
use std::time::Duration;

use chronosta_common::EraId;
use chronosta_era::EraRegistry;
use chronosta_game::{GameConfig, GameEvent, GameSession, Report};
use chronosta_input::TickInput;
use chronosta_kernel::{Level, SwitchDirection, SwitchGuard, World, switch_era};
use chronosta_persist::{CheckpointStore, SlotId};
use chronosta_time::{TimeError, TimeMode};
use proptest::prelude::*;

fn scripted(i: usize) -> TickInput {
    TickInput {
        move_right: i % 120 < 80,
        move_left: (100..110).contains(&(i % 120)),
        jump: i % 50 == 10,
        use_power: i % 300 == 150,
        ..TickInput::default()
    }
}

fn session() -> GameSession {
    GameSession::new(GameConfig::default(), Level::demo()).unwrap()
}

fn run_ticks(s: &mut GameSession, inputs: impl Iterator<Item = TickInput>) {
    let mut sink = Vec::new();
    for input in inputs {
        s.tick(&input, &mut sink);
    }
}

#[test]
fn same_inputs_give_identical_snapshots() {
    let mut a = session();
    let mut b = session();
    run_ticks(&mut a, (0..900).map(scripted));
    run_ticks(&mut b, (0..900).map(scripted));
    assert_eq!(a.live(), b.live());
    assert_eq!(a.live().state_hash(), b.live().state_hash());
}

#[test]
fn frame_pacing_does_not_change_the_outcome() {
    // 120 ticks delivered as 120 even frames or as 40 frames of three ticks.
    let step = Duration::from_nanos(16_666_666);
    let mut sink = Vec::new();

    let mut even = session();
    for _ in 0..120 {
        even.frame(step, &TickInput::default(), &mut sink);
    }
    let mut bursty = session();
    for _ in 0..40 {
        bursty.frame(step * 3, &TickInput::default(), &mut sink);
    }
    assert_eq!(even.live().tick(), 120);
    assert_eq!(even.live(), bursty.live());
}

#[test]
fn rewind_then_replay_restores_snapshot() {
    let mut s = session();
    let mut sink = Vec::new();
    run_ticks(&mut s, (0..200).map(scripted));
    let target = Arc::clone(s.live());

    let k = 60;
    run_ticks(&mut s, (200..200 + k).map(scripted));
    assert_ne!(s.live().tick(), target.tick());

    s.request_rewind(k, &mut sink).unwrap();
    while s.mode() == TimeMode::Rewinding {
        s.tick(&TickInput::default(), &mut sink);
    }
    assert_eq!(s.live(), &target);

    s.toggle_pause(&mut sink);
    assert_eq!(s.mode(), TimeMode::Normal);
    let branch: Vec<TickInput> = (200..200 + k).map(scripted).collect();
    let mut replay = session();
    run_ticks(&mut replay, (0..200 + k).map(scripted));
    run_ticks(&mut s, branch.into_iter());
    assert_eq!(s.live(), replay.live());
    assert_eq!(s.timeline().head(), Some(s.live()));
}

#[test]
fn rewind_deeper_than_history_stops_at_oldest_and_reports() {
    let mut s = session();
    let mut sink = Vec::new();
    run_ticks(&mut s, (0..40).map(scripted));
    s.request_rewind(100, &mut sink).unwrap();
    while s.mode() == TimeMode::Rewinding {
        s.tick(&TickInput::default(), &mut sink);
    }
    assert_eq!(s.live().tick(), 0);
    assert!(sink.contains(&GameEvent::Reported(Report::Time(TimeError::Empty {
        requested: 100,
        available: 40,
    }))));
}

#[test]
fn suspend_save_is_consumed_by_resume() {
    let dir = tempfile::tempdir().unwrap();
    let mut s = session();
    run_ticks(&mut s, (0..90).map(scripted));
    let store = CheckpointStore::open(dir.path(), 3).unwrap();
    store
        .save(SlotId::Suspend, s.live(), s.live().era())
        .unwrap();
    let record = store.resume().unwrap();
    assert_eq!(&record.world, s.live().as_ref());
    assert!(store.list().unwrap().is_empty());
}

#[test]
fn era_round_trip_keeps_motion_and_rules() {
    let registry = EraRegistry::builtin();
    let mut s = session();
    run_ticks(&mut s, (0..50).map(scripted));
    let world: &World = s.live();
    let guard = SwitchGuard::default();

    let (fwd, _) = switch_era(world, &registry, SwitchDirection::Forward, guard).unwrap();
    let (back, _) = switch_era(&fwd, &registry, SwitchDirection::Back, guard).unwrap();
    assert_eq!(back.era(), world.era());
    assert_eq!(registry.get(back.era()), registry.get(world.era()));
    for (a, b) in world.entities().iter().zip(back.entities()) {
        assert_eq!(a.position, b.position);
        assert_eq!(a.velocity, b.velocity);
    }
    for (a, b) in world.entities().iter().zip(fwd.entities()) {
        assert_eq!(a.position, b.position);
        assert_eq!(a.velocity, b.velocity);
    }
}

#[test]
fn session_era_switch_changes_rules() {
    let mut s = session();
    let mut sink = Vec::new();
    let before = s.era().gravity;
    s.switch_era(SwitchDirection::Back, &mut sink).unwrap();
    assert_eq!(s.live().era(), EraId::Prehistoric);
    assert_ne!(s.era().gravity, before);
    assert!(sink.contains(&GameEvent::EraSwitched {
        from: EraId::Medieval,
        to: EraId::Prehistoric
    }));
}

#[test]
fn checkpoint_round_trip_is_exact() {
    let dir = tempfile::tempdir().unwrap();
    let mut s = session();
    run_ticks(&mut s, (0..240).map(scripted));
    let store = CheckpointStore::open(dir.path(), 3).unwrap();
    store
        .save(SlotId::Manual(2), s.live(), s.live().era())
        .unwrap();

    let reopened = CheckpointStore::open(dir.path(), 3).unwrap();
    let record = reopened.load(SlotId::Manual(2)).unwrap();
    assert_eq!(&record.world, s.live().as_ref());
    assert_eq!(record.era, s.live().era());
    assert_eq!(record.world.state_hash(), s.live().state_hash());
}

#[test]
fn timeline_stays_within_capacity() {
    let mut config = GameConfig::default();
    config.timeline.capacity = 50;
    let mut s = GameSession::new(config, Level::demo()).unwrap();
    run_ticks(&mut s, (0..300).map(scripted));
    assert_eq!(s.timeline().len(), 50);
    assert_eq!(s.timeline().oldest_tick(), Some(251));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn inverse_law_for_any_depth(prefix in 1usize..120, k in 1usize..90) {
        let mut s = session();
        let mut sink = Vec::new();
        run_ticks(&mut s, (0..prefix).map(scripted));
        let target = Arc::clone(s.live());
        run_ticks(&mut s, (prefix..prefix + k).map(scripted));

        s.request_rewind(k, &mut sink).unwrap();
        while s.mode() == TimeMode::Rewinding {
            s.tick(&TickInput::default(), &mut sink);
        }
        prop_assert_eq!(s.live(), &target);

        let after = Arc::clone(s.live());
        s.toggle_pause(&mut sink);
        run_ticks(&mut s, (prefix..prefix + k).map(scripted));
        let mut fresh = session();
        run_ticks(&mut fresh, (0..prefix + k).map(scripted));
        prop_assert_eq!(s.live(), fresh.live());
        prop_assert_eq!(after.tick(), prefix as u64);
    }
}
