//! Publish cycle: link check, broker session and payload.

use crate::mock_node::{Call, Rig, World};

use airnode::logic::{ConnectivityState, SessionState, status};
use airnode::model::Reading;

const REFERENCE_BODY: &str = r#"{"temp":21.50,"humidity":40.25,"pressure":1013.25}"#;

fn publish_times(rig: &Rig) -> Vec<u64> {
    rig.world().publishes().into_iter().map(|(at, _)| at).collect()
}

// ── Cadence ──────────────────────────────────────────────────

#[test]
fn publishes_once_per_publish_interval() {
    let mut rig = Rig::online();
    rig.run_until(185_001);

    assert_eq!(publish_times(&rig), vec![65_000, 125_000, 185_000]);
    assert!(rig.world().publishes().iter().all(|(_, body)| body == REFERENCE_BODY));
}

#[test]
fn four_sampling_sub_cycles_between_publishes() {
    let mut rig = Rig::online();
    rig.run_until(125_001);

    let w = rig.world();
    let samples: Vec<u64> = w
        .times_of(&Call::SensorSample)
        .into_iter()
        .filter(|at| (65_000..125_000).contains(at))
        .collect();
    assert_eq!(samples, vec![65_000, 80_000, 95_000, 110_000]);
}

#[test]
fn first_publish_opens_session_then_services_it() {
    let mut rig = Rig::online();
    rig.run_until(65_001);

    assert_eq!(rig.node.session(), SessionState::Connected);

    let w = rig.world();
    let session: Vec<&Call> = w
        .journal
        .iter()
        .filter(|(at, c)| {
            *at == 65_000
                && matches!(
                    c,
                    Call::ChannelConnect | Call::ChannelService | Call::ChannelPublish(_)
                )
        })
        .map(|(_, c)| c)
        .collect();
    assert_eq!(
        session,
        vec![
            &Call::ChannelConnect,
            &Call::ChannelService,
            &Call::ChannelPublish(REFERENCE_BODY.to_string()),
        ]
    );
}

#[test]
fn open_session_is_reused() {
    let mut rig = Rig::online();
    rig.run_until(185_001);

    let w = rig.world();
    assert_eq!(w.count(&Call::ChannelConnect), 1);
    assert_eq!(w.count(&Call::ChannelService), 3);
}

#[test]
fn payload_carries_last_sampled_reading() {
    let mut rig = Rig::online();
    rig.run_until(40_000);
    rig.world_mut().reading = Reading::from_raw(-3.5, 80.0, 99_000.0);
    rig.run_until(65_001);

    let w = rig.world();
    assert_eq!(
        w.publishes(),
        vec![(65_000, r#"{"temp":-3.50,"humidity":80.00,"pressure":990.00}"#.to_string())]
    );
}

// ── Broker failures ──────────────────────────────────────────

#[test]
fn unreachable_broker_skips_cycle_and_retries_next_one() {
    let mut rig = Rig::new(World {
        press_from: Some(0),
        broker_accepts: false,
        ..World::default()
    });
    rig.run_until(65_001);

    assert_eq!(rig.node.session(), SessionState::Disconnected);
    {
        let w = rig.world();
        assert_eq!(w.times_of(&Call::Status(status::NO_BROKER.to_string())), vec![65_000]);
        assert!(w.publishes().is_empty());
        assert_eq!(w.count(&Call::ChannelService), 0);
    }

    rig.world_mut().broker_accepts = true;
    rig.run_until(125_001);

    assert_eq!(rig.node.session(), SessionState::Connected);
    let w = rig.world();
    assert_eq!(w.times_of(&Call::ChannelConnect), vec![65_000, 125_000]);
    assert_eq!(publish_times(&rig), vec![125_000]);
}

#[test]
fn sampling_continues_after_broker_failure() {
    let mut rig = Rig::new(World {
        press_from: Some(0),
        broker_accepts: false,
        ..World::default()
    });
    rig.run_until(85_001);

    let w = rig.world();
    let metrics: Vec<u64> = w
        .metrics()
        .into_iter()
        .map(|(at, _, _)| at)
        .filter(|at| *at > 65_000)
        .collect();
    assert_eq!(metrics, vec![70_000, 75_000, 80_000, 85_000]);
}

#[test]
fn dropped_session_is_handshaken_again() {
    let mut rig = Rig::online();
    rig.run_until(65_001);
    rig.world_mut().session_open = false;
    rig.run_until(125_001);

    let w = rig.world();
    assert_eq!(w.times_of(&Call::ChannelConnect), vec![65_000, 125_000]);
    assert_eq!(publish_times(&rig), vec![65_000, 125_000]);
}

// ── Link loss ────────────────────────────────────────────────

#[test]
fn link_down_at_publish_blocks_until_restored() {
    let mut rig = Rig::new(World {
        press_from: Some(0),
        link_outages: vec![60_000..68_500],
        ..World::default()
    });
    rig.run_until(65_001);

    assert_eq!(rig.node.connectivity(), ConnectivityState::Connecting);
    assert_eq!(
        rig.world().times_of(&Call::Status(status::RECONNECTING.to_string())),
        vec![65_000]
    );

    rig.run_until(69_001);

    assert_eq!(rig.node.connectivity(), ConnectivityState::Connected);
    let w = rig.world();
    let polls: Vec<u64> = w
        .times_of(&Call::LinkIsUp)
        .into_iter()
        .filter(|at| *at > 65_000)
        .collect();
    // The second read at 69 s is the link indicator of the sample that follows.
    assert_eq!(polls, vec![66_000, 67_000, 68_000, 69_000, 69_000]);
    assert_eq!(publish_times(&rig), vec![69_000]);
    // Nothing is sampled while the link is down.
    assert!(!w.times_of(&Call::SensorSample).iter().any(|at| (65_001..69_000).contains(at)));
}

#[test]
fn accepted_association_request_is_reissued_until_link_returns() {
    let mut rig = Rig::new(World {
        press_from: Some(0),
        link_outages: vec![60_000..68_500],
        ..World::default()
    });
    rig.run_until(69_001);

    assert_eq!(
        rig.world().times_of(&Call::LinkConnect),
        vec![0, 65_000, 66_000, 67_000, 68_000, 69_000]
    );
    assert_eq!(rig.node.connectivity(), ConnectivityState::Connected);
}

#[test]
fn refused_association_request_is_retried_every_poll() {
    let mut rig = Rig::new(World {
        press_from: Some(0),
        link_outages: vec![60_000..68_500],
        ..World::default()
    });
    rig.run_until(64_000);
    rig.world_mut().link_accepts = false;
    rig.run_until(67_001);
    rig.world_mut().link_accepts = true;
    rig.run_until(69_001);

    assert_eq!(
        rig.world().times_of(&Call::LinkConnect),
        vec![0, 65_000, 66_000, 67_000, 68_000, 69_000]
    );
    assert_eq!(publish_times(&rig), vec![69_000]);
}

#[test]
fn schedule_restarts_from_reconnect() {
    let mut rig = Rig::new(World {
        press_from: Some(0),
        link_outages: vec![60_000..68_500],
        ..World::default()
    });
    rig.run_until(129_001);

    assert_eq!(publish_times(&rig), vec![69_000, 129_000]);
}
