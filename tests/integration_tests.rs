//! Integration tests across the shared core, the predicting client and the
//! authoritative server
//!
//! Most tests wire the client and server halves together through the
//! in-memory links so delivery can be controlled exactly. The last module
//! runs the real UDP server.

use assert_approx_eq::assert_approx_eq;
use client::prediction::{ClientPredictor, ReconcileConfig};
use client::reconciliation::ReconcileOutcome;
use server::authority::{Authority, InputOrdering};
use shared::transport::{FrameOutbox, SnapshotOutbox};
use shared::{
    apply, apply_all, EntityState, InputFrame, InputSample, MovementConfig, ResultSnapshot, Vec3,
};

fn walk_forward() -> InputSample {
    InputSample {
        move_z: 1.0,
        ..Default::default()
    }
}

/// END-TO-END PREDICTION SCENARIOS
mod scenario_tests {
    use super::*;

    /// Client and server walk the same 43 frames from (10,0,0) and agree on
    /// (10,0,5) at frame #42, so nothing is corrected.
    #[test]
    fn matching_prediction_is_not_corrected() {
        let movement = MovementConfig {
            walk_speed: 5.0,
            ..Default::default()
        };
        let mut authority = Authority::new(movement, InputOrdering::Arrival);
        let spawn = authority.spawn(5);
        assert_eq!(spawn.position, Vec3::new(10.0, 0.0, 0.0));

        let mut predictor = ClientPredictor::new(spawn, movement, ReconcileConfig::default());
        let mut uplink = FrameOutbox::default();
        let dt = 1.0 / 43.0;
        for _ in 0..43 {
            predictor.predict(&walk_forward(), dt, &mut uplink);
        }

        let predicted = *predictor.result_history().get(42).unwrap();
        assert_approx_eq!(predicted.position.x, 10.0, 1e-4);
        assert_approx_eq!(predicted.position.y, 0.0, 1e-4);
        assert_approx_eq!(predicted.position.z, 5.0, 1e-3);

        let mut downlink = SnapshotOutbox::default();
        authority.consume(5, uplink.sent.clone(), &mut downlink);
        let authoritative = *downlink.for_client(5).last().unwrap();
        assert_eq!(authoritative.sequence, 42);

        let before = *predictor.state();
        assert_eq!(predictor.reconcile(&authoritative), ReconcileOutcome::Confirmed);
        assert_eq!(*predictor.state(), before);
        assert_eq!(predictor.stats().corrected, 0);
    }

    /// The client jumps at #50 but the server never applies that impulse.
    /// The client snaps back to the ground and replays #51 onward.
    #[test]
    fn missed_jump_is_corrected_and_replayed() {
        let movement = MovementConfig::default();
        let mut authority = Authority::new(movement, InputOrdering::Arrival);
        let spawn = authority.spawn(1);
        let mut predictor = ClientPredictor::new(spawn, movement, ReconcileConfig::default());
        let mut uplink = FrameOutbox::default();
        let dt = 1.0 / 60.0;

        for tick in 0..60 {
            let sample = InputSample {
                jump_requested: tick == 50,
                ..walk_forward()
            };
            predictor.predict(&sample, dt, &mut uplink);
        }
        let predicted_50 = *predictor.result_history().get(50).unwrap();
        assert!(predicted_50.position.y > 0.0);
        assert!(!predicted_50.grounded);

        // The server's copy of #50 arrives without the jump
        let mut server_frames = uplink.sent.clone();
        server_frames[50].jump_requested = false;
        let mut downlink = SnapshotOutbox::default();
        authority.consume(1, server_frames, &mut downlink);

        let results = downlink.for_client(1);
        let mut outcomes = Vec::new();
        for snapshot in &results[..=50] {
            outcomes.push(predictor.reconcile(snapshot));
        }

        assert!(outcomes[..50]
            .iter()
            .all(|outcome| *outcome == ReconcileOutcome::Confirmed));
        assert_eq!(outcomes[50], ReconcileOutcome::Corrected { replayed: 9 });

        let authoritative_50 = results[50];
        assert_eq!(authoritative_50.position.y, 0.0);
        assert_approx_eq!(authoritative_50.position.x, predicted_50.position.x, 1e-6);
        assert_approx_eq!(authoritative_50.position.z, predicted_50.position.z, 1e-6);

        // Replayed trajectory now matches the server's for every later frame
        for snapshot in &results[51..] {
            let local = predictor.result_history().get(snapshot.sequence).unwrap();
            assert_eq!(local.position, snapshot.position);
        }
        assert_eq!(
            predictor.state().position,
            authority.state(1).unwrap().position
        );
    }

    /// The client lands at #50, but one of its airborne frames was lost on the
    /// way up, so the server is a gravity step behind and still in the air
    /// at #50. Only the result for #50 makes it back.
    #[test]
    fn lost_airborne_frame_leaves_server_in_the_air() {
        let movement = MovementConfig {
            jump_height: 0.3,
            ..Default::default()
        };
        let dt = 1.0 / 60.0;
        let landing_frame = 50u32;

        // Frames from a grounded jump until the first grounded result
        let mut airtime = 0u32;
        let jump = InputSample {
            jump_requested: true,
            ..walk_forward()
        };
        let mut flight = apply(
            &EntityState::default(),
            &InputFrame::from_sample(0, dt, &jump),
            &movement,
        );
        while !flight.grounded {
            airtime += 1;
            let frame = InputFrame::from_sample(airtime, dt, &walk_forward());
            flight = apply(&flight, &frame, &movement);
        }
        let jump_frame = landing_frame - airtime;
        assert!(jump_frame > 1);

        let mut authority = Authority::new(movement, InputOrdering::Arrival);
        let spawn = authority.spawn(1);
        let mut predictor = ClientPredictor::new(spawn, movement, ReconcileConfig::default());
        let mut uplink = FrameOutbox::default();
        for tick in 0..60 {
            let sample = InputSample {
                jump_requested: tick == jump_frame,
                ..walk_forward()
            };
            predictor.predict(&sample, dt, &mut uplink);
        }
        let predicted_49 = *predictor.result_history().get(landing_frame - 1).unwrap();
        let predicted_50 = *predictor.result_history().get(landing_frame).unwrap();
        assert!(!predicted_49.grounded);
        assert!(predicted_50.grounded);

        let lost = jump_frame + 1;
        let delivered: Vec<InputFrame> = uplink
            .sent
            .iter()
            .copied()
            .filter(|frame| frame.sequence != lost)
            .collect();
        let mut downlink = SnapshotOutbox::default();
        authority.consume(1, delivered, &mut downlink);
        let results = downlink.for_client(1);

        for snapshot in results.iter().filter(|s| s.sequence <= jump_frame) {
            assert_eq!(predictor.reconcile(snapshot), ReconcileOutcome::Confirmed);
        }

        let authoritative_50 = *results
            .iter()
            .find(|s| s.sequence == landing_frame)
            .unwrap();
        assert!(!authoritative_50.grounded);
        assert!(authoritative_50.position.y > 0.0);
        assert_eq!(authoritative_50.position, predicted_49.position);

        assert_eq!(
            predictor.reconcile(&authoritative_50),
            ReconcileOutcome::Corrected { replayed: 9 }
        );
        assert_eq!(predictor.last_acknowledged(), Some(landing_frame));
        assert_eq!(
            predictor.state().position,
            authority.state(1).unwrap().position
        );
    }

    /// Issuing LobbyToPreGame while MainGame is active fails and leaves the
    /// session where it was.
    #[test]
    fn transition_from_wrong_phase_is_rejected() {
        use server::config::PhaseTable;
        use server::phases::{GsService, PhaseError};
        use shared::transport::ReplicationLog;
        use shared::{Phase, TransitionId};

        let mut service =
            GsService::new(PhaseTable::default_table(), ReplicationLog::default()).unwrap();
        service.start().unwrap();
        for id in [TransitionId::LobbyToPreGame, TransitionId::PreGameToMainGame] {
            service.issue_transition(id).unwrap();
            while service.tick(1.0).is_none() {}
        }
        assert_eq!(service.active_phase(), Some(Phase::MainGame));
        let live = service.replicator().live();

        let result = service.issue_transition(TransitionId::LobbyToPreGame);

        assert_eq!(
            result,
            Err(PhaseError::WrongSource {
                transition: TransitionId::LobbyToPreGame,
                expected: Phase::Lobby,
                active: Phase::MainGame,
            })
        );
        assert_eq!(service.active_phase(), Some(Phase::MainGame));
        assert_eq!(service.in_flight(), None);
        assert_eq!(service.replicator().live(), live);
    }
}

/// RECONCILIATION PROPERTIES
mod reconciliation_tests {
    use super::*;

    fn predictor_through(last: u32) -> (ClientPredictor, Vec<InputFrame>) {
        let mut predictor = ClientPredictor::new(
            EntityState::default(),
            MovementConfig::default(),
            ReconcileConfig::default(),
        );
        let mut uplink = FrameOutbox::default();
        for tick in 0..=last {
            let sample = InputSample {
                move_x: if tick % 2 == 0 { 1.0 } else { 0.0 },
                look_yaw: 0.4,
                ..walk_forward()
            };
            predictor.predict(&sample, 1.0 / 60.0, &mut uplink);
        }
        (predictor, uplink.sent)
    }

    #[test]
    fn replay_follows_corrected_baseline() {
        let (mut predictor, frames) = predictor_through(8);
        let confirmed = *predictor.result_history().get(4).unwrap();
        predictor.reconcile(&confirmed);
        assert_eq!(predictor.input_history().oldest_sequence(), Some(5));

        let original_8 = *predictor.result_history().get(8).unwrap();
        let mut corrected_5 = *predictor.result_history().get(5).unwrap();
        corrected_5.position = corrected_5.position.add(&Vec3::new(0.5, 0.0, -0.25));

        assert_eq!(
            predictor.reconcile(&corrected_5),
            ReconcileOutcome::Corrected { replayed: 3 }
        );

        let movement = MovementConfig::default();
        let mut expected = corrected_5.restore(0.0);
        for frame in &frames[6..=8] {
            expected = apply(&expected, frame, &movement);
            let stored = predictor.result_history().get(frame.sequence).unwrap();
            assert_eq!(*stored, ResultSnapshot::capture(frame.sequence, &expected));
        }
        assert_ne!(
            predictor.result_history().get(8).unwrap().position,
            original_8.position
        );
    }

    #[test]
    fn reconciling_prunes_through_acknowledged_id() {
        let (mut predictor, _) = predictor_through(8);
        let authoritative = *predictor.result_history().get(5).unwrap();

        predictor.reconcile(&authoritative);

        for sequence in 0..=5 {
            assert!(!predictor.input_history().contains(sequence));
            assert!(!predictor.result_history().contains(sequence));
        }
        for sequence in 6..=8 {
            assert!(predictor.input_history().contains(sequence));
            assert!(predictor.result_history().contains(sequence));
        }
    }

    #[test]
    fn matching_result_changes_nothing_but_history() {
        let (mut predictor, _) = predictor_through(8);
        let state = *predictor.state();
        let later = *predictor.result_history().get(8).unwrap();
        let mut nudged = *predictor.result_history().get(3).unwrap();
        nudged.position.x += 0.0005;

        assert_eq!(predictor.reconcile(&nudged), ReconcileOutcome::Confirmed);
        assert_eq!(*predictor.state(), state);
        assert_eq!(*predictor.result_history().get(8).unwrap(), later);
    }

    #[test]
    fn apply_is_deterministic_over_a_frame_list() {
        let (_, frames) = predictor_through(30);
        let movement = MovementConfig::default();
        let start = EntityState::new(Vec3::new(1.0, 0.0, -2.0), 45.0);

        let first = apply_all(&start, frames.iter(), &movement);
        let second = apply_all(&start, frames.iter(), &movement);

        assert_eq!(first, second);
    }
}

/// LOSSY CHANNEL SIMULATION
mod lossy_channel_tests {
    use super::*;

    /// Drops some uplink frames and delivers results in batches. Whatever the
    /// client mispredicts is corrected, and after the final result both
    /// sides agree.
    #[test]
    fn client_converges_with_server_under_loss() {
        let movement = MovementConfig::default();
        let mut authority = Authority::new(movement, InputOrdering::Arrival);
        let spawn = authority.spawn(2);
        let mut predictor = ClientPredictor::new(spawn, movement, ReconcileConfig::default());
        let mut uplink = FrameOutbox::default();
        let mut in_transit = Vec::new();

        for tick in 0..120u32 {
            let sample = InputSample {
                move_x: if (tick / 20) % 2 == 0 { 0.0 } else { 1.0 },
                look_yaw: 0.25,
                jump_requested: tick % 40 == 10,
                sprinting: tick > 60,
                ..walk_forward()
            };
            predictor.predict(&sample, 1.0 / 60.0, &mut uplink);

            for frame in uplink.sent.drain(..) {
                if frame.sequence % 7 != 3 {
                    in_transit.push(frame);
                }
            }

            if tick % 4 == 3 {
                let mut downlink = SnapshotOutbox::default();
                authority.consume(2, std::mem::take(&mut in_transit), &mut downlink);
                for snapshot in downlink.for_client(2) {
                    predictor.reconcile(&snapshot);
                }
            }
        }

        let stats = predictor.stats();
        assert!(stats.corrected > 0);
        assert_eq!(predictor.last_acknowledged(), Some(119));
        assert!(predictor.input_history().is_empty());

        let server_state = authority.state(2).unwrap();
        assert!(predictor.state().position.approx_eq(&server_state.position, 1e-3));
    }

    #[test]
    fn duplicated_and_late_results_are_stale() {
        let movement = MovementConfig::default();
        let mut authority = Authority::new(movement, InputOrdering::Arrival);
        let spawn = authority.spawn(1);
        let mut predictor = ClientPredictor::new(spawn, movement, ReconcileConfig::default());
        let mut uplink = FrameOutbox::default();
        for _ in 0..5 {
            predictor.predict(&walk_forward(), 1.0 / 60.0, &mut uplink);
        }

        let mut downlink = SnapshotOutbox::default();
        authority.consume(1, uplink.sent.clone(), &mut downlink);
        let results = downlink.for_client(1);

        assert_eq!(predictor.reconcile(&results[4]), ReconcileOutcome::Confirmed);
        assert_eq!(predictor.reconcile(&results[2]), ReconcileOutcome::Stale);
        assert_eq!(predictor.reconcile(&results[4]), ReconcileOutcome::Stale);
        assert_eq!(predictor.stats().stale, 2);
    }
}

/// REAL NETWORK TESTS
mod network_tests {
    use shared::{InputFrame, InputSample, Packet, PROTOCOL_VERSION};
    use std::net::SocketAddr;
    use std::time::Duration;
    use tokio::net::UdpSocket;
    use tokio::time::timeout;

    async fn start_server() -> SocketAddr {
        use server::config::{PhaseTable, ServerConfig};
        use server::network::Server;

        let mut server = Server::new(
            "127.0.0.1:0",
            ServerConfig::default(),
            PhaseTable::default_table(),
        )
        .await
        .unwrap();
        let addr = server.local_addr().unwrap();

        tokio::spawn(async move {
            let _ = server.run().await;
        });

        addr
    }

    async fn recv_until<F>(socket: &UdpSocket, mut wanted: F) -> Packet
    where
        F: FnMut(&Packet) -> bool,
    {
        let mut buf = [0u8; 2048];
        loop {
            let (len, _) = timeout(Duration::from_secs(2), socket.recv_from(&mut buf))
                .await
                .expect("timed out waiting for server")
                .unwrap();
            let packet = Packet::decode(&buf[..len]).unwrap();
            if wanted(&packet) {
                return packet;
            }
        }
    }

    #[tokio::test]
    async fn server_connects_and_answers_input() {
        let server_addr = start_server().await;
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        let connect = Packet::Connect {
            client_version: PROTOCOL_VERSION,
        };
        socket
            .send_to(&connect.encode().unwrap(), server_addr)
            .await
            .unwrap();

        let client_id = match recv_until(&socket, |p| matches!(p, Packet::Connected { .. })).await
        {
            Packet::Connected { client_id, .. } => client_id,
            _ => unreachable!(),
        };
        assert_eq!(client_id, 1);

        let sample = InputSample {
            move_z: 1.0,
            ..Default::default()
        };
        let frame = InputFrame::from_sample(0, 1.0 / 60.0, &sample);
        socket
            .send_to(&Packet::Input { frame }.encode().unwrap(), server_addr)
            .await
            .unwrap();

        match recv_until(&socket, |p| matches!(p, Packet::InputResult { .. })).await {
            Packet::InputResult { snapshot } => {
                assert_eq!(snapshot.sequence, 0);
                assert!(snapshot.position.z > 0.0);
            }
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn server_replicates_session_phase_to_new_client() {
        let server_addr = start_server().await;
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        let connect = Packet::Connect {
            client_version: PROTOCOL_VERSION,
        };
        socket
            .send_to(&connect.encode().unwrap(), server_addr)
            .await
            .unwrap();

        let packet = recv_until(&socket, |p| matches!(p, Packet::PhaseChanged { .. })).await;
        assert!(matches!(packet, Packet::PhaseChanged { .. }));
    }

    #[tokio::test]
    async fn server_shares_other_players_but_not_your_own() {
        let server_addr = start_server().await;
        let mut sockets = Vec::new();
        let mut ids = Vec::new();
        for _ in 0..2 {
            let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
            let connect = Packet::Connect {
                client_version: PROTOCOL_VERSION,
            };
            socket
                .send_to(&connect.encode().unwrap(), server_addr)
                .await
                .unwrap();
            match recv_until(&socket, |p| matches!(p, Packet::Connected { .. })).await {
                Packet::Connected { client_id, .. } => ids.push(client_id),
                _ => unreachable!(),
            }
            sockets.push(socket);
        }

        for (socket, own_id) in sockets.iter().zip(&ids) {
            for _ in 0..5 {
                match recv_until(socket, |p| matches!(p, Packet::RemoteState { .. })).await {
                    Packet::RemoteState { client_id, .. } => assert_ne!(client_id, *own_id),
                    _ => unreachable!(),
                }
            }
        }
    }

    #[tokio::test]
    async fn server_rejects_old_protocol() {
        let server_addr = start_server().await;
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        let connect = Packet::Connect { client_version: 1 };
        socket
            .send_to(&connect.encode().unwrap(), server_addr)
            .await
            .unwrap();

        let packet = recv_until(&socket, |_| true).await;
        assert!(matches!(packet, Packet::Disconnected { .. }));
    }
}
