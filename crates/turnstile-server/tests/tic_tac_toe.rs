//! Two agent threads playing tic-tac-toe through the turn server.

use std::thread;

use turnstile_core::{ClientError, EnvError, TurnError};
use turnstile_envs::{TicTacToe, EMPTY};
use turnstile_server::{create_clients, create_clients_with_config, ErrorPolicy, ServerConfig};

fn propagate() -> ServerConfig {
    ServerConfig {
        error_policy: ErrorPolicy::Propagate,
        ..ServerConfig::default()
    }
}

#[test]
fn draw_after_nine_moves() {
    let mut clients = create_clients(TicTacToe::new(3)).unwrap();
    let mut second = clients.pop().unwrap();
    let mut first = clients.pop().unwrap();

    let agent1 = thread::spawn(move || {
        second.reset().unwrap();
        let mut last = None;
        for mv in [(0, 1), (1, 1), (1, 2), (2, 0)] {
            last = Some(second.step(mv).unwrap());
        }
        last.unwrap()
    });

    first.reset().unwrap();
    let mut last = None;
    for mv in [(0, 0), (0, 2), (1, 0), (2, 1), (2, 2)] {
        last = Some(first.step(mv).unwrap());
    }
    let t0 = last.unwrap();
    let t1 = agent1.join().unwrap();

    for t in [&t0, &t1] {
        assert!(t.done);
        assert_eq!(t.reward, 0.0);
        assert!(!t.info.interrupted);
        let details = t.info.details.as_ref().unwrap();
        assert!(details.draw);
        assert_eq!(details.winner, None);
    }
    assert!(t0.observation.iter().flatten().all(|&c| c != EMPTY));

    // Both agents are done, so this reset starts a new episode.
    let board = first.reset().unwrap();
    assert_eq!(board, vec![vec![EMPTY; 3]; 3]);
}

#[test]
fn winner_and_loser_both_learn_the_result() {
    let mut clients = create_clients(TicTacToe::new(3)).unwrap();
    let mut second = clients.pop().unwrap();
    let mut first = clients.pop().unwrap();

    let agent1 = thread::spawn(move || {
        second.reset().unwrap();
        second.step((1, 0)).unwrap();
        second.step((1, 1)).unwrap()
    });

    first.reset().unwrap();
    first.step((0, 0)).unwrap();
    first.step((0, 1)).unwrap();
    let t0 = first.step((0, 2)).unwrap();
    let t1 = agent1.join().unwrap();

    assert!(t0.done && t1.done);
    assert_eq!(t0.reward, 1.0);
    assert_eq!(t1.reward, -1.0);
    assert_eq!(
        t1.info.details.unwrap().winning_line,
        vec![(0, 0), (0, 1), (0, 2)]
    );
}

#[test]
fn interrupt_ends_the_episode_for_the_other_agent() {
    let mut clients = create_clients(TicTacToe::new(3)).unwrap();
    let mut second = clients.pop().unwrap();
    let mut first = clients.pop().unwrap();

    let agent1 = thread::spawn(move || {
        second.reset().unwrap();
        let t = second.step((1, 1)).unwrap();
        let board = second.reset().unwrap();
        second.close();
        (t, board)
    });

    first.reset().unwrap();
    let t = first.step((0, 0)).unwrap();
    assert_eq!(t.observation[1][1], 1);

    // Mid-episode reset on our own turn: interrupt.
    let fresh = first.reset().unwrap();
    assert_eq!(fresh, vec![vec![EMPTY; 3]; 3]);

    // Agent 1 resets, waits for our move, then stops the server.
    assert_eq!(first.step((2, 2)).unwrap_err(), ClientError::Stopped);

    let (t, board) = agent1.join().unwrap();
    assert!(t.done);
    assert!(t.info.interrupted);
    assert_eq!(t.reward, 0.0);
    assert_eq!(t.observation[1][1], 1);
    assert_eq!(board[2][2], 0);
    assert_eq!(board[1][1], EMPTY);
}

#[test]
fn illegal_move_can_be_retried() {
    let mut clients = create_clients_with_config(TicTacToe::new(3), propagate()).unwrap();
    let mut second = clients.pop().unwrap();
    let mut first = clients.pop().unwrap();

    let agent1 = thread::spawn(move || {
        second.reset().unwrap();
        let err = second.step((0, 0)).unwrap_err();
        let retry = second.step((1, 1));
        (err, retry)
    });

    first.reset().unwrap();
    let t = first.step((0, 0)).unwrap();
    assert_eq!(t.observation[1][1], 1);
    first.close();

    let (err, retry) = agent1.join().unwrap();
    assert!(matches!(
        err,
        ClientError::Turn(TurnError::Environment(EnvError::IllegalAction { .. }))
    ));
    // The retried move went through; the call then waited for agent 0.
    assert_eq!(retry.unwrap_err(), ClientError::Stopped);
}

#[test]
fn failure_under_default_policy_cancels_everyone() {
    let mut clients = create_clients(TicTacToe::new(3)).unwrap();
    let mut second = clients.pop().unwrap();
    let mut first = clients.pop().unwrap();

    let agent1 = thread::spawn(move || {
        second.reset().unwrap();
        second.step((0, 0))
    });

    first.reset().unwrap();
    let res = first.step((0, 0));

    let err = agent1.join().unwrap().unwrap_err();
    assert!(matches!(err, ClientError::Turn(_)));
    assert_eq!(res.unwrap_err(), ClientError::Stopped);
    assert!(!first.server().is_running());
    assert_eq!(first.reset().unwrap_err(), ClientError::NotRunning);
}
