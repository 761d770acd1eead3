mod common;

use common::*;
use std::sync::Arc;
use std::time::Duration;
use trivia_client::LocalSession;
use trivia_core::LocalProgress;
use trivia_types::{GameError, GameSettings, GameStatus, Phase, SettingsUpdate, Subject};

fn local_session(generator: Arc<dyn trivia_client::QuestionGenerator>) -> LocalSession {
    LocalSession::new(
        GameSettings {
            rounds: 3,
            subjects: vec![Subject::Science, Subject::Sports],
            ..GameSettings::default()
        },
        generator,
        Duration::from_secs(2),
        Duration::from_millis(2000),
    )
}

#[tokio::test(start_paused = true)]
async fn test_pass_and_play_runs_every_turn() {
    let mut session = local_session(Arc::new(FailingGenerator::new()));
    let alice = session.add_player(profile("Alice")).unwrap();
    let bob = session.add_player(profile("Bob")).unwrap();
    session.start().unwrap();

    let mut turns = 0;
    loop {
        let question = session.load_question().await.unwrap();
        assert_eq!(session.view().phase, Phase::Question);
        assert!([Subject::Science, Subject::Sports].contains(&question.subject));

        let current = session.view().current_player.unwrap();
        let outcome = if current == alice {
            session.submit_answer(question.correct_answer.clone(), 0.0)
        } else {
            session.time_out()
        }
        .unwrap();
        assert_eq!(outcome.is_correct, current == alice);
        turns += 1;

        match session.continue_turn().unwrap() {
            LocalProgress::NextTurn => assert_eq!(session.view().phase, Phase::Loading),
            LocalProgress::Finished => break,
        }
    }

    assert_eq!(turns, 6);
    assert_eq!(session.game().status, GameStatus::Finished);
    assert_eq!(session.view().phase, Phase::Finished);

    let board = session.leaderboard();
    assert_eq!(board[0].player_id, alice);
    assert_eq!(board[0].score, 68);
    assert_eq!(board[1].player_id, bob);
    assert_eq!(board[1].score, 0);
    assert!(!session.awards().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_generated_question_is_used_locally() {
    let mut session = local_session(Arc::new(ScriptedGenerator {
        delay: Duration::from_millis(200),
    }));
    session.add_player(profile("Alice")).unwrap();
    session.start().unwrap();

    let question = session.load_question().await.unwrap();
    assert!(question.text.starts_with("Scripted"));
}

#[tokio::test(start_paused = true)]
async fn test_second_answer_is_rejected() {
    let mut session = local_session(Arc::new(FailingGenerator::new()));
    session.add_player(profile("Alice")).unwrap();
    session.start().unwrap();
    let question = session.load_question().await.unwrap();

    session
        .submit_answer(question.correct_answer.clone(), 1.0)
        .unwrap();
    assert_eq!(
        session.submit_answer(question.correct_answer, 1.0),
        Err(GameError::AlreadyAnswered)
    );
}

#[tokio::test(start_paused = true)]
async fn test_lobby_edits_close_once_started() {
    let mut session = local_session(Arc::new(FailingGenerator::new()));
    assert!(matches!(
        session.start(),
        Err(GameError::NotEnoughPlayers { .. })
    ));

    let alice = session.add_player(profile("Alice")).unwrap();
    let bob = session.add_player(profile("Bob")).unwrap();
    session.remove_player(bob).unwrap();
    assert_eq!(session.game().players.len(), 1);

    assert!(matches!(
        session.update_settings(SettingsUpdate {
            rounds: Some(4),
            ..SettingsUpdate::default()
        }),
        Err(GameError::InvalidSettings { .. })
    ));
    session
        .update_settings(SettingsUpdate {
            rounds: Some(10),
            ..SettingsUpdate::default()
        })
        .unwrap();
    assert_eq!(session.game().settings.rounds, 10);

    session.start().unwrap();
    assert!(session.remove_player(alice).is_err());
    assert!(session.add_player(profile("Carol")).is_err());
}
