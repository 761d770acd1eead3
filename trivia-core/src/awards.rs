use trivia_types::{Award, AwardKind, LeaderboardEntry, Player};

/// Final standings, highest score first. Equal scores share a rank and keep
/// their turn order.
pub fn leaderboard(players: &[Player]) -> Vec<LeaderboardEntry> {
    let mut sorted: Vec<&Player> = players.iter().collect();
    sorted.sort_by(|a, b| b.score.cmp(&a.score));

    let mut entries = Vec::with_capacity(sorted.len());
    for (index, player) in sorted.iter().enumerate() {
        let rank = match entries.last() {
            Some(LeaderboardEntry { score, rank, .. }) if *score == player.score => *rank,
            _ => index + 1,
        };
        let tied = sorted
            .iter()
            .filter(|other| other.score == player.score)
            .count()
            > 1;
        entries.push(LeaderboardEntry {
            rank,
            player_id: player.id,
            name: player.name.clone(),
            avatar: player.avatar.clone(),
            score: player.score,
            tied,
        });
    }
    entries
}

pub fn compute_awards(players: &[Player]) -> Vec<Award> {
    let mut awards = Vec::new();

    // First player wins ties in every category
    let hottest = players.iter().fold(None::<&Player>, |best, p| match best {
        Some(b) if b.best_streak >= p.best_streak => Some(b),
        _ => Some(p),
    });
    if let Some(player) = hottest.filter(|p| p.best_streak > 0) {
        awards.push(Award {
            kind: AwardKind::HottestStreak,
            player_id: player.id,
            value: player.best_streak as f64,
        });
    }

    let sharpest = players
        .iter()
        .filter_map(|p| p.accuracy().map(|accuracy| (p, accuracy)))
        .fold(None::<(&Player, f64)>, |best, (p, accuracy)| match best {
            Some((b, best_accuracy)) if best_accuracy >= accuracy => Some((b, best_accuracy)),
            _ => Some((p, accuracy)),
        });
    if let Some((player, accuracy)) = sharpest {
        awards.push(Award {
            kind: AwardKind::Sharpshooter,
            player_id: player.id,
            value: accuracy,
        });
    }

    let fastest = players
        .iter()
        .filter_map(|p| p.fastest_answer.map(|time| (p, time)))
        .fold(None::<(&Player, f64)>, |best, (p, time)| match best {
            Some((b, best_time)) if best_time <= time => Some((b, best_time)),
            _ => Some((p, time)),
        });
    if let Some((player, time)) = fastest {
        awards.push(Award {
            kind: AwardKind::SpeedDemon,
            player_id: player.id,
            value: time,
        });
    }

    awards
}

#[cfg(test)]
mod tests {
    use super::*;
    use trivia_types::AgeGroup;
    use uuid::Uuid;

    fn player(name: &str, score: u32) -> Player {
        let mut p = Player::new(Uuid::new_v4(), name, AgeGroup::Adult, 5);
        p.score = score;
        p
    }

    #[test]
    fn test_leaderboard_orders_and_detects_ties() {
        let players = vec![player("A", 10), player("B", 40), player("C", 10)];
        let board = leaderboard(&players);

        assert_eq!(board[0].name, "B");
        assert_eq!(board[0].rank, 1);
        assert!(!board[0].tied);
        assert_eq!((board[1].name.as_str(), board[1].rank), ("A", 2));
        assert_eq!((board[2].name.as_str(), board[2].rank), ("C", 2));
        assert!(board[1].tied && board[2].tied);
    }

    #[test]
    fn test_awards() {
        let mut a = player("A", 0);
        a.best_streak = 3;
        a.correct_answers = 2;
        a.total_answers = 4;
        a.fastest_answer = Some(6.5);

        let mut b = player("B", 0);
        b.best_streak = 1;
        b.correct_answers = 3;
        b.total_answers = 3;
        b.fastest_answer = Some(2.25);

        let c = player("C", 0);

        let awards = compute_awards(&[a.clone(), b.clone(), c]);
        assert_eq!(awards.len(), 3);
        assert_eq!(awards[0].kind, AwardKind::HottestStreak);
        assert_eq!(awards[0].player_id, a.id);
        assert_eq!(awards[1].kind, AwardKind::Sharpshooter);
        assert_eq!(awards[1].player_id, b.id);
        assert_eq!(awards[2].kind, AwardKind::SpeedDemon);
        assert_eq!(awards[2].value, 2.25);
    }

    #[test]
    fn test_no_awards_without_answers() {
        let awards = compute_awards(&[player("A", 0), player("B", 0)]);
        assert!(awards.is_empty());
    }
}
