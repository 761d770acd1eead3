use anyhow::{Result, anyhow};
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use trivia_types::{
    AgeGroup, Game, Language, QUESTION_TIME_LIMIT_SECS, Question, QuestionType, Subject,
};
use uuid::Uuid;

/// How many previous question texts are sent to the generator
pub const HISTORY_WINDOW: usize = 10;

/// Input for the question-generation collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionRequest {
    pub subject: Subject,
    pub difficulty: u8,
    pub age: AgeGroup,
    pub kid_age: Option<u8>,
    pub history: Vec<String>,
    pub language: Language,
    pub question_type: Option<QuestionType>,
}

impl QuestionRequest {
    /// Builds the request for whoever's turn it is. `None` when the roster is empty.
    pub fn for_turn<R: Rng + ?Sized>(game: &Game, rng: &mut R) -> Option<Self> {
        let player = game.current_player()?;
        let subject = game
            .settings
            .subjects
            .choose(rng)
            .copied()
            .unwrap_or(Subject::Science);
        let skip = game.question_history.len().saturating_sub(HISTORY_WINDOW);

        Some(Self {
            subject,
            difficulty: player.difficulty,
            age: player.age,
            kid_age: player.kid_age,
            history: game.question_history[skip..].to_vec(),
            language: game.settings.language,
            question_type: None,
        })
    }

    /// Plain-word difficulty band used in prompts
    pub fn difficulty_label(&self) -> &'static str {
        match self.difficulty {
            d if d <= 3 => "easy",
            d if d <= 6 => "medium",
            _ => "hard",
        }
    }
}

/// Checks the structural rules every playable question must satisfy
pub fn validate_question(question: &Question) -> Result<()> {
    if question.text.trim().is_empty() {
        return Err(anyhow!("Question text is empty"));
    }

    let expected = question.question_type.option_count();
    if question.options.len() != expected {
        return Err(anyhow!(
            "{} question needs {} options, got {}",
            question.question_type.as_str(),
            expected,
            question.options.len()
        ));
    }

    if question.options.iter().any(|o| o.trim().is_empty()) {
        return Err(anyhow!("Question has an empty option"));
    }

    if !question.options.contains(&question.correct_answer) {
        return Err(anyhow!(
            "Correct answer '{}' is not one of the options",
            question.correct_answer
        ));
    }

    if question.time_limit == 0 {
        return Err(anyhow!("Question has no time limit"));
    }

    Ok(())
}

struct FallbackEntry {
    text: &'static str,
    question_type: QuestionType,
    options: &'static [&'static str],
    correct_answer: &'static str,
    explanation: &'static str,
    difficulty: u8,
}

const SCIENCE: &[FallbackEntry] = &[
    FallbackEntry {
        text: "Which planet is the Red Planet?",
        question_type: QuestionType::MultipleChoice,
        options: &["Venus", "Mars", "Jupiter", "Saturn"],
        correct_answer: "Mars",
        explanation: "Iron oxide gives Mars its red color.",
        difficulty: 3,
    },
    FallbackEntry {
        text: "Water contains oxygen.",
        question_type: QuestionType::TrueFalse,
        options: &["True", "False"],
        correct_answer: "True",
        explanation: "H2O = two hydrogen atoms + one oxygen.",
        difficulty: 2,
    },
];

const HISTORY: &[FallbackEntry] = &[FallbackEntry {
    text: "When did WWII end?",
    question_type: QuestionType::MultipleChoice,
    options: &["1943", "1944", "1945", "1946"],
    correct_answer: "1945",
    explanation: "Japan surrendered in 1945.",
    difficulty: 3,
}];

const NATURE: &[FallbackEntry] = &[FallbackEntry {
    text: "Largest mammal on Earth?",
    question_type: QuestionType::MultipleChoice,
    options: &["Elephant", "Blue Whale", "Giraffe", "Polar Bear"],
    correct_answer: "Blue Whale",
    explanation: "Blue whales can reach 100 feet long.",
    difficulty: 2,
}];

const GAMING: &[FallbackEntry] = &[FallbackEntry {
    text: "Mario Bros. arcade release year?",
    question_type: QuestionType::MultipleChoice,
    options: &["1981", "1983", "1985", "1987"],
    correct_answer: "1983",
    explanation: "The arcade original dropped in 1983.",
    difficulty: 5,
}];

const MOVIES: &[FallbackEntry] = &[FallbackEntry {
    text: "\"I'll be back\": which film?",
    question_type: QuestionType::MultipleChoice,
    options: &["Robocop", "The Terminator", "Predator", "Total Recall"],
    correct_answer: "The Terminator",
    explanation: "Schwarzenegger's iconic line from 1984.",
    difficulty: 3,
}];

const MUSIC: &[FallbackEntry] = &[FallbackEntry {
    text: "Strings on a standard guitar?",
    question_type: QuestionType::MultipleChoice,
    options: &["4", "5", "6", "8"],
    correct_answer: "6",
    explanation: "Six strings: E-A-D-G-B-E.",
    difficulty: 2,
}];

const SPORTS: &[FallbackEntry] = &[FallbackEntry {
    text: "Players on a soccer team?",
    question_type: QuestionType::MultipleChoice,
    options: &["9", "10", "11", "12"],
    correct_answer: "11",
    explanation: "11 per side, including the keeper.",
    difficulty: 2,
}];

const FOOD: &[FallbackEntry] = &[FallbackEntry {
    text: "Sushi originated in Japan.",
    question_type: QuestionType::TrueFalse,
    options: &["True", "False"],
    correct_answer: "True",
    explanation: "Modern sushi was born in Japan.",
    difficulty: 3,
}];

const TRAVEL: &[FallbackEntry] = &[FallbackEntry {
    text: "Capital of Australia?",
    question_type: QuestionType::MultipleChoice,
    options: &["Sydney", "Melbourne", "Canberra", "Brisbane"],
    correct_answer: "Canberra",
    explanation: "A compromise pick between Sydney and Melbourne.",
    difficulty: 4,
}];

const POP_CULTURE: &[FallbackEntry] = &[FallbackEntry {
    text: "Musical.ly became which app?",
    question_type: QuestionType::MultipleChoice,
    options: &["Reels", "TikTok", "Snapchat", "Vine"],
    correct_answer: "TikTok",
    explanation: "TikTok absorbed Musical.ly in 2018.",
    difficulty: 3,
}];

const ART: &[FallbackEntry] = &[FallbackEntry {
    text: "Who painted the Mona Lisa?",
    question_type: QuestionType::MultipleChoice,
    options: &["Michelangelo", "Da Vinci", "Raphael", "Donatello"],
    correct_answer: "Da Vinci",
    explanation: "Leonardo painted it in the early 1500s.",
    difficulty: 2,
}];

const TECH: &[FallbackEntry] = &[FallbackEntry {
    text: "What does HTML stand for?",
    question_type: QuestionType::MultipleChoice,
    options: &[
        "Hyper Text Markup Language",
        "High Tech Modern Language",
        "Hyper Transfer Markup Language",
        "Home Tool Markup Language",
    ],
    correct_answer: "Hyper Text Markup Language",
    explanation: "The standard language for web pages.",
    difficulty: 3,
}];

fn fallback_entries(subject: Subject) -> &'static [FallbackEntry] {
    match subject {
        Subject::Science => SCIENCE,
        Subject::History => HISTORY,
        Subject::Nature => NATURE,
        Subject::Gaming => GAMING,
        Subject::Movies => MOVIES,
        Subject::Music => MUSIC,
        Subject::Sports => SPORTS,
        Subject::Food => FOOD,
        Subject::Travel => TRAVEL,
        Subject::PopCulture => POP_CULTURE,
        Subject::Art => ART,
        Subject::Tech => TECH,
    }
}

/// Bundled replacement for when generation fails. `seed` picks among the
/// subject's entries deterministically; every call gets a fresh id.
pub fn fallback_question(subject: Subject, seed: usize) -> Question {
    let entries = fallback_entries(subject);
    let entry = &entries[seed % entries.len()];

    Question {
        id: Uuid::new_v4(),
        text: entry.text.to_string(),
        question_type: entry.question_type,
        options: entry.options.iter().map(|o| o.to_string()).collect(),
        correct_answer: entry.correct_answer.to_string(),
        explanation: entry.explanation.to_string(),
        subject,
        difficulty: entry.difficulty,
        time_limit: QUESTION_TIME_LIMIT_SECS,
    }
}

/// Fallback for a request, seeded by how many questions were already asked
pub fn fallback_for(request: &QuestionRequest) -> Question {
    fallback_question(request.subject, request.history.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use trivia_types::{Player, SettingsUpdate};

    #[test]
    fn test_every_fallback_is_valid() {
        for subject in Subject::ALL {
            for seed in 0..3 {
                let question = fallback_question(subject, seed);
                assert!(
                    validate_question(&question).is_ok(),
                    "fallback for {:?} failed validation",
                    subject
                );
                assert_eq!(question.subject, subject);
                assert_eq!(question.time_limit, 20);
            }
        }
    }

    #[test]
    fn test_fallback_is_deterministic_but_fresh() {
        let a = fallback_question(Subject::Science, 0);
        let b = fallback_question(Subject::Science, 2);
        assert_eq!(a.text, b.text);
        assert_ne!(a.id, b.id);

        let c = fallback_question(Subject::Science, 1);
        assert_eq!(c.text, "Water contains oxygen.");
    }

    #[test]
    fn test_validation_rejects_bad_answers() {
        let mut question = fallback_question(Subject::Travel, 0);
        question.correct_answer = "Perth".to_string();
        assert!(validate_question(&question).is_err());

        let mut question = fallback_question(Subject::Food, 0);
        question.options.push("Maybe".to_string());
        assert!(validate_question(&question).is_err());

        let mut question = fallback_question(Subject::Art, 0);
        question.text = "   ".to_string();
        assert!(validate_question(&question).is_err());
    }

    #[test]
    fn test_request_uses_current_player_and_recent_history() {
        let mut game = Game::default();
        let mut kid = Player::new(Uuid::new_v4(), "Kid", AgeGroup::Kid, 2);
        kid.kid_age = Some(7);
        game.players.push(Player::new(Uuid::new_v4(), "Adult", AgeGroup::Adult, 8));
        game.players.push(kid);
        game.current_player_turn_index = 1;
        game.settings = game.settings.merged(&SettingsUpdate {
            subjects: Some(vec![Subject::Music]),
            language: Some(Language::De),
            ..SettingsUpdate::default()
        });
        game.question_history = (0..14).map(|i| format!("Q{}", i)).collect();

        let mut rng = StdRng::seed_from_u64(7);
        let request = QuestionRequest::for_turn(&game, &mut rng).unwrap();

        assert_eq!(request.subject, Subject::Music);
        assert_eq!(request.difficulty, 2);
        assert_eq!(request.age, AgeGroup::Kid);
        assert_eq!(request.kid_age, Some(7));
        assert_eq!(request.language, Language::De);
        assert_eq!(request.history.len(), HISTORY_WINDOW);
        assert_eq!(request.history.first().map(String::as_str), Some("Q4"));
        assert_eq!(request.difficulty_label(), "easy");
    }

    #[test]
    fn test_request_needs_a_player() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(QuestionRequest::for_turn(&Game::default(), &mut rng).is_none());
    }
}
