use rand::seq::SliceRandom;
use rand::Rng;

use crate::models::LetterArrangementResult;

/// Letters move one at a time between the shuffled bank and the arrangement.
/// Together they always hold exactly the letters of the word.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LetterTask {
    original: String,
    bank: Vec<char>,
    arrangement: Vec<char>,
}

/// Fisher–Yates. A shuffle that reproduces the word swaps its first letter
/// with the first letter that differs from it, so only words made of a
/// single repeated letter come back unchanged.
pub fn shuffle_word<R: Rng + ?Sized>(rng: &mut R, word: &str) -> Vec<char> {
    let mut letters: Vec<char> = word.chars().collect();
    for i in (1..letters.len()).rev() {
        let j = rng.gen_range(0..=i);
        letters.swap(i, j);
    }
    if letters.iter().copied().eq(word.chars()) {
        if let Some(k) = letters.iter().position(|&c| c != letters[0]) {
            letters.swap(0, k);
        }
    }
    letters
}

impl LetterTask {
    pub fn new<R: Rng + ?Sized>(rng: &mut R, word: &str) -> Self {
        Self {
            original: word.to_string(),
            bank: shuffle_word(rng, word),
            arrangement: Vec::new(),
        }
    }

    /// Picks a word at random from `words`; `None` when the list is empty.
    pub fn random<R: Rng + ?Sized>(rng: &mut R, words: &[String]) -> Option<Self> {
        let word = words.choose(rng)?;
        Some(Self::new(rng, word.trim()))
    }

    pub fn original(&self) -> &str {
        &self.original
    }

    pub fn bank(&self) -> &[char] {
        &self.bank
    }

    pub fn arrangement(&self) -> &[char] {
        &self.arrangement
    }

    pub fn arranged_word(&self) -> String {
        self.arrangement.iter().collect()
    }

    /// Moves the bank letter at `index` to the end of the arrangement.
    pub fn move_to_arrangement(&mut self, index: usize) -> Option<char> {
        if index >= self.bank.len() {
            return None;
        }
        let letter = self.bank.remove(index);
        self.arrangement.push(letter);
        Some(letter)
    }

    /// Moves the arranged letter at `index` back to the bank.
    pub fn return_to_bank(&mut self, index: usize) -> Option<char> {
        if index >= self.arrangement.len() {
            return None;
        }
        let letter = self.arrangement.remove(index);
        self.bank.push(letter);
        Some(letter)
    }

    /// `None` when nothing has been arranged yet.
    pub fn evaluate(&self) -> Option<LetterArrangementResult> {
        if self.arrangement.is_empty() {
            return None;
        }

        let user_word = self.arranged_word();
        let original = self.original.as_str();
        let correct = user_word == original;
        let user: Vec<char> = user_word.chars().collect();
        let expected: Vec<char> = original.chars().collect();

        let interpretation = if correct {
            format!("Yes! You correctly spelled \"{original}\". Great job!")
        } else {
            format!(
                "Good try! The word was \"{original}\". Putting letters in the right order can be tricky."
            )
        };
        let length_step = if correct {
            "Try slightly longer words next time!"
        } else {
            "Keep practicing with 3-letter words."
        };

        Some(LetterArrangementResult {
            original_word: original.to_string(),
            user_arrangement: user_word,
            correct,
            transpositions: count_transpositions(&user, &expected),
            correct_placement: count_correct_positions(&user, &expected),
            interpretation,
            suggested_next_steps: vec![
                "Play letter sound games (what sound does 'c' make?).".to_string(),
                "Practice spelling simple words with letter tiles or magnets.".to_string(),
                length_step.to_string(),
                "Read simple picture books together.".to_string(),
            ],
        })
    }
}

/// Adjacent pairs that appear swapped relative to the word.
pub fn count_transpositions(user: &[char], expected: &[char]) -> usize {
    if user.len() != expected.len() || user.len() < 2 {
        return 0;
    }
    user.windows(2)
        .zip(expected.windows(2))
        .filter(|(u, e)| u[0] == e[1] && u[1] == e[0])
        .count()
}

pub fn count_correct_positions(user: &[char], expected: &[char]) -> usize {
    user.iter()
        .zip(expected.iter())
        .filter(|(u, e)| u == e)
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn sorted(letters: impl IntoIterator<Item = char>) -> Vec<char> {
        let mut v: Vec<char> = letters.into_iter().collect();
        v.sort_unstable();
        v
    }

    #[test]
    fn shuffle_always_differs_and_keeps_letters() {
        let mut rng = StdRng::seed_from_u64(42);
        for word in ["cat", "see", "ab", "the", "banana", "sky"] {
            for _ in 0..500 {
                let shuffled = shuffle_word(&mut rng, word);
                assert!(!shuffled.iter().copied().eq(word.chars()), "{word}");
                assert_eq!(sorted(shuffled), sorted(word.chars()));
            }
        }
    }

    #[test]
    fn repeated_leading_letters_still_shuffle() {
        for seed in 0..200 {
            let mut rng = StdRng::seed_from_u64(seed);
            for word in ["aab", "oops", "eel", "llama"] {
                let shuffled = shuffle_word(&mut rng, word);
                assert!(!shuffled.iter().copied().eq(word.chars()), "{word} seed {seed}");
                assert_eq!(sorted(shuffled), sorted(word.chars()));
            }
        }
    }

    #[test]
    fn one_repeated_letter_cannot_change() {
        let mut rng = StdRng::seed_from_u64(5);
        assert_eq!(shuffle_word(&mut rng, "zzz"), vec!['z', 'z', 'z']);
    }

    #[test]
    fn single_letter_word_is_left_alone() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(shuffle_word(&mut rng, "a"), vec!['a']);
        assert!(shuffle_word(&mut rng, "").is_empty());
    }

    #[test]
    fn moving_a_letter_back_restores_the_bank() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut task = LetterTask::new(&mut rng, "dog");
        let before = sorted(task.bank().iter().copied());

        let moved = task.move_to_arrangement(1).unwrap();
        assert_eq!(task.arrangement(), &[moved]);
        assert_eq!(task.return_to_bank(0), Some(moved));

        assert_eq!(sorted(task.bank().iter().copied()), before);
        assert!(task.arrangement().is_empty());
    }

    #[test]
    fn letters_are_conserved_across_moves() {
        let mut rng = StdRng::seed_from_u64(9);
        let mut task = LetterTask::new(&mut rng, "was");
        task.move_to_arrangement(2);
        task.move_to_arrangement(0);
        task.return_to_bank(1);
        assert!(task.move_to_arrangement(10).is_none());
        assert!(task.return_to_bank(10).is_none());

        let all = task.bank().iter().chain(task.arrangement()).copied();
        assert_eq!(sorted(all), sorted("was".chars()));
    }

    #[test]
    fn submitted_word_is_arrangement_in_order() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut task = LetterTask::new(&mut rng, "cat");
        assert!(task.evaluate().is_none());

        while !task.bank().is_empty() {
            let index = task.bank().iter().position(|c| {
                let want = "cat".chars().nth(task.arrangement().len()).unwrap();
                *c == want
            });
            task.move_to_arrangement(index.unwrap());
        }

        let result = task.evaluate().unwrap();
        assert_eq!(result.user_arrangement, "cat");
        assert!(result.correct);
        assert_eq!(result.correct_placement, 3);
        assert_eq!(result.transpositions, 0);
    }

    #[test]
    fn diagnostics_count_swaps_and_positions() {
        let user: Vec<char> = "act".chars().collect();
        let expected: Vec<char> = "cat".chars().collect();
        assert_eq!(count_transpositions(&user, &expected), 1);
        assert_eq!(count_correct_positions(&user, &expected), 1);

        let short: Vec<char> = "ca".chars().collect();
        assert_eq!(count_transpositions(&short, &expected), 0);
        assert_eq!(count_correct_positions(&short, &expected), 2);
    }

    #[test]
    fn random_word_comes_from_list() {
        let mut rng = StdRng::seed_from_u64(4);
        let words = vec!["sun".to_string(), "map".to_string()];
        let task = LetterTask::random(&mut rng, &words).unwrap();
        assert!(words.iter().any(|w| w == task.original()));
        assert!(LetterTask::random(&mut rng, &[]).is_none());
    }
}
