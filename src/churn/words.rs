//! Pronounceable filler text and entry-name tokens.

use rand::Rng;

const CONSONANTS: &[u8] = b"bcdfghjklmnprstvwz";
const VOWELS: &[u8] = b"aeiou";

fn syllable<R: Rng + ?Sized>(rng: &mut R, out: &mut String) {
    let consonant = CONSONANTS[rng.gen_range(0..CONSONANTS.len())];
    let vowel = VOWELS[rng.gen_range(0..VOWELS.len())];
    out.push(char::from(consonant));
    out.push(char::from(vowel));
    if rng.gen_bool(0.3) {
        out.push(char::from(CONSONANTS[rng.gen_range(0..CONSONANTS.len())]));
    }
}

/// A lowercase word of one to three syllables.
pub fn word<R: Rng + ?Sized>(rng: &mut R) -> String {
    let mut out = String::with_capacity(9);
    for _ in 0..rng.gen_range(1..=3) {
        syllable(rng, &mut out);
    }
    out
}

/// A capitalized sentence of 12 to 18 words ending with a period.
pub fn sentence<R: Rng + ?Sized>(rng: &mut R) -> String {
    let count = rng.gen_range(12..=18);
    let mut words: Vec<String> = (0..count).map(|_| word(rng)).collect();
    if let Some(first) = words.first_mut() {
        let mut chars = first.chars();
        if let Some(head) = chars.next() {
            *first = head.to_ascii_uppercase().to_string() + chars.as_str();
        }
    }
    let mut text = words.join(" ");
    text.push('.');
    text
}

/// One die roll, `1..=8`, as a digit character.
pub fn d8<R: Rng + ?Sized>(rng: &mut R) -> char {
    char::from(b'0' + rng.gen_range(1..=8u8))
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    use super::*;

    #[test]
    fn words_are_lowercase_ascii() {
        let mut rng = SmallRng::seed_from_u64(3);
        for _ in 0..200 {
            let w = word(&mut rng);
            assert!((2..=9).contains(&w.len()), "{w}");
            assert!(w.bytes().all(|b| b.is_ascii_lowercase()), "{w}");
        }
    }

    #[test]
    fn sentences_are_capitalized_and_terminated() {
        let mut rng = SmallRng::seed_from_u64(11);
        let s = sentence(&mut rng);
        assert!(s.ends_with('.'));
        assert!(s.chars().next().is_some_and(|c| c.is_ascii_uppercase()));
        let words = s.trim_end_matches('.').split(' ').count();
        assert!((12..=18).contains(&words));
    }

    #[test]
    fn d8_stays_in_range() {
        let mut rng = SmallRng::seed_from_u64(5);
        for _ in 0..500 {
            assert!(('1'..='8').contains(&d8(&mut rng)));
        }
    }
}
