//! Interactive track-selection prompts (`-i`/`--interactive`, spec.md 6).
//! Kept behind a trait so non-interactive test/CI runs never touch stdin;
//! the default implementation mirrors `original_source/recode/helpers.py`'s
//! `input_numbers`/`confirm_yesno` loop-until-valid prompting.

use std::io::{self, BufRead, Write};
use std::ops::RangeInclusive;

pub trait InteractiveSelector {
    /// Prompts for a comma/hyphen-separated set of numbers within
    /// `bounds`. An empty response selects the whole range.
    fn select_numbers(&mut self, prompt: &str, bounds: RangeInclusive<u32>) -> Vec<u32>;

    /// Prompts for a yes/no answer, returning `default` on an empty response.
    fn confirm(&mut self, prompt: &str, default: bool) -> bool;
}

/// Reads from stdin, writes prompts to stdout, re-asking until the input
/// parses (`original_source`'s behaviour exactly: invalid input never
/// aborts the run, it just prompts again).
pub struct StdioSelector;

impl InteractiveSelector for StdioSelector {
    fn select_numbers(&mut self, prompt: &str, bounds: RangeInclusive<u32>) -> Vec<u32> {
        let stdin = io::stdin();
        let mut lines = stdin.lock().lines();
        loop {
            print!(
                "{prompt} (from {} to {}, comma separated, hyphen denotes range, empty means \"all\"): ",
                bounds.start(),
                bounds.end()
            );
            let _ = io::stdout().flush();
            let Some(Ok(line)) = lines.next() else {
                return bounds.clone().collect();
            };
            match parse_number_selection(&line, &bounds) {
                Some(selection) => return selection,
                None => println!("Cannot parse numbers, try again"),
            }
        }
    }

    fn confirm(&mut self, prompt: &str, default: bool) -> bool {
        let stdin = io::stdin();
        let mut lines = stdin.lock().lines();
        loop {
            print!("{prompt} [{}]: ", if default { "Y/n" } else { "y/N" });
            let _ = io::stdout().flush();
            let Some(Ok(line)) = lines.next() else {
                return default;
            };
            match line.trim().to_lowercase().as_str() {
                "" => return default,
                "y" | "yes" => return true,
                "n" | "no" => return false,
                _ => continue,
            }
        }
    }
}

fn parse_number_selection(text: &str, bounds: &RangeInclusive<u32>) -> Option<Vec<u32>> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Some(bounds.clone().collect());
    }
    let mut result = Vec::new();
    for piece in trimmed.split(',') {
        let piece = piece.trim();
        if let Some((left, right)) = piece.split_once('-') {
            let left: u32 = left.trim().parse().ok()?;
            let right: u32 = right.trim().parse().ok()?;
            result.extend(left..=right);
        } else {
            result.push(piece.parse().ok()?);
        }
    }
    if result.iter().any(|n| !bounds.contains(n)) {
        return None;
    }
    Some(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_selection_means_whole_range() {
        assert_eq!(parse_number_selection("", &(1..=4)), Some(vec![1, 2, 3, 4]));
    }

    #[test]
    fn parses_comma_and_hyphen_ranges() {
        assert_eq!(parse_number_selection("1,3-5", &(1..=5)), Some(vec![1, 3, 4, 5]));
    }

    #[test]
    fn rejects_out_of_bounds_selection() {
        assert_eq!(parse_number_selection("7", &(1..=5)), None);
    }

    #[test]
    fn rejects_unparseable_input() {
        assert_eq!(parse_number_selection("abc", &(1..=5)), None);
    }
}
