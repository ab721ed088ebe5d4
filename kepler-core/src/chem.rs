//! Chemical formula and reaction parsing.
//!
//! Shared between the chemistry extractor (formula recognition) and the
//! domain-rule engine (atom balance). Handles nested parentheses, unicode
//! subscript digits, and leading stoichiometric coefficients.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use crate::enrich::{Reaction, ReactionTerm};

/// Element symbols the parser accepts. Covers the common STEM-problem set.
const ELEMENTS: &[&str] = &[
    "H", "He", "Li", "Be", "B", "C", "N", "O", "F", "Ne", "Na", "Mg", "Al", "Si", "P", "S",
    "Cl", "Ar", "K", "Ca", "Ti", "Cr", "Mn", "Fe", "Ni", "Cu", "Zn", "Br", "Ag", "Sn", "I",
    "Ba", "Pt", "Au", "Hg", "Pb",
];

fn element_set() -> &'static std::collections::BTreeSet<&'static str> {
    static SET: OnceLock<std::collections::BTreeSet<&'static str>> = OnceLock::new();
    SET.get_or_init(|| ELEMENTS.iter().copied().collect())
}

/// Replace unicode subscript digits (H₂O) with ASCII digits (H2O).
pub fn normalize_subscripts(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '₀'..='₉' => char::from_u32(u32::from(c) - 0x2080 + u32::from('0')).unwrap_or(c),
            _ => c,
        })
        .collect()
}

/// Parse a formula like `Ca(OH)2` into an element → atom-count map.
/// Returns `None` when the string is not a plausible formula.
pub fn parse_formula(formula: &str) -> Option<BTreeMap<String, u32>> {
    let normalized = normalize_subscripts(formula.trim());
    let chars: Vec<char> = normalized.chars().collect();
    let (counts, consumed) = parse_group(&chars, 0)?;
    if consumed != chars.len() || counts.is_empty() {
        return None;
    }
    Some(counts)
}

fn parse_group(chars: &[char], mut i: usize) -> Option<(BTreeMap<String, u32>, usize)> {
    let mut counts: BTreeMap<String, u32> = BTreeMap::new();

    while i < chars.len() {
        match chars[i] {
            '(' => {
                let (inner, next) = parse_group(chars, i + 1)?;
                if next >= chars.len() || chars[next] != ')' {
                    return None;
                }
                i = next + 1;
                let (mult, next) = parse_number(chars, i);
                i = next;
                let mult = mult.unwrap_or(1);
                for (el, n) in inner {
                    *counts.entry(el).or_insert(0) += n * mult;
                }
            }
            ')' => break,
            c if c.is_ascii_uppercase() => {
                let mut symbol = c.to_string();
                if i + 1 < chars.len() && chars[i + 1].is_ascii_lowercase() {
                    symbol.push(chars[i + 1]);
                    i += 1;
                }
                i += 1;
                if !element_set().contains(symbol.as_str()) {
                    return None;
                }
                let (count, next) = parse_number(chars, i);
                i = next;
                *counts.entry(symbol).or_insert(0) += count.unwrap_or(1);
            }
            _ => return None,
        }
    }
    Some((counts, i))
}

fn parse_number(chars: &[char], mut i: usize) -> (Option<u32>, usize) {
    let start = i;
    while i < chars.len() && chars[i].is_ascii_digit() {
        i += 1;
    }
    if i == start {
        (None, i)
    } else {
        let n: String = chars[start..i].iter().collect();
        (n.parse().ok(), i)
    }
}

/// Whether a token reads as a chemical formula (and not a stray word like "V").
pub fn is_plausible_formula(token: &str) -> bool {
    let normalized = normalize_subscripts(token);
    match parse_formula(&normalized) {
        Some(counts) => {
            let total_atoms: u32 = counts.values().sum();
            // Single-letter single-atom tokens ("N", "K") are more often units
            // or variables than formulas in problem text.
            counts.len() >= 2 || total_atoms >= 2
        }
        None => false,
    }
}

/// Parse `2H2 + O2 -> 2H2O` into a [`Reaction`]. Accepts `->`, `→`, `=`.
pub fn parse_reaction(text: &str) -> Option<Reaction> {
    let normalized = normalize_subscripts(text).replace('→', "->");
    let (lhs, rhs) = normalized
        .split_once("->")
        .or_else(|| normalized.split_once('='))?;

    let reactants = parse_side(lhs)?;
    let products = parse_side(rhs)?;
    if reactants.is_empty() || products.is_empty() {
        return None;
    }
    Some(Reaction { reactants, products })
}

/// Each '+'-separated token must contain exactly one formula word; the rest
/// is surrounding prose ("Balance the equation 2H2", "2H2O in the beaker").
fn parse_side(side: &str) -> Option<Vec<ReactionTerm>> {
    let mut terms = Vec::new();
    for raw in side.split('+') {
        let token = raw.trim();
        if token.is_empty() {
            return None;
        }
        let mut candidates = token.split_whitespace().filter_map(parse_term);
        let term = candidates.next()?;
        if candidates.next().is_some() {
            return None; // ambiguous: two formula words in one term
        }
        terms.push(term);
    }
    Some(terms)
}

fn parse_term(word: &str) -> Option<ReactionTerm> {
    let digits: String = word.chars().take_while(char::is_ascii_digit).collect();
    let (coefficient, formula) = if digits.is_empty() {
        (1, word.to_string())
    } else {
        (digits.parse().ok()?, word[digits.len()..].trim().to_string())
    };
    parse_formula(&formula)?;
    Some(ReactionTerm { coefficient, formula })
}

/// Total atoms per element on one side of a reaction: Σ(atoms × coefficient).
pub fn atom_totals(terms: &[ReactionTerm]) -> BTreeMap<String, u32> {
    let mut totals: BTreeMap<String, u32> = BTreeMap::new();
    for term in terms {
        if let Some(counts) = parse_formula(&term.formula) {
            for (el, n) in counts {
                *totals.entry(el).or_insert(0) += n * term.coefficient;
            }
        }
    }
    totals
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_formula() {
        let counts = parse_formula("H2O").unwrap();
        assert_eq!(counts["H"], 2);
        assert_eq!(counts["O"], 1);
    }

    #[test]
    fn parses_parenthesised_formula() {
        let counts = parse_formula("Ca(OH)2").unwrap();
        assert_eq!(counts["Ca"], 1);
        assert_eq!(counts["O"], 2);
        assert_eq!(counts["H"], 2);
    }

    #[test]
    fn normalises_subscripts() {
        assert_eq!(normalize_subscripts("H₂O"), "H2O");
        let counts = parse_formula("H₂O").unwrap();
        assert_eq!(counts["H"], 2);
    }

    #[test]
    fn rejects_non_formulas() {
        assert!(parse_formula("hello").is_none());
        assert!(parse_formula("Xx2").is_none());
        assert!(parse_formula("").is_none());
        assert!(parse_formula("(H2").is_none());
    }

    #[test]
    fn plausibility_filters_stray_symbols() {
        assert!(is_plausible_formula("H2O"));
        assert!(is_plausible_formula("NaCl"));
        assert!(is_plausible_formula("O2"));
        assert!(!is_plausible_formula("V"));
        assert!(!is_plausible_formula("N"));
    }

    #[test]
    fn parses_balanced_reaction() {
        let rx = parse_reaction("2H2 + O2 -> 2H2O").unwrap();
        assert_eq!(rx.reactants.len(), 2);
        assert_eq!(rx.reactants[0].coefficient, 2);
        assert_eq!(rx.products[0].formula, "H2O");

        let lhs = atom_totals(&rx.reactants);
        let rhs = atom_totals(&rx.products);
        assert_eq!(lhs, rhs);
    }

    #[test]
    fn detects_unbalanced_totals() {
        let rx = parse_reaction("2H2 + O2 -> H2O").unwrap();
        let lhs = atom_totals(&rx.reactants);
        let rhs = atom_totals(&rx.products);
        assert_ne!(lhs["H"], rhs["H"]);
    }

    #[test]
    fn unicode_arrow_and_equals_accepted() {
        assert!(parse_reaction("2H₂ + O₂ → 2H₂O").is_some());
        assert!(parse_reaction("CH4 + 2O2 = CO2 + 2H2O").is_some());
    }

    #[test]
    fn garbage_reaction_is_none() {
        assert!(parse_reaction("no arrow here").is_none());
        assert!(parse_reaction("H2 + -> H2O").is_none());
    }
}
