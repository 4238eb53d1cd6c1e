//! Answer rewrites that turn a gold answer into a plausible wrong one.

use super::RubricItem;
use crate::calibration::folds::Lcg64;
use crate::judge::ExpectedOutcome;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transformation {
    /// Same figures, attached to the wrong metric.
    WrongMetricRightNumber,
    /// Same metric, figures moved by 25-30%.
    RightMetricWrongNumber,
    /// Million for billion, percent for basis points.
    WrongUnitScale,
    /// The gold answer followed by a conflicting second value.
    MultiNumberConflict,
    /// Rubric vocabulary without the actual answer.
    KeywordStuffing,
    /// Doubtful framing with the figures removed.
    HedgedAnswer,
}

impl Transformation {
    pub const ALL: [Transformation; 6] = [
        Transformation::WrongMetricRightNumber,
        Transformation::RightMetricWrongNumber,
        Transformation::WrongUnitScale,
        Transformation::MultiNumberConflict,
        Transformation::KeywordStuffing,
        Transformation::HedgedAnswer,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Transformation::WrongMetricRightNumber => "wrong_metric_right_number",
            Transformation::RightMetricWrongNumber => "right_metric_wrong_number",
            Transformation::WrongUnitScale => "wrong_unit_scale",
            Transformation::MultiNumberConflict => "multi_number_conflict",
            Transformation::KeywordStuffing => "keyword_stuffing",
            Transformation::HedgedAnswer => "hedged_answer",
        }
    }

    pub fn expected_outcome(self) -> ExpectedOutcome {
        match self {
            Transformation::MultiNumberConflict => ExpectedOutcome::ContradictionViolated,
            _ => ExpectedOutcome::Fail,
        }
    }

    pub fn notes(self) -> &'static str {
        match self {
            Transformation::WrongMetricRightNumber => {
                "Numeric values correct but applied to wrong metric/concept"
            }
            Transformation::RightMetricWrongNumber => {
                "Correct metric/concept but numeric values are incorrect"
            }
            Transformation::WrongUnitScale => "Unit scale confusion (e.g., million vs billion)",
            Transformation::MultiNumberConflict => "Answer contains two conflicting values",
            Transformation::KeywordStuffing => {
                "Contains relevant keywords but no actual correct information"
            }
            Transformation::HedgedAnswer => "Hedged/uncertain language with no definitive answer",
        }
    }

    /// Rewrites `gold`. `None` only when the text patterns failed to build.
    /// The result can equal `gold` when the answer has nothing to rewrite.
    pub fn apply(self, gold: &str, rubric: &[RubricItem], rng: &mut Lcg64) -> Option<String> {
        let p = patterns()?;
        let out = match self {
            Transformation::WrongMetricRightNumber => wrong_metric(p, gold),
            Transformation::RightMetricWrongNumber => wrong_number(p, gold, rng),
            Transformation::WrongUnitScale => wrong_unit(p, gold),
            Transformation::MultiNumberConflict => number_conflict(p, gold),
            Transformation::KeywordStuffing => keyword_stuffing(p, gold, rubric),
            Transformation::HedgedAnswer => hedged(p, gold, rng),
        };
        Some(out)
    }
}

const PERTURB_FACTORS: [f64; 4] = [0.7, 0.75, 1.25, 1.3];

const HEDGE_PREFIXES: [&str; 5] = [
    "It's difficult to determine exactly, but",
    "Based on limited information, it might be",
    "The data suggests, though uncertainly,",
    "There could potentially be",
    "It's possible that approximately",
];

const METRIC_SWAPS: [(&str, &str); 11] = [
    ("revenue", "profit"),
    ("profit", "revenue"),
    ("margin", "ratio"),
    ("growth", "decline"),
    ("increase", "decrease"),
    ("beat", "miss"),
    ("miss", "beat"),
    ("expenses", "income"),
    ("income", "expenses"),
    ("assets", "liabilities"),
    ("liabilities", "assets"),
];

struct Patterns {
    /// A figure with an optional scale or percent suffix.
    number: Regex,
    plain_number: Regex,
    dollar: Regex,
    word: Regex,
    metric: Regex,
    /// Tried in order; the first that matches is applied.
    unit_swaps: Vec<(Regex, &'static str)>,
}

static PATTERNS: OnceLock<Option<Patterns>> = OnceLock::new();

fn build_patterns() -> Result<Patterns, regex::Error> {
    let metric_alt = METRIC_SWAPS
        .iter()
        .map(|(from, _)| *from)
        .collect::<Vec<_>>()
        .join("|");
    Ok(Patterns {
        number: Regex::new(r"\$?\d[\d,]*(?:\.\d+)?(?:\s*(?:billion|million|%|bps))?")?,
        plain_number: Regex::new(r"\$?\d[\d,]*(?:\.\d+)?")?,
        dollar: Regex::new(r"\$\d[\d,]*(?:\.\d+)?")?,
        word: Regex::new(r"\b[A-Za-z]{4,}\b")?,
        metric: Regex::new(&format!(r"(?i)\b(?:{metric_alt})\b"))?,
        unit_swaps: vec![
            (Regex::new(r"(?i)\bbillion\b")?, "million"),
            (Regex::new(r"(?i)\bmillion\b")?, "billion"),
            (Regex::new(r"\bB\b")?, "M"),
            (Regex::new(r"\bM\b")?, "B"),
            (Regex::new(r"(?i)\bthousand\b")?, "million"),
            (Regex::new(r"(\d)\s*%")?, "${1} bps"),
        ],
    })
}

fn patterns() -> Option<&'static Patterns> {
    PATTERNS
        .get_or_init(|| match build_patterns() {
            Ok(p) => Some(p),
            Err(e) => {
                tracing::warn!(error = %e, "answer rewrite patterns failed to compile");
                None
            }
        })
        .as_ref()
}

/// Carries the casing of `original` over to `replacement`.
fn match_case(original: &str, replacement: &str) -> String {
    if original.len() > 1 && original.chars().all(char::is_uppercase) {
        return replacement.to_uppercase();
    }
    if original.starts_with(char::is_uppercase) {
        let mut chars = replacement.chars();
        return match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        };
    }
    replacement.to_string()
}

fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

fn parse_figure(text: &str) -> Option<f64> {
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    cleaned.parse().ok()
}

fn wrong_metric(p: &Patterns, gold: &str) -> String {
    if p.metric.is_match(gold) {
        // all swaps in one pass, so revenue/profit trade places
        return p
            .metric
            .replace_all(gold, |caps: &Captures<'_>| {
                let found = &caps[0];
                let lower = found.to_lowercase();
                METRIC_SWAPS
                    .iter()
                    .find(|(from, _)| *from == lower)
                    .map_or_else(|| found.to_string(), |(_, to)| match_case(found, to))
            })
            .into_owned();
    }
    match p.number.find(gold) {
        Some(n) => format!(
            "The operating expenses were {} for the period, showing efficiency improvements.",
            n.as_str()
        ),
        None => "The company reported strong profit margins due to cost optimization.".to_string(),
    }
}

fn wrong_number(p: &Patterns, gold: &str, rng: &mut Lcg64) -> String {
    p.plain_number
        .replace_all(gold, |caps: &Captures<'_>| {
            let found = &caps[0];
            let Some(value) = parse_figure(found) else {
                return found.to_string();
            };
            let moved = value * PERTURB_FACTORS[rng.next_below(PERTURB_FACTORS.len())];
            let body = if found.contains('.') {
                format!("{moved:.2}")
            } else {
                group_thousands(moved.trunc() as u64)
            };
            let prefix = if found.starts_with('$') { "$" } else { "" };
            format!("{prefix}{body}")
        })
        .into_owned()
}

fn wrong_unit(p: &Patterns, gold: &str) -> String {
    for (pattern, replacement) in &p.unit_swaps {
        if pattern.is_match(gold) {
            return pattern.replace_all(gold, *replacement).into_owned();
        }
    }
    // no unit to swap: scale the first dollar figure by a thousand
    p.dollar
        .replacen(gold, 1, |caps: &Captures<'_>| {
            let found = &caps[0];
            match parse_figure(found) {
                Some(value) => format!("${}", group_thousands((value * 1000.0).round() as u64)),
                None => found.to_string(),
            }
        })
        .into_owned()
}

fn number_conflict(p: &Patterns, gold: &str) -> String {
    match p.number.find(gold) {
        Some(n) => {
            let n = n.as_str();
            format!(
                "{gold}\n\nHowever, alternative calculations suggest the value could be {n} times 1.5, \
                 which would be approximately {n} increased by 50%."
            )
        }
        None => format!(
            "{gold}\n\nAlternatively, some sources indicate the figure was actually 25% higher than reported."
        ),
    }
}

fn keyword_stuffing(p: &Patterns, gold: &str, rubric: &[RubricItem]) -> String {
    let mut keywords: Vec<&str> = rubric
        .iter()
        .flat_map(|item| p.word.find_iter(&item.criteria).take(5))
        .map(|m| m.as_str())
        .collect();
    if keywords.is_empty() {
        keywords = p.word.find_iter(gold).take(10).map(|m| m.as_str()).collect();
    }
    if keywords.is_empty() {
        keywords.push("performance");
    }
    let lead = keywords[0];
    let mut listed: Vec<&str> = Vec::new();
    for k in keywords.into_iter().take(8) {
        if !listed.contains(&k) {
            listed.push(k);
        }
    }
    let listed = listed.join(", ");
    format!(
        "Regarding {listed}, the analysis shows various factors including {listed}. \
         Key metrics like {lead} and related measures indicate overall alignment with expectations."
    )
}

fn hedged(p: &Patterns, gold: &str, rng: &mut Lcg64) -> String {
    let prefix = HEDGE_PREFIXES[rng.next_below(HEDGE_PREFIXES.len())];
    let vague = p.plain_number.replace_all(gold, "some value");
    let vague = vague.trim().trim_end_matches('.');
    format!(
        "{prefix} {vague}. However, further analysis would be needed to confirm these figures. \
         The actual numbers could vary significantly."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(t: Transformation, gold: &str) -> String {
        t.apply(gold, &[], &mut Lcg64::new(42)).unwrap()
    }

    #[test]
    fn metric_words_swap_in_one_pass() {
        let out = run(
            Transformation::WrongMetricRightNumber,
            "Revenue rose 12% while profit fell to $3.1 billion.",
        );
        assert_eq!(out, "Profit rose 12% while revenue fell to $3.1 billion.");
    }

    #[test]
    fn metric_fallback_reuses_first_figure() {
        let out = run(Transformation::WrongMetricRightNumber, "EBITDA was $4.2 billion.");
        assert_eq!(
            out,
            "The operating expenses were $4.2 billion for the period, showing efficiency improvements."
        );
        let out = run(Transformation::WrongMetricRightNumber, "Guidance was withdrawn.");
        assert!(out.starts_with("The company reported strong profit margins"));
    }

    #[test]
    fn every_figure_moves_and_keeps_its_format() {
        let gold = "Net sales were $1,200 and margin was 40.0%.";
        let out = run(Transformation::RightMetricWrongNumber, gold);
        assert_ne!(out, gold);
        let re = Regex::new(r"^Net sales were \$[\d,]+ and margin was \d+\.\d{2}%\.$").unwrap();
        assert!(re.is_match(&out), "{out}");
        let allowed = ["$840", "$900", "$1,500", "$1,560"];
        assert!(allowed.iter().any(|a| out.contains(a)), "{out}");
    }

    #[test]
    fn unit_swap_takes_first_matching_rule() {
        assert_eq!(
            run(Transformation::WrongUnitScale, "Capex was $2.5 billion, up from 900 million."),
            "Capex was $2.5 million, up from 900 million."
        );
        assert_eq!(run(Transformation::WrongUnitScale, "Margin was 14%."), "Margin was 14 bps.");
        assert_eq!(
            run(Transformation::WrongUnitScale, "Dividend of $1.25 per share."),
            "Dividend of $1,250 per share."
        );
        assert_eq!(run(Transformation::WrongUnitScale, "No figures."), "No figures.");
    }

    #[test]
    fn conflict_appends_a_second_value() {
        let out = run(Transformation::MultiNumberConflict, "Revenue was $10 million.");
        assert!(out.starts_with("Revenue was $10 million.\n\nHowever"));
        assert!(out.contains("$10 million times 1.5"));
        assert_eq!(
            Transformation::MultiNumberConflict.expected_outcome(),
            ExpectedOutcome::ContradictionViolated
        );
    }

    #[test]
    fn stuffing_prefers_rubric_vocabulary() {
        let rubric = vec![
            RubricItem {
                criteria: "Mentions liquidity and solvency ratios".into(),
            },
            RubricItem {
                criteria: "Mentions liquidity trend".into(),
            },
        ];
        let out = Transformation::KeywordStuffing
            .apply("Gold text here", &rubric, &mut Lcg64::new(1))
            .unwrap();
        assert!(out.starts_with(
            "Regarding Mentions, liquidity, solvency, ratios, trend, the analysis"
        ));
        assert!(out.contains("Key metrics like Mentions and related"));
        assert!(!out.contains("Gold"));
    }

    #[test]
    fn hedged_strips_figures() {
        let out = run(Transformation::HedgedAnswer, "Operating margin was 21.4%.");
        assert!(HEDGE_PREFIXES.iter().any(|p| out.starts_with(p)));
        assert!(out.contains("Operating margin was some value%. However"));
        assert!(!out.contains("21.4"));
    }

    #[test]
    fn casing_and_grouping_helpers() {
        assert_eq!(match_case("Revenue", "profit"), "Profit");
        assert_eq!(match_case("REVENUE", "profit"), "PROFIT");
        assert_eq!(match_case("revenue", "profit"), "profit");
        assert_eq!(group_thousands(0), "0");
        assert_eq!(group_thousands(999), "999");
        assert_eq!(group_thousands(1_250_000), "1,250,000");
    }

    #[test]
    fn names_round_trip_through_serde() {
        for t in Transformation::ALL {
            let json = serde_json::to_string(&t).unwrap();
            assert_eq!(json, format!("\"{}\"", t.as_str()));
        }
    }
}
