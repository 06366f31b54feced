use chrono::{Days, NaiveDate};

pub fn last_day_of_month(year: i32, month: u32) -> NaiveDate {
    let next_month = if month == 12 { 1 } else { month + 1 };
    let next_year = if month == 12 { year + 1 } else { year };

    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|d| d.checked_sub_days(Days::new(1)))
        .unwrap_or(NaiveDate::MAX)
}

/// Outcome of reading a monetary cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Amount {
    Blank,
    Value(f64),
    Invalid,
}

/// Reads an accounting amount: `1 234,56` -> 1234.56, `(1 000)` -> -1000.0,
/// `1,234.56` -> 1234.56, `-` -> 0.0.
pub fn parse_amount(cell: &str) -> Amount {
    let trimmed = cell.trim();
    if trimmed.is_empty() {
        return Amount::Blank;
    }
    if matches!(trimmed, "-" | "—" | "–") {
        return Amount::Value(0.0);
    }

    let mut negative = false;
    let mut s: String = trimmed
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\u{00A0}' && *c != '\'')
        .collect();

    if s.starts_with('(') && s.ends_with(')') {
        negative = true;
        s = s[1..s.len() - 1].to_string();
    }
    if let Some(rest) = s.strip_prefix('-') {
        negative = !negative;
        s = rest.to_string();
    } else if let Some(rest) = s.strip_suffix('-') {
        negative = !negative;
        s = rest.to_string();
    }

    let normalized = match (s.rfind(','), s.rfind('.')) {
        // 1,234.56
        (Some(c), Some(d)) if c < d => s.replace(',', ""),
        // 1.234,56
        (Some(c), Some(d)) if d < c => s.replace('.', "").replace(',', "."),
        (Some(_), None) => {
            // 1,234,567 is grouping; 1234,5 is a decimal comma
            if s.matches(',').count() > 1 || is_thousands_grouped(&s, ',') {
                s.replace(',', "")
            } else {
                s.replace(',', ".")
            }
        }
        _ => s,
    };

    if normalized.is_empty() || !normalized.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return Amount::Invalid;
    }

    match normalized.parse::<f64>() {
        Ok(value) if value.is_finite() => Amount::Value(if negative { -value } else { value }),
        _ => Amount::Invalid,
    }
}

fn is_thousands_grouped(s: &str, separator: char) -> bool {
    match s.split_once(separator) {
        Some((head, tail)) => {
            tail.len() == 3 && !head.is_empty() && head.len() <= 3 && !head.starts_with('0')
        }
        None => false,
    }
}

/// Lowercases, folds `ё` and collapses whitespace and punctuation noise so that
/// labels compare on words only.
pub fn normalize_label(label: &str) -> String {
    let lowered = label.to_lowercase().replace('ё', "е");
    let cleaned: String = lowered
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '&' {
                c
            } else {
                ' '
            }
        })
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn slugify(label: &str) -> String {
    normalize_label(label).replace(' ', "_")
}

/// Whole-word containment on normalized labels.
pub fn contains_phrase(haystack: &str, phrase: &str) -> bool {
    let haystack = format!(" {} ", normalize_label(haystack));
    let phrase = normalize_label(phrase);
    if phrase.is_empty() {
        return false;
    }
    haystack.contains(&format!(" {} ", phrase))
}

/// Leading decimal digits of an account code, e.g. `1010.02` -> 1010.
pub fn account_number(code: &str) -> Option<u64> {
    let digits: String = code
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}
