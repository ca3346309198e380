use mdm_core::error::{MdmError, MdmResult};
use mdm_core::types::AttributeValue;

use crate::Comparator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhoneticMethod {
    Soundex,
    Metaphone,
    Nysiis,
}

impl PhoneticMethod {
    fn parse(s: &str) -> MdmResult<Self> {
        match s {
            "soundex" => Ok(PhoneticMethod::Soundex),
            "metaphone" => Ok(PhoneticMethod::Metaphone),
            "nysiis" => Ok(PhoneticMethod::Nysiis),
            other => Err(MdmError::Config(format!(
                "unknown phonetic method '{other}', expected one of soundex|metaphone|nysiis"
            ))),
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            PhoneticMethod::Soundex => "soundex",
            PhoneticMethod::Metaphone => "metaphone",
            PhoneticMethod::Nysiis => "nysiis",
        }
    }
}

pub struct PhoneticComparator {
    id: String,
    method: PhoneticMethod,
}

impl PhoneticComparator {
    pub fn new(method: PhoneticMethod) -> Self {
        Self {
            id: format!("phonetic:{}", method.as_str()),
            method,
        }
    }

    pub(crate) fn from_params(params: &serde_json::Value) -> MdmResult<Self> {
        let method = params
            .get("method")
            .and_then(|v| v.as_str())
            .unwrap_or("soundex");
        Ok(Self::new(PhoneticMethod::parse(method)?))
    }
}

impl Comparator for PhoneticComparator {
    fn id(&self) -> &str {
        &self.id
    }

    fn compare(&self, left: &AttributeValue, right: &AttributeValue) -> MdmResult<f64> {
        let (a, b) = match (left.as_text(), right.as_text()) {
            (Some(a), Some(b)) => (a, b),
            _ => return Ok(0.0),
        };
        let (code_a, code_b) = match self.method {
            PhoneticMethod::Soundex => (soundex(&a), soundex(&b)),
            PhoneticMethod::Metaphone => (metaphone(&a), metaphone(&b)),
            PhoneticMethod::Nysiis => (nysiis(&a), nysiis(&b)),
        };
        Ok(if !code_a.is_empty() && code_a == code_b {
            1.0
        } else {
            0.0
        })
    }
}

fn soundex_code(c: char) -> Option<char> {
    match c.to_ascii_uppercase() {
        'B' | 'F' | 'P' | 'V' => Some('1'),
        'C' | 'G' | 'J' | 'K' | 'Q' | 'S' | 'X' | 'Z' => Some('2'),
        'D' | 'T' => Some('3'),
        'L' => Some('4'),
        'M' | 'N' => Some('5'),
        'R' => Some('6'),
        _ => None,
    }
}

/// Classic Soundex: first letter retained, subsequent digits deduplicated
/// against the immediately preceding code, vowels and H/W/Y dropped, padded
/// or truncated to four characters.
fn soundex(s: &str) -> String {
    let chars: Vec<char> = s.chars().filter(|c| c.is_ascii_alphabetic()).collect();
    if chars.is_empty() {
        return String::new();
    }
    let mut out = String::new();
    out.push(chars[0].to_ascii_uppercase());
    let mut last_code = soundex_code(chars[0]);
    for &c in &chars[1..] {
        let code = soundex_code(c);
        if code.is_some() && code != last_code {
            out.push(code.unwrap());
        }
        if !matches!(c.to_ascii_uppercase(), 'H' | 'W') {
            last_code = code;
        }
        if out.len() >= 4 {
            break;
        }
    }
    while out.len() < 4 {
        out.push('0');
    }
    out
}

/// Simplified Metaphone: a practical subset of the classic rule table
/// sufficient for deduplication purposes (common digraphs, silent letters,
/// voiced/voiceless consonant collapsing). Not a full implementation of
/// every historical edge case.
fn metaphone(s: &str) -> String {
    let chars: Vec<char> = s
        .to_uppercase()
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .collect();
    if chars.is_empty() {
        return String::new();
    }
    let mut out = String::new();
    let n = chars.len();
    let mut i = 0;

    if n >= 2 {
        let pair: String = chars[0..2].iter().collect();
        match pair.as_str() {
            "KN" | "GN" | "PN" | "AE" | "WR" => i = 1,
            "WH" => {
                out.push('W');
                i = 2;
            }
            _ => {}
        }
    }
    if i == 0 && chars[0] == 'X' {
        out.push('S');
        i = 1;
    }

    while i < n && out.len() < 6 {
        let c = chars[i];
        if i > 0 && c == chars[i - 1] && c != 'C' {
            i += 1;
            continue;
        }
        match c {
            'A' | 'E' | 'I' | 'O' | 'U' => {
                if i == 0 {
                    out.push(c);
                }
            }
            'B' => {
                if !(i == n - 1 && i > 0 && chars[i - 1] == 'M') {
                    out.push('B');
                }
            }
            'C' => {
                if i + 1 < n && chars[i + 1] == 'H' {
                    out.push('X');
                    i += 1;
                } else if i + 1 < n && matches!(chars[i + 1], 'I' | 'E' | 'Y') {
                    out.push('S');
                } else {
                    out.push('K');
                }
            }
            'D' => {
                if i + 2 < n && chars[i + 1] == 'G' && matches!(chars[i + 2], 'E' | 'Y' | 'I') {
                    out.push('J');
                    i += 2;
                } else {
                    out.push('T');
                }
            }
            'G' => {
                if i + 1 < n && chars[i + 1] == 'H' {
                    i += 1;
                } else if i + 1 < n && matches!(chars[i + 1], 'I' | 'E' | 'Y') {
                    out.push('J');
                } else {
                    out.push('K');
                }
            }
            'H' => {
                let prev_vowel = i > 0 && matches!(chars[i - 1], 'A' | 'E' | 'I' | 'O' | 'U');
                let next_vowel =
                    i + 1 < n && matches!(chars[i + 1], 'A' | 'E' | 'I' | 'O' | 'U');
                if !prev_vowel || next_vowel {
                    out.push('H');
                }
            }
            'K' => {
                if !(i > 0 && chars[i - 1] == 'C') {
                    out.push('K');
                }
            }
            'P' => {
                if i + 1 < n && chars[i + 1] == 'H' {
                    out.push('F');
                    i += 1;
                } else {
                    out.push('P');
                }
            }
            'Q' => out.push('K'),
            'S' => {
                if i + 1 < n && chars[i + 1] == 'H' {
                    out.push('X');
                    i += 1;
                } else {
                    out.push('S');
                }
            }
            'T' => {
                if i + 1 < n && chars[i + 1] == 'H' {
                    out.push('0');
                    i += 1;
                } else {
                    out.push('T');
                }
            }
            'V' => out.push('F'),
            'W' | 'Y' => {
                if i + 1 < n && matches!(chars[i + 1], 'A' | 'E' | 'I' | 'O' | 'U') {
                    out.push(c);
                }
            }
            'X' => {
                out.push('K');
                out.push('S');
            }
            'Z' => out.push('S'),
            'F' | 'J' | 'L' | 'M' | 'N' | 'R' => out.push(c),
            _ => {}
        }
        i += 1;
    }
    out
}

/// Simplified NYSIIS: initial-letter transliteration plus trailing-suffix
/// normalization, truncated to six characters.
fn nysiis(s: &str) -> String {
    let mut chars: Vec<char> = s
        .to_uppercase()
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .collect();
    if chars.is_empty() {
        return String::new();
    }

    replace_prefix(&mut chars, "MAC", "MCC");
    replace_prefix(&mut chars, "KN", "NN");
    replace_prefix(&mut chars, "K", "C");
    replace_prefix(&mut chars, "PH", "FF");
    replace_prefix(&mut chars, "PF", "FF");
    replace_prefix(&mut chars, "SCH", "SSS");

    replace_suffix(&mut chars, "EE", "Y");
    replace_suffix(&mut chars, "IE", "Y");
    replace_suffix(&mut chars, "DT", "D");
    replace_suffix(&mut chars, "RT", "D");
    replace_suffix(&mut chars, "RD", "D");
    replace_suffix(&mut chars, "NT", "D");
    replace_suffix(&mut chars, "ND", "D");

    let mut out = String::new();
    out.push(chars[0]);
    let mut last = chars[0];
    for &c in &chars[1..] {
        let mapped = match c {
            'A' | 'E' | 'I' | 'O' | 'U' => 'A',
            'Q' => 'G',
            'Z' => 'S',
            'M' => 'N',
            'K' => 'C',
            'V' => 'F',
            other => other,
        };
        if mapped != last {
            out.push(mapped);
        }
        last = mapped;
    }
    out.truncate(6);
    out
}

fn replace_prefix(chars: &mut Vec<char>, from: &str, to: &str) {
    let from_chars: Vec<char> = from.chars().collect();
    if chars.len() >= from_chars.len() && chars[..from_chars.len()] == from_chars[..] {
        let rest = chars.split_off(from_chars.len());
        *chars = to.chars().chain(rest).collect();
    }
}

fn replace_suffix(chars: &mut Vec<char>, from: &str, to: &str) {
    let from_chars: Vec<char> = from.chars().collect();
    let len = chars.len();
    if len >= from_chars.len() && chars[len - from_chars.len()..] == from_chars[..] {
        chars.truncate(len - from_chars.len());
        chars.extend(to.chars());
    }
}
