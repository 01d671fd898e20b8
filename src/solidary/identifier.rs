use chrono::NaiveDate;
use regex::{Captures, Regex};
use crate::error::Result;
use super::types::IdScheme;

const RFC_PATTERN: &str = r"^([A-ZÑ&]{3,4})([0-9]{2})([0-9]{2})([0-9]{2})([A-Z0-9]{2})([0-9A])$";
const RFC_ALPHABET: &str = "0123456789ABCDEFGHIJKLMN&OPQRSTUVWXYZ Ñ";

/// Consignee identifier validator built from an [`IdScheme`].
#[derive(Debug, Clone)]
pub enum IdValidator {
    /// Mexican taxpayer registry code: format, embedded date and check digit.
    Rfc(Regex),
    Pattern(Regex),
}

impl IdValidator {
    pub fn from_scheme(scheme: &IdScheme) -> Result<Self> {
        Ok(match scheme {
            IdScheme::Rfc => IdValidator::Rfc(Regex::new(RFC_PATTERN)?),
            IdScheme::Pattern(pattern) => IdValidator::Pattern(Regex::new(pattern)?),
        })
    }

    /// Returns the reason the identifier is invalid, if it is.
    pub fn validate(&self, value: &str) -> Option<String> {
        let value = value.trim();
        match self {
            IdValidator::Pattern(re) => {
                (!re.is_match(value)).then(|| format!("'{}' does not match pattern {}", value, re.as_str()))
            }
            IdValidator::Rfc(re) => validate_rfc(re, value),
        }
    }
}

fn validate_rfc(re: &Regex, value: &str) -> Option<String> {
    let upper = value.to_uppercase();
    let Some(caps) = re.captures(&upper) else {
        return Some(format!("'{}' is not a well-formed RFC", value));
    };

    if embedded_date(&caps).is_none() {
        return Some(format!("'{}' embeds an invalid date", value));
    }

    let (Some(expected), Some(actual)) = (rfc_check_digit(&upper), upper.chars().last()) else {
        return Some(format!("'{}' contains characters outside the RFC alphabet", value));
    };
    (expected != actual).then(|| format!("'{}' has check digit {} but {} was expected", value, actual, expected))
}

/// The YYMMDD date after the name letters, read in either century.
fn embedded_date(caps: &Captures<'_>) -> Option<NaiveDate> {
    let yy: i32 = caps.get(2)?.as_str().parse().ok()?;
    let mm: u32 = caps.get(3)?.as_str().parse().ok()?;
    let dd: u32 = caps.get(4)?.as_str().parse().ok()?;
    [2000, 1900]
        .into_iter()
        .find_map(|century| NaiveDate::from_ymd_opt(century + yy, mm, dd))
}

/// Modulo-11 check digit over the first 12 positions, with 12-character
/// codes padded by a leading space.
pub fn rfc_check_digit(rfc: &str) -> Option<char> {
    let chars: Vec<char> = rfc.chars().collect();
    if chars.len() < 12 {
        return None;
    }
    let mut body: Vec<char> = chars[..chars.len() - 1].to_vec();
    if body.len() == 11 {
        body.insert(0, ' ');
    }

    let mut sum = 0u32;
    for (i, c) in body.iter().enumerate() {
        let value = RFC_ALPHABET.chars().position(|a| a == *c)? as u32;
        sum += value * (13 - i as u32);
    }

    Some(match sum % 11 {
        0 => '0',
        r if 11 - r == 10 => 'A',
        r => char::from_digit(11 - r, 10)?,
    })
}
