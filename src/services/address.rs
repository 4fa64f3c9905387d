//! Free-text address parsing and comparison.
//!
//! The portal renders the on-file mailing address as multi-line markup while
//! the user payload is a single line, so both sides are cleaned and parsed
//! into the same structure before comparing. Pure string logic, no I/O.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

/// `", FL 33101"` or `" FL 33101-0000"` anchored at the end of the string.
/// The comma is optional but the state token must be set off by a separator
/// so a trailing city fragment cannot be mistaken for a state code.
static STATE_ZIP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:,|\s)\s*([A-Z]{2})\s+(\d{5}(?:-\d{4})?)$").expect("state/zip pattern")
});

/// Street suffix tokens, full forms before abbreviations, word-boundary
/// matched with an optional trailing period.
static SUFFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(street|avenue|drive|road|boulevard|lane|court|circle|parkway|place|terrace|highway|square|suite|apartment|st|ave|dr|rd|blvd|ln|ct|cir|way|pkwy|pl|ter|hwy|sq|apt|unit|ste)\b\.?",
    )
    .expect("street suffix pattern")
});

/// Trailing country designator the portal appends.
static COUNTRY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s+USA?$").expect("country suffix pattern"));

/// Structured mailing address. Derived and ephemeral; recomputed per
/// comparison, never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedAddress {
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip: String,
}

impl fmt::Display for ParsedAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.street)?;
        if !self.city.is_empty() {
            write!(f, ", {}", self.city)?;
        }
        if !self.state.is_empty() {
            write!(f, ", {} {}", self.state, self.zip)?;
        }
        Ok(())
    }
}

/// Prepare a raw portal or payload address for parsing: drop a trailing
/// " US"/" USA", turn embedded newlines into comma separators, collapse
/// whitespace.
pub fn clean_address(raw: &str) -> String {
    let cleaned = COUNTRY_RE.replace(raw.trim(), "");
    collapse_whitespace(&cleaned.replace('\n', ", "))
}

/// Parse a single-line address into street/city/state/zip.
///
/// If the state+zip tail is absent the whole input becomes `street` with the
/// other fields empty; degraded output, not a failure. The left portion is
/// split on the last comma when one exists, otherwise on the last street
/// suffix token. Last-match-wins handles street names that themselves
/// contain a suffix word ("123 St Marks Pl").
pub fn parse_address(input: &str) -> ParsedAddress {
    let full = collapse_whitespace(input);

    let Some(caps) = STATE_ZIP_RE.captures(&full) else {
        return ParsedAddress {
            street: full,
            ..Default::default()
        };
    };

    let state = caps[1].to_string();
    let zip = caps[2].to_string();
    let tail_start = caps.get(0).map_or(full.len(), |m| m.start());
    let left = full[..tail_start].trim();

    let (street, city) = if let Some(idx) = left.rfind(',') {
        (left[..idx].trim(), left[idx + 1..].trim())
    } else if let Some(m) = SUFFIX_RE.find_iter(left).last() {
        (left[..m.end()].trim(), left[m.end()..].trim())
    } else {
        (left, "")
    };

    ParsedAddress {
        street: street.to_string(),
        city: city.to_string(),
        state,
        zip,
    }
}

/// Decide whether two free-text addresses denote the same mailing address.
///
/// Both sides are cleaned and parsed, then street, city, state and zip are
/// compared after normalization. Zip is compared literally: `33101` and
/// `33101-0000` are different addresses here.
pub fn addresses_match(a: &str, b: &str) -> bool {
    let ca = clean_address(a);
    let cb = clean_address(b);
    let pa = parse_address(&ca);
    let pb = parse_address(&cb);

    debug!(
        "comparing addresses: \"{ca}\" -> {pa:?} vs \"{cb}\" -> {pb:?}"
    );

    normalize(&pa.street) == normalize(&pb.street)
        && normalize(&pa.city) == normalize(&pb.city)
        && normalize(&pa.state) == normalize(&pb.state)
        && normalize(&pa.zip) == normalize(&pb.zip)
}

fn normalize(s: &str) -> String {
    s.to_lowercase().replace(['.', ','], "").trim().to_string()
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_suffix_split_without_comma() {
        let parsed = parse_address("123 Test St Miami, FL 33101");
        assert_eq!(
            parsed,
            ParsedAddress {
                street: "123 Test St".to_string(),
                city: "Miami".to_string(),
                state: "FL".to_string(),
                zip: "33101".to_string(),
            }
        );
    }

    #[test]
    fn last_suffix_token_wins() {
        // "St" in the street name must not become the split point.
        let parsed = parse_address("123 St Marks Pl New York, FL 33101");
        assert_eq!(parsed.street, "123 St Marks Pl");
        assert_eq!(parsed.city, "New York");
    }

    #[test]
    fn splits_on_last_comma_when_present() {
        let parsed = parse_address("500 E Broward Blvd, Suite 1700, Fort Lauderdale, FL 33394");
        assert_eq!(parsed.street, "500 E Broward Blvd, Suite 1700");
        assert_eq!(parsed.city, "Fort Lauderdale");
        assert_eq!(parsed.zip, "33394");
    }

    #[test]
    fn missing_tail_degrades_to_street_only() {
        let parsed = parse_address("somewhere on the beach");
        assert_eq!(parsed.street, "somewhere on the beach");
        assert_eq!(parsed.city, "");
        assert_eq!(parsed.state, "");
        assert_eq!(parsed.zip, "");
    }

    #[test]
    fn no_suffix_means_whole_left_is_street() {
        let parsed = parse_address("PO BOX 1234, FL 33101");
        assert_eq!(parsed.street, "PO BOX 1234");
        assert_eq!(parsed.city, "");
    }

    #[test]
    fn plus_four_zip_is_captured() {
        let parsed = parse_address("123 Main St, Miami, FL 33101-0000");
        assert_eq!(parsed.zip, "33101-0000");
    }

    #[test]
    fn city_fragment_is_not_mistaken_for_state() {
        // Ends in two capitals glued to the city; must not parse "LA" as state.
        let parsed = parse_address("123 Main St OCALA 33101");
        assert_eq!(parsed.state, "");
        assert_eq!(parsed.street, "123 Main St OCALA 33101");
    }

    #[test]
    fn clean_strips_country_and_newlines() {
        assert_eq!(
            clean_address("123 TEST ST\nMIAMI, FL 33101 US"),
            "123 TEST ST, MIAMI, FL 33101"
        );
        assert_eq!(
            clean_address("123 TEST ST\nMIAMI, FL 33101\nUSA"),
            "123 TEST ST, MIAMI, FL 33101"
        );
    }

    #[test]
    fn parse_is_idempotent_over_its_own_rendering() {
        for input in [
            "123 Test St Miami, FL 33101",
            "123 St Marks Pl, New York, FL 33101",
            "PO BOX 1234, FL 33101",
            "somewhere on the beach",
        ] {
            let once = parse_address(&clean_address(input));
            let twice = parse_address(&clean_address(&once.to_string()));
            assert_eq!(once, twice, "reparse of {input:?} diverged");
        }
    }

    #[test]
    fn match_is_reflexive() {
        for addr in [
            "123 Test St Miami, FL 33101",
            "123 TEST ST\nMIAMI, FL 33101 US",
            "500 E Broward Blvd, Suite 1700, Fort Lauderdale, FL 33394",
        ] {
            assert!(addresses_match(addr, addr), "{addr:?} did not match itself");
        }
    }

    #[test]
    fn match_ignores_case_and_punctuation() {
        assert!(addresses_match(
            "123 Main St., Miami, FL 33101",
            "123 MAIN ST MIAMI, FL 33101"
        ));
    }

    #[test]
    fn match_crosses_portal_and_payload_formats() {
        assert!(addresses_match(
            "123 TEST ST\nMIAMI, FL 33101 US",
            "123 Test St Miami, FL 33101"
        ));
    }

    #[test]
    fn plus_four_zip_is_a_different_address() {
        // Zip equality is literal; the +4 suffix is not stripped.
        assert!(!addresses_match(
            "123 Main St, Miami, FL 33101",
            "123 MAIN ST, MIAMI, FL 33101-0000"
        ));
    }

    #[test]
    fn differing_state_is_a_different_address() {
        assert!(!addresses_match(
            "123 Main St, Springfield, FL 32401",
            "123 Main St, Springfield, GA 32401"
        ));
    }

    #[test]
    fn differing_street_is_a_different_address() {
        assert!(!addresses_match(
            "123 Main St, Miami, FL 33101",
            "125 Main St, Miami, FL 33101"
        ));
    }
}
