//! Detection of the daily leet winner announcements.

use std::sync::OnceLock;

use regex::Regex;

static RE_WINNERS: OnceLock<Regex> = OnceLock::new();
static RE_EKAVIKA: OnceLock<Regex> = OnceLock::new();

/// A recognized leet announcement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeetMatch {
    /// The first, last and closest-to-multileet winners of the day.
    Winners {
        /// First to leet.
        first: String,
        /// Last to leet.
        last: String,
        /// Closest to a multileet.
        multileet: String,
    },
    /// The first (eka) and last (vika) of the day.
    EkaVika {
        /// First of the day.
        eka: String,
        /// Last of the day.
        vika: String,
    },
}

/// Scans raw lines for leet announcements.
pub trait LeetMatcher: Send + Sync {
    /// Returns every announcement found in `line`.
    fn scan(&self, line: &str) -> Vec<LeetMatch>;
}

/// Matches the announcements of the leet bots by regular expression.
#[derive(Debug, Default, Clone, Copy)]
pub struct LeetDetector;

impl LeetDetector {
    fn winners() -> &'static Regex {
        RE_WINNERS.get_or_init(|| {
            Regex::new(
                r"Ensimmäinen leettaaja oli (\S+) .*?, viimeinen oli (\S+) .*?Lähimpänä multileettiä oli (\S+)",
            )
            .expect("invalid regex")
        })
    }

    fn ekavika() -> &'static Regex {
        RE_EKAVIKA.get_or_init(|| {
            Regex::new(r"𝙫𝙞𝙠𝙖 oli (\w+) kello .*?, ja 𝖊𝖐𝖆 oli (\w+)").expect("invalid regex")
        })
    }
}

impl LeetMatcher for LeetDetector {
    fn scan(&self, line: &str) -> Vec<LeetMatch> {
        let mut matches = vec![];

        if let Some(caps) = Self::winners().captures(line) {
            matches.push(LeetMatch::Winners {
                first: caps[1].to_string(),
                last: caps[2].to_string(),
                multileet: caps[3].to_string(),
            });
        }

        if let Some(caps) = Self::ekavika().captures(line) {
            matches.push(LeetMatch::EkaVika {
                vika: caps[1].to_string(),
                eka: caps[2].to_string(),
            });
        }

        matches
    }
}
