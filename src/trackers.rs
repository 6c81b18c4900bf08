//! Keyed counters persisted as JSON files.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, OnceLock};

use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::Error;
use crate::consts::DRINK_WORDS;
use crate::leet::LeetMatch;
use crate::services::{DrinkTracker, LeetTracker, WordTracker};

static RE_WORD: OnceLock<Regex> = OnceLock::new();
static RE_DRINK: OnceLock<Regex> = OnceLock::new();

/// Returns the lowercased words in `text`.
#[must_use]
pub fn tokenize_words(text: &str) -> Vec<String> {
    let re = RE_WORD.get_or_init(|| Regex::new(r"\b\w+\b").expect("invalid regex"));
    let lowercased = text.to_lowercase();

    re.find_iter(&lowercased)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// A drink announcement like `krak (olut)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrinkMention {
    /// The drink word, lowercased.
    pub word: String,
    /// The text in parentheses, lowercased and trimmed.
    pub detail: String,
}

/// Returns every drink announcement in `text` whose word is a known drink word.
#[must_use]
pub fn find_drinks(text: &str) -> Vec<DrinkMention> {
    let re = RE_DRINK
        .get_or_init(|| Regex::new(r"(\w+)\s*\(\s*([\w\s]+)\s*\)").expect("invalid regex"));

    re.captures_iter(text)
        .map(|caps| DrinkMention {
            word: caps[1].to_lowercase(),
            detail: caps[2].trim().to_lowercase(),
        })
        .filter(|mention| DRINK_WORDS.contains(&mention.word.as_str()))
        .collect()
}

/// A value kept in memory and written to a JSON file on [`JsonStore::save`].
pub struct JsonStore<T> {
    path: PathBuf,
    data: Mutex<T>,
}

impl<T> JsonStore<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    /// Loads the store from `path`, starting empty if the file doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but can't be read or parsed.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, Error> {
        let path = path.into();
        let data = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "starting with empty store");
                T::default()
            }
            Err(source) => {
                return Err(Error::Persist {
                    path: path.display().to_string(),
                    source,
                });
            }
        };

        Ok(JsonStore {
            path,
            data: Mutex::new(data),
        })
    }

    /// Returns the path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Locks and returns the data.
    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.data
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Writes the data to the backing file, replacing it atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if the data can't be serialized or written.
    pub fn save(&self) -> Result<(), Error> {
        let json = serde_json::to_vec_pretty(&*self.lock())?;
        let persist_err = |source| Error::Persist {
            path: self.path.display().to_string(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(persist_err)?;
        }

        let tmp = self.path.with_extension("json.tmp");

        fs::write(&tmp, json).map_err(persist_err)?;
        fs::rename(&tmp, &self.path).map_err(persist_err)?;
        trace!(path = %self.path.display(), "saved store");

        Ok(())
    }
}

/// Word counts per server, nick and word.
pub type WordMap = BTreeMap<String, BTreeMap<String, BTreeMap<String, u64>>>;

/// Counts the words people say.
pub struct WordCounts {
    store: JsonStore<WordMap>,
}

impl WordCounts {
    /// Loads the counts from `<data_dir>/words.json`.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file can't be read.
    pub fn load(data_dir: &Path) -> Result<Self, Error> {
        Ok(WordCounts {
            store: JsonStore::load(data_dir.join("words.json"))?,
        })
    }

    /// Returns how many times `nick` has said `word` on `server_id`.
    #[must_use]
    pub fn count(&self, server_id: &str, nick: &str, word: &str) -> u64 {
        self.store
            .lock()
            .get(server_id)
            .and_then(|nicks| nicks.get(&nick.to_lowercase()))
            .and_then(|words| words.get(&word.to_lowercase()))
            .copied()
            .unwrap_or(0)
    }
}

impl WordTracker for WordCounts {
    fn track_words(&self, server_id: &str, nick: &str, words: &[String]) -> Result<(), Error> {
        let mut data = self.store.lock();
        let counts = data
            .entry(server_id.to_string())
            .or_default()
            .entry(nick.to_lowercase())
            .or_default();

        for word in words {
            *counts.entry(word.clone()).or_default() += 1;
        }

        Ok(())
    }

    fn flush(&self) -> Result<(), Error> {
        self.store.save()
    }
}

/// Drink statistics of a single nick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrinkStats {
    /// Total announcements.
    pub total: u64,
    /// Announcements per drink word.
    pub words: BTreeMap<String, u64>,
    /// Announcements per detail, e.g. the beverage.
    pub details: BTreeMap<String, u64>,
}

/// Counts drink announcements.
pub struct DrinkCounts {
    store: JsonStore<BTreeMap<String, BTreeMap<String, DrinkStats>>>,
}

impl DrinkCounts {
    /// Loads the counts from `<data_dir>/drinks.json`.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file can't be read.
    pub fn load(data_dir: &Path) -> Result<Self, Error> {
        Ok(DrinkCounts {
            store: JsonStore::load(data_dir.join("drinks.json"))?,
        })
    }

    /// Returns the statistics of `nick` on `server_id`.
    #[must_use]
    pub fn stats(&self, server_id: &str, nick: &str) -> DrinkStats {
        self.store
            .lock()
            .get(server_id)
            .and_then(|nicks| nicks.get(&nick.to_lowercase()))
            .cloned()
            .unwrap_or_default()
    }
}

impl DrinkTracker for DrinkCounts {
    fn track_drink(
        &self,
        server_id: &str,
        nick: &str,
        drink_word: &str,
        detail: &str,
    ) -> Result<(), Error> {
        let mut data = self.store.lock();
        let stats = data
            .entry(server_id.to_string())
            .or_default()
            .entry(nick.to_lowercase())
            .or_default();

        stats.total += 1;
        *stats.words.entry(drink_word.to_string()).or_default() += 1;
        *stats.details.entry(detail.to_string()).or_default() += 1;

        Ok(())
    }

    fn flush(&self) -> Result<(), Error> {
        self.store.save()
    }
}

/// Leet wins of a single nick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeetCounts {
    /// First to leet.
    pub first: u64,
    /// Last to leet.
    pub last: u64,
    /// Closest to a multileet.
    pub multileet: u64,
    /// First of the day.
    pub eka: u64,
    /// Last of the day.
    pub vika: u64,
}

/// Counts leet wins.
pub struct LeetStats {
    store: JsonStore<BTreeMap<String, BTreeMap<String, LeetCounts>>>,
}

impl LeetStats {
    /// Loads the stats from `<data_dir>/leet.json`.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file can't be read.
    pub fn load(data_dir: &Path) -> Result<Self, Error> {
        Ok(LeetStats {
            store: JsonStore::load(data_dir.join("leet.json"))?,
        })
    }

    /// Returns the counts of `nick` on `server_id`.
    #[must_use]
    pub fn counts(&self, server_id: &str, nick: &str) -> LeetCounts {
        self.store
            .lock()
            .get(server_id)
            .and_then(|nicks| nicks.get(nick))
            .copied()
            .unwrap_or_default()
    }
}

impl LeetTracker for LeetStats {
    fn record(&self, server_id: &str, leet: &LeetMatch) -> Result<(), Error> {
        let mut data = self.store.lock();
        let nicks = data.entry(server_id.to_string()).or_default();
        let mut bump = |nick: &str, field: fn(&mut LeetCounts) -> &mut u64| {
            *field(nicks.entry(nick.to_string()).or_default()) += 1;
        };

        match leet {
            LeetMatch::Winners {
                first,
                last,
                multileet,
            } => {
                bump(first, |c| &mut c.first);
                bump(last, |c| &mut c.last);
                bump(multileet, |c| &mut c.multileet);
            }
            LeetMatch::EkaVika { eka, vika } => {
                bump(eka, |c| &mut c.eka);
                bump(vika, |c| &mut c.vika);
            }
        }

        Ok(())
    }

    fn flush(&self) -> Result<(), Error> {
        self.store.save()
    }
}
