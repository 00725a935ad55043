// Crisis keyword sets
//
// Two ordered phrase lists: general crisis phrases and anxiety-crisis
// phrases. Matching is plain substring containment on lowercased text, so
// short phrases like "hang" also fire inside longer words. That over-match
// is accepted: a false positive costs a modal, a miss costs far more.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

const GENERAL_PHRASES: &[&str] = &[
    "suicide",
    "kill myself",
    "end it all",
    "better off dead",
    "want to die",
    "self-harm",
    "hurt myself",
    "cut myself",
    "self-injury",
    "cutting",
    "no point",
    "hopeless",
    "cant go on",
    "worthless",
    "no way out",
    "never get better",
    "nothing helps",
    "give up",
    "cant take it",
    "pills",
    "overdose",
    "weapon",
    "jump",
    "hang",
    "rope",
    "bridge",
    "poison",
    "car crash",
    "knife",
    "gun",
    "shooting myself",
    "escape this pain",
    "make it stop",
    "end the suffering",
    "permanent solution",
    "everyone better without me",
    "burden to everyone",
    "disappear forever",
];

const ANXIETY_PHRASES: &[&str] = &[
    "panic attack wont stop",
    "cant breathe",
    "heart racing for hours",
    "feel like dying",
    "going crazy",
    "losing my mind",
    "cant handle this",
    "anxiety too much",
    "overwhelming panic",
    "spiraling out of control",
    "cant leave house",
    "scared of everything",
    "avoiding all people",
    "hiding from life",
    "too scared to live",
    "paralyzed by fear",
    "chest pain wont stop",
    "dizzy for days",
    "shaking uncontrollably",
    "nausea all the time",
    "cant eat or sleep",
    "body shutting down",
];

/// On-disk shape of a keyword file
#[derive(Debug, Clone, Serialize, Deserialize)]
struct KeywordFile {
    general: Vec<String>,
    #[serde(default)]
    domain: Vec<String>,
}

/// Immutable, validated phrase lists used by the detector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordSet {
    general: Vec<String>,
    domain: Vec<String>,
}

impl KeywordSet {
    /// Build a keyword set, normalizing every phrase to trimmed lowercase.
    ///
    /// Fails on empty phrases and on phrases that appear in both lists.
    /// Duplicates within one list keep their first position.
    pub fn new<G, D>(general: G, domain: D) -> Result<Self>
    where
        G: IntoIterator,
        G::Item: AsRef<str>,
        D: IntoIterator,
        D::Item: AsRef<str>,
    {
        let general = normalize_list(general, "general")?;
        let domain = normalize_list(domain, "domain")?;

        let general_set: HashSet<&str> = general.iter().map(String::as_str).collect();
        if let Some(shared) = domain.iter().find(|p| general_set.contains(p.as_str())) {
            bail!("Phrase '{}' appears in both general and domain lists", shared);
        }

        Ok(Self { general, domain })
    }

    /// Load keywords from a JSON file: `{"general": [...], "domain": [...]}`
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read crisis keywords file: {}", path.display()))?;

        let file: KeywordFile =
            serde_json::from_str(&contents).context("Failed to parse crisis keywords file")?;

        let set = Self::new(file.general, file.domain)
            .with_context(|| format!("Invalid crisis keywords in {}", path.display()))?;

        tracing::info!(
            path = %path.display(),
            general = set.general.len(),
            domain = set.domain.len(),
            "Loaded crisis keywords"
        );
        Ok(set)
    }

    pub fn general(&self) -> &[String] {
        &self.general
    }

    pub fn domain(&self) -> &[String] {
        &self.domain
    }

    /// Total number of phrases across both lists
    pub fn len(&self) -> usize {
        self.general.len() + self.domain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for KeywordSet {
    fn default() -> Self {
        Self {
            general: GENERAL_PHRASES.iter().map(|p| p.to_string()).collect(),
            domain: ANXIETY_PHRASES.iter().map(|p| p.to_string()).collect(),
        }
    }
}

fn normalize_list<I>(phrases: I, list: &str) -> Result<Vec<String>>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for (index, phrase) in phrases.into_iter().enumerate() {
        let normalized = phrase.as_ref().trim().to_lowercase();
        if normalized.is_empty() {
            bail!("Empty phrase at position {} of the {} list", index, list);
        }
        if seen.insert(normalized.clone()) {
            out.push(normalized);
        }
    }

    Ok(out)
}
