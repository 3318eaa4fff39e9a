//! Learning store implementations.
//!
//! - `MemoryStore`: process-local, used for replays and tests.
//! - `JsonFileStore`: `profile.json` plus an `outcomes.jsonl` log capped to the
//!   newest `max_outcomes` records.
pub mod error;
pub mod util;

use std::collections::VecDeque;
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use bolus_traits::{LearningProfile, LearningStore, MealOutcomeRecord};

pub use crate::error::StoreError;

/// Default cap on retained outcome records.
pub const DEFAULT_MAX_OUTCOMES: usize = 1000;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// In-memory store; keeps the newest `max_outcomes` records.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    profile: Option<LearningProfile>,
    outcomes: VecDeque<MealOutcomeRecord>,
    max_outcomes: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_OUTCOMES)
    }
}

impl MemoryStore {
    pub fn new(max_outcomes: usize) -> Self {
        Self {
            profile: None,
            outcomes: VecDeque::new(),
            max_outcomes: max_outcomes.max(1),
        }
    }

    /// Seed the store with an existing profile.
    pub fn with_profile(mut self, profile: LearningProfile) -> Self {
        self.profile = Some(profile);
        self
    }

    pub fn profile(&self) -> Option<&LearningProfile> {
        self.profile.as_ref()
    }

    pub fn outcome_count(&self) -> usize {
        self.outcomes.len()
    }
}

impl LearningStore for MemoryStore {
    fn save(&mut self, profile: &LearningProfile) -> Result<(), BoxError> {
        self.profile = Some(profile.clone());
        Ok(())
    }

    fn load(&mut self) -> Result<Option<LearningProfile>, BoxError> {
        Ok(self.profile.clone())
    }

    fn save_outcome(&mut self, record: &MealOutcomeRecord) -> Result<(), BoxError> {
        self.outcomes.push_back(record.clone());
        while self.outcomes.len() > self.max_outcomes {
            self.outcomes.pop_front();
        }
        Ok(())
    }

    fn load_outcomes(&mut self) -> Result<Vec<MealOutcomeRecord>, BoxError> {
        Ok(self.outcomes.iter().cloned().collect())
    }

    fn clear(&mut self) -> Result<(), BoxError> {
        self.profile = None;
        self.outcomes.clear();
        Ok(())
    }
}

/// File-backed store rooted at a directory.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
    max_outcomes: usize,
}

impl JsonFileStore {
    const PROFILE_FILE: &'static str = "profile.json";
    const OUTCOMES_FILE: &'static str = "outcomes.jsonl";

    /// Open a store directory, creating it if needed.
    pub fn open(dir: impl AsRef<Path>, max_outcomes: usize) -> error::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            max_outcomes: max_outcomes.max(1),
        })
    }

    pub fn profile_path(&self) -> PathBuf {
        self.dir.join(Self::PROFILE_FILE)
    }

    pub fn outcomes_path(&self) -> PathBuf {
        self.dir.join(Self::OUTCOMES_FILE)
    }

    /// Remove the persisted profile and outcome log.
    pub fn remove_files(&self) -> error::Result<()> {
        for path in [self.profile_path(), self.outcomes_path()] {
            if path.exists() {
                fs::remove_file(&path)?;
            }
        }
        Ok(())
    }

    fn read_profile(&self) -> error::Result<Option<LearningProfile>> {
        let path = self.profile_path();
        if !path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(&path)?;
        let profile =
            serde_json::from_str::<LearningProfile>(&text).map_err(|e| StoreError::Corrupt {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        Ok(Some(profile))
    }

    fn read_outcomes(&self) -> error::Result<Vec<MealOutcomeRecord>> {
        let path = self.outcomes_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let reader = BufReader::new(fs::File::open(&path)?);
        let mut out = Vec::new();
        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<MealOutcomeRecord>(&line) {
                Ok(rec) => out.push(rec),
                Err(e) => {
                    tracing::warn!(line = idx + 1, error = %e, "skipping unreadable outcome record");
                }
            }
        }
        Ok(out)
    }

    fn append_outcome(&self, record: &MealOutcomeRecord) -> error::Result<()> {
        let mut records = self.read_outcomes()?;
        records.push(record.clone());
        if records.len() > self.max_outcomes {
            let drop_n = records.len() - self.max_outcomes;
            records.drain(..drop_n);
            let mut buf = Vec::new();
            for r in &records {
                serde_json::to_writer(&mut buf, r)?;
                buf.push(b'\n');
            }
            return util::write_atomically(&self.outcomes_path(), &buf);
        }
        let mut f = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.outcomes_path())?;
        let line = serde_json::to_string(record)?;
        writeln!(f, "{line}")?;
        Ok(())
    }
}

impl LearningStore for JsonFileStore {
    fn save(&mut self, profile: &LearningProfile) -> Result<(), BoxError> {
        let bytes = serde_json::to_vec_pretty(profile).map_err(StoreError::from)?;
        util::write_atomically(&self.profile_path(), &bytes)?;
        tracing::debug!(path = %self.profile_path().display(), "learning profile saved");
        Ok(())
    }

    fn load(&mut self) -> Result<Option<LearningProfile>, BoxError> {
        Ok(self.read_profile()?)
    }

    fn save_outcome(&mut self, record: &MealOutcomeRecord) -> Result<(), BoxError> {
        Ok(self.append_outcome(record)?)
    }

    fn load_outcomes(&mut self) -> Result<Vec<MealOutcomeRecord>, BoxError> {
        Ok(self.read_outcomes()?)
    }

    fn clear(&mut self) -> Result<(), BoxError> {
        self.remove_files()?;
        tracing::debug!(path = %self.outcomes_path().display(), "learning store cleared");
        Ok(())
    }
}
