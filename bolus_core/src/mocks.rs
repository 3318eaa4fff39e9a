//! Test and helper stores for bolus_core

use bolus_traits::{LearningProfile, LearningStore, MealOutcomeRecord};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A store whose every operation fails; exercises the tolerated-failure paths.
#[derive(Debug, Default)]
pub struct FailingStore {
    pub attempts: usize,
}

impl LearningStore for FailingStore {
    fn save(&mut self, _profile: &LearningProfile) -> Result<(), BoxError> {
        self.attempts += 1;
        Err(Box::new(std::io::Error::other("store offline")))
    }

    fn load(&mut self) -> Result<Option<LearningProfile>, BoxError> {
        self.attempts += 1;
        Err(Box::new(std::io::Error::other("store offline")))
    }

    fn save_outcome(&mut self, _record: &MealOutcomeRecord) -> Result<(), BoxError> {
        self.attempts += 1;
        Err(Box::new(std::io::Error::other("store offline")))
    }

    fn load_outcomes(&mut self) -> Result<Vec<MealOutcomeRecord>, BoxError> {
        self.attempts += 1;
        Err(Box::new(std::io::Error::other("store offline")))
    }

    fn clear(&mut self) -> Result<(), BoxError> {
        self.attempts += 1;
        Err(Box::new(std::io::Error::other("store offline")))
    }
}
